use crate::error::{DbResult, Error};

/// The crate's in-process representation of a document. JSON is the
/// boundary format (per spec.md §4.3); this wraps the parsed value so
/// callers get typed accessors instead of re-parsing JSON at every site.
#[derive(Debug, Clone, PartialEq)]
pub struct Document(serde_json::Value);

impl Document {
    pub fn empty() -> Self {
        Document(serde_json::Value::Object(serde_json::Map::new()))
    }

    pub fn from_json(json: &str) -> DbResult<Self> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| Error::invalid_parameter(format!("invalid document json: {e}")))?;
        Ok(Document(value))
    }

    pub fn from_value(value: serde_json::Value) -> Self {
        Document(value)
    }

    pub fn to_json(&self) -> String {
        self.0.to_string()
    }

    pub fn value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn get_id(&self) -> Option<String> {
        self.0.get("_id").map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    pub fn get_string(&self, field: &str) -> Option<String> {
        self.0.get(field)?.as_str().map(str::to_owned)
    }

    pub fn get_int(&self, field: &str) -> Option<i64> {
        self.0.get(field)?.as_i64()
    }

    pub fn get_double(&self, field: &str) -> Option<f64> {
        self.0.get(field)?.as_f64()
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.0.get(field)?.as_bool()
    }

    pub fn is_null(&self, field: &str) -> bool {
        matches!(self.0.get(field), Some(serde_json::Value::Null) | None)
    }
}
