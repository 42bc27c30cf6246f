//! Parsing for the crate's connection URL grammar:
//!
//! ```text
//! <url>     ::= "cpp_dbc:" <scheme> "://" <authority> [ "/" <path> ] [ "?" <query> ]
//! <scheme>  ::= "mysql" | "postgresql" | "sqlite" | "firebird"
//!             | "mongodb" | "mongodb+srv"
//!             | "scylladb" | "cassandra" | ...
//! <authority> ::= <host> [ ":" <port> ]
//! ```
//!
//! `sqlite` is the odd one out: `cpp_dbc:sqlite://<path>` puts a filesystem
//! path (or the literal `:memory:`) where other backends put a host/port
//! authority. Per the grammar's own note, each driver owns parsing of its
//! backend-specific remainder, so [`ConnectionUrl`] only does the generic
//! part — splitting off the backend scheme and the query string — and
//! exposes the untouched authority-plus-path remainder (`tail()`) for
//! drivers like `sqlite` that need to interpret it themselves. Drivers for
//! conventional network backends can instead use [`ConnectionUrl::host`],
//! [`ConnectionUrl::port`] and [`ConnectionUrl::database`], which are derived
//! via best-effort `host[:port][/database]` parsing of the tail.

use std::collections::HashMap;

use crate::error::{DbResult, Error};

const PREFIX: &str = "cpp_dbc:";

/// A parsed connection URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionUrl {
    raw: String,
    backend: String,
    tail: String,
    host: Option<String>,
    port: Option<u16>,
    database: Option<String>,
    options: HashMap<String, String>,
}

impl ConnectionUrl {
    /// Parses a `cpp_dbc:<backend>://...` connection string.
    pub fn parse(input: &str) -> DbResult<Self> {
        let rest = input
            .strip_prefix(PREFIX)
            .ok_or_else(|| Error::url_invalid(format!("missing '{PREFIX}' prefix in {input:?}")))?;

        let (backend, after_scheme) = rest
            .split_once("://")
            .ok_or_else(|| Error::url_invalid(format!("missing '://' after backend scheme in {input:?}")))?;

        if backend.is_empty() {
            return Err(Error::url_invalid(format!("empty backend scheme in {input:?}")));
        }

        let (tail, query) = match after_scheme.split_once('?') {
            Some((t, q)) => (t, Some(q)),
            None => (after_scheme, None),
        };

        let mut options = HashMap::new();
        if let Some(query) = query {
            for pair in query.split('&').filter(|s| !s.is_empty()) {
                match pair.split_once('=') {
                    Some((k, v)) => {
                        options.insert(percent_decode(k), percent_decode(v));
                    }
                    None => {
                        options.insert(percent_decode(pair), String::new());
                    }
                }
            }
        }

        let (host, port, database) = parse_authority_and_path(tail);

        Ok(Self {
            raw: input.to_owned(),
            backend: backend.to_owned(),
            tail: tail.to_owned(),
            host,
            port,
            database,
            options,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// The untouched authority-plus-path remainder, for drivers (like
    /// `sqlite`) whose backend-specific grammar doesn't fit `host:port/db`.
    pub fn tail(&self) -> &str {
        &self.tail
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Returns the port, falling back to `default_port` if none was given.
    pub fn port_or(&self, default_port: u16) -> u16 {
        self.port.unwrap_or(default_port)
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn options(&self) -> &HashMap<String, String> {
        &self.options
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}

impl std::fmt::Display for ConnectionUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Best-effort `host[:port][/database]` parse of the authority-and-path
/// remainder. Drivers that don't fit this shape (`sqlite`) ignore the
/// result and use [`ConnectionUrl::tail`] instead.
fn parse_authority_and_path(tail: &str) -> (Option<String>, Option<u16>, Option<String>) {
    let (authority, path) = match tail.split_once('/') {
        Some((a, p)) => (a, Some(p)),
        None => (tail, None),
    };

    let database = path.filter(|p| !p.is_empty()).map(str::to_owned);

    if authority.is_empty() {
        return (None, None, database);
    }

    match authority.rsplit_once(':') {
        Some((host, port_str)) if !host.is_empty() && port_str.chars().all(|c| c.is_ascii_digit()) && !port_str.is_empty() => {
            let port = port_str.parse::<u16>().ok();
            (Some(host.to_owned()), port, database)
        }
        _ => (Some(authority.to_owned()), None, database),
    }
}

fn percent_decode(s: &str) -> String {
    url::form_urlencoded::parse(s.as_bytes())
        .map(|(k, _)| k.into_owned())
        .next()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sqlite_memory() {
        let url = ConnectionUrl::parse("cpp_dbc:sqlite://:memory:").unwrap();
        assert_eq!(url.backend(), "sqlite");
        assert_eq!(url.tail(), ":memory:");
    }

    #[test]
    fn parses_sqlite_file_path() {
        let url = ConnectionUrl::parse("cpp_dbc:sqlite:///var/data/app.db").unwrap();
        assert_eq!(url.tail(), "/var/data/app.db");
    }

    #[test]
    fn parses_host_port_db_and_options() {
        let url = ConnectionUrl::parse(
            "cpp_dbc:postgresql://db.example.com:5433/analytics?sslmode=require&app=svc",
        )
        .unwrap();

        assert_eq!(url.backend(), "postgresql");
        assert_eq!(url.host(), Some("db.example.com"));
        assert_eq!(url.port(), Some(5433));
        assert_eq!(url.database(), Some("analytics"));
        assert_eq!(url.option("sslmode"), Some("require"));
        assert_eq!(url.option("app"), Some("svc"));
    }

    #[test]
    fn default_port_applies_when_missing() {
        let url = ConnectionUrl::parse("cpp_dbc:mongodb://localhost/testdb").unwrap();
        assert_eq!(url.port_or(27017), 27017);
        assert_eq!(url.database(), Some("testdb"));
    }

    #[test]
    fn rejects_missing_prefix() {
        assert!(ConnectionUrl::parse("postgresql://localhost").is_err());
    }

    #[test]
    fn rejects_malformed_inner_uri() {
        assert!(ConnectionUrl::parse("cpp_dbc:sqlite").is_err());
    }
}
