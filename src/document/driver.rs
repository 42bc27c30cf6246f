//! The document-store refinement of [`crate::registry::Driver`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DbResult;
use crate::registry::ConnectOptions;
use crate::url::ConnectionUrl;

use super::DocumentConnection;

#[async_trait]
pub trait DocumentDriver: crate::registry::Driver {
    async fn connect_document(
        &self,
        url: &ConnectionUrl,
        options: &ConnectOptions,
    ) -> DbResult<Arc<dyn DocumentConnection>>;
}
