//! The relational refinement of the generic [`crate::registry::Driver`]
//! contract: adds a `connect` that returns the paradigm-typed connection
//! directly, so a relational pool never has to downcast a
//! `dyn BaseConnection` back to `dyn RelationalConnection`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DbResult;
use crate::registry::ConnectOptions;
use crate::url::ConnectionUrl;

use super::RelationalConnection;

#[async_trait]
pub trait RelationalDriver: crate::registry::Driver {
    async fn connect_relational(
        &self,
        url: &ConnectionUrl,
        options: &ConnectOptions,
    ) -> DbResult<Arc<dyn RelationalConnection>>;
}
