//! The columnar refinement of [`crate::registry::Driver`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DbResult;
use crate::registry::ConnectOptions;
use crate::url::ConnectionUrl;

use super::ColumnarConnection;

#[async_trait]
pub trait ColumnarDriver: crate::registry::Driver {
    async fn connect_columnar(
        &self,
        url: &ConnectionUrl,
        options: &ConnectOptions,
    ) -> DbResult<Arc<dyn ColumnarConnection>>;
}
