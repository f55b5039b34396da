//! The connector capability shared by all drivers.

use async_trait::async_trait;

use crate::error::WbrResult;
use crate::models::frame::DailyTable;

/// A database connector: executes one query and returns a daily table.
///
/// Implementations open, use, and release their connection within the call,
/// on all exit paths. The returned table always exposes a canonical `Date`
/// column.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn execute_query(&self, query: &str) -> WbrResult<DailyTable>;
}
