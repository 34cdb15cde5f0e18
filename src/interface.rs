use async_trait::async_trait;
use crate::core::{NodeRole, Result};

/// The one datastore primitive the router needs.
///
/// Runs `sql` against the connection for `role` and returns the single scalar
/// it produces, as text. Implement this over whatever driver the service
/// already uses (see `PgScalarQuery` behind the `postgres` feature), or over an
/// in-memory fake in tests.
///
/// Unreachable connections should surface as `RouterError::ConnectionError`,
/// rejected or empty queries as `RouterError::QueryError`.
#[async_trait]
pub trait ScalarQuery: Send + Sync {
    async fn query_scalar(&self, role: NodeRole, sql: &str) -> Result<String>;
}
