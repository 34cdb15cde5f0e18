// ============================================================================
// lsn_router
// ============================================================================
//
// Read-your-writes routing for primary/replica datastores.

pub mod core;
pub mod cache;
pub mod connection;
pub mod interface;
pub mod lifecycle;
pub mod prelude;
pub mod replication;
pub mod request;
pub mod router;
pub mod web;

// Re-export main types for convenience
pub use crate::core::{LogPosition, NodeRole, Result, RouterError};
pub use interface::ScalarQuery;
pub use cache::{CacheWritePolicy, MemoryPositionCache, PositionCache};
pub use connection::config::RouterConfig;
pub use lifecycle::{CompletionReport, LifecycleHook, LifecyclePhase, RequestScope};
pub use replication::{InMemoryReplicationStatus, ReplicationStatusSource, SqlReplicationStatus};
pub use request::{RequestContext, RequestState};
pub use router::{ReadWriteRouter, ReplicaFailurePolicy, RouterStats};

#[cfg(feature = "postgres")]
pub use connection::postgres::PgScalarQuery;

use std::sync::Arc;

/// Assemble a lifecycle hook over any [`ScalarQuery`] implementation.
///
/// The status queries, cache settings and failure policy come from `config`,
/// which is validated first.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use lsn_router::{NodeRole, Result, RouterConfig, ScalarQuery};
/// use std::sync::Arc;
///
/// struct Fixed;
///
/// #[async_trait]
/// impl ScalarQuery for Fixed {
///     async fn query_scalar(&self, role: NodeRole, _sql: &str) -> Result<String> {
///         Ok(match role {
///             NodeRole::Primary => "0/1F4".to_string(),
///             NodeRole::Replica => "0/190".to_string(),
///         })
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<()> {
/// let hook = lsn_router::build_hook(Arc::new(Fixed), &RouterConfig::default())?;
///
/// let router = hook.router().clone();
/// hook.run("alice", |ctx| async move { router.route_for_write(&ctx) }).await?;
///
/// let router = hook.router().clone();
/// let role = hook.run("alice", |ctx| async move { router.route_for_read(&ctx).await }).await?;
/// assert_eq!(role, NodeRole::Primary);
/// # Ok(())
/// # }
/// ```
pub fn build_hook(client: Arc<dyn ScalarQuery>, config: &RouterConfig) -> Result<LifecycleHook> {
    let status = SqlReplicationStatus::from_config(client, config);
    LifecycleHook::from_config(Arc::new(status), config)
}

/// Connect to the primary and replica of `config` and assemble a hook.
#[cfg(feature = "postgres")]
pub async fn connect(config: &RouterConfig) -> Result<LifecycleHook> {
    config.validate().map_err(RouterError::ConfigError)?;
    let client = PgScalarQuery::connect(config).await?;
    build_hook(Arc::new(client), config)
}
