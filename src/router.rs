//! Primary/replica routing decisions.
//!
//! Writes always go to the primary and mark the request as having written.
//! Reads go to the replica unless one of these holds:
//!
//! 1. the request has already written (read-your-own-writes within a request);
//! 2. the principal has a cached write position the replica has not received yet.
//!
//! A principal with no cached position reads from the replica without any
//! status query.

use crate::connection::config::RouterConfig;
use crate::core::{LogPosition, NodeRole, Result, RouterError};
use crate::replication::ReplicationStatusSource;
use crate::request::RequestContext;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{Level, event};

/// What a read does when the replica status lookup fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaFailurePolicy {
    /// The read fails with the lookup error.
    #[default]
    FailClosed,
    /// The read is sent to the primary.
    FailOpenToPrimary,
}

impl ReplicaFailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicaFailurePolicy::FailClosed => "fail_closed",
            ReplicaFailurePolicy::FailOpenToPrimary => "fail_open_to_primary",
        }
    }
}

impl fmt::Display for ReplicaFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReplicaFailurePolicy {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail_closed" => Ok(ReplicaFailurePolicy::FailClosed),
            "fail_open_to_primary" => Ok(ReplicaFailurePolicy::FailOpenToPrimary),
            other => Err(RouterError::ConfigError(format!(
                "unknown replica failure policy '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct RouterMetrics {
    primary_reads: AtomicU64,
    replica_reads: AtomicU64,
    writes: AtomicU64,
    replica_status_lookups: AtomicU64,
    replica_status_failures: AtomicU64,
    position_refreshes: AtomicU64,
    position_refresh_failures: AtomicU64,
}

impl RouterMetrics {
    fn on_read(&self, role: NodeRole) {
        match role {
            NodeRole::Primary => self.primary_reads.fetch_add(1, Ordering::Relaxed),
            NodeRole::Replica => self.replica_reads.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub(crate) fn on_refresh(&self, succeeded: bool) {
        if succeeded {
            self.position_refreshes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.position_refresh_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn snapshot(&self) -> RouterStats {
        RouterStats {
            primary_reads: self.primary_reads.load(Ordering::Relaxed),
            replica_reads: self.replica_reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            replica_status_lookups: self.replica_status_lookups.load(Ordering::Relaxed),
            replica_status_failures: self.replica_status_failures.load(Ordering::Relaxed),
            position_refreshes: self.position_refreshes.load(Ordering::Relaxed),
            position_refresh_failures: self.position_refresh_failures.load(Ordering::Relaxed),
        }
    }
}

/// Routing counters since the router was created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouterStats {
    pub primary_reads: u64,
    pub replica_reads: u64,
    pub writes: u64,
    pub replica_status_lookups: u64,
    pub replica_status_failures: u64,
    pub position_refreshes: u64,
    pub position_refresh_failures: u64,
}

impl fmt::Display for RouterStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Router Stats: {} primary reads, {} replica reads, {} writes, {}/{} status lookups failed, {}/{} refreshes failed",
            self.primary_reads,
            self.replica_reads,
            self.writes,
            self.replica_status_failures,
            self.replica_status_lookups,
            self.position_refresh_failures,
            self.position_refreshes + self.position_refresh_failures
        )
    }
}

/// Decides which node each statement of a request goes to.
///
/// # Examples
///
/// ```
/// use lsn_router::{InMemoryReplicationStatus, LogPosition, NodeRole, ReadWriteRouter, RequestContext};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> lsn_router::Result<()> {
/// let status = Arc::new(InMemoryReplicationStatus::new(
///     LogPosition::new(0, 500),
///     LogPosition::new(0, 400),
/// ));
/// let router = ReadWriteRouter::new(status);
///
/// let ctx = RequestContext::new("alice");
/// ctx.state().set_cached_primary_position(Some(LogPosition::new(0, 500)));
///
/// // the replica has only received 0/190, alice last wrote at 0/1F4
/// assert_eq!(router.route_for_read(&ctx).await?, NodeRole::Primary);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ReadWriteRouter {
    status: Arc<dyn ReplicationStatusSource>,
    failure_policy: ReplicaFailurePolicy,
    metrics: Arc<RouterMetrics>,
}

impl ReadWriteRouter {
    pub fn new(status: Arc<dyn ReplicationStatusSource>) -> Self {
        Self {
            status,
            failure_policy: ReplicaFailurePolicy::default(),
            metrics: Arc::new(RouterMetrics::default()),
        }
    }

    pub fn from_config(status: Arc<dyn ReplicationStatusSource>, config: &RouterConfig) -> Self {
        Self::new(status).with_failure_policy(config.replica_failure_policy)
    }

    pub fn with_failure_policy(mut self, policy: ReplicaFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn failure_policy(&self) -> ReplicaFailurePolicy {
        self.failure_policy
    }

    pub fn status_source(&self) -> &Arc<dyn ReplicationStatusSource> {
        &self.status
    }

    pub fn stats(&self) -> RouterStats {
        self.metrics.snapshot()
    }

    pub(crate) fn metrics(&self) -> &RouterMetrics {
        &self.metrics
    }

    /// Choose the node for a read issued by the request behind `ctx`.
    ///
    /// Queries the replica's received position only when the principal has a
    /// cached write position and the request has not written yet. A failed
    /// lookup is handled according to the [`ReplicaFailurePolicy`].
    pub async fn route_for_read(&self, ctx: &RequestContext) -> Result<NodeRole> {
        ctx.ensure_active()?;
        let state = ctx.state();

        if state.has_write_occurred() {
            event!(Level::DEBUG, principal = %ctx.principal(), route = "primary", "read after write in request");
            return Ok(self.read_routed(NodeRole::Primary));
        }

        let Some(cached) = state.cached_primary_position() else {
            event!(Level::DEBUG, principal = %ctx.principal(), route = "replica", "no cached write position");
            return Ok(self.read_routed(NodeRole::Replica));
        };

        self.metrics
            .replica_status_lookups
            .fetch_add(1, Ordering::Relaxed);
        let received = match self.status.last_replica_received_position().await {
            Ok(received) => received,
            Err(err) => return self.on_status_failure(ctx, err),
        };

        let route = replica_route(&cached, &received);
        event!(
            Level::DEBUG,
            principal = %ctx.principal(),
            cached = %cached,
            received = %received,
            lag_bytes = cached.byte_lag(&received),
            route = route.as_str(),
            "read routed by replica position"
        );
        Ok(self.read_routed(route))
    }

    /// Writes always go to the primary; the request is marked as written so
    /// its later reads see the write.
    pub fn route_for_write(&self, ctx: &RequestContext) -> Result<NodeRole> {
        ctx.ensure_active()?;
        ctx.state().mark_write();
        self.metrics.writes.fetch_add(1, Ordering::Relaxed);
        Ok(NodeRole::Primary)
    }

    fn read_routed(&self, role: NodeRole) -> NodeRole {
        self.metrics.on_read(role);
        role
    }

    fn on_status_failure(&self, ctx: &RequestContext, err: RouterError) -> Result<NodeRole> {
        self.metrics
            .replica_status_failures
            .fetch_add(1, Ordering::Relaxed);

        match self.failure_policy {
            ReplicaFailurePolicy::FailClosed => {
                event!(Level::ERROR, principal = %ctx.principal(), error = %err, "replica status lookup failed");
                Err(err)
            }
            ReplicaFailurePolicy::FailOpenToPrimary => {
                event!(Level::WARN, principal = %ctx.principal(), error = %err, "replica status lookup failed, reading from primary");
                Ok(self.read_routed(NodeRole::Primary))
            }
        }
    }
}

/// Replica if it has received at least `cached`, primary otherwise.
pub fn replica_route(cached: &LogPosition, received: &LogPosition) -> NodeRole {
    if cached <= received {
        NodeRole::Replica
    } else {
        NodeRole::Primary
    }
}
