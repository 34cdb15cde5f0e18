use async_trait::async_trait;
use lsn_router::{
    LogPosition, NodeRole, PositionCache, ReplicationStatusSource, Result, RouterConfig,
    RouterError, ScalarQuery, SqlReplicationStatus, build_hook,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

// A datastore stand-in: every write moves the primary forward, the replica
// catches up only when told to.
#[derive(Default)]
struct SimulatedCluster {
    primary: AtomicU64,
    replica: AtomicU64,
    seen_sql: Mutex<Vec<String>>,
}

impl SimulatedCluster {
    fn write(&self, bytes: u64) {
        self.primary.fetch_add(bytes, Ordering::SeqCst);
    }

    fn catch_up(&self) {
        self.replica
            .store(self.primary.load(Ordering::SeqCst), Ordering::SeqCst);
    }
}

fn format_position(value: u64) -> String {
    format!("{:X}/{:X}", value >> 32, value & 0xFFFF_FFFF)
}

#[async_trait]
impl ScalarQuery for SimulatedCluster {
    async fn query_scalar(&self, role: NodeRole, sql: &str) -> Result<String> {
        self.seen_sql.lock()?.push(sql.to_string());
        let value = match role {
            NodeRole::Primary => self.primary.load(Ordering::SeqCst),
            NodeRole::Replica => self.replica.load(Ordering::SeqCst),
        };
        Ok(format_position(value))
    }
}

// Business logic that only needs the status trait, whatever backs it
async fn replica_lag(status: &impl ReplicationStatusSource) -> Result<u64> {
    let primary = status.current_primary_position().await?;
    let replica = status.last_replica_received_position().await?;
    Ok(primary.byte_lag(&replica))
}

#[tokio::test]
async fn test_sql_status_over_custom_client() -> Result<()> {
    let cluster = Arc::new(SimulatedCluster::default());
    let status = SqlReplicationStatus::new(cluster.clone());

    cluster.write(0x1_0000_0010);
    assert_eq!(replica_lag(&status).await?, 0x1_0000_0010);

    cluster.catch_up();
    assert_eq!(replica_lag(&status).await?, 0);
    assert_eq!(
        status.current_primary_position().await?,
        LogPosition::new(1, 0x10)
    );

    Ok(())
}

#[tokio::test]
async fn test_build_hook_with_custom_client() -> Result<()> {
    let cluster = Arc::new(SimulatedCluster::default());
    let config = RouterConfig::default().position_queries("select primary_lsn()", "select replica_lsn()");
    let hook = build_hook(cluster.clone(), &config)?;

    let router = hook.router().clone();
    let writer = cluster.clone();
    hook.run("alice", |ctx| async move {
        router.route_for_write(&ctx)?;
        writer.write(4096);
        Ok::<_, RouterError>(())
    })
    .await?;

    let router = hook.router().clone();
    let role = hook
        .run("alice", |ctx| async move { router.route_for_read(&ctx).await })
        .await?;
    assert_eq!(role, NodeRole::Primary);

    cluster.catch_up();
    let router = hook.router().clone();
    let role = hook
        .run("alice", |ctx| async move { router.route_for_read(&ctx).await })
        .await?;
    assert_eq!(role, NodeRole::Replica);

    let seen = cluster.seen_sql.lock()?.clone();
    assert!(seen.iter().all(|sql| sql == "select primary_lsn()" || sql == "select replica_lsn()"));
    assert_eq!(seen.iter().filter(|sql| *sql == "select primary_lsn()").count(), 1);

    Ok(())
}

struct NullPrimary;

#[async_trait]
impl ScalarQuery for NullPrimary {
    async fn query_scalar(&self, _role: NodeRole, _sql: &str) -> Result<String> {
        Ok("not-a-position".to_string())
    }
}

#[tokio::test]
async fn test_garbage_position_does_not_break_the_write() -> Result<()> {
    let hook = build_hook(Arc::new(NullPrimary), &RouterConfig::default())?;

    let router = hook.router().clone();
    let result = hook
        .run("alice", |ctx| async move {
            router.route_for_write(&ctx)?;
            Ok::<_, RouterError>("saved")
        })
        .await?;

    assert_eq!(result, "saved");
    assert_eq!(hook.cache().get("alice").await?, None);
    assert_eq!(hook.router().stats().position_refresh_failures, 1);

    Ok(())
}
