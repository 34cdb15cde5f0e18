use super::ReplicationStatusSource;
use crate::connection::config::RouterConfig;
use crate::core::{LogPosition, NodeRole, Result};
use crate::interface::ScalarQuery;
use async_trait::async_trait;
use std::sync::Arc;

/// Current WAL write position, cast to text so any driver can read it.
pub const CURRENT_PRIMARY_POSITION_SQL: &str = "select pg_current_wal_lsn()::text";

/// Last WAL position received by a streaming replica.
pub const LAST_REPLICA_RECEIVED_POSITION_SQL: &str = "select pg_last_wal_receive_lsn()::text";

/// Status source backed by two fixed scalar queries.
#[derive(Clone)]
pub struct SqlReplicationStatus {
    client: Arc<dyn ScalarQuery>,
    primary_sql: String,
    replica_sql: String,
}

impl SqlReplicationStatus {
    pub fn new(client: Arc<dyn ScalarQuery>) -> Self {
        Self {
            client,
            primary_sql: CURRENT_PRIMARY_POSITION_SQL.to_string(),
            replica_sql: LAST_REPLICA_RECEIVED_POSITION_SQL.to_string(),
        }
    }

    pub fn from_config(client: Arc<dyn ScalarQuery>, config: &RouterConfig) -> Self {
        Self::new(client).with_queries(&config.primary_position_sql, &config.replica_position_sql)
    }

    /// Override the two status queries, e.g. for a datastore with different
    /// function names.
    pub fn with_queries(mut self, primary_sql: &str, replica_sql: &str) -> Self {
        self.primary_sql = primary_sql.to_string();
        self.replica_sql = replica_sql.to_string();
        self
    }

    async fn position(&self, role: NodeRole, sql: &str) -> Result<LogPosition> {
        let text = self.client.query_scalar(role, sql).await?;
        LogPosition::parse(&text)
    }
}

#[async_trait]
impl ReplicationStatusSource for SqlReplicationStatus {
    async fn current_primary_position(&self) -> Result<LogPosition> {
        self.position(NodeRole::Primary, &self.primary_sql).await
    }

    async fn last_replica_received_position(&self) -> Result<LogPosition> {
        self.position(NodeRole::Replica, &self.replica_sql).await
    }
}
