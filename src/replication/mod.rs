//! Replication status queries.
//!
//! The router only ever needs two facts from the datastore: the primary's
//! current write position and the last position a replica has received.
//! Every call is one live round trip; nothing is cached here.

mod in_memory;
mod sql;

pub use in_memory::InMemoryReplicationStatus;
pub use sql::{
    CURRENT_PRIMARY_POSITION_SQL, LAST_REPLICA_RECEIVED_POSITION_SQL, SqlReplicationStatus,
};

use crate::core::{LogPosition, Result};
use async_trait::async_trait;

#[async_trait]
pub trait ReplicationStatusSource: Send + Sync {
    /// Current write position of the primary.
    async fn current_primary_position(&self) -> Result<LogPosition>;

    /// Last position received (not necessarily replayed) by the replica.
    async fn last_replica_received_position(&self) -> Result<LogPosition>;
}
