use super::ReplicationStatusSource;
use crate::core::{LogPosition, Result, RouterError};
use async_trait::async_trait;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

struct ReplicationPositions {
    primary: LogPosition,
    replica: LogPosition,
    primary_failure: Option<RouterError>,
    replica_failure: Option<RouterError>,
}

/// A status source whose positions are set by hand.
///
/// Intended for tests of code that routes through [`crate::ReadWriteRouter`]:
/// positions can be moved, failures injected, and the number of queries
/// observed.
pub struct InMemoryReplicationStatus {
    positions: RwLock<ReplicationPositions>,
    primary_queries: AtomicUsize,
    replica_queries: AtomicUsize,
}

impl InMemoryReplicationStatus {
    pub fn new(primary: LogPosition, replica: LogPosition) -> Self {
        Self {
            positions: RwLock::new(ReplicationPositions {
                primary,
                replica,
                primary_failure: None,
                replica_failure: None,
            }),
            primary_queries: AtomicUsize::new(0),
            replica_queries: AtomicUsize::new(0),
        }
    }

    pub fn set_primary_position(&self, position: LogPosition) -> Result<()> {
        self.positions.write()?.primary = position;
        Ok(())
    }

    pub fn set_replica_position(&self, position: LogPosition) -> Result<()> {
        self.positions.write()?.replica = position;
        Ok(())
    }

    /// Make every following primary query fail with `err`.
    pub fn fail_primary_with(&self, err: RouterError) -> Result<()> {
        self.positions.write()?.primary_failure = Some(err);
        Ok(())
    }

    /// Make every following replica query fail with `err`.
    pub fn fail_replica_with(&self, err: RouterError) -> Result<()> {
        self.positions.write()?.replica_failure = Some(err);
        Ok(())
    }

    pub fn clear_failures(&self) -> Result<()> {
        let mut positions = self.positions.write()?;
        positions.primary_failure = None;
        positions.replica_failure = None;
        Ok(())
    }

    pub fn primary_query_count(&self) -> usize {
        self.primary_queries.load(Ordering::SeqCst)
    }

    pub fn replica_query_count(&self) -> usize {
        self.replica_queries.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryReplicationStatus {
    fn default() -> Self {
        Self::new(LogPosition::new(0, 0), LogPosition::new(0, 0))
    }
}

#[async_trait]
impl ReplicationStatusSource for InMemoryReplicationStatus {
    async fn current_primary_position(&self) -> Result<LogPosition> {
        self.primary_queries.fetch_add(1, Ordering::SeqCst);
        let positions = self.positions.read()?;
        match &positions.primary_failure {
            Some(err) => Err(err.clone()),
            None => Ok(positions.primary.clone()),
        }
    }

    async fn last_replica_received_position(&self) -> Result<LogPosition> {
        self.replica_queries.fetch_add(1, Ordering::SeqCst);
        let positions = self.positions.read()?;
        match &positions.replica_failure {
            Some(err) => Err(err.clone()),
            None => Ok(positions.replica.clone()),
        }
    }
}
