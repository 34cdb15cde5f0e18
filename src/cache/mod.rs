//! Principal → last written log position.
//!
//! The cache is the only state shared between concurrent requests. It is
//! injected into the lifecycle hook as `Arc<dyn PositionCache>`, so the
//! in-process [`MemoryPositionCache`] can be swapped for a shared external
//! cache when several processes serve the same principals.

mod memory;

pub use memory::MemoryPositionCache;

use crate::core::{LogPosition, Result, RouterError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[async_trait]
pub trait PositionCache: Send + Sync {
    /// Last stored position for `principal`, or `None` if it never wrote
    /// (or its entry expired or was evicted).
    async fn get(&self, principal: &str) -> Result<Option<LogPosition>>;

    /// Store `position` for `principal`.
    async fn set(&self, principal: &str, position: LogPosition) -> Result<()>;

    /// Drop the entry for `principal`, returning what was stored.
    async fn remove(&self, principal: &str) -> Result<Option<LogPosition>>;
}

/// How `set` treats an existing entry.
///
/// Two writing requests for the same principal can finish in any order.
/// With `LastWriterWins` the later finisher overwrites the entry even if it
/// observed a lower primary position, which can let a following read go to a
/// replica that has not yet received the higher one. `MonotonicMax` keeps the
/// larger of the two positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheWritePolicy {
    #[default]
    LastWriterWins,
    MonotonicMax,
}

impl CacheWritePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheWritePolicy::LastWriterWins => "last_writer_wins",
            CacheWritePolicy::MonotonicMax => "monotonic_max",
        }
    }
}

impl fmt::Display for CacheWritePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CacheWritePolicy {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "last_writer_wins" => Ok(CacheWritePolicy::LastWriterWins),
            "monotonic_max" => Ok(CacheWritePolicy::MonotonicMax),
            other => Err(RouterError::ConfigError(format!(
                "unknown cache write policy '{}'",
                other
            ))),
        }
    }
}
