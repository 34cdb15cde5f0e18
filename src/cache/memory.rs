use super::{CacheWritePolicy, PositionCache};
use crate::connection::config::RouterConfig;
use crate::core::{LogPosition, Result};
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct CacheEntry {
    position: LogPosition,
    stored_at: Instant,
}

impl CacheEntry {
    fn new(position: LogPosition) -> Self {
        Self {
            position,
            stored_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Option<Duration>) -> bool {
        if let Some(ttl) = ttl {
            self.stored_at.elapsed() > ttl
        } else {
            false
        }
    }
}

/// In-process position cache.
///
/// Bounded by `capacity` principals, least recently used first out. Entries
/// optionally expire after `ttl`. Each `get`/`set` holds the lock only for the
/// map operation itself.
pub struct MemoryPositionCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl: Option<Duration>,
    write_policy: CacheWritePolicy,
}

impl MemoryPositionCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl: None,
            write_policy: CacheWritePolicy::default(),
        }
    }

    /// Build a cache from the `cache_*` settings of a router configuration.
    pub fn from_config(config: &RouterConfig) -> Self {
        let cache = Self::new(config.cache_capacity).with_write_policy(config.cache_write_policy);
        match config.cache_ttl_duration() {
            Some(ttl) => cache.with_ttl(ttl),
            None => cache,
        }
    }

    /// Expire entries `ttl` after they were last stored.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_write_policy(mut self, policy: CacheWritePolicy) -> Self {
        self.write_policy = policy;
        self
    }

    pub fn write_policy(&self) -> CacheWritePolicy {
        self.write_policy
    }

    /// Number of stored entries, expired ones included until they are touched.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_sync(&self, principal: &str) -> Result<Option<LogPosition>> {
        let mut entries = self.entries.lock()?;

        match entries.get(principal) {
            Some(entry) if !entry.is_expired(self.ttl) => return Ok(Some(entry.position.clone())),
            Some(_) => {}
            None => return Ok(None),
        }

        entries.pop(principal);
        Ok(None)
    }

    fn set_sync(&self, principal: &str, position: LogPosition) -> Result<()> {
        let mut entries = self.entries.lock()?;

        let position = match self.write_policy {
            CacheWritePolicy::LastWriterWins => position,
            CacheWritePolicy::MonotonicMax => match entries.peek(principal) {
                Some(existing) if !existing.is_expired(self.ttl) && existing.position > position => {
                    existing.position.clone()
                }
                _ => position,
            },
        };

        entries.put(principal.to_string(), CacheEntry::new(position));
        Ok(())
    }
}

impl Default for MemoryPositionCache {
    fn default() -> Self {
        Self::from_config(&RouterConfig::default())
    }
}

#[async_trait]
impl PositionCache for MemoryPositionCache {
    async fn get(&self, principal: &str) -> Result<Option<LogPosition>> {
        self.get_sync(principal)
    }

    async fn set(&self, principal: &str, position: LogPosition) -> Result<()> {
        self.set_sync(principal, position)
    }

    async fn remove(&self, principal: &str) -> Result<Option<LogPosition>> {
        let mut entries = self.entries.lock()?;
        Ok(entries.pop(principal).map(|entry| entry.position))
    }
}
