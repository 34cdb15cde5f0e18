//! Per-request routing state.
//!
//! Every request gets its own freshly allocated [`RequestState`], reached only
//! through the [`RequestContext`] handed to the request's handler. Nothing is
//! keyed by thread or task identity, so a worker that interleaves requests
//! cannot mix their state up.

use crate::core::{LogPosition, Result, RouterError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Whether the request wrote, and which primary position was cached for its
/// principal when it started.
#[derive(Debug, Default)]
pub struct RequestState {
    write_occurred: AtomicBool,
    cached_primary_position: Mutex<Option<LogPosition>>,
    released: AtomicBool,
}

impl RequestState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget any write and cached position. Called at request start.
    ///
    /// A state that has already been cleared stays released; a new request
    /// must allocate a new state.
    pub fn reset(&self) {
        self.write_occurred.store(false, Ordering::SeqCst);
        *self.cached_position() = None;
    }

    /// Record the position cached for the principal (`None`: no known write).
    pub fn set_cached_primary_position(&self, position: Option<LogPosition>) {
        *self.cached_position() = position;
    }

    pub fn mark_write(&self) {
        self.write_occurred.store(true, Ordering::SeqCst);
    }

    pub fn has_write_occurred(&self) -> bool {
        self.write_occurred.load(Ordering::SeqCst)
    }

    pub fn cached_primary_position(&self) -> Option<LogPosition> {
        self.cached_position().clone()
    }

    /// Release the state at request end. Further routing through it fails.
    pub fn clear(&self) {
        self.released.store(true, Ordering::SeqCst);
        self.write_occurred.store(false, Ordering::SeqCst);
        *self.cached_position() = None;
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    // The guarded value is plain data, so a poisoned lock is still usable.
    fn cached_position(&self) -> MutexGuard<'_, Option<LogPosition>> {
        self.cached_primary_position
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Handle to one request's routing state, passed to business logic.
///
/// Cheap to clone; all clones share the same [`RequestState`].
#[derive(Debug, Clone)]
pub struct RequestContext {
    principal: Arc<str>,
    request_id: Uuid,
    state: Arc<RequestState>,
}

impl RequestContext {
    /// Allocate a context with fresh state for `principal`.
    pub fn new(principal: impl Into<String>) -> Self {
        Self {
            principal: Arc::from(principal.into()),
            request_id: Uuid::new_v4(),
            state: Arc::new(RequestState::new()),
        }
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn state(&self) -> &RequestState {
        &self.state
    }

    /// Fail if the request this context belongs to has already ended.
    pub fn ensure_active(&self) -> Result<()> {
        if self.state.is_released() {
            return Err(RouterError::StateLeak(format!(
                "request {} for principal '{}' has already completed",
                self.request_id, self.principal
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_state_defaults() {
        let state = RequestState::new();
        assert!(!state.has_write_occurred());
        assert_eq!(state.cached_primary_position(), None);
        assert!(!state.is_released());
    }

    #[test]
    fn test_mark_write_is_idempotent() {
        let state = RequestState::new();
        state.mark_write();
        state.mark_write();
        assert!(state.has_write_occurred());
    }

    #[test]
    fn test_reset_forgets_previous_values() {
        let state = RequestState::new();
        state.set_cached_primary_position(Some(LogPosition::new(0, 100)));
        state.mark_write();

        state.reset();
        assert!(!state.has_write_occurred());
        assert_eq!(state.cached_primary_position(), None);
    }

    #[test]
    fn test_clear_releases_state() {
        let ctx = RequestContext::new("alice");
        ctx.state().set_cached_primary_position(Some(LogPosition::new(0, 100)));
        ctx.state().mark_write();
        assert!(ctx.ensure_active().is_ok());

        ctx.state().clear();
        assert!(ctx.state().is_released());
        assert!(!ctx.state().has_write_occurred());
        assert_eq!(ctx.state().cached_primary_position(), None);

        let err = ctx.ensure_active().unwrap_err();
        assert!(matches!(err, RouterError::StateLeak(_)));
    }

    #[test]
    fn test_next_request_gets_fresh_state() {
        let first = RequestContext::new("alice");
        first.state().reset();
        first.state().set_cached_primary_position(Some(LogPosition::new(0, 100)));
        first.state().mark_write();
        first.state().clear();

        let second = RequestContext::new("alice");
        second.state().reset();
        assert!(!second.state().has_write_occurred());
        assert_eq!(second.state().cached_primary_position(), None);
        assert!(second.ensure_active().is_ok());
        assert_ne!(first.request_id(), second.request_id());
    }

    #[test]
    fn test_clones_share_state() {
        let ctx = RequestContext::new("bob");
        let clone = ctx.clone();
        clone.state().mark_write();
        assert!(ctx.state().has_write_occurred());
        assert_eq!(clone.principal(), "bob");
    }
}
