//! Request start/end hook.
//!
//! At request start the principal's cached write position is loaded into a
//! fresh [`RequestState`](crate::RequestState). At request end, if the request
//! wrote, the primary's current position is stored for the principal so its
//! next requests only read from a replica that has received that write.
//!
//! ```text
//! Idle ──begin──▶ Started ──finish(ok)───▶ Completed
//!                    │
//!                    └──finish(err) / panic / drop──▶ Failed
//! ```
//!
//! Both terminal phases clear the request state. Clearing happens in
//! `RequestScope`'s `Drop`, so it also runs when the request future is
//! cancelled or times out.

use crate::cache::{MemoryPositionCache, PositionCache};
use crate::connection::config::RouterConfig;
use crate::core::{LogPosition, Result, RouterError};
use crate::replication::ReplicationStatusSource;
use crate::request::RequestContext;
use crate::router::ReadWriteRouter;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{Instrument, Level, Span, event, info_span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Idle,
    Started,
    Completed,
    Failed,
}

impl LifecyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePhase::Idle => "idle",
            LifecyclePhase::Started => "started",
            LifecyclePhase::Completed => "completed",
            LifecyclePhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecyclePhase::Completed | LifecyclePhase::Failed)
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What happened at the end of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionReport {
    pub phase: LifecyclePhase,
    /// Whether the request routed at least one write.
    pub wrote: bool,
    /// Primary position stored for the principal, if a write was refreshed.
    pub refreshed_position: Option<LogPosition>,
    /// Why the refresh failed. The request's own result is unaffected.
    pub refresh_error: Option<RouterError>,
}

/// Wraps each request with position loading and refreshing.
///
/// Construct once at process start and share it (e.g. behind an `Arc`)
/// between all request handlers.
#[derive(Clone)]
pub struct LifecycleHook {
    router: ReadWriteRouter,
    cache: Arc<dyn PositionCache>,
}

impl LifecycleHook {
    pub fn new(router: ReadWriteRouter, cache: Arc<dyn PositionCache>) -> Self {
        Self { router, cache }
    }

    /// Router and in-memory cache built from `config`, after validating it.
    pub fn from_config(
        status: Arc<dyn ReplicationStatusSource>,
        config: &RouterConfig,
    ) -> Result<Self> {
        config.validate().map_err(RouterError::ConfigError)?;
        let router = ReadWriteRouter::from_config(status, config);
        let cache: Arc<dyn PositionCache> = Arc::new(MemoryPositionCache::from_config(config));
        Ok(Self::new(router, cache))
    }

    pub fn router(&self) -> &ReadWriteRouter {
        &self.router
    }

    pub fn cache(&self) -> &Arc<dyn PositionCache> {
        &self.cache
    }

    /// Start a request for `principal`.
    ///
    /// The returned scope must be ended with [`RequestScope::finish`]; if it
    /// is dropped instead, the state is still cleared.
    pub async fn begin(&self, principal: impl Into<String>) -> Result<RequestScope> {
        let ctx = RequestContext::new(principal);
        let span = info_span!(
            "lsn.request",
            principal = %ctx.principal(),
            request_id = %ctx.request_id()
        );

        let mut scope = RequestScope {
            ctx,
            phase: LifecyclePhase::Idle,
            router: self.router.clone(),
            cache: Arc::clone(&self.cache),
            span,
        };

        let state = scope.ctx.state();
        state.reset();
        let cached = self
            .cache
            .get(scope.ctx.principal())
            .instrument(scope.span.clone())
            .await?;
        let cached_text = cached
            .as_ref()
            .map_or_else(|| "none".to_string(), |p| p.to_string());
        state.set_cached_primary_position(cached);
        scope.phase = LifecyclePhase::Started;

        event!(parent: &scope.span, Level::DEBUG, cached = %cached_text, "request started");

        Ok(scope)
    }

    /// Run `handler` as one request of `principal`.
    ///
    /// The handler receives the request's [`RequestContext`] to pass to
    /// [`ReadWriteRouter::route_for_read`] and
    /// [`ReadWriteRouter::route_for_write`]. Its result is returned as-is
    /// after cleanup; a panic is resumed after cleanup. A failure to refresh
    /// the cached position is logged and never replaces the handler's result.
    pub async fn run<F, Fut, T, E>(
        &self,
        principal: impl Into<String>,
        handler: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce(RequestContext) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<RouterError>,
    {
        let scope = self.begin(principal).await?;
        let span = scope.span.clone();

        let outcome = AssertUnwindSafe(handler(scope.context().clone()))
            .catch_unwind()
            .instrument(span)
            .await;

        match outcome {
            Ok(result) => {
                scope.finish(result.is_ok()).await;
                result
            }
            Err(panic) => {
                scope.finish(false).await;
                std::panic::resume_unwind(panic)
            }
        }
    }
}

/// A started request. Clears its state when dropped.
pub struct RequestScope {
    ctx: RequestContext,
    phase: LifecyclePhase,
    router: ReadWriteRouter,
    cache: Arc<dyn PositionCache>,
    span: Span,
}

impl RequestScope {
    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    /// End the request, refreshing the principal's cached position if it wrote.
    ///
    /// The scope stays `Started` until the refresh has finished, so dropping
    /// this future mid-refresh hands the refresh to the runtime like any
    /// other abandoned request.
    pub async fn finish(mut self, succeeded: bool) -> CompletionReport {
        let outcome = if succeeded {
            LifecyclePhase::Completed
        } else {
            LifecyclePhase::Failed
        };

        let wrote = self.ctx.state().has_write_occurred();
        let mut report = CompletionReport {
            phase: outcome,
            wrote,
            refreshed_position: None,
            refresh_error: None,
        };

        if wrote {
            let refreshed = refresh_position(&self.router, self.cache.as_ref(), self.ctx.principal())
                .instrument(self.span.clone())
                .await;
            match refreshed {
                Ok(position) => report.refreshed_position = Some(position),
                Err(err) => report.refresh_error = Some(err),
            }
        }

        self.phase = outcome;
        report
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        if self.phase == LifecyclePhase::Started {
            self.phase = LifecyclePhase::Failed;
            if self.ctx.state().has_write_occurred() {
                spawn_abandoned_refresh(
                    self.router.clone(),
                    Arc::clone(&self.cache),
                    self.ctx.principal().to_string(),
                    self.span.clone(),
                );
            }
        }

        self.ctx.state().clear();
        event!(parent: &self.span, Level::DEBUG, phase = self.phase.as_str(), "request state cleared");
    }
}

async fn refresh_position(
    router: &ReadWriteRouter,
    cache: &dyn PositionCache,
    principal: &str,
) -> Result<LogPosition> {
    let result: Result<LogPosition> = async {
        let position = router.status_source().current_primary_position().await?;
        cache.set(principal, position.clone()).await?;
        Ok(position)
    }
    .await;

    router.metrics().on_refresh(result.is_ok());
    match &result {
        Ok(position) => {
            event!(Level::DEBUG, position = %position, "cached primary position refreshed")
        }
        Err(err) => {
            event!(Level::ERROR, error = %err, "failed to refresh cached primary position")
        }
    }
    result
}

// A request dropped before `finish` cannot await in `Drop`; hand the refresh
// to the runtime so the principal's next request still sees its write.
fn spawn_abandoned_refresh(
    router: ReadWriteRouter,
    cache: Arc<dyn PositionCache>,
    principal: String,
    span: Span,
) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(
                async move {
                    let _ = refresh_position(&router, cache.as_ref(), &principal).await;
                }
                .instrument(span),
            );
        }
        Err(_) => {
            event!(
                parent: &span,
                Level::WARN,
                "request abandoned after a write outside a runtime, cached position not refreshed"
            );
        }
    }
}
