//! axum middleware running each request inside a [`LifecycleHook`].
//!
//! The principal is read from a request header set by upstream
//! authentication (`x-principal` unless configured otherwise). Handlers get
//! the request's [`RequestContext`] as an extension:
//!
//! ```ignore
//! async fn update_thing(
//!     State(app): State<AppState>,
//!     Extension(ctx): Extension<RequestContext>,
//! ) -> Result<Json<Thing>, AppError> {
//!     let role = app.router.route_for_write(&ctx)?;
//!     // run the UPDATE on the pool for `role`
//! }
//!
//! let app = with_lsn_routing(Router::new().route("/things/:id", post(update_thing)), state);
//! ```
//!
//! Requests without the header pass through untouched.

use crate::connection::config::RouterConfig;
use crate::core::{Result, RouterError};
use crate::lifecycle::LifecycleHook;
use crate::request::RequestContext;
use axum::Json;
use axum::Router;
use axum::extract::{Request, State};
use axum::http::{HeaderName, StatusCode};
use axum::middleware::{Next, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub enum WebError {
    Router(RouterError),
    /// A `5xx` produced by the downstream handler, passed back unchanged.
    Handler(Response),
}

impl From<RouterError> for WebError {
    fn from(err: RouterError) -> Self {
        WebError::Router(err)
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let err = match self {
            WebError::Handler(response) => return response,
            WebError::Router(err) => err,
        };

        let (status, code) = match &err {
            RouterError::ConnectionError(_) | RouterError::QueryError(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "datastore_unavailable")
            }
            RouterError::CacheError(_) | RouterError::LockError(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "position_cache_unavailable")
            }
            RouterError::FormatError(_) => (StatusCode::BAD_GATEWAY, "invalid_log_position"),
            RouterError::StateLeak(_) | RouterError::ConfigError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };

        let body = Json(ErrorResponse {
            error: err.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

/// Shared state of [`lsn_middleware`].
pub struct LsnMiddlewareState {
    hook: LifecycleHook,
    principal_header: HeaderName,
}

impl LsnMiddlewareState {
    pub fn new(hook: LifecycleHook, config: &RouterConfig) -> Result<Self> {
        let principal_header = HeaderName::from_bytes(config.principal_header.as_bytes())
            .map_err(|e| {
                RouterError::ConfigError(format!(
                    "invalid principal header '{}': {}",
                    config.principal_header, e
                ))
            })?;
        Ok(Self {
            hook,
            principal_header,
        })
    }

    pub fn hook(&self) -> &LifecycleHook {
        &self.hook
    }

    fn principal(&self, request: &Request) -> Option<String> {
        request
            .headers()
            .get(&self.principal_header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }
}

/// Middleware for `axum::middleware::from_fn_with_state`.
pub async fn lsn_middleware(
    State(state): State<Arc<LsnMiddlewareState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(principal) = state.principal(&request) else {
        return next.run(request).await;
    };

    let result = state
        .hook
        .run(principal, |ctx: RequestContext| async move {
            request.extensions_mut().insert(ctx);
            let response = next.run(request).await;
            if response.status().is_server_error() {
                Err(WebError::Handler(response))
            } else {
                Ok(response)
            }
        })
        .await;

    match result {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

/// Wrap every route of `router` with [`lsn_middleware`].
pub fn with_lsn_routing(router: Router, state: Arc<LsnMiddlewareState>) -> Router {
    router.layer(from_fn_with_state(state, lsn_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datastore_errors_map_to_service_unavailable() {
        let response =
            WebError::from(RouterError::ConnectionError("replica down".into())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_state_leak_maps_to_internal_error() {
        let response = WebError::from(RouterError::StateLeak("late".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_handler_response_passes_through() {
        let original = (StatusCode::GATEWAY_TIMEOUT, "slow").into_response();
        let response = WebError::Handler(original).into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
