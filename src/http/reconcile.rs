//! Before-request reconciliation hook.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::http::request::request_id;
use crate::http::server::AppState;

/// Bring the live map up to date before the handler reads it.
///
/// The throttle check runs inline; a due pass runs on the blocking pool.
/// A failed pass fails the request.
pub async fn reconcile_before_request(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(engine) = state.engine.as_ref() else {
        return next.run(request).await;
    };

    let reconciler = engine.reconciler().clone();
    if reconciler.try_throttle() {
        return next.run(request).await;
    }

    let request_id = request_id(&request).to_string();
    match tokio::task::spawn_blocking(move || reconciler.run_now(&[])).await {
        Ok(Ok(_)) => next.run(request).await,
        Ok(Err(e)) => {
            tracing::error!(request_id = %request_id, error = %e, "Before-request reconciliation failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Configuration reconciliation failed").into_response()
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Reconciliation task panicked");
            (StatusCode::INTERNAL_SERVER_ERROR, "Configuration reconciliation failed").into_response()
        }
    }
}
