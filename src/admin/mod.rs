//! Admin API for configuration overrides.
//!
//! # Data Flow
//! ```text
//! HTTP request (Bearer token)
//!     → auth.rs (token check)
//!     → payload.rs (lenient body decoding)
//!     → handlers.rs (blocking pool)
//!     → actions.rs (validate all → write store → optional reconcile)
//!     → JSON records or JSON error
//! ```
//!
//! # Design Decisions
//! - A request either writes every record or none
//! - Not-editable keys are reported as field errors, like invalid values
//! - With the engine disabled every action answers 503

pub mod actions;
pub mod auth;
pub mod handlers;
pub mod pattern;
pub mod payload;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub use actions::ActionError;

/// Path prefix of every admin route.
pub const API_PREFIX: &str = "/api/editable-config";

pub fn setup_admin_router(state: AppState) -> Router<AppState> {
    let routes = Router::new()
        .route("/list", get(list_options))
        .route("/change", post(change_options))
        .route("/create", post(create_option))
        .route("/revert", post(revert_options))
        .route("/reset", post(reset_options))
        .route("/update", post(update_options))
        .route("/apply", post(apply_options))
        .route("/last-check", get(get_last_check))
        .route("/status", get(get_engine_status))
        .layer(middleware::from_fn_with_state(state, admin_auth_middleware));

    Router::new().nest(API_PREFIX, routes)
}
