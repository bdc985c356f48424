//! HTTP server setup.
//!
//! # Responsibilities
//! - Create Axum Router with application and admin handlers
//! - Wire up middleware (tracing, timeout, request ID, reconciliation)
//! - Apply static option reloads from the settings watcher
//! - Serve until the shutdown signal fires

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin::setup_admin_router;
use crate::config::{Settings, StaticOptions, StaticSource};
use crate::http::reconcile::reconcile_before_request;
use crate::http::request::{request_id, MakeRequestUuid, X_REQUEST_ID};
use crate::lifecycle::startup::Services;
use crate::runtime::{Engine, LiveConfig};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub live: LiveConfig,
    /// `None` when the engine is disabled for this process.
    pub engine: Option<Arc<Engine>>,
    pub api_key: Arc<str>,
}

/// HTTP server for the application and its admin API.
pub struct HttpServer {
    router: Router,
    live: LiveConfig,
    source: StaticSource,
    engine: Option<Arc<Engine>>,
}

impl HttpServer {
    pub fn new(settings: &Settings, services: Services) -> Self {
        let state = AppState {
            live: services.live.clone(),
            engine: services.engine.clone(),
            api_key: Arc::from(settings.admin.api_key.as_str()),
        };

        let router = Self::build_router(settings, state);
        Self {
            router,
            live: services.live,
            source: services.source,
            engine: services.engine,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(settings: &Settings, state: AppState) -> Router {
        let mut router = Router::new()
            .route("/status", get(status_handler))
            .route("/config/{key}", get(option_handler));

        if settings.admin.enabled {
            router = router.merge(setup_admin_router(state.clone()));
        }

        // Every route, admin ones included, sees an up to date live map.
        router
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                reconcile_before_request,
            ))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
                    .layer(TraceLayer::new_for_http().make_span_with(
                        |request: &Request<Body>| {
                            tracing::info_span!(
                                "request",
                                method = %request.method(),
                                path = %request.uri().path(),
                                request_id = %request_id(request),
                            )
                        },
                    ))
                    .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        settings.server.request_timeout_secs,
                    ))),
            )
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// `option_updates` carries re-parsed static options from the settings
    /// watcher; `shutdown` stops the server gracefully.
    pub async fn run(
        self,
        listener: TcpListener,
        mut option_updates: mpsc::UnboundedReceiver<StaticOptions>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let source = self.source.clone();
        let live = self.live.clone();
        let engine = self.engine.clone();
        tokio::spawn(async move {
            while let Some(options) = option_updates.recv().await {
                let previous = source.snapshot();
                let overridden = engine
                    .as_ref()
                    .map(|engine| engine.reconciler().active_keys())
                    .unwrap_or_default();
                let changes = live.reload_static(&previous, &options, &overridden);
                source.replace(options);
                tracing::info!(changes, "Static options reloaded");
                if changes > 0 {
                    live.notify_refresh(changes);
                }
            }
        });

        let mut refreshes = self.live.subscribe();
        tokio::spawn(async move {
            loop {
                match refreshes.recv().await {
                    Ok(event) => tracing::debug!(
                        generation = event.generation,
                        changes = event.changes,
                        "Live configuration refreshed"
                    ),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Refresh listener lagged")
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

#[derive(Serialize)]
struct SystemStatus {
    version: &'static str,
    status: &'static str,
    engine: &'static str,
}

async fn status_handler(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        engine: if state.engine.is_some() {
            "enabled"
        } else {
            "disabled"
        },
    })
}

#[derive(Serialize)]
struct OptionValue {
    key: String,
    value: String,
    typed: Value,
}

/// Effective value of one option, as the application would read it.
async fn option_handler(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    let Some(value) = state.live.get(&key) else {
        return (StatusCode::NOT_FOUND, "Option has no value").into_response();
    };
    let typed = match state.live.get_typed(&key) {
        Ok(typed) => typed.unwrap_or(Value::Null),
        Err(message) => {
            tracing::warn!(key = %key, error = %message, "Live value fails its validators");
            Value::Null
        }
    };
    Json(OptionValue { key, value, typed }).into_response()
}
