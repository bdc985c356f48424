use std::collections::BTreeMap;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::admin::actions::ActionError;
use crate::admin::payload::{
    ApplyRequest, ChangeRequest, CreateRequest, KeysRequest, ListQuery, ListedOption, Records,
    UpdateRequest, UpdateResult,
};
use crate::http::server::AppState;
use crate::reconcile::Phase;
use crate::runtime::Engine;
use crate::store::OverrideRecord;

impl IntoResponse for ActionError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ActionError::Validation(fields) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": { "type": "validation", "fields": fields } }),
            ),
            ActionError::NotFound(key) => (
                StatusCode::NOT_FOUND,
                json!({ "error": { "type": "not_found", "message": self.to_string(), "key": key } }),
            ),
            ActionError::Disabled => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": { "type": "disabled", "message": self.to_string() } }),
            ),
            ActionError::Store(_) | ActionError::Internal(_) => {
                tracing::error!(error = %self, "Admin action failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": { "type": "internal", "message": self.to_string() } }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Run `action` on the blocking pool. Store access is synchronous.
async fn run<T, F>(state: &AppState, action: F) -> Result<T, ActionError>
where
    F: FnOnce(&Engine) -> Result<T, ActionError> + Send + 'static,
    T: Send + 'static,
{
    let engine = state.engine.clone().ok_or(ActionError::Disabled)?;
    tokio::task::spawn_blocking(move || action(engine.as_ref()))
        .await
        .map_err(|e| ActionError::Internal(e.to_string()))?
}

pub async fn list_options(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<BTreeMap<String, ListedOption>>, ActionError> {
    run(&state, move |engine| engine.list(&query.pattern))
        .await
        .map(Json)
}

pub async fn change_options(
    State(state): State<AppState>,
    Json(request): Json<ChangeRequest>,
) -> Result<Json<Records>, ActionError> {
    run(&state, move |engine| engine.change(&request.options, request.apply))
        .await
        .map(Json)
}

pub async fn create_option(
    State(state): State<AppState>,
    Json(request): Json<CreateRequest>,
) -> Result<Json<OverrideRecord>, ActionError> {
    run(&state, move |engine| {
        engine.create(&request.key, &request.value, request.prev_value, request.apply)
    })
    .await
    .map(Json)
}

pub async fn revert_options(
    State(state): State<AppState>,
    Json(request): Json<KeysRequest>,
) -> Result<Json<Records>, ActionError> {
    run(&state, move |engine| engine.revert(&request.keys, request.apply))
        .await
        .map(Json)
}

pub async fn reset_options(
    State(state): State<AppState>,
    Json(request): Json<KeysRequest>,
) -> Result<Json<Records>, ActionError> {
    run(&state, move |engine| engine.reset(&request.keys, request.apply))
        .await
        .map(Json)
}

pub async fn update_options(
    State(state): State<AppState>,
    Json(request): Json<UpdateRequest>,
) -> Result<Json<UpdateResult>, ActionError> {
    run(&state, move |engine| engine.update(&request))
        .await
        .map(Json)
}

#[derive(Debug, Serialize)]
pub struct ApplyResponse {
    pub changes: usize,
}

pub async fn apply_options(
    State(state): State<AppState>,
    Json(request): Json<ApplyRequest>,
) -> Result<Json<ApplyResponse>, ActionError> {
    run(&state, move |engine| engine.apply(&request.removed_keys))
        .await
        .map(|changes| Json(ApplyResponse { changes }))
}

#[derive(Debug, Serialize)]
pub struct LastCheckResponse {
    pub last_check: DateTime<Utc>,
}

pub async fn get_last_check(
    State(state): State<AppState>,
) -> Result<Json<LastCheckResponse>, ActionError> {
    let engine = state.engine.as_ref().ok_or(ActionError::Disabled)?;
    let last_check = engine.last_check()?;
    Ok(Json(LastCheckResponse { last_check }))
}

#[derive(Debug, Serialize)]
pub struct EngineStatus {
    pub phase: Phase,
    pub last_check: Option<DateTime<Utc>>,
    pub charge_timeout_secs: u64,
    pub active_overrides: usize,
    pub pending: bool,
    pub generation: u64,
}

pub async fn get_engine_status(
    State(state): State<AppState>,
) -> Result<Json<EngineStatus>, ActionError> {
    run(&state, |engine| {
        let reconciler = engine.reconciler();
        Ok(EngineStatus {
            phase: reconciler.phase(),
            last_check: reconciler.last_check(),
            charge_timeout_secs: reconciler.charge_timeout().as_secs(),
            active_overrides: reconciler.active_keys().len(),
            pending: engine.has_pending()?,
            generation: engine.live().generation(),
        })
    })
    .await
    .map(Json)
}

