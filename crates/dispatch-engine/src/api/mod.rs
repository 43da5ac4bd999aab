//! REST API for the dispatch engine
//!
//! Exposes intake, the lawyer-facing confirm/reject pair, cancellation and
//! completion, polling lists, stats, and the presence upsert. The wire
//! shapes mirror the engine types; errors come back as a JSON envelope
//! `{"error": {"code", "message"}}` with a status code per error class.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::dispatch::{CallStatus, Cancellation, DispatchEngine, EmergencyCall};
use crate::error::DispatchError;
use crate::intake::{CallIntake, NewCallRequest};
use crate::metrics::EmergencyCallStats;
use crate::presence::LawyerPresence;
use crate::types::{Actor, CallId, LawyerId};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct ApiState {
    pub engine: DispatchEngine,
    pub intake: CallIntake,
}

/// Build the dispatch REST router.
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/emergency-calls", post(create_call).get(list_calls))
        .route("/emergency-calls/stats", get(stats))
        .route("/emergency-calls/:id", get(get_call))
        .route("/emergency-calls/:id/confirm", post(confirm_call))
        .route("/emergency-calls/:id/reject", post(reject_call))
        .route("/emergency-calls/:id/cancel", post(cancel_call))
        .route("/emergency-calls/:id/complete", post(complete_call))
        .route("/lawyers/:id/presence", put(update_presence))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// Request/Response types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCallResponse {
    pub call_id: CallId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LawyerActionRequest {
    pub lawyer_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub actor: Actor,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub is_available: bool,
    #[serde(default)]
    pub rating: Option<f32>,
}

/// Call payload with the derived timing fields the clients poll for.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResponse {
    #[serde(flatten)]
    pub call: EmergencyCall,
    /// Seconds waited so far (or until acceptance).
    pub wait_seconds: f64,
    /// Seconds from intake to confirmation, once confirmed.
    pub response_seconds: Option<f64>,
    /// Present on cancelled calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<Cancellation>,
}

impl CallResponse {
    fn from_call(call: EmergencyCall, now: DateTime<Utc>) -> Self {
        let wait_seconds = call.wait_time(now).num_milliseconds() as f64 / 1000.0;
        let response_seconds = call
            .response_time()
            .map(|d| d.num_milliseconds() as f64 / 1000.0);
        let cancelled = call.cancellation.clone();
        Self {
            call,
            wait_seconds,
            response_seconds,
            cancelled,
        }
    }
}

// Error envelope

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Wrapper translating engine errors into HTTP responses.
pub struct ApiError(pub DispatchError);

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        ApiError(err)
    }
}

/// (status, machine-readable code) for each error class.
pub fn error_mapping(err: &DispatchError) -> (StatusCode, &'static str) {
    match err {
        DispatchError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
        DispatchError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        DispatchError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
        DispatchError::StaleState(_) => (StatusCode::CONFLICT, "stale_state"),
        DispatchError::NoCandidates { .. } => (StatusCode::CONFLICT, "no_candidates"),
        DispatchError::Unauthorized(_) => (StatusCode::FORBIDDEN, "unauthorized"),
        DispatchError::ResourceUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "resource_unavailable")
        }
        DispatchError::Timeout(_) => (StatusCode::CONFLICT, "timeout"),
        DispatchError::Database(_)
        | DispatchError::Configuration(_)
        | DispatchError::Notification(_)
        | DispatchError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = error_mapping(&self.0);
        let body = Json(ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.0.to_string(),
            },
        });
        (status, body).into_response()
    }
}

// Handlers

async fn create_call(
    State(state): State<ApiState>,
    Json(request): Json<NewCallRequest>,
) -> Result<(StatusCode, Json<CreateCallResponse>), ApiError> {
    let call_id = state.intake.create_call(request).await?;
    Ok((StatusCode::CREATED, Json(CreateCallResponse { call_id })))
}

async fn get_call(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<CallResponse>, ApiError> {
    let call = state.engine.get_call(&CallId::from(id))?;
    Ok(Json(CallResponse::from_call(call, Utc::now())))
}

async fn list_calls(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<CallResponse>>, ApiError> {
    let status = match query.status.as_deref() {
        Some(s) => Some(
            s.parse::<CallStatus>()
                .map_err(DispatchError::validation)?,
        ),
        None => None,
    };
    let limit = query.limit.unwrap_or(50).min(500);
    let now = Utc::now();
    let calls = state
        .engine
        .list_calls(status, limit)
        .into_iter()
        .map(|c| CallResponse::from_call(c, now))
        .collect();
    Ok(Json(calls))
}

async fn confirm_call(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<LawyerActionRequest>,
) -> Result<Json<CallResponse>, ApiError> {
    let actor = Actor::Lawyer(LawyerId::from(request.lawyer_id));
    let call = state
        .engine
        .confirm_call(&CallId::from(id), &actor)
        .await?;
    Ok(Json(CallResponse::from_call(call, Utc::now())))
}

async fn reject_call(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<LawyerActionRequest>,
) -> Result<Json<CallResponse>, ApiError> {
    let actor = Actor::Lawyer(LawyerId::from(request.lawyer_id));
    let call = state.engine.reject_call(&CallId::from(id), &actor).await?;
    Ok(Json(CallResponse::from_call(call, Utc::now())))
}

async fn cancel_call(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<CancelRequest>,
) -> Result<Json<CallResponse>, ApiError> {
    let call = state
        .engine
        .cancel_call(&CallId::from(id), &request.actor, request.reason)
        .await?;
    Ok(Json(CallResponse::from_call(call, Utc::now())))
}

async fn complete_call(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<CallResponse>, ApiError> {
    let call = state.engine.complete_call(&CallId::from(id)).await?;
    Ok(Json(CallResponse::from_call(call, Utc::now())))
}

async fn stats(State(state): State<ApiState>) -> Json<EmergencyCallStats> {
    Json(state.engine.stats())
}

async fn update_presence(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<PresenceRequest>,
) -> Result<Json<LawyerPresence>, ApiError> {
    let presence = state.engine.registry().update_presence(
        &LawyerId::from(id),
        request.latitude,
        request.longitude,
        request.is_available,
        request.rating,
    )?;
    Ok(Json(presence))
}

async fn health() -> &'static str {
    "ok"
}
