//! API handlers for the rehab coaching server.

use crate::sessions::{ForwardError, LaunchError};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Extension, Json, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rehab_agent::{PatientMedia, TurnOutcome};
use rehab_types::StartRequest;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Participant identity used when a token request names no user.
pub const DEFAULT_PATIENT_ID: &str = "patient-001";

/// Upper bound for the history listing.
const MAX_HISTORY_LIMIT: u32 = 200;

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<LaunchError> for ApiError {
    fn from(err: LaunchError) -> Self {
        match err {
            LaunchError::Invalid(e) => ApiError::BadRequest(e.to_string()),
            LaunchError::AlreadyActive(_) => ApiError::Conflict(err.to_string()),
        }
    }
}

impl From<ForwardError> for ApiError {
    fn from(err: ForwardError) -> Self {
        match err {
            ForwardError::NotLive(_) => ApiError::NotFound(err.to_string()),
            ForwardError::NotReady { .. } => ApiError::Conflict(err.to_string()),
            ForwardError::Turn(e) if e.is_provider_failure() => {
                ApiError::InternalServerError(e.to_string())
            }
            ForwardError::Turn(e) => ApiError::Conflict(e.to_string()),
        }
    }
}

fn credential_status(value: &str) -> &'static str {
    if value.trim().is_empty() {
        "MISSING"
    } else {
        "SET"
    }
}

/// Handler for `GET /health`.
///
/// Reports which provider credentials are configured without revealing them.
pub async fn health_handler(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let voice = &state.config.voice;
    let env: BTreeMap<&str, &str> = [
        ("LIVEKIT_URL", voice.livekit.url.as_str()),
        ("LIVEKIT_API_KEY", voice.livekit.api_key.as_str()),
        ("LIVEKIT_API_SECRET", voice.livekit.api_secret.as_str()),
        ("ANTHROPIC_API_KEY", voice.anthropic.api_key.as_str()),
        ("DEEPGRAM_API_KEY", voice.deepgram.api_key.as_str()),
        ("ELEVENLABS_API_KEY", voice.elevenlabs.api_key.as_str()),
    ]
    .into_iter()
    .map(|(key, value)| (key, credential_status(value)))
    .collect();

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "env": env,
        "active_sessions": state.sessions.list().len(),
    }))
}

/// Query parameters for `GET /token`.
#[derive(Debug, Deserialize)]
pub struct TokenParams {
    pub user_id: Option<String>,
    pub call_id: Option<String>,
}

/// Response body for `GET /token`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    /// URL the patient's client connects to.
    pub url: String,
    pub user_id: String,
    pub call_id: String,
}

/// Handler for `GET /token`: issues a call join token for the patient.
pub async fn token_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<TokenParams>,
) -> Result<Json<TokenResponse>, ApiError> {
    if !state.call_client.is_enabled() {
        return Err(ApiError::InternalServerError(
            "LiveKit credentials missing".to_string(),
        ));
    }

    let user_id = params
        .user_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PATIENT_ID.to_string());
    let call_id = params
        .call_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("call_id is required".to_string()))?;

    let token = state
        .call_client
        .generate_join_token(&call_id, &user_id, "Patient")
        .map_err(|e| {
            tracing::error!("failed to generate LiveKit token: {}", e);
            ApiError::InternalServerError(e.to_string())
        })?;

    tracing::info!(user_id = %user_id, call_id = %call_id, "token issued");

    Ok(Json(TokenResponse {
        token,
        url: state.call_client.public_url().to_string(),
        user_id,
        call_id,
    }))
}

/// Response body for `POST /start-agent`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StartAgentResponse {
    pub status: String,
    pub call_id: String,
    pub session_id: String,
}

/// Handler for `POST /start-agent`: launches a coaching session for a call.
pub async fn start_agent_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<StartRequest>,
) -> Result<Json<StartAgentResponse>, ApiError> {
    let request = payload
        .normalized()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    if !state.call_client.is_enabled() {
        return Err(ApiError::InternalServerError(
            "LiveKit credentials missing".to_string(),
        ));
    }

    let snapshot = state.sessions.launch(request)?;

    Ok(Json(StartAgentResponse {
        status: "agent_launching".to_string(),
        call_id: snapshot.call_id,
        session_id: snapshot.session_id,
    }))
}

/// Query parameters for `GET /api/sessions`.
#[derive(Debug, Deserialize)]
pub struct ListSessionsParams {
    pub limit: Option<u32>,
}

/// Handler for `GET /api/sessions`: live sessions plus recent history.
pub async fn list_sessions_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<ListSessionsParams>,
) -> Result<Json<Value>, ApiError> {
    let limit = params
        .limit
        .unwrap_or(state.config.agent.history_limit)
        .min(MAX_HISTORY_LIMIT);
    let live = state.sessions.list();

    let pool = state.pool.clone();
    let recent = tokio::task::spawn_blocking(move || {
        let conn = pool
            .get()
            .map_err(|e| ApiError::InternalServerError(format!("db connection failed: {}", e)))?;
        rehab_db::list_recent_sessions(&conn, limit)
            .map_err(|e| ApiError::InternalServerError(e.to_string()))
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("task join error: {}", e)))??;

    Ok(Json(json!({
        "live": live,
        "recent": recent,
    })))
}

/// Handler for `GET /api/sessions/{callId}`.
///
/// Returns the live session for the call, or the most recent recorded one.
pub async fn get_session_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(call_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if let Some(snapshot) = state.sessions.snapshot(&call_id) {
        return Ok(Json(json!({ "live": true, "session": snapshot })));
    }

    let pool = state.pool.clone();
    let lookup_id = call_id.clone();
    let record = tokio::task::spawn_blocking(move || {
        let conn = pool
            .get()
            .map_err(|e| ApiError::InternalServerError(format!("db connection failed: {}", e)))?;
        rehab_db::latest_session_for_call(&conn, &lookup_id)
            .map_err(|e| ApiError::InternalServerError(e.to_string()))
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("task join error: {}", e)))??;

    match record {
        Some(record) => Ok(Json(json!({ "live": false, "session": record }))),
        None => Err(ApiError::NotFound(format!(
            "no coaching session for call {}",
            call_id
        ))),
    }
}

/// Handler for `POST /api/sessions/{callId}/finish`.
pub async fn finish_session_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(call_id): Path<String>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let snapshot = state.sessions.finish(&call_id).ok_or_else(|| {
        ApiError::NotFound(format!("no live coaching session for call {}", call_id))
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "finishing",
            "call_id": snapshot.call_id,
            "session_id": snapshot.session_id,
        })),
    ))
}

/// Handler for `POST /api/sessions/{callId}/speech`.
///
/// The body is one recorded utterance; the reply is spoken into the call and
/// returned with its transcript.
pub async fn speech_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(call_id): Path<String>,
    body: Bytes,
) -> Result<Json<TurnOutcome>, ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("audio body is required".to_string()));
    }
    let outcome = state
        .sessions
        .forward(&call_id, PatientMedia::Speech(body.to_vec()))
        .await?;
    Ok(Json(outcome))
}

/// Handler for `POST /api/sessions/{callId}/frames`.
pub async fn frame_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(call_id): Path<String>,
    body: Bytes,
) -> Result<Json<TurnOutcome>, ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("frame body is required".to_string()));
    }
    let outcome = state
        .sessions
        .forward(&call_id, PatientMedia::Frame(body.to_vec()))
        .await?;
    Ok(Json(outcome))
}
