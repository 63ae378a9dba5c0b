//! Playback session endpoints
//!
//! Thin adapters from JSON bodies to `PlaybackService` calls. Enum-valued
//! fields arrive as strings so unknown values map to a 400 with our error
//! body instead of an extractor rejection.

use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use cuepoint_core::models::{
    CapabilityDeclaration, DecideRequest, DecisionStatus, HeartbeatAck, HeartbeatRequest,
    PlaybackDecision, PlaybackState, ResumeDetails, SessionId, StartPlaybackRequest,
    StartedSession, StopOutcome,
};
use serde::Deserialize;

use crate::http::{AppResult, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatBody {
    pub playhead_ms: i64,
    #[serde(default = "default_state")]
    pub state: String,
    #[serde(default)]
    pub capability: Option<CapabilityDeclaration>,
}

fn default_state() -> String {
    PlaybackState::Playing.as_str().to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionBody {
    pub status: String,
    #[serde(default)]
    pub progress_ms: i64,
    #[serde(default)]
    pub jump_index: Option<i64>,
    #[serde(default)]
    pub capability: Option<CapabilityDeclaration>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeBody {
    #[serde(default)]
    pub capability: Option<CapabilityDeclaration>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeekBody {
    pub position_ms: i64,
}

/// POST /api/sessions
pub async fn start_playback(
    State(state): State<AppState>,
    Json(request): Json<StartPlaybackRequest>,
) -> AppResult<Json<StartedSession>> {
    Ok(Json(state.playback.start(request).await?))
}

/// POST /api/sessions/{session_id}/heartbeat
pub async fn heartbeat(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<HeartbeatBody>,
) -> AppResult<Json<HeartbeatAck>> {
    let request = HeartbeatRequest {
        playhead_ms: body.playhead_ms,
        state: body.state.parse::<PlaybackState>()?,
        capability: body.capability,
    };
    let ack = state
        .playback
        .heartbeat(&SessionId::from_string(session_id), request)
        .await?;
    Ok(Json(ack))
}

/// POST /api/sessions/{session_id}/decision
pub async fn decide(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<DecisionBody>,
) -> AppResult<Json<PlaybackDecision>> {
    let request = DecideRequest {
        status: body.status.parse::<DecisionStatus>()?,
        progress_ms: body.progress_ms,
        jump_index: body.jump_index,
        capability: body.capability,
    };
    let decision = state
        .playback
        .decide(&SessionId::from_string(session_id), request)
        .await?;
    Ok(Json(decision))
}

/// POST /api/sessions/{session_id}/resume
///
/// The body is optional; when present it may carry a fresh capability
/// declaration.
pub async fn resume(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> AppResult<Json<ResumeDetails>> {
    let body: ResumeBody = if body.is_empty() {
        ResumeBody::default()
    } else {
        serde_json::from_slice(&body)?
    };
    let details = state
        .playback
        .resume(&SessionId::from_string(session_id), body.capability)
        .await?;
    Ok(Json(details))
}

/// POST /api/sessions/{session_id}/seek
pub async fn seek(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<SeekBody>,
) -> AppResult<Json<ResumeDetails>> {
    let details = state
        .playback
        .seek(&SessionId::from_string(session_id), body.position_ms)
        .await?;
    Ok(Json(details))
}

/// DELETE /api/sessions/{session_id}
pub async fn stop(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<StopOutcome> {
    Json(state.playback.stop(&SessionId::from_string(session_id)).await)
}
