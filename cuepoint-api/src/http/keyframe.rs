//! Keyframe index endpoints
//!
//! The media-analysis stage pushes GOP indices here; players resolve seek
//! targets against them.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use cuepoint_core::models::{MediaPartId, SeekResolution};
use serde::{Deserialize, Serialize};

use crate::http::{AppError, AppResult, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeekQuery {
    pub target_ms: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyframesBody {
    pub keyframes_ms: Vec<u64>,
    #[serde(default)]
    pub last_gop_duration_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyframesRegistered {
    pub media_part_id: MediaPartId,
    pub keyframe_count: usize,
}

/// GET /api/media-parts/{media_part_id}/seek?targetMs=
pub async fn resolve_seek(
    State(state): State<AppState>,
    Path(media_part_id): Path<String>,
    Query(query): Query<SeekQuery>,
) -> AppResult<Json<SeekResolution>> {
    let resolution = state
        .keyframes
        .resolve_seek(&MediaPartId::from(media_part_id), query.target_ms)?;
    Ok(Json(resolution))
}

/// PUT /api/media-parts/{media_part_id}/keyframes
pub async fn register_keyframes(
    State(state): State<AppState>,
    Path(media_part_id): Path<String>,
    Json(body): Json<KeyframesBody>,
) -> Json<KeyframesRegistered> {
    let media_part_id = MediaPartId::from(media_part_id);
    let keyframe_count = state.keyframes.register_index(
        media_part_id.clone(),
        body.keyframes_ms,
        body.last_gop_duration_ms,
    );
    Json(KeyframesRegistered {
        media_part_id,
        keyframe_count,
    })
}

/// DELETE /api/media-parts/{media_part_id}/keyframes
pub async fn remove_keyframes(
    State(state): State<AppState>,
    Path(media_part_id): Path<String>,
) -> AppResult<StatusCode> {
    let media_part_id = MediaPartId::from(media_part_id);
    if state.keyframes.remove_index(&media_part_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found(format!(
            "No keyframe index for media part {media_part_id}"
        )))
    }
}
