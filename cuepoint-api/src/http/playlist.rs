//! Playlist generator endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use cuepoint_core::{
    models::{GeneratorId, NavigationResult, PlaylistChunk, PlaylistCursor},
    service::CreatePlaylistRequest,
};
use serde::Deserialize;

use crate::http::{AppResult, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkQuery {
    #[serde(default)]
    pub start_index: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

const fn default_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
pub struct JumpBody {
    pub index: i64,
}

#[derive(Debug, Deserialize)]
pub struct ToggleBody {
    pub enabled: bool,
}

/// POST /api/playlists
pub async fn create_playlist(
    State(state): State<AppState>,
    Json(request): Json<CreatePlaylistRequest>,
) -> AppResult<Json<PlaylistCursor>> {
    Ok(Json(state.playlists.create(request).await?))
}

/// GET /api/playlists/{generator_id}
pub async fn get_playlist(
    State(state): State<AppState>,
    Path(generator_id): Path<String>,
) -> AppResult<Json<PlaylistCursor>> {
    Ok(Json(
        state.playlists.get(&GeneratorId::from_string(generator_id))?,
    ))
}

/// GET /api/playlists/{generator_id}/items?startIndex=&limit=
pub async fn get_items(
    State(state): State<AppState>,
    Path(generator_id): Path<String>,
    Query(query): Query<ChunkQuery>,
) -> AppResult<Json<PlaylistChunk>> {
    let chunk = state
        .playlists
        .chunk(
            &GeneratorId::from_string(generator_id),
            query.start_index,
            query.limit,
        )
        .await?;
    Ok(Json(chunk))
}

/// POST /api/playlists/{generator_id}/next
pub async fn next(
    State(state): State<AppState>,
    Path(generator_id): Path<String>,
) -> AppResult<Json<NavigationResult>> {
    Ok(Json(
        state
            .playlists
            .next(&GeneratorId::from_string(generator_id))
            .await?,
    ))
}

/// POST /api/playlists/{generator_id}/previous
pub async fn previous(
    State(state): State<AppState>,
    Path(generator_id): Path<String>,
) -> AppResult<Json<NavigationResult>> {
    Ok(Json(
        state
            .playlists
            .previous(&GeneratorId::from_string(generator_id))?,
    ))
}

/// POST /api/playlists/{generator_id}/jump
pub async fn jump(
    State(state): State<AppState>,
    Path(generator_id): Path<String>,
    Json(body): Json<JumpBody>,
) -> AppResult<Json<NavigationResult>> {
    Ok(Json(
        state
            .playlists
            .jump(&GeneratorId::from_string(generator_id), body.index)
            .await?,
    ))
}

/// PUT /api/playlists/{generator_id}/shuffle
pub async fn set_shuffle(
    State(state): State<AppState>,
    Path(generator_id): Path<String>,
    Json(body): Json<ToggleBody>,
) -> AppResult<Json<NavigationResult>> {
    Ok(Json(state.playlists.set_shuffle(
        &GeneratorId::from_string(generator_id),
        body.enabled,
    )?))
}

/// PUT /api/playlists/{generator_id}/repeat
pub async fn set_repeat(
    State(state): State<AppState>,
    Path(generator_id): Path<String>,
    Json(body): Json<ToggleBody>,
) -> AppResult<Json<NavigationResult>> {
    Ok(Json(state.playlists.set_repeat(
        &GeneratorId::from_string(generator_id),
        body.enabled,
    )?))
}
