//! Capability declaration endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use cuepoint_core::{
    models::{CapabilityDeclaration, DeclaredVersion, DeviceCapabilities, DeviceId},
    service::CapabilityStore,
};

use crate::http::{AppError, AppResult, AppState};

/// Store a device's capability profile
///
/// POST /api/capabilities
pub async fn declare_capability(
    State(state): State<AppState>,
    Json(declaration): Json<CapabilityDeclaration>,
) -> AppResult<Json<DeclaredVersion>> {
    let version = state.capabilities.declare(declaration)?;
    Ok(Json(DeclaredVersion {
        capability_profile_version: version,
    }))
}

/// GET /api/capabilities/{device_id}
pub async fn get_capability(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> AppResult<Json<DeviceCapabilities>> {
    let device_id = DeviceId::from(device_id);
    state
        .capabilities
        .profile(&device_id)
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("Device {device_id} has not declared capabilities")))
}
