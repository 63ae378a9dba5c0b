//! Capability registry
//!
//! Keeps the latest capability profile per device together with a
//! per-device version counter.

use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    models::{CapabilityDeclaration, DeviceCapabilities, DeviceId},
    validation::CapabilityValidator,
    Result,
};

/// Versioned store of device capability profiles
pub trait CapabilityStore: Send + Sync {
    /// Validate and store a declaration, returning the new version
    fn declare(&self, declaration: CapabilityDeclaration) -> Result<u64>;

    fn current_version(&self, device_id: &DeviceId) -> Option<u64>;

    fn profile(&self, device_id: &DeviceId) -> Option<DeviceCapabilities>;

    /// True when `declared_version` is not the device's current version,
    /// including when the device never declared anything
    fn mismatch(&self, device_id: &DeviceId, declared_version: u64) -> bool {
        self.current_version(device_id) != Some(declared_version)
    }
}

/// In-memory capability registry
///
/// Declarations for one device serialize on its map entry, so versions are
/// strictly increasing and never handed out twice.
#[derive(Default)]
pub struct CapabilityRegistry {
    devices: DashMap<DeviceId, DeviceCapabilities>,
    validator: CapabilityValidator,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("devices", &self.devices.len())
            .finish()
    }
}

impl CapabilityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }
}

impl CapabilityStore for CapabilityRegistry {
    fn declare(&self, declaration: CapabilityDeclaration) -> Result<u64> {
        self.validator.validate(&declaration)?;

        let CapabilityDeclaration { device_id, profile } = declaration;
        let profile = Arc::new(profile);
        let now = Utc::now();

        let version = match self.devices.entry(device_id.clone()) {
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                record.version += 1;
                record.profile = profile;
                record.declared_at = now;
                record.version
            }
            Entry::Vacant(vacant) => {
                vacant.insert(DeviceCapabilities {
                    device_id: device_id.clone(),
                    version: 1,
                    profile,
                    declared_at: now,
                });
                1
            }
        };

        if version == 1 {
            info!(device_id = %device_id, "Device declared capabilities");
        } else {
            debug!(device_id = %device_id, version, "Device re-declared capabilities");
        }

        Ok(version)
    }

    fn current_version(&self, device_id: &DeviceId) -> Option<u64> {
        self.devices.get(device_id).map(|r| r.version)
    }

    fn profile(&self, device_id: &DeviceId) -> Option<DeviceCapabilities> {
        self.devices.get(device_id).map(|r| r.value().clone())
    }
}
