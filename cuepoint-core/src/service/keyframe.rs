//! Seek-to-keyframe resolution
//!
//! Indices are written by the external media-analysis stage and replaced
//! wholesale; readers clone an `Arc` snapshot and never block writers.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

use crate::{
    config::KeyframeConfig,
    models::{KeyframeIndex, MediaPartId, SeekResolution},
    Error, Result,
};

pub struct KeyframeResolver {
    indices: DashMap<MediaPartId, Arc<KeyframeIndex>>,
    default_last_gop_ms: u64,
}

impl std::fmt::Debug for KeyframeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyframeResolver")
            .field("indices", &self.indices.len())
            .field("default_last_gop_ms", &self.default_last_gop_ms)
            .finish()
    }
}

impl KeyframeResolver {
    #[must_use]
    pub fn new(config: &KeyframeConfig) -> Self {
        Self {
            indices: DashMap::new(),
            default_last_gop_ms: config.default_last_gop_ms,
        }
    }

    /// Install or replace the index of a media part; returns the keyframe count
    pub fn register_index(
        &self,
        media_part_id: MediaPartId,
        offsets_ms: Vec<u64>,
        last_gop_duration_ms: Option<u64>,
    ) -> usize {
        let index = KeyframeIndex::new(offsets_ms, last_gop_duration_ms);
        let count = index.keyframe_count();
        info!(
            media_part_id = %media_part_id,
            keyframes = count,
            "Registered keyframe index"
        );
        self.indices.insert(media_part_id, Arc::new(index));
        count
    }

    pub fn remove_index(&self, media_part_id: &MediaPartId) -> bool {
        self.indices.remove(media_part_id).is_some()
    }

    #[must_use]
    pub fn has_index(&self, media_part_id: &MediaPartId) -> bool {
        self.indices.contains_key(media_part_id)
    }

    fn snapshot(&self, media_part_id: &MediaPartId) -> Option<Arc<KeyframeIndex>> {
        self.indices.get(media_part_id).map(|r| Arc::clone(r.value()))
    }

    /// Snap a seek target back to the nearest keyframe at or before it
    pub fn resolve_seek(&self, media_part_id: &MediaPartId, target_ms: i64) -> Result<SeekResolution> {
        let target = u64::try_from(target_ms)
            .map_err(|_| Error::InvalidInput(format!("targetMs must be >= 0, got {target_ms}")))?;

        let Some(index) = self.snapshot(media_part_id) else {
            return Ok(SeekResolution {
                keyframe_ms: target_ms,
                gop_duration_ms: 0,
                has_gop_index: false,
                original_target_ms: target_ms,
            });
        };

        let (keyframe, next) = index.floor(target);
        let gop = match next {
            Some(next) => next - keyframe,
            None => index
                .last_gop_duration_ms()
                .unwrap_or(self.default_last_gop_ms),
        };

        Ok(SeekResolution {
            keyframe_ms: i64::try_from(keyframe).unwrap_or(target_ms),
            gop_duration_ms: i64::try_from(gop).unwrap_or(i64::MAX),
            has_gop_index: true,
            original_target_ms: target_ms,
        })
    }
}
