use serde::{Deserialize, Serialize};

/// Sorted keyframe offsets (ms) of one media part.
///
/// Offset 0 is always present: the start of a stream is always decodable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyframeIndex {
    offsets: Vec<u64>,
    last_gop_duration_ms: Option<u64>,
}

impl KeyframeIndex {
    #[must_use]
    pub fn new(offsets: impl IntoIterator<Item = u64>, last_gop_duration_ms: Option<u64>) -> Self {
        let mut offsets: Vec<u64> = offsets.into_iter().collect();
        offsets.push(0);
        offsets.sort_unstable();
        offsets.dedup();

        Self {
            offsets,
            last_gop_duration_ms,
        }
    }

    /// Largest keyframe `<= target_ms` and the keyframe after it, if any
    #[must_use]
    pub fn floor(&self, target_ms: u64) -> (u64, Option<u64>) {
        let pos = self.offsets.partition_point(|&o| o <= target_ms);
        let keyframe = pos
            .checked_sub(1)
            .and_then(|i| self.offsets.get(i))
            .copied()
            .unwrap_or(0);
        (keyframe, self.offsets.get(pos).copied())
    }

    #[must_use]
    pub const fn last_gop_duration_ms(&self) -> Option<u64> {
        self.last_gop_duration_ms
    }

    #[must_use]
    pub fn keyframe_count(&self) -> usize {
        self.offsets.len()
    }

    #[must_use]
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }
}

/// Result of resolving a seek target against a keyframe index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeekResolution {
    pub keyframe_ms: i64,
    pub gop_duration_ms: i64,
    pub has_gop_index: bool,
    pub original_target_ms: i64,
}
