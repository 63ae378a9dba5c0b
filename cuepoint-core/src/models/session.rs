use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;

use super::capability::CapabilityDeclaration;
use super::id::{DeviceId, EntryId, GeneratorId, ItemId, MediaPartId, SessionId};
use super::playlist::{PlaylistEntry, PlaylistItem, PlaylistType};
use crate::provider::Delivery;
use crate::{Error, Result};

/// Opaque stream plan produced by the decision engine. Never parsed here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamPlan(String);

impl StreamPlan {
    #[must_use]
    pub const fn new(plan: String) -> Self {
        Self(plan)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Client-reported playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Starting,
    Playing,
    Paused,
    Buffering,
    Stopped,
}

impl PlaybackState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Buffering => "buffering",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlaybackState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "starting" => Ok(Self::Starting),
            "playing" => Ok(Self::Playing),
            "paused" => Ok(Self::Paused),
            "buffering" => Ok(Self::Buffering),
            "stopped" => Ok(Self::Stopped),
            other => Err(Error::InvalidInput(format!("Unknown playback state: {other}"))),
        }
    }
}

/// Status reported when asking for the next decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionStatus {
    Playing,
    Paused,
    Buffering,
    Ended,
    Jump,
}

impl FromStr for DecisionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "playing" => Ok(Self::Playing),
            "paused" => Ok(Self::Paused),
            "buffering" => Ok(Self::Buffering),
            "ended" => Ok(Self::Ended),
            "jump" => Ok(Self::Jump),
            other => Err(Error::InvalidInput(format!("Unknown decision status: {other}"))),
        }
    }
}

/// What the client should do after a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
    /// Keep playing the current stream
    Continue,
    /// Switch to the new stream plan
    Advance,
    /// End of a non-repeating playlist
    Stop,
    /// Capabilities changed; a new plan for the current item follows
    Renegotiate,
}

/// Server-side playback session
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub id: SessionId,
    pub device_id: Option<DeviceId>,
    pub generator_id: GeneratorId,
    pub current_item_id: ItemId,
    pub current_entry_id: EntryId,
    pub media_part_id: Option<MediaPartId>,
    pub duration_ms: Option<i64>,
    pub playhead_ms: i64,
    pub state: PlaybackState,
    pub capability_version: u64,
    pub stream_plan: StreamPlan,
    pub playback_url: String,
    pub created_at: DateTime<Utc>,
    pub last_heartbeat_at: DateTime<Utc>,
    last_seen: Instant,
    stopped_at: Option<Instant>,
}

impl PlaybackSession {
    #[must_use]
    pub fn new(
        id: SessionId,
        device_id: Option<DeviceId>,
        generator_id: GeneratorId,
        entry: &PlaylistEntry,
        delivery: Delivery,
        offset_ms: i64,
        capability_version: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            device_id,
            generator_id,
            current_item_id: entry.item_id.clone(),
            current_entry_id: entry.id,
            media_part_id: delivery.media_part_id.or_else(|| entry.media_part_id.clone()),
            duration_ms: delivery.duration_ms.or(entry.duration_ms),
            playhead_ms: offset_ms,
            state: PlaybackState::Starting,
            capability_version,
            stream_plan: delivery.stream_plan,
            playback_url: delivery.playback_url,
            created_at: now,
            last_heartbeat_at: now,
            last_seen: Instant::now(),
            stopped_at: None,
        }
    }

    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        matches!(self.state, PlaybackState::Stopped)
    }

    /// Time since the last sign of life
    #[must_use]
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }

    /// Non-stopped session without a heartbeat inside the liveness window
    #[must_use]
    pub fn is_lapsed(&self, now: Instant, liveness_window: Duration) -> bool {
        !self.is_stopped() && self.idle_for(now) > liveness_window
    }

    /// Whether the session can be forgotten
    #[must_use]
    pub fn is_reapable(&self, now: Instant, horizon: Duration) -> bool {
        match self.stopped_at {
            Some(stopped_at) => now.saturating_duration_since(stopped_at) > horizon,
            None => self.idle_for(now) > horizon,
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
        self.last_heartbeat_at = Utc::now();
    }

    /// Apply a heartbeat. Backward playhead moves are ignored; use `seek`.
    pub fn record_heartbeat(&mut self, playhead_ms: i64, state: PlaybackState) {
        if playhead_ms >= self.playhead_ms {
            self.playhead_ms = playhead_ms;
        }
        self.state = state;
        self.touch();
    }

    pub fn seek(&mut self, position_ms: i64) {
        self.playhead_ms = position_ms;
        self.touch();
    }

    /// Bind the session to a new item; the playhead restarts at zero
    pub fn switch_item(&mut self, entry: &PlaylistEntry, delivery: Delivery) {
        self.current_item_id = entry.item_id.clone();
        self.current_entry_id = entry.id;
        self.media_part_id = delivery.media_part_id.or_else(|| entry.media_part_id.clone());
        self.duration_ms = delivery.duration_ms.or(entry.duration_ms);
        self.playhead_ms = 0;
        self.stream_plan = delivery.stream_plan;
        self.playback_url = delivery.playback_url;
        self.touch();
    }

    /// Replace the plan for the current item, keeping the playhead
    pub fn replan(&mut self, delivery: Delivery) {
        if delivery.media_part_id.is_some() {
            self.media_part_id = delivery.media_part_id;
        }
        if delivery.duration_ms.is_some() {
            self.duration_ms = delivery.duration_ms;
        }
        self.stream_plan = delivery.stream_plan;
        self.playback_url = delivery.playback_url;
    }

    pub fn stop(&mut self) {
        self.state = PlaybackState::Stopped;
        self.stopped_at = Some(Instant::now());
        self.last_heartbeat_at = Utc::now();
    }

    #[must_use]
    pub fn resume_details(&self, capability_version_mismatch: bool) -> ResumeDetails {
        ResumeDetails {
            session_id: self.id.clone(),
            current_item_id: self.current_item_id.clone(),
            current_entry_id: self.current_entry_id,
            media_part_id: self.media_part_id.clone(),
            duration_ms: self.duration_ms,
            playhead_ms: self.playhead_ms,
            state: self.state,
            playlist_generator_id: self.generator_id.clone(),
            stream_plan_json: self.stream_plan.clone(),
            playback_url: self.playback_url.clone(),
            capability_profile_version: self.capability_version,
            capability_version_mismatch,
        }
    }
}

/// Request to start a playback session
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPlaybackRequest {
    pub item_id: ItemId,
    #[serde(default = "default_playlist_type")]
    pub playlist_type: PlaylistType,
    #[serde(default)]
    pub originator_id: Option<ItemId>,
    /// Items of an `explicit` playlist
    #[serde(default)]
    pub item_ids: Vec<ItemId>,
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default)]
    pub repeat: bool,
    #[serde(default)]
    pub device_id: Option<DeviceId>,
    #[serde(default)]
    pub capability: Option<CapabilityDeclaration>,
    #[serde(default)]
    pub offset_ms: Option<i64>,
}

const fn default_playlist_type() -> PlaylistType {
    PlaylistType::Single
}

#[derive(Debug, Clone)]
pub struct HeartbeatRequest {
    pub playhead_ms: i64,
    pub state: PlaybackState,
    pub capability: Option<CapabilityDeclaration>,
}

#[derive(Debug, Clone)]
pub struct DecideRequest {
    pub status: DecisionStatus,
    pub progress_ms: i64,
    pub jump_index: Option<i64>,
    pub capability: Option<CapabilityDeclaration>,
}

/// Response to a successful start
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedSession {
    pub session_id: SessionId,
    pub playlist_generator_id: GeneratorId,
    pub stream_plan_json: StreamPlan,
    pub playback_url: String,
    pub capability_profile_version: u64,
    pub capability_version_mismatch: bool,
    pub playlist_index: usize,
    pub playlist_total_count: i64,
    pub current_item: PlaylistItem,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_item: Option<PlaylistItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_part_id: Option<MediaPartId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatAck {
    pub capability_profile_version: u64,
    pub capability_version_mismatch: bool,
    /// The session had lapsed and was resumed by this heartbeat
    pub resumed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackDecision {
    pub action: DecisionAction,
    pub stream_plan_json: StreamPlan,
    pub playback_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_item_id: Option<ItemId>,
    pub capability_profile_version: u64,
    pub capability_version_mismatch: bool,
    pub playlist_index: usize,
    pub playlist_total_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_item: Option<PlaylistItem>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeDetails {
    pub session_id: SessionId,
    pub current_item_id: ItemId,
    pub current_entry_id: EntryId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_part_id: Option<MediaPartId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    pub playhead_ms: i64,
    pub state: PlaybackState,
    pub playlist_generator_id: GeneratorId,
    pub stream_plan_json: StreamPlan,
    pub playback_url: String,
    pub capability_profile_version: u64,
    pub capability_version_mismatch: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StopOutcome {
    pub success: bool,
}
