use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::id::DeviceId;

/// Streaming protocols a device can consume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamingProtocol {
    Hls,
    Dash,
    Progressive,
    Smooth,
}

impl StreamingProtocol {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hls => "hls",
            Self::Dash => "dash",
            Self::Progressive => "progressive",
            Self::Smooth => "smooth",
        }
    }
}

/// Container/codec combination the device decodes natively
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectPlayProfile {
    pub container: String,
    #[serde(default)]
    pub video_codecs: Vec<String>,
    #[serde(default)]
    pub audio_codecs: Vec<String>,
}

/// Codec constraints, e.g. `"level <= 51"` or `"width <= 3840"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodecProfile {
    pub codec: String,
    #[serde(default)]
    pub conditions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodingProfile {
    pub container: String,
    pub protocol: Option<StreamingProtocol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleDelivery {
    Embed,
    External,
    Burn,
    Hls,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleProfile {
    pub format: String,
    pub method: SubtitleDelivery,
}

/// What a client device can decode, display and transport
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CapabilityProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub direct_play_profiles: Vec<DirectPlayProfile>,
    pub codec_profiles: Vec<CodecProfile>,
    pub transcoding_profiles: Vec<TranscodingProfile>,
    pub subtitle_profiles: Vec<SubtitleProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_streaming_bitrate_kbps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_static_bitrate_kbps: Option<u32>,
    pub supports_hdr: bool,
    pub supports_tone_mapping: bool,
    pub protocols: Vec<StreamingProtocol>,
}

/// A device declaring its capabilities, as sent by clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityDeclaration {
    pub device_id: DeviceId,
    #[serde(flatten)]
    pub profile: CapabilityProfile,
}

/// Registry record: the latest declared profile and its version
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCapabilities {
    pub device_id: DeviceId,
    pub version: u64,
    pub profile: Arc<CapabilityProfile>,
    pub declared_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclaredVersion {
    pub capability_profile_version: u64,
}
