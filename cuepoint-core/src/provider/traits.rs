// Collaborator Traits
//
// Interfaces the playback core calls out to

use super::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::{
    CapabilityProfile, DeviceId, ItemId, MediaPartId, PlaylistType, SessionId, StreamPlan,
};

/// Playable catalog item (track, episode, movie)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub id: ItemId,

    pub title: String,

    /// Album, season or show title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_title: Option<String>,

    /// Artist or episode subtitle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,

    /// Primary media part, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_part_id: Option<MediaPartId>,
}

/// One page of a container's children, in catalog order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogPage {
    pub items: Vec<CatalogItem>,
    /// Total number of children, when the catalog knows it
    pub total: Option<usize>,
}

/// Catalog lookups
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Look up a single playable item
    async fn item(&self, id: &ItemId) -> Result<Option<CatalogItem>, ProviderError>;

    /// Enumerate the playable children of a container in catalog order
    ///
    /// Returns `ProviderError::NotFound` when the container does not exist.
    async fn children(
        &self,
        originator: &ItemId,
        playlist_type: PlaylistType,
        offset: usize,
        limit: usize,
    ) -> Result<CatalogPage, ProviderError>;
}

/// Input of a playback decision
#[derive(Debug, Clone)]
pub struct DecisionRequest {
    pub session_id: SessionId,
    pub device_id: Option<DeviceId>,
    pub item: CatalogItem,
    pub offset_ms: i64,
    pub capability: Option<Arc<CapabilityProfile>>,
    pub capability_version: u64,
    /// Plan handed out by the previous decision of this session
    pub previous_plan: Option<StreamPlan>,
}

/// How an item is delivered to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub stream_plan: StreamPlan,
    pub playback_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_part_id: Option<MediaPartId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

/// Playback decision engine
///
/// Decides direct play, remux or transcode and compiles the stream plan.
/// The plan is opaque to the playback core.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DecisionEngine: Send + Sync {
    /// Engine name, for logs
    fn name(&self) -> &'static str;

    async fn decide(&self, request: &DecisionRequest) -> Result<Delivery, ProviderError>;
}
