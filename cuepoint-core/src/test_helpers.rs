//! Test helpers and fixtures for cuepoint-core tests
//!
//! Shared by unit tests and by the integration tests of this and
//! downstream crates.

use std::sync::Arc;

use crate::{
    config::{KeyframeConfig, PlaylistConfig, SessionConfig},
    models::{
        CapabilityDeclaration, CapabilityProfile, DeviceId, DirectPlayProfile, EntryId, ItemId,
        MediaPartId, PlaylistEntry, PlaylistType, StartPlaybackRequest, StreamPlan,
        StreamingProtocol,
    },
    provider::{CatalogItem, DecisionEngine, Delivery, DirectPlayDecisionEngine, InMemoryCatalog},
    service::{CapabilityRegistry, KeyframeResolver, PlaybackService, PlaylistService},
};

/// Base URL used by fixture decision engines
pub const TEST_MEDIA_BASE_URL: &str = "http://media.test";

/// `count` catalog items with ids `{prefix}0`, `{prefix}1`, ...
pub fn catalog_items(prefix: &str, count: usize) -> Vec<CatalogItem> {
    (0..count)
        .map(|i| CatalogItem {
            id: ItemId::from(format!("{prefix}{i}")),
            title: format!("Item {i}"),
            parent_title: None,
            subtitle: None,
            thumbnail: None,
            duration_ms: Some(60_000),
            media_part_id: None,
        })
        .collect()
}

/// Catalog with one container of `tracks` items named `{container}-track-{i}`
pub fn album_catalog(container: &str, tracks: usize) -> InMemoryCatalog {
    let mut catalog = InMemoryCatalog::new();
    let mut children = Vec::with_capacity(tracks);
    for i in 0..tracks {
        let id = ItemId::from(format!("{container}-track-{i}"));
        children.push(id.clone());
        catalog = catalog.with_item(CatalogItem {
            id,
            title: format!("Track {i}"),
            parent_title: Some(container.to_string()),
            subtitle: Some("Test Artist".to_string()),
            thumbnail: Some(format!("/thumbs/{container}/{i}.jpg")),
            duration_ms: Some(180_000 + i64::try_from(i).unwrap_or(0) * 1000),
            media_part_id: Some(MediaPartId::from(format!("{container}-part-{i}"))),
        });
    }
    catalog.with_container(container, children)
}

/// Valid declaration with one direct-play profile
pub fn declaration(device_id: &str) -> CapabilityDeclaration {
    CapabilityDeclaration {
        device_id: DeviceId::from(device_id),
        profile: CapabilityProfile {
            name: Some(format!("{device_id} test device")),
            direct_play_profiles: vec![DirectPlayProfile {
                container: "mp3".to_string(),
                video_codecs: vec![],
                audio_codecs: vec!["mp3".to_string()],
            }],
            protocols: vec![StreamingProtocol::Progressive, StreamingProtocol::Hls],
            max_streaming_bitrate_kbps: Some(320),
            ..CapabilityProfile::default()
        },
    }
}

pub fn entry(id: u64, item_id: &str) -> PlaylistEntry {
    PlaylistEntry {
        id: EntryId(id),
        item_id: ItemId::from(item_id),
        catalog_position: 0,
        duration_ms: Some(60_000),
        media_part_id: None,
        served: false,
        title: item_id.to_string(),
        parent_title: None,
        subtitle: None,
        thumbnail: None,
    }
}

pub fn delivery(plan: &str) -> Delivery {
    Delivery {
        stream_plan: StreamPlan::new(plan.to_string()),
        playback_url: format!("{TEST_MEDIA_BASE_URL}/{plan}"),
        media_part_id: None,
        duration_ms: None,
    }
}

/// Start request for `item_id` inside an album
pub fn album_start(album: &str, item_id: &str) -> StartPlaybackRequest {
    StartPlaybackRequest {
        item_id: ItemId::from(item_id),
        playlist_type: PlaylistType::Album,
        originator_id: Some(ItemId::from(album)),
        item_ids: vec![],
        shuffle: false,
        repeat: false,
        device_id: None,
        capability: None,
        offset_ms: None,
    }
}

/// Fully wired services over in-memory collaborators
pub struct ServiceFixture {
    pub capabilities: Arc<CapabilityRegistry>,
    pub keyframes: Arc<KeyframeResolver>,
    pub playlists: PlaylistService,
    pub playback: PlaybackService,
}

/// Builder for [`ServiceFixture`]
pub struct ServiceFixtureBuilder {
    catalog: InMemoryCatalog,
    engine: Arc<dyn DecisionEngine>,
    session: SessionConfig,
    playlist: PlaylistConfig,
}

impl ServiceFixtureBuilder {
    pub fn new() -> Self {
        Self {
            catalog: album_catalog("album-1", 12),
            engine: Arc::new(DirectPlayDecisionEngine::new(TEST_MEDIA_BASE_URL)),
            session: SessionConfig::default(),
            playlist: PlaylistConfig::default(),
        }
    }

    pub fn with_catalog(mut self, catalog: InMemoryCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_engine(mut self, engine: Arc<dyn DecisionEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_session_config(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    pub fn with_playlist_config(mut self, playlist: PlaylistConfig) -> Self {
        self.playlist = playlist;
        self
    }

    pub fn build(self) -> ServiceFixture {
        let capabilities = Arc::new(CapabilityRegistry::new());
        let playlists = PlaylistService::new(Arc::new(self.catalog), self.playlist);
        let playback = PlaybackService::new(
            playlists.clone(),
            capabilities.clone(),
            self.engine,
            self.session,
        );
        ServiceFixture {
            capabilities,
            keyframes: Arc::new(KeyframeResolver::new(&KeyframeConfig::default())),
            playlists,
            playback,
        }
    }
}

impl Default for ServiceFixtureBuilder {
    fn default() -> Self {
        Self::new()
    }
}
