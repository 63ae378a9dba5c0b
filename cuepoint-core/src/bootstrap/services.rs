//! Service initialization and dependency injection

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    provider::{DirectPlayDecisionEngine, InMemoryCatalog},
    service::{CapabilityRegistry, KeyframeResolver, PlaybackService, PlaylistService},
    Config,
};

/// Container for all initialized services
#[derive(Clone)]
pub struct Services {
    /// Device capability profiles
    pub capabilities: Arc<CapabilityRegistry>,
    /// Keyframe indices for seek resolution
    pub keyframes: Arc<KeyframeResolver>,
    /// Playlist generators
    pub playlists: PlaylistService,
    /// Playback sessions
    pub playback: PlaybackService,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

/// Initialize all core services
pub fn init_services(config: &Config) -> Result<Services, anyhow::Error> {
    info!("Initializing services...");

    let catalog = match &config.catalog.path {
        Some(path) => {
            let catalog = InMemoryCatalog::load(path)
                .map_err(|e| anyhow::anyhow!("Failed to load catalog {path}: {e}"))?;
            info!(
                path = %path,
                items = catalog.item_count(),
                containers = catalog.container_count(),
                "Catalog loaded"
            );
            catalog
        }
        None => {
            warn!("No catalog configured, starting with an empty catalog");
            InMemoryCatalog::new()
        }
    };

    let engine = DirectPlayDecisionEngine::new(config.decision.base_url.clone());
    info!(base_url = %engine.base_url(), "Decision engine initialized");

    let capabilities = Arc::new(CapabilityRegistry::new());
    let keyframes = Arc::new(KeyframeResolver::new(&config.keyframes));
    let playlists = PlaylistService::new(Arc::new(catalog), config.playlist.clone());
    let playback = PlaybackService::new(
        playlists.clone(),
        capabilities.clone(),
        Arc::new(engine),
        config.session.clone(),
    );

    info!("Services initialized");

    Ok(Services {
        capabilities,
        keyframes,
        playlists,
        playback,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_init_with_default_config() {
        let services = init_services(&Config::default()).unwrap();
        assert_eq!(services.capabilities.device_count(), 0);
        assert!(services.playlists.is_empty());
        assert_eq!(services.playback.session_count(), 0);
    }

    #[tokio::test]
    async fn test_init_with_catalog_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"items": [{{"id": "t1", "title": "One"}}], "containers": {{"a": ["t1"]}}}}"#
        )
        .unwrap();

        let mut config = Config::default();
        config.catalog.path = Some(file.path().to_str().unwrap().to_string());

        let services = init_services(&config).unwrap();
        let cursor = services
            .playlists
            .create(crate::service::CreatePlaylistRequest {
                playlist_type: crate::models::PlaylistType::Album,
                originator_id: Some("a".into()),
                item_ids: vec![],
                start_item_id: None,
                shuffle: false,
                repeat: false,
            })
            .await
            .unwrap();
        assert_eq!(cursor.total_count, 1);
    }

    #[test]
    fn test_init_with_broken_catalog_fails() {
        let mut config = Config::default();
        config.catalog.path = Some("/no/such/catalog.json".to_string());
        assert!(init_services(&config).is_err());
    }
}
