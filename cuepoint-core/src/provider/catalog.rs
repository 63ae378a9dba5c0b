// In-memory catalog
//
// Backs tests and standalone deployments; loadable from a JSON document:
//
// {
//   "items": [{ "id": "track-1", "title": "Intro", "durationMs": 180000 }],
//   "containers": { "album-1": ["track-1", "track-2"] }
// }

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use super::{Catalog, CatalogItem, CatalogPage, ProviderError};
use crate::models::{ItemId, PlaylistType};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CatalogDocument {
    items: Vec<CatalogItem>,
    containers: HashMap<ItemId, Vec<ItemId>>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    items: HashMap<ItemId, CatalogItem>,
    containers: HashMap<ItemId, Vec<ItemId>>,
}

impl InMemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_item(mut self, item: CatalogItem) -> Self {
        self.items.insert(item.id.clone(), item);
        self
    }

    /// Register a container; children are kept in the given order
    #[must_use]
    pub fn with_container(mut self, id: impl Into<ItemId>, children: Vec<ItemId>) -> Self {
        self.containers.insert(id.into(), children);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, ProviderError> {
        let doc: CatalogDocument = serde_json::from_str(json)?;
        Ok(Self {
            items: doc
                .items
                .into_iter()
                .map(|item| (item.id.clone(), item))
                .collect(),
            containers: doc.containers,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProviderError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    #[must_use]
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn container_count(&self) -> usize {
        self.containers.len()
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn item(&self, id: &ItemId) -> Result<Option<CatalogItem>, ProviderError> {
        Ok(self.items.get(id).cloned())
    }

    async fn children(
        &self,
        originator: &ItemId,
        _playlist_type: PlaylistType,
        offset: usize,
        limit: usize,
    ) -> Result<CatalogPage, ProviderError> {
        let children = self
            .containers
            .get(originator)
            .ok_or(ProviderError::NotFound)?;

        // Dangling child references are skipped
        let playable: Vec<&CatalogItem> = children
            .iter()
            .filter_map(|id| self.items.get(id))
            .collect();

        let items = playable
            .iter()
            .skip(offset)
            .take(limit)
            .map(|item| (*item).clone())
            .collect();

        Ok(CatalogPage {
            items,
            total: Some(playable.len()),
        })
    }
}
