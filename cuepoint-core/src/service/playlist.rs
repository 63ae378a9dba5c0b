//! Playlist generator service
//!
//! Builds generators from the catalog and serializes every cursor mutation
//! on the generator's own lock.

use parking_lot::RwLock;
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    config::PlaylistConfig,
    models::{
        EntryId, GeneratorId, GeneratorSeed, ItemId, NavigationResult, PeekedMove, PlaylistChunk,
        PlaylistCursor, PlaylistEntry, PlaylistGenerator, PlaylistType, UpstreamCursor,
    },
    provider::{Catalog, CatalogItem, CatalogPage, ProviderError},
    Error, Result,
};

/// Request to build a playlist generator
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlaylistRequest {
    pub playlist_type: PlaylistType,
    /// Container the entries come from; the item itself for `single`
    #[serde(default)]
    pub originator_id: Option<ItemId>,
    /// Items of an `explicit` playlist
    #[serde(default)]
    pub item_ids: Vec<ItemId>,
    #[serde(default)]
    pub start_item_id: Option<ItemId>,
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default)]
    pub repeat: bool,
}

/// Generators keyed by id, one lock per generator
#[derive(Default)]
pub struct PlaylistStore {
    generators: DashMap<GeneratorId, Arc<RwLock<PlaylistGenerator>>>,
}

impl std::fmt::Debug for PlaylistStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaylistStore")
            .field("generators", &self.generators.len())
            .finish()
    }
}

impl PlaylistStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, generator: PlaylistGenerator) -> GeneratorId {
        let id = generator.id.clone();
        self.generators
            .insert(id.clone(), Arc::new(RwLock::new(generator)));
        id
    }

    fn handle(&self, id: &GeneratorId) -> Result<Arc<RwLock<PlaylistGenerator>>> {
        self.generators
            .get(id)
            .map(|g| Arc::clone(g.value()))
            .ok_or_else(|| Error::NotFound(format!("Playlist generator {id} not found")))
    }

    pub fn read<R>(&self, id: &GeneratorId, f: impl FnOnce(&PlaylistGenerator) -> R) -> Result<R> {
        let handle = self.handle(id)?;
        let guard = handle.read();
        Ok(f(&guard))
    }

    pub fn write<R>(
        &self,
        id: &GeneratorId,
        f: impl FnOnce(&mut PlaylistGenerator) -> R,
    ) -> Result<R> {
        let handle = self.handle(id)?;
        let mut guard = handle.write();
        Ok(f(&mut guard))
    }

    pub fn remove(&self, id: &GeneratorId) -> bool {
        self.generators.remove(id).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.generators.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }
}

#[derive(Clone)]
pub struct PlaylistService {
    store: Arc<PlaylistStore>,
    catalog: Arc<dyn Catalog>,
    config: PlaylistConfig,
}

impl std::fmt::Debug for PlaylistService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaylistService").finish()
    }
}

impl PlaylistService {
    #[must_use]
    pub fn new(catalog: Arc<dyn Catalog>, config: PlaylistConfig) -> Self {
        Self {
            store: Arc::new(PlaylistStore::new()),
            catalog,
            config,
        }
    }

    /// Number of live generators
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    fn catalog_error(err: ProviderError, what: &ItemId) -> Error {
        match err {
            ProviderError::NotFound => Error::NotFound(format!("Catalog item {what} not found")),
            other => Error::Upstream(format!("Catalog request for {what} failed: {other}")),
        }
    }

    async fn lookup(&self, id: &ItemId) -> Result<Option<CatalogItem>> {
        self.catalog
            .item(id)
            .await
            .map_err(|e| Self::catalog_error(e, id))
    }

    async fn page(
        &self,
        originator: &ItemId,
        playlist_type: PlaylistType,
        offset: usize,
    ) -> Result<CatalogPage> {
        self.catalog
            .children(originator, playlist_type, offset, self.config.library_window)
            .await
            .map_err(|e| Self::catalog_error(e, originator))
    }

    /// Whether a page ends the container
    fn page_exhausts(&self, page: &CatalogPage, offset: usize) -> bool {
        let fetched = page.items.len();
        fetched < self.config.library_window || page.total.is_some_and(|t| offset + fetched >= t)
    }

    async fn all_children(&self, originator: &ItemId, playlist_type: PlaylistType) -> Result<Vec<CatalogItem>> {
        let mut items = Vec::new();
        loop {
            let offset = items.len();
            let page = self.page(originator, playlist_type, offset).await?;
            let done = self.page_exhausts(&page, offset);
            items.extend(page.items);
            if done {
                return Ok(items);
            }
        }
    }

    fn require_originator(request: &CreatePlaylistRequest) -> Result<ItemId> {
        request.originator_id.clone().ok_or_else(|| {
            Error::InvalidInput(format!(
                "{} playlist requires originatorId",
                request.playlist_type
            ))
        })
    }

    /// Build a generator and return its initial cursor
    pub async fn create(&self, request: CreatePlaylistRequest) -> Result<PlaylistCursor> {
        let mut upstream = None;

        let items = match request.playlist_type {
            PlaylistType::Single => {
                let id = request
                    .start_item_id
                    .clone()
                    .or_else(|| request.originator_id.clone())
                    .ok_or_else(|| {
                        Error::InvalidInput("single playlist requires an item id".to_string())
                    })?;
                let item = self
                    .lookup(&id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("Catalog item {id} not found")))?;
                vec![item]
            }
            PlaylistType::Explicit => {
                if request.item_ids.is_empty() {
                    return Err(Error::InvalidInput(
                        "explicit playlist requires itemIds".to_string(),
                    ));
                }
                let mut items = Vec::with_capacity(request.item_ids.len());
                for id in &request.item_ids {
                    match self.lookup(id).await? {
                        Some(item) => items.push(item),
                        None => warn!(item_id = %id, "Skipping unknown item in explicit playlist"),
                    }
                }
                items
            }
            PlaylistType::Library => {
                let originator = Self::require_originator(&request)?;
                let page = self.page(&originator, request.playlist_type, 0).await?;
                upstream = Some(UpstreamCursor {
                    next_offset: page.items.len(),
                    exhausted: self.page_exhausts(&page, 0),
                });
                page.items
            }
            PlaylistType::Album | PlaylistType::Season | PlaylistType::Show | PlaylistType::Artist => {
                let originator = Self::require_originator(&request)?;
                self.all_children(&originator, request.playlist_type).await?
            }
        };

        let start_item_id = request.start_item_id.clone();
        let generator = PlaylistGenerator::new(
            GeneratorId::new(),
            GeneratorSeed {
                playlist_type: request.playlist_type,
                originator_id: request.originator_id,
                items,
                start_item_id: start_item_id.clone(),
                shuffle: request.shuffle,
                repeat: request.repeat,
                upstream,
            },
        )?;

        if let Some(start) = &start_item_id {
            if generator.current_entry().is_none_or(|e| &e.item_id != start) {
                warn!(
                    generator_id = %generator.id,
                    start_item_id = %start,
                    "Start item not among playlist entries, starting at first entry"
                );
            }
        }

        let cursor = generator.cursor();
        self.store.insert(generator);

        info!(
            generator_id = %cursor.generator_id,
            playlist_type = %cursor.playlist_type,
            total_count = cursor.total_count,
            current_index = cursor.current_index,
            shuffle = cursor.shuffle,
            "Playlist generator created"
        );

        Ok(cursor)
    }

    /// Pull catalog windows until `needed` entries are materialized or the
    /// container is exhausted. No-op for bounded generators.
    async fn ensure_materialized(&self, id: &GeneratorId, needed: usize) -> Result<()> {
        loop {
            let (originator, playlist_type, upstream, len) = self.store.read(id, |g| {
                (g.originator_id.clone(), g.playlist_type, g.upstream(), g.len())
            })?;

            let Some(cursor) = upstream else {
                return Ok(());
            };
            if cursor.exhausted || len >= needed {
                return Ok(());
            }
            let Some(originator) = originator else {
                return Ok(());
            };

            let page = self.page(&originator, playlist_type, cursor.next_offset).await?;
            let next = UpstreamCursor {
                next_offset: cursor.next_offset + page.items.len(),
                exhausted: self.page_exhausts(&page, cursor.next_offset),
            };

            let applied = self.store.write(id, |g| {
                // Another task may have extended while the page was in flight
                if g.upstream() == Some(cursor) {
                    g.append(page.items, next);
                    true
                } else {
                    false
                }
            })?;

            if applied {
                debug!(
                    generator_id = %id,
                    next_offset = next.next_offset,
                    exhausted = next.exhausted,
                    "Extended playlist from catalog"
                );
            }
        }
    }

    pub fn get(&self, id: &GeneratorId) -> Result<PlaylistCursor> {
        self.store.read(id, PlaylistGenerator::cursor)
    }

    /// Current logical index and the entry under the cursor
    pub fn current_entry(&self, id: &GeneratorId) -> Result<(usize, PlaylistEntry)> {
        self.store
            .read(id, |g| {
                g.current_entry()
                    .map(|e| (g.current_index(), e.clone()))
            })?
            .ok_or_else(|| Error::Internal(format!("Playlist generator {id} has no current entry")))
    }

    pub async fn chunk(&self, id: &GeneratorId, start_index: i64, limit: i64) -> Result<PlaylistChunk> {
        let limit = usize::try_from(limit)
            .map_err(|_| Error::InvalidInput(format!("limit must be >= 0, got {limit}")))?
            .min(self.config.max_chunk_limit);

        if let Ok(start) = usize::try_from(start_index) {
            self.ensure_materialized(id, start.saturating_add(limit)).await?;
        }

        self.store.read(id, |g| g.chunk(start_index, limit))
    }

    pub async fn next(&self, id: &GeneratorId) -> Result<NavigationResult> {
        loop {
            let current = self.store.read(id, PlaylistGenerator::current_index)?;
            self.ensure_materialized(id, current + 2).await?;

            let outcome = self.store.write(id, |g| {
                if g.needs_extension_for_next() {
                    None
                } else {
                    Some(g.next())
                }
            })?;

            if let Some(result) = outcome {
                debug!(generator_id = %id, success = result.success, index = result.current_index, "Playlist next");
                return Ok(result);
            }
        }
    }

    pub fn previous(&self, id: &GeneratorId) -> Result<NavigationResult> {
        let result = self.store.write(id, PlaylistGenerator::previous)?;
        debug!(generator_id = %id, success = result.success, index = result.current_index, "Playlist previous");
        Ok(result)
    }

    pub async fn jump(&self, id: &GeneratorId, index: i64) -> Result<NavigationResult> {
        if let Ok(i) = usize::try_from(index) {
            self.ensure_materialized(id, i.saturating_add(1)).await?;
        }
        let result = self.store.write(id, |g| g.jump(index))??;
        info!(generator_id = %id, index, "Playlist jump");
        Ok(result)
    }

    pub fn set_shuffle(&self, id: &GeneratorId, enabled: bool) -> Result<NavigationResult> {
        let result = self.store.write(id, |g| g.set_shuffle(enabled))?;
        info!(generator_id = %id, shuffle = enabled, "Playlist shuffle changed");
        Ok(result)
    }

    pub fn set_repeat(&self, id: &GeneratorId, enabled: bool) -> Result<NavigationResult> {
        let result = self.store.write(id, |g| g.set_repeat(enabled))?;
        info!(generator_id = %id, repeat = enabled, "Playlist repeat changed");
        Ok(result)
    }

    /// What `next` would land on, without moving the cursor
    pub async fn peek_next(&self, id: &GeneratorId) -> Result<PeekedMove> {
        loop {
            let current = self.store.read(id, PlaylistGenerator::current_index)?;
            self.ensure_materialized(id, current + 2).await?;

            let peeked = self.store.read(id, |g| {
                if g.needs_extension_for_next() {
                    None
                } else {
                    Some(g.peek(g.next_index()))
                }
            })?;

            if let Some(peeked) = peeked {
                return Ok(peeked);
            }
        }
    }

    /// The entry at `index`, or `IndexOutOfRange`
    pub async fn peek_index(&self, id: &GeneratorId, index: i64) -> Result<PeekedMove> {
        if let Ok(i) = usize::try_from(index) {
            self.ensure_materialized(id, i.saturating_add(1)).await?;
        }
        self.store
            .read(id, |g| g.check_index(index).map(|i| g.peek(Some(i))))?
    }

    /// Compare-and-set cursor move
    pub fn commit_move(&self, id: &GeneratorId, expected_version: u64, index: usize) -> Result<NavigationResult> {
        self.store
            .write(id, |g| g.commit_move(expected_version, index))?
    }

    pub fn mark_served(&self, id: &GeneratorId, entry_id: EntryId) -> Result<bool> {
        self.store.write(id, |g| g.mark_served(entry_id))
    }

    pub fn remove(&self, id: &GeneratorId) -> bool {
        let removed = self.store.remove(id);
        if removed {
            debug!(generator_id = %id, "Playlist generator removed");
        }
        removed
    }
}
