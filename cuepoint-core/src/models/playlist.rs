use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::id::{EntryId, GeneratorId, ItemId, MediaPartId};
use crate::provider::CatalogItem;
use crate::{Error, Result};

/// Playlist type, selects how the generator is populated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaylistType {
    /// Exactly one entry
    Single,
    Album,
    Season,
    Show,
    Artist,
    /// Whole library section, materialized lazily
    Library,
    /// Caller-supplied item list
    Explicit,
}

impl PlaylistType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Album => "album",
            Self::Season => "season",
            Self::Show => "show",
            Self::Artist => "artist",
            Self::Library => "library",
            Self::Explicit => "explicit",
        }
    }
}

impl std::fmt::Display for PlaylistType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlaylistType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "single" => Ok(Self::Single),
            "album" => Ok(Self::Album),
            "season" => Ok(Self::Season),
            "show" => Ok(Self::Show),
            "artist" => Ok(Self::Artist),
            "library" => Ok(Self::Library),
            "explicit" => Ok(Self::Explicit),
            other => Err(Error::InvalidInput(format!("Unknown playlist type: {other}"))),
        }
    }
}

/// One materialized playlist entry. Immutable apart from `served`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub id: EntryId,
    pub item_id: ItemId,
    /// Position in catalog order
    pub catalog_position: usize,
    pub duration_ms: Option<i64>,
    pub media_part_id: Option<MediaPartId>,
    pub served: bool,
    pub title: String,
    pub parent_title: Option<String>,
    pub subtitle: Option<String>,
    pub thumbnail: Option<String>,
}

impl PlaylistEntry {
    fn from_catalog(id: EntryId, catalog_position: usize, item: CatalogItem) -> Self {
        Self {
            id,
            item_id: item.id,
            catalog_position,
            duration_ms: item.duration_ms,
            media_part_id: item.media_part_id,
            served: false,
            title: item.title,
            parent_title: item.parent_title,
            subtitle: item.subtitle,
            thumbnail: item.thumbnail,
        }
    }

    /// The catalog view of this entry, as handed to the decision engine
    #[must_use]
    pub fn to_catalog_item(&self) -> CatalogItem {
        CatalogItem {
            id: self.item_id.clone(),
            title: self.title.clone(),
            parent_title: self.parent_title.clone(),
            subtitle: self.subtitle.clone(),
            thumbnail: self.thumbnail.clone(),
            duration_ms: self.duration_ms,
            media_part_id: self.media_part_id.clone(),
        }
    }

    fn view(&self, index: usize) -> PlaylistItem {
        PlaylistItem {
            index,
            entry_id: self.id,
            item_id: self.item_id.clone(),
            title: self.title.clone(),
            parent_title: self.parent_title.clone(),
            subtitle: self.subtitle.clone(),
            thumbnail: self.thumbnail.clone(),
            duration_ms: self.duration_ms,
            served: self.served,
        }
    }
}

/// Entry as seen by clients, with its current logical index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItem {
    pub index: usize,
    pub entry_id: EntryId,
    pub item_id: ItemId,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    pub served: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistChunk {
    pub items: Vec<PlaylistItem>,
    pub start_index: i64,
    pub current_index: usize,
    /// `-1` while the generator is unbounded
    pub total_count: i64,
    pub has_more: bool,
    pub shuffle: bool,
    pub repeat: bool,
}

/// Outcome of next/previous/jump and of the flag toggles
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationResult {
    pub success: bool,
    pub current_index: usize,
    pub total_count: i64,
    pub shuffle: bool,
    pub repeat: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_item: Option<PlaylistItem>,
}

/// Snapshot of a generator's cursor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistCursor {
    pub generator_id: GeneratorId,
    pub playlist_type: PlaylistType,
    pub current_index: usize,
    pub total_count: i64,
    pub shuffle: bool,
    pub repeat: bool,
    pub version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_item: Option<PlaylistItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_item: Option<PlaylistItem>,
}

/// What a cursor move would land on, and the version it was computed at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeekedMove {
    pub version: u64,
    pub target: Option<(usize, PlaylistEntry)>,
}

/// Catalog paging state of a lazily materialized generator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpstreamCursor {
    pub next_offset: usize,
    pub exhausted: bool,
}

/// Inputs for building a generator
#[derive(Debug, Clone)]
pub struct GeneratorSeed {
    pub playlist_type: PlaylistType,
    pub originator_id: Option<ItemId>,
    pub items: Vec<CatalogItem>,
    pub start_item_id: Option<ItemId>,
    pub shuffle: bool,
    pub repeat: bool,
    pub upstream: Option<UpstreamCursor>,
}

/// Stateful cursor over an ordered, optionally shuffled, list of entries
#[derive(Debug, Clone)]
pub struct PlaylistGenerator {
    pub id: GeneratorId,
    pub playlist_type: PlaylistType,
    pub originator_id: Option<ItemId>,
    /// Catalog order
    entries: Vec<PlaylistEntry>,
    /// Logical index -> position in `entries`
    order: Vec<usize>,
    current_index: usize,
    shuffle: bool,
    repeat: bool,
    upstream: Option<UpstreamCursor>,
    next_entry_id: u64,
    version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PlaylistGenerator {
    /// Build a generator positioned on the start item (or the first entry).
    ///
    /// With `shuffle` the start entry is placed at index 0 and the rest permuted.
    pub fn new(id: GeneratorId, seed: GeneratorSeed) -> Result<Self> {
        if seed.items.is_empty() {
            return Err(Error::NotFound(format!(
                "{} playlist has no playable items",
                seed.playlist_type
            )));
        }

        let now = Utc::now();
        let mut generator = Self {
            id,
            playlist_type: seed.playlist_type,
            originator_id: seed.originator_id,
            entries: Vec::with_capacity(seed.items.len()),
            order: Vec::with_capacity(seed.items.len()),
            current_index: 0,
            shuffle: false,
            repeat: seed.repeat,
            upstream: seed.upstream,
            next_entry_id: 1,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        generator.push_entries(seed.items);
        generator.order = (0..generator.entries.len()).collect();

        if let Some(start) = &seed.start_item_id {
            if let Some(pos) = generator.entries.iter().position(|e| &e.item_id == start) {
                generator.current_index = pos;
            }
        }

        if seed.shuffle {
            let start = generator.current_index;
            let mut rest: Vec<usize> = (0..generator.entries.len()).filter(|&i| i != start).collect();
            rest.shuffle(&mut rand::rng());
            generator.order = std::iter::once(start).chain(rest).collect();
            generator.current_index = 0;
            generator.shuffle = true;
        }

        Ok(generator)
    }

    fn push_entries(&mut self, items: Vec<CatalogItem>) -> std::ops::Range<usize> {
        let first = self.entries.len();
        for item in items {
            let id = EntryId(self.next_entry_id);
            self.next_entry_id += 1;
            let position = self.entries.len();
            self.entries.push(PlaylistEntry::from_catalog(id, position, item));
        }
        first..self.entries.len()
    }

    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }

    /// Number of materialized entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Whether the full length is known
    #[must_use]
    pub fn is_bounded(&self) -> bool {
        self.upstream.is_none_or(|u| u.exhausted)
    }

    #[must_use]
    pub fn total_count(&self) -> i64 {
        if self.is_bounded() {
            i64::try_from(self.len()).unwrap_or(i64::MAX)
        } else {
            -1
        }
    }

    #[must_use]
    pub const fn current_index(&self) -> usize {
        self.current_index
    }

    #[must_use]
    pub const fn shuffle(&self) -> bool {
        self.shuffle
    }

    #[must_use]
    pub const fn repeat(&self) -> bool {
        self.repeat
    }

    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub const fn upstream(&self) -> Option<UpstreamCursor> {
        self.upstream
    }

    #[must_use]
    pub fn entry_at(&self, index: usize) -> Option<&PlaylistEntry> {
        self.order.get(index).and_then(|&pos| self.entries.get(pos))
    }

    #[must_use]
    pub fn current_entry(&self) -> Option<&PlaylistEntry> {
        self.entry_at(self.current_index)
    }

    #[must_use]
    pub fn item_at(&self, index: usize) -> Option<PlaylistItem> {
        self.entry_at(index).map(|e| e.view(index))
    }

    /// Logical index `next` would move to, `None` at the end without repeat
    #[must_use]
    pub fn next_index(&self) -> Option<usize> {
        if self.current_index + 1 < self.len() {
            Some(self.current_index + 1)
        } else if self.repeat && self.is_bounded() && !self.is_empty() {
            Some(0)
        } else {
            None
        }
    }

    #[must_use]
    pub fn previous_index(&self) -> Option<usize> {
        if self.current_index > 0 {
            Some(self.current_index - 1)
        } else if self.repeat && self.is_bounded() && !self.is_empty() {
            Some(self.len() - 1)
        } else {
            None
        }
    }

    /// True when `next` cannot be answered without pulling more entries
    #[must_use]
    pub fn needs_extension_for_next(&self) -> bool {
        !self.is_bounded() && self.current_index + 1 >= self.len()
    }

    #[must_use]
    pub fn cursor(&self) -> PlaylistCursor {
        PlaylistCursor {
            generator_id: self.id.clone(),
            playlist_type: self.playlist_type,
            current_index: self.current_index,
            total_count: self.total_count(),
            shuffle: self.shuffle,
            repeat: self.repeat,
            version: self.version,
            current_item: self.item_at(self.current_index),
            next_item: self.next_index().and_then(|i| self.item_at(i)),
        }
    }

    fn navigation(&self, success: bool) -> NavigationResult {
        NavigationResult {
            success,
            current_index: self.current_index,
            total_count: self.total_count(),
            shuffle: self.shuffle,
            repeat: self.repeat,
            current_item: self.item_at(self.current_index),
        }
    }

    /// Contiguous range of entries starting at `start_index`
    #[must_use]
    pub fn chunk(&self, start_index: i64, limit: usize) -> PlaylistChunk {
        let total_count = self.total_count();
        let empty = PlaylistChunk {
            items: Vec::new(),
            start_index,
            current_index: self.current_index,
            total_count,
            has_more: false,
            shuffle: self.shuffle,
            repeat: self.repeat,
        };

        let Ok(start) = usize::try_from(start_index) else {
            return empty;
        };
        if self.is_bounded() && start >= self.len() {
            return empty;
        }

        let end = start.saturating_add(limit).min(self.len());
        let items: Vec<PlaylistItem> = (start..end).filter_map(|i| self.item_at(i)).collect();
        let has_more = !self.is_bounded() || start + items.len() < self.len();

        PlaylistChunk {
            items,
            start_index,
            current_index: self.current_index,
            total_count,
            has_more,
            shuffle: self.shuffle,
            repeat: self.repeat,
        }
    }

    fn move_to(&mut self, index: usize) {
        self.current_index = index;
        self.touch();
    }

    fn step(&mut self, target: Option<usize>) -> NavigationResult {
        match target {
            Some(index) => {
                self.move_to(index);
                self.navigation(true)
            }
            None => self.navigation(false),
        }
    }

    pub fn next(&mut self) -> NavigationResult {
        let target = self.next_index();
        self.step(target)
    }

    pub fn previous(&mut self) -> NavigationResult {
        let target = self.previous_index();
        self.step(target)
    }

    /// Validate a logical index against the materialized entries
    pub fn check_index(&self, index: i64) -> Result<usize> {
        usize::try_from(index)
            .ok()
            .filter(|&i| i < self.len())
            .ok_or(Error::IndexOutOfRange {
                index,
                total: self.total_count(),
            })
    }

    pub fn jump(&mut self, index: i64) -> Result<NavigationResult> {
        let index = self.check_index(index)?;
        self.move_to(index);
        Ok(self.navigation(true))
    }

    #[must_use]
    pub fn peek(&self, target: Option<usize>) -> PeekedMove {
        PeekedMove {
            version: self.version,
            target: target.and_then(|i| self.entry_at(i).map(|e| (i, e.clone()))),
        }
    }

    /// Move the cursor if nothing changed since `expected_version` was read
    pub fn commit_move(&mut self, expected_version: u64, index: usize) -> Result<NavigationResult> {
        if self.version != expected_version {
            return Err(Error::OptimisticLockConflict);
        }
        let index = self.check_index(i64::try_from(index).unwrap_or(i64::MAX))?;
        self.move_to(index);
        Ok(self.navigation(true))
    }

    /// Toggle shuffle. The current entry keeps playing in both directions.
    pub fn set_shuffle(&mut self, enabled: bool) -> NavigationResult {
        let current_pos = self.order.get(self.current_index).copied();

        if enabled {
            // Re-permute everything except the current entry, which keeps its index
            if let Some(current_pos) = current_pos {
                let mut rest: Vec<usize> = self
                    .order
                    .iter()
                    .copied()
                    .filter(|&p| p != current_pos)
                    .collect();
                rest.shuffle(&mut rand::rng());
                rest.insert(self.current_index, current_pos);
                self.order = rest;
            }
        } else {
            self.order = (0..self.entries.len()).collect();
            if let Some(current_pos) = current_pos {
                self.current_index = current_pos;
            }
        }

        self.shuffle = enabled;
        self.touch();
        self.navigation(true)
    }

    pub fn set_repeat(&mut self, enabled: bool) -> NavigationResult {
        self.repeat = enabled;
        self.touch();
        self.navigation(true)
    }

    /// Append a window pulled from the catalog. Existing indices are unchanged.
    pub fn append(&mut self, items: Vec<CatalogItem>, upstream: UpstreamCursor) {
        let range = self.push_entries(items);
        let mut added: Vec<usize> = range.collect();
        if self.shuffle {
            added.shuffle(&mut rand::rng());
        }
        self.order.extend(added);
        self.upstream = Some(upstream);
        self.updated_at = Utc::now();
    }

    /// Flag an entry as handed to a client. Returns false for unknown entries.
    pub fn mark_served(&mut self, entry_id: EntryId) -> bool {
        match self.entries.iter_mut().find(|e| e.id == entry_id) {
            Some(entry) => {
                entry.served = true;
                true
            }
            None => false,
        }
    }
}
