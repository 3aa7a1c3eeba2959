//! Session store of fetched grid content

use std::collections::HashMap;

use super::GridIndex;
use super::api::ContentItem;

/// Items received from the content API, keyed by grid cell.
///
/// Nothing is evicted: the loaded grid never shrinks, so an evicted item
/// would never be fetched again during the session.
#[derive(Debug, Default)]
pub struct ItemStore {
    items: HashMap<GridIndex, ContentItem>,
    batches: usize,
}

impl ItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fetched batch. Overlapping fetches may deliver a cell twice;
    /// the newest copy wins.
    pub fn insert_all(&mut self, items: Vec<ContentItem>) {
        self.batches += 1;
        for item in items {
            self.items.insert(item.grid_index(), item);
        }
    }

    pub fn get(&self, index: &GridIndex) -> Option<&ContentItem> {
        self.items.get(index)
    }

    pub fn contains(&self, index: &GridIndex) -> bool {
        self.items.contains_key(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            item_count: self.items.len(),
            batches_received: self.batches,
        }
    }
}

/// Store statistics for the overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub item_count: usize,
    pub batches_received: usize,
}
