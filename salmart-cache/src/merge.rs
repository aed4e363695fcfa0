//! Merge by id.

use salmart_core::{Timestamp, TEMP_ID_PREFIX};
use salmart_storage::CacheableEntity;
use serde::Serialize;
use std::collections::HashMap;

/// Result of merging incoming entities into a cached partition.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome<T> {
    pub items: Vec<T>,
    /// Incoming entities whose id was not cached.
    pub added: usize,
    /// Cached entities replaced by a different incoming version.
    pub replaced: usize,
}

impl<T> MergeOutcome<T> {
    pub fn changed(&self) -> bool {
        self.added > 0 || self.replaced > 0
    }
}

/// Merge `incoming` into `existing`.
///
/// Ids stay unique and the incoming version wins on collision. Existing
/// entities keep their position, new ones are appended; callers re-sort.
pub fn merge_by_id<T>(existing: Vec<T>, incoming: Vec<T>) -> MergeOutcome<T>
where
    T: CacheableEntity,
{
    let mut items: Vec<T> = Vec::with_capacity(existing.len() + incoming.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for item in existing {
        match positions.get(item.merge_key()) {
            Some(&pos) => items[pos] = item,
            None => {
                positions.insert(item.merge_key().to_string(), items.len());
                items.push(item);
            }
        }
    }

    let mut added = 0;
    let mut replaced = 0;
    for item in incoming {
        match positions.get(item.merge_key()) {
            Some(&pos) => {
                if !same_value(&items[pos], &item) {
                    replaced += 1;
                }
                items[pos] = item;
            }
            None => {
                positions.insert(item.merge_key().to_string(), items.len());
                items.push(item);
                added += 1;
            }
        }
    }

    MergeOutcome {
        items,
        added,
        replaced,
    }
}

/// Most recent creation time of a server-known item, used as the `since`
/// watermark.
///
/// Queued and failed bubbles carry a local clock and are skipped.
pub fn latest_created_at<T: CacheableEntity>(items: &[T]) -> Option<Timestamp> {
    items
        .iter()
        .filter(|item| !item.merge_key().starts_with(TEMP_ID_PREFIX))
        .filter_map(CacheableEntity::created_at)
        .max()
}

/// Structural equality through the wire representation.
pub fn same_value<T: Serialize>(a: &T, b: &T) -> bool {
    match (serde_json::to_value(a), serde_json::to_value(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
