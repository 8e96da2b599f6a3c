//! # Persistent IDs
//!
//! IDs survive instance reordering (kills swap the last instance in), so
//! renderers can follow one particle across frames.
//!
//! - Free IDs form a LIFO stack; the lowest free ID is handed out first.
//! - Each tick bumps the acquire tag, so an ID reused within the same tick
//!   is distinguishable from the same index acquired earlier.
//! - After each published pass the free stack is rebuilt from the live ID
//!   column and `max_used_id` shrinks to the highest live ID.

use bytemuck::{Pod, Zeroable};

use crate::buffer::NO_INDEX;

/// Persistent identity of one particle.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct ParticleId {
    /// Slot in the ID-to-index table.
    pub index: i32,
    /// Tick tag at which `index` was acquired.
    pub acquire_tag: i32,
}

#[derive(Debug, Default)]
pub(crate) struct IdTable {
    free_ids: Vec<i32>,
    max_used_id: Option<i32>,
    acquire_tag: i32,
}

impl IdTable {
    pub(crate) fn acquire(&mut self) -> ParticleId {
        let index = match self.free_ids.pop() {
            Some(index) => index,
            None => self.max_used_id.map_or(0, |max| max + 1),
        };
        self.max_used_id = self.max_used_id.max(Some(index));
        ParticleId {
            index,
            acquire_tag: self.acquire_tag,
        }
    }

    /// Forgets every acquired ID. The acquire tag keeps counting so IDs
    /// handed out before the clear never look freshly spawned.
    pub(crate) fn clear(&mut self) {
        self.free_ids.clear();
        self.max_used_id = None;
    }

    pub(crate) fn next_tick(&mut self) {
        self.acquire_tag = self.acquire_tag.wrapping_add(1);
    }

    pub(crate) fn acquire_tag(&self) -> i32 {
        self.acquire_tag
    }

    pub(crate) fn max_used_id(&self) -> Option<i32> {
        self.max_used_id
    }

    /// Length the ID-to-index table needs to cover every acquired ID.
    pub(crate) fn table_len(&self) -> usize {
        self.max_used_id
            .and_then(|max| usize::try_from(max + 1).ok())
            .unwrap_or(0)
    }

    pub(crate) fn free_count(&self) -> usize {
        self.free_ids.len()
    }

    /// Rebuilds the free stack from an ID-to-index table.
    pub(crate) fn rebuild(&mut self, max_live: Option<i32>, id_to_index: &[i32]) {
        let previous = self.max_used_id;
        self.max_used_id = max_live;
        self.free_ids.clear();
        if let Some(max) = max_live {
            self.free_ids.extend((0..=max).rev().filter(|&id| {
                usize::try_from(id)
                    .ok()
                    .and_then(|i| id_to_index.get(i))
                    .map_or(true, |&slot| slot == NO_INDEX)
            }));
        }
        if previous != self.max_used_id {
            tracing::trace!(?previous, max_used_id = ?self.max_used_id, free = self.free_ids.len(), "trimmed id table");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_sequential_then_recycled_lowest_first() {
        let mut ids = IdTable::default();
        let a = ids.acquire();
        let b = ids.acquire();
        let c = ids.acquire();
        assert_eq!((a.index, b.index, c.index), (0, 1, 2));
        assert_eq!(ids.max_used_id(), Some(2));

        // Only ID 2 and ID 0 alive: table[id] = instance
        ids.rebuild(Some(2), &[1, NO_INDEX, 0]);
        assert_eq!(ids.free_count(), 1);
        assert_eq!(ids.acquire().index, 1);
        assert_eq!(ids.acquire().index, 3);
    }

    #[test]
    fn test_rebuild_shrinks_max() {
        let mut ids = IdTable::default();
        for _ in 0..10 {
            ids.acquire();
        }
        ids.rebuild(Some(3), &[0, NO_INDEX, 1, 2, NO_INDEX]);
        assert_eq!(ids.max_used_id(), Some(3));
        assert_eq!(ids.table_len(), 4);
        assert_eq!(ids.free_count(), 1);

        ids.rebuild(None, &[]);
        assert_eq!(ids.max_used_id(), None);
        assert_eq!(ids.acquire().index, 0);
    }

    #[test]
    fn test_tag_changes_per_tick() {
        let mut ids = IdTable::default();
        let first = ids.acquire();
        ids.next_tick();
        ids.rebuild(None, &[]);
        let second = ids.acquire();
        assert_eq!(first.index, second.index);
        assert_ne!(first.acquire_tag, second.acquire_tag);
        assert_eq!(second.acquire_tag, ids.acquire_tag());
    }

    #[test]
    fn test_clear_keeps_tag() {
        let mut ids = IdTable::default();
        ids.next_tick();
        let before = ids.acquire();
        ids.acquire();

        ids.clear();
        assert_eq!(ids.max_used_id(), None);
        assert_eq!(ids.free_count(), 0);
        assert_eq!(ids.acquire_tag(), before.acquire_tag);

        ids.next_tick();
        let after = ids.acquire();
        assert_eq!(after.index, before.index);
        assert_ne!(after, before);
    }
}
