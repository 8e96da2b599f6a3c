//! # Buffer Arena
//!
//! Fixed set of buffer slots shared between the simulation writer and any
//! number of render readers.

// SAFETY: This module hands out references into `UnsafeCell` slots.
// Exclusivity is enforced by each slot's `SharedLifetime`.
#![allow(unsafe_code)]
//!
//! ## Slot Protocol
//!
//! ```text
//!            try_lock (0 readers)              unlock
//!   FREE ───────────────────────────▶ WRITING ───────────▶ FREE / CURRENT
//!     ▲                                                        │
//!     │            release_read_ref (last reader)              │ try_add_read_ref
//!     └──────────────────────────── READING ◀──────────────────┘
//! ```
//!
//! - A slot's contents change only while its counter holds the write sentinel.
//! - A reader that holds a read reference sees frozen contents.
//! - Slots are never freed while referenced: reclamation goes through
//!   [`RetireList`], which retries once the readers have gone.
//! - Every recycle bumps the slot's epoch, so a [`BufferHandle`] names one
//!   particular generation of contents.

use std::cell::UnsafeCell;
use std::ops::Deref;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::buffer::ParticleBuffer;
use crate::layout::ComponentLayout;
use crate::sync::SharedLifetime;

/// Marker stored in [`BufferArena`]'s current index when nothing is published.
const NO_CURRENT: usize = usize::MAX;

/// Names one generation of one buffer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle {
    /// Slot index.
    pub index: usize,
    /// Slot epoch at the time the handle was taken.
    pub epoch: u32,
}

struct BufferSlot {
    lifetime: SharedLifetime,
    epoch: AtomicU32,
    buffer: UnsafeCell<ParticleBuffer>,
}

/// Shared buffer slots plus the published "current" index.
pub struct BufferArena {
    slots: Box<[BufferSlot]>,
    layout: Arc<ComponentLayout>,
    current: AtomicUsize,
}

impl BufferArena {
    /// Creates `capacity` empty slots, building each buffer with `make`.
    #[must_use]
    pub fn new(
        layout: Arc<ComponentLayout>,
        capacity: usize,
        mut make: impl FnMut(&ComponentLayout) -> ParticleBuffer,
    ) -> Self {
        let slots = (0..capacity)
            .map(|_| BufferSlot {
                lifetime: SharedLifetime::new(),
                epoch: AtomicU32::new(0),
                buffer: UnsafeCell::new(make(layout.as_ref())),
            })
            .collect();
        Self {
            slots,
            layout,
            current: AtomicUsize::new(NO_CURRENT),
        }
    }

    /// Number of slots.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// The layout every slot is shaped for.
    #[inline]
    #[must_use]
    pub fn layout(&self) -> &Arc<ComponentLayout> {
        &self.layout
    }

    /// Index of the published buffer.
    #[inline]
    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        match self.current.load(Ordering::Acquire) {
            NO_CURRENT => None,
            index => Some(index),
        }
    }

    pub(crate) fn publish(&self, index: Option<usize>) {
        self.current
            .store(index.unwrap_or(NO_CURRENT), Ordering::Release);
    }

    /// Readers currently holding slot `index`.
    #[inline]
    #[must_use]
    pub fn read_ref_count(&self, index: usize) -> u32 {
        self.slots[index].lifetime.read_ref_count()
    }

    /// Whether slot `index` is locked for writing.
    #[inline]
    #[must_use]
    pub fn is_write_locked(&self, index: usize) -> bool {
        self.slots[index].lifetime.is_write_locked()
    }

    /// Current epoch of slot `index`.
    #[inline]
    #[must_use]
    pub fn epoch(&self, index: usize) -> u32 {
        self.slots[index].epoch.load(Ordering::Acquire)
    }

    /// Whether `handle` still names the contents now in its slot.
    #[must_use]
    pub fn is_live(&self, handle: BufferHandle) -> bool {
        handle.index < self.slots.len() && self.epoch(handle.index) == handle.epoch
    }

    /// Takes the write lock on slot `index` and starts a new epoch.
    pub(crate) fn try_lock(&self, index: usize) -> bool {
        let slot = &self.slots[index];
        if slot.lifetime.try_lock() {
            slot.epoch.fetch_add(1, Ordering::AcqRel);
            true
        } else {
            false
        }
    }

    pub(crate) fn unlock(&self, index: usize) {
        self.slots[index].lifetime.unlock();
    }

    /// Mutable access to a write-locked slot.
    ///
    /// # Safety
    ///
    /// The caller must hold the write lock on `index` (a successful
    /// [`Self::try_lock`] not yet matched by [`Self::unlock`]) and must not
    /// create a second reference to the same slot while this one is alive.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn locked_buffer_mut(&self, index: usize) -> &mut ParticleBuffer {
        debug_assert!(self.slots[index].lifetime.is_write_locked());
        &mut *self.slots[index].buffer.get()
    }

    /// Acquires a read reference on the published buffer.
    ///
    /// Never blocks on the writer: if the published slot changes underneath,
    /// the acquire is retried against the new one.
    #[must_use]
    pub fn current(self: &Arc<Self>) -> Option<BufferReadGuard> {
        loop {
            let index = self.current_index()?;
            let slot = &self.slots[index];
            if slot.lifetime.try_add_read_ref() {
                if self.current.load(Ordering::Acquire) == index {
                    return Some(BufferReadGuard {
                        arena: Arc::clone(self),
                        handle: BufferHandle {
                            index,
                            epoch: slot.epoch.load(Ordering::Acquire),
                        },
                    });
                }
                slot.lifetime.release_read_ref();
            }
            std::hint::spin_loop();
        }
    }

    /// Runs `action` on slot `index` if it can be locked right now.
    fn with_locked(&self, index: usize, action: RetireAction) -> bool {
        if !self.try_lock(index) {
            return false;
        }
        // SAFETY: the lock was just taken and is released below.
        let buffer = unsafe { self.locked_buffer_mut(index) };
        match action {
            RetireAction::Reset => buffer.reset(),
            RetireAction::Free => buffer.release_memory(),
        }
        self.unlock(index);
        true
    }
}

// SAFETY: slot contents are only reached through the `SharedLifetime`
// protocol: shared references while a read reference is held, a unique
// reference while the write lock is held. The two are mutually exclusive.
unsafe impl Sync for BufferArena {}

impl std::fmt::Debug for BufferArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferArena")
            .field("capacity", &self.slots.len())
            .field("current", &self.current_index())
            .finish_non_exhaustive()
    }
}

/// Read reference on one published buffer.
///
/// The buffer's contents cannot change and its memory cannot be reclaimed
/// until the guard is dropped.
pub struct BufferReadGuard {
    arena: Arc<BufferArena>,
    handle: BufferHandle,
}

impl BufferReadGuard {
    /// The slot and epoch this guard reads.
    #[inline]
    #[must_use]
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    /// Layout of the buffer.
    #[inline]
    #[must_use]
    pub fn layout(&self) -> &ComponentLayout {
        &self.arena.layout
    }
}

impl Deref for BufferReadGuard {
    type Target = ParticleBuffer;

    #[inline]
    fn deref(&self) -> &Self::Target {
        // SAFETY: we hold a read reference, so no writer can lock the slot.
        unsafe { &*self.arena.slots[self.handle.index].buffer.get() }
    }
}

impl Clone for BufferReadGuard {
    fn clone(&self) -> Self {
        // Cannot fail: our own reference keeps the writer out.
        self.arena.slots[self.handle.index].lifetime.add_read_ref();
        Self {
            arena: Arc::clone(&self.arena),
            handle: self.handle,
        }
    }
}

impl Drop for BufferReadGuard {
    fn drop(&mut self) {
        self.arena.slots[self.handle.index].lifetime.release_read_ref();
    }
}

impl std::fmt::Debug for BufferReadGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferReadGuard")
            .field("handle", &self.handle)
            .field("num_instances", &self.num_instances())
            .finish()
    }
}

/// What to do with a slot once its readers are gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetireAction {
    /// Drop the instances, keep the memory.
    Reset,
    /// Free the memory.
    Free,
}

#[derive(Debug, Clone, Copy)]
struct Retired {
    index: usize,
    action: RetireAction,
}

/// Slots waiting for their last reader before they can be reset or freed.
///
/// Owned by the writer; readers never touch it.
#[derive(Debug, Default)]
pub struct RetireList {
    entries: Vec<Retired>,
}

impl RetireList {
    /// Applies `action` now if slot `index` is unreferenced, otherwise queues it.
    ///
    /// Returns `true` if the action ran immediately.
    pub fn retire(&mut self, arena: &BufferArena, index: usize, action: RetireAction) -> bool {
        if arena.with_locked(index, action) {
            return true;
        }
        match self.entries.iter_mut().find(|e| e.index == index) {
            // Free wins over Reset.
            Some(entry) if action == RetireAction::Free => entry.action = action,
            Some(_) => {}
            None => self.entries.push(Retired { index, action }),
        }
        tracing::debug!(
            slot = index,
            readers = arena.read_ref_count(index),
            ?action,
            "deferred buffer reclamation"
        );
        false
    }

    /// Reclaims every queued slot whose readers have all gone.
    ///
    /// Returns the number of slots reclaimed.
    pub fn flush(&mut self, arena: &BufferArena) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|entry| !arena.with_locked(entry.index, entry.action));
        let reclaimed = before - self.entries.len();
        if reclaimed > 0 {
            tracing::debug!(reclaimed, pending = self.entries.len(), "flushed retired buffers");
        }
        reclaimed
    }

    /// Whether slot `index` is waiting for reclamation.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        self.entries.iter().any(|e| e.index == index)
    }

    /// Number of slots waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
