//! # Double-Buffered Dataset
//!
//! Owns a small pool of particle buffers and rotates them between the
//! simulation writer and the render readers.

// SAFETY: The destination buffer is reached through the arena's write lock.
#![allow(unsafe_code)]
//!
//! ## Architecture
//!
//! ```text
//!                 ┌───────────────────────────────────────┐
//!                 │                Dataset                │
//!                 │  ┌────────┐  ┌────────┐  ┌────────┐   │
//!                 │  │ slot 0 │  │ slot 1 │  │ slot 2 │.. │
//!                 │  └────────┘  └────────┘  └────────┘   │
//!                 │   current ▲     destination ▲         │
//!                 └───────────┼─────────────────┼─────────┘
//!                             │                 │
//!              ┌──────────────┴───┐   ┌─────────┴──────────┐
//!              │  DatasetReader   │   │ begin/end_simulate │
//!              │ (render threads) │   │ (simulation owner) │
//!              └──────────────────┘   └────────────────────┘
//! ```
//!
//! ## State Machine
//!
//! ```text
//! Idle ──begin_simulate──▶ Simulating ──end_simulate(publish)──▶ Idle
//! ```
//!
//! - `begin_simulate` picks a slot that is neither current nor read.
//! - `end_simulate(true)` publishes that slot as the new current buffer.
//!   Readers already holding the old one keep it until they drop it.

mod ids;

pub use ids::ParticleId;

use std::sync::Arc;

use crate::buffer::{DeviceBackend, ParticleBuffer};
use crate::config::DatasetConfig;
use crate::error::{CoreError, CoreResult};
use crate::layout::{ComponentLayout, PERSISTENT_ID_ATTRIBUTE};
use crate::memory::{BufferArena, BufferReadGuard, RetireAction, RetireList};
use ids::IdTable;

/// Where a dataset's buffers live. Chosen once, at construction.
#[derive(Debug, Clone, Default)]
pub enum Residency {
    /// Host memory only.
    #[default]
    Host,
    /// Host columns mirrored into device buffers from this backend.
    Device(Arc<dyn DeviceBackend>),
}

/// Double-buffer controller for one particle stream.
#[derive(Debug)]
pub struct Dataset {
    name: String,
    arena: Arc<BufferArena>,
    gpu_resident: bool,
    in_service: usize,
    destination: Option<usize>,
    retired: RetireList,
    ids: IdTable,
    id_component: Option<usize>,
    tick: u64,
}

impl Dataset {
    /// Creates a dataset, compiling the layout from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the layout fails
    /// to compile.
    pub fn new(config: &DatasetConfig, residency: Residency) -> CoreResult<Self> {
        let layout = Arc::new(config.compile_layout()?);
        Self::with_layout(Some(layout), config, residency)
    }

    /// Creates a dataset with an already compiled layout.
    ///
    /// `None` falls back to the shared empty layout. `config.attributes` is
    /// ignored here.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if the buffer counts are invalid.
    pub fn with_layout(
        layout: Option<Arc<ComponentLayout>>,
        config: &DatasetConfig,
        residency: Residency,
    ) -> CoreResult<Self> {
        config.validate()?;
        let layout = layout.unwrap_or_else(ComponentLayout::empty);
        let id_component = layout
            .find(PERSISTENT_ID_ATTRIBUTE)
            .filter(|_| layout.has_persistent_ids())
            .map(|entry| entry.int_offset);

        let gpu_resident = matches!(residency, Residency::Device(_));
        let arena = BufferArena::new(layout, config.max_buffers, |layout| match &residency {
            Residency::Host => ParticleBuffer::new(layout),
            Residency::Device(backend) => ParticleBuffer::with_device(layout, Arc::clone(backend)),
        });

        tracing::debug!(
            dataset = %config.name,
            gpu_resident,
            initial_buffers = config.initial_buffers,
            max_buffers = config.max_buffers,
            "created dataset"
        );

        Ok(Self {
            name: config.name.clone(),
            arena: Arc::new(arena),
            gpu_resident,
            in_service: config.initial_buffers,
            destination: None,
            retired: RetireList::default(),
            ids: IdTable::default(),
            id_component,
            tick: 0,
        })
    }

    /// Dataset name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Compiled layout shared by all buffers.
    #[inline]
    #[must_use]
    pub fn layout(&self) -> &Arc<ComponentLayout> {
        self.arena.layout()
    }

    /// Whether buffers are mirrored into device memory.
    #[inline]
    #[must_use]
    pub fn is_gpu_resident(&self) -> bool {
        self.gpu_resident
    }

    /// Number of simulate passes started so far.
    #[inline]
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Buffers currently in the pool (grows on demand up to `max_buffers`).
    #[inline]
    #[must_use]
    pub fn buffers_in_service(&self) -> usize {
        self.in_service
    }

    /// The shared arena, for inspection.
    #[inline]
    #[must_use]
    pub fn arena(&self) -> &Arc<BufferArena> {
        &self.arena
    }

    /// A handle render threads can use to fetch the current buffer.
    #[must_use]
    pub fn reader(&self) -> DatasetReader {
        DatasetReader {
            arena: Arc::clone(&self.arena),
        }
    }

    /// Read reference on the most recently published buffer.
    #[must_use]
    pub fn current_data(&self) -> Option<BufferReadGuard> {
        self.arena.current()
    }

    /// Whether a simulate pass is in progress.
    #[inline]
    #[must_use]
    pub fn is_simulating(&self) -> bool {
        self.destination.is_some()
    }

    /// Checks out a buffer for writing and starts a new tick.
    ///
    /// The returned buffer is empty (capacity is kept from its last use).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AlreadySimulating`] if a pass is open and
    /// [`CoreError::BufferPoolExhausted`] if every slot is current or read.
    pub fn begin_simulate(&mut self) -> CoreResult<&mut ParticleBuffer> {
        if self.destination.is_some() {
            return Err(CoreError::AlreadySimulating(self.name.clone()));
        }
        self.retired.flush(&self.arena);

        let index = self.select_destination()?;
        self.destination = Some(index);
        self.tick += 1;
        self.ids.next_tick();
        tracing::trace!(dataset = %self.name, slot = index, tick = self.tick, "begin simulate");

        // SAFETY: `select_destination` returned a slot whose lock we now hold.
        let buffer = unsafe { self.arena.locked_buffer_mut(index) };
        buffer.reset();
        Ok(buffer)
    }

    fn select_destination(&mut self) -> CoreResult<usize> {
        let current = self.arena.current_index();
        let reusable = (0..self.in_service).find(|&index| {
            Some(index) != current && !self.retired.contains(index) && self.arena.try_lock(index)
        });
        if let Some(index) = reusable {
            return Ok(index);
        }

        while self.in_service < self.arena.capacity() {
            let index = self.in_service;
            self.in_service += 1;
            tracing::debug!(
                dataset = %self.name,
                buffers = self.in_service,
                "grew buffer pool"
            );
            if self.arena.try_lock(index) {
                return Ok(index);
            }
        }

        tracing::warn!(dataset = %self.name, capacity = self.arena.capacity(), "buffer pool exhausted");
        Err(CoreError::BufferPoolExhausted {
            capacity: self.arena.capacity(),
        })
    }

    /// The buffer being written, between `begin_simulate` and `end_simulate`.
    #[must_use]
    pub fn destination_mut(&mut self) -> Option<&mut ParticleBuffer> {
        let index = self.destination?;
        // SAFETY: `destination` is only set while we hold the slot's lock.
        Some(unsafe { self.arena.locked_buffer_mut(index) })
    }

    /// Grows the destination buffer to hold `num_instances`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotSimulating`] outside a simulate pass.
    pub fn allocate(&mut self, num_instances: usize, maintain_existing: bool) -> CoreResult<()> {
        let name = &self.name;
        let index = self
            .destination
            .ok_or_else(|| CoreError::NotSimulating(name.clone()))?;
        // SAFETY: `destination` is only set while we hold the slot's lock.
        unsafe { self.arena.locked_buffer_mut(index) }.allocate(num_instances, maintain_existing);
        Ok(())
    }

    /// Copies every instance of the current buffer into the destination.
    ///
    /// Returns the number of instances copied (0 if nothing is published).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotSimulating`] outside a simulate pass.
    pub fn carry_over_current(&mut self) -> CoreResult<usize> {
        let name = &self.name;
        let index = self
            .destination
            .ok_or_else(|| CoreError::NotSimulating(name.clone()))?;
        let Some(current) = self.arena.current() else {
            return Ok(0);
        };
        // SAFETY: `destination` is locked and differs from the current slot,
        // which `current` holds a read reference on.
        let destination = unsafe { self.arena.locked_buffer_mut(index) };
        let count = current.num_instances();
        current.copy_to(destination, 0, 0, count)?;
        Ok(count)
    }

    /// Ends the simulate pass. With `publish`, the written buffer becomes the
    /// new current buffer; otherwise it is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotSimulating`] outside a simulate pass.
    pub fn end_simulate(&mut self, publish: bool) -> CoreResult<()> {
        let name = &self.name;
        let index = self
            .destination
            .take()
            .ok_or_else(|| CoreError::NotSimulating(name.clone()))?;

        if publish {
            // SAFETY: the slot stays locked until `unlock` below.
            let buffer = unsafe { self.arena.locked_buffer_mut(index) };
            if let Some(component) = self.id_component {
                let max_live = buffer.rebuild_id_table(component, self.ids.table_len());
                self.ids.rebuild(max_live, buffer.id_table());
            }
            buffer.upload_to_device();
        }
        self.arena.unlock(index);

        if publish {
            self.arena.publish(Some(index));
            tracing::trace!(dataset = %self.name, slot = index, "published buffer");
        }
        Ok(())
    }

    /// Drops all particle data.
    ///
    /// Buffers still held by readers keep their contents until the last
    /// reader leaves; they are reset at the next [`Self::flush_retired`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ResetWhileSimulating`] during a simulate pass.
    pub fn reset(&mut self) -> CoreResult<()> {
        self.retire_all(RetireAction::Reset)
    }

    /// Drops all particle data and frees buffer memory, deferring buffers
    /// that are still being read.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ResetWhileSimulating`] during a simulate pass.
    pub fn release_buffers(&mut self) -> CoreResult<()> {
        self.retire_all(RetireAction::Free)
    }

    fn retire_all(&mut self, action: RetireAction) -> CoreResult<()> {
        if self.destination.is_some() {
            return Err(CoreError::ResetWhileSimulating(self.name.clone()));
        }
        self.arena.publish(None);
        let mut deferred = 0;
        for index in 0..self.in_service {
            if !self.retired.retire(&self.arena, index, action) {
                deferred += 1;
            }
        }
        self.ids.clear();
        tracing::debug!(dataset = %self.name, ?action, deferred, "reset dataset");
        Ok(())
    }

    /// Reclaims retired buffers whose readers have gone.
    ///
    /// Runs automatically at every `begin_simulate`; call it at other safe
    /// points to release memory sooner. Returns the number reclaimed.
    pub fn flush_retired(&mut self) -> usize {
        self.retired.flush(&self.arena)
    }

    /// Buffers waiting for readers before they can be reclaimed.
    #[must_use]
    pub fn pending_retired(&self) -> usize {
        self.retired.len()
    }

    /// Hands out a persistent ID for a newly spawned particle.
    pub fn acquire_id(&mut self) -> ParticleId {
        self.ids.acquire()
    }

    /// Whether `id` was acquired during the current tick.
    #[must_use]
    pub fn is_spawned_this_tick(&self, id: ParticleId) -> bool {
        id.acquire_tag == self.ids.acquire_tag()
    }

    /// Highest ID currently in use, if any.
    #[must_use]
    pub fn max_used_id(&self) -> Option<i32> {
        self.ids.max_used_id()
    }

    /// Number of recycled IDs waiting to be reused.
    #[must_use]
    pub fn free_id_count(&self) -> usize {
        self.ids.free_count()
    }
}

impl Drop for Dataset {
    fn drop(&mut self) {
        if let Some(index) = self.destination.take() {
            self.arena.unlock(index);
        }
    }
}

/// Cloneable, thread-safe view of a dataset's published buffer.
#[derive(Debug, Clone)]
pub struct DatasetReader {
    arena: Arc<BufferArena>,
}

impl DatasetReader {
    /// Read reference on the most recently published buffer.
    #[must_use]
    pub fn current_data(&self) -> Option<BufferReadGuard> {
        self.arena.current()
    }

    /// Layout of the dataset's buffers.
    #[must_use]
    pub fn layout(&self) -> &Arc<ComponentLayout> {
        self.arena.layout()
    }
}
