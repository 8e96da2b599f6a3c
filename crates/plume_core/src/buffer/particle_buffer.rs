//! # Particle Buffer
//!
//! One frame of particle data in structure-of-arrays form:
//!
//! ```text
//! float_data: [ comp0: i0 i1 .. iN pad | comp1: i0 i1 .. iN pad | ... ]
//! int_data:   [ comp0: i0 i1 .. iN pad | ... ]
//!               <-------- stride ------>
//! ```
//!
//! The stride is the allocated instance count rounded up to
//! [`COMPONENT_ALIGNMENT_BYTES`], so a vector write to one component never
//! spills into the next.

use std::fmt::Write;
use std::ops::Range;
use std::sync::Arc;

use super::device::{DeviceBackend, DeviceColumns};
use crate::error::{CoreError, CoreResult};
use crate::layout::ComponentLayout;

/// Alignment of every component column, in bytes (four 32-bit lanes).
pub const COMPONENT_ALIGNMENT_BYTES: usize = 16;

const LANES: usize = COMPONENT_ALIGNMENT_BYTES / std::mem::size_of::<f32>();

/// Sentinel stored in the ID table for IDs with no live instance.
pub const NO_INDEX: i32 = -1;

#[inline]
const fn aligned_stride(num_instances: usize) -> usize {
    (num_instances + LANES - 1) / LANES * LANES
}

/// Structure-of-arrays storage for one frame of particles.
#[derive(Debug, Default)]
pub struct ParticleBuffer {
    float_data: Vec<f32>,
    int_data: Vec<i32>,
    num_float_components: usize,
    num_int_components: usize,
    stride: usize,
    num_instances: usize,
    num_instances_allocated: usize,
    id_to_index: Vec<i32>,
    device: Option<DeviceColumns>,
}

impl ParticleBuffer {
    /// Creates an empty buffer shaped for `layout`.
    #[must_use]
    pub fn new(layout: &ComponentLayout) -> Self {
        Self::with_components(layout.num_float_components(), layout.num_int_components())
    }

    /// Creates an empty buffer with explicit component counts.
    #[must_use]
    pub fn with_components(num_float_components: usize, num_int_components: usize) -> Self {
        Self {
            num_float_components,
            num_int_components,
            ..Self::default()
        }
    }

    /// Creates an empty buffer that mirrors its columns into device memory.
    #[must_use]
    pub fn with_device(layout: &ComponentLayout, backend: Arc<dyn DeviceBackend>) -> Self {
        Self {
            device: Some(DeviceColumns::new(backend)),
            ..Self::new(layout)
        }
    }

    /// Grows the columns to hold at least `num_instances` instances.
    ///
    /// Capacity never shrinks. With `maintain_existing` the first
    /// `min(old, new)` instances keep their values; otherwise the buffer is
    /// left empty.
    pub fn allocate(&mut self, num_instances: usize, maintain_existing: bool) {
        if num_instances > self.num_instances_allocated {
            let new_stride = aligned_stride(num_instances);
            let keep = if maintain_existing { self.num_instances } else { 0 };

            self.float_data =
                Self::restride(&self.float_data, self.num_float_components, self.stride, new_stride, keep);
            self.int_data =
                Self::restride(&self.int_data, self.num_int_components, self.stride, new_stride, keep);
            self.stride = new_stride;
            self.num_instances_allocated = num_instances;

            if let Some(device) = self.device.as_mut() {
                device.resize(
                    (self.float_data.len() * 4) as u64,
                    (self.int_data.len() * 4) as u64,
                );
            }
            tracing::trace!(num_instances, stride = new_stride, "grew particle buffer");
        }

        self.num_instances = if maintain_existing {
            self.num_instances.min(num_instances)
        } else {
            0
        };
    }

    fn restride<T: Copy + Default>(
        old: &[T],
        components: usize,
        old_stride: usize,
        new_stride: usize,
        keep: usize,
    ) -> Vec<T> {
        let mut data = vec![T::default(); components * new_stride];
        if keep > 0 {
            for component in 0..components {
                let src = component * old_stride;
                let dst = component * new_stride;
                data[dst..dst + keep].copy_from_slice(&old[src..src + keep]);
            }
        }
        data
    }

    /// Drops all instances, keeping capacity.
    #[inline]
    pub fn reset(&mut self) {
        self.num_instances = 0;
        self.id_to_index.clear();
    }

    /// Frees both columns and any device memory.
    pub fn release_memory(&mut self) {
        self.float_data = Vec::new();
        self.int_data = Vec::new();
        self.id_to_index = Vec::new();
        self.stride = 0;
        self.num_instances = 0;
        self.num_instances_allocated = 0;
        if let Some(device) = self.device.as_mut() {
            device.release();
        }
    }

    /// Number of live instances.
    #[inline]
    #[must_use]
    pub fn num_instances(&self) -> usize {
        self.num_instances
    }

    /// Sets the live instance count.
    ///
    /// # Panics
    ///
    /// Panics if `num_instances` exceeds the allocated capacity.
    #[inline]
    pub fn set_num_instances(&mut self, num_instances: usize) {
        assert!(
            num_instances <= self.num_instances_allocated,
            "num_instances {num_instances} exceeds allocation {}",
            self.num_instances_allocated
        );
        self.num_instances = num_instances;
    }

    /// Number of instances the columns can hold.
    #[inline]
    #[must_use]
    pub fn num_instances_allocated(&self) -> usize {
        self.num_instances_allocated
    }

    /// Distance between two components, in elements.
    #[inline]
    #[must_use]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Distance between two float components, in bytes.
    #[inline]
    #[must_use]
    pub fn float_stride_bytes(&self) -> usize {
        self.stride * std::mem::size_of::<f32>()
    }

    /// Number of float components per instance.
    #[inline]
    #[must_use]
    pub fn num_float_components(&self) -> usize {
        self.num_float_components
    }

    /// Number of int components per instance.
    #[inline]
    #[must_use]
    pub fn num_int_components(&self) -> usize {
        self.num_int_components
    }

    /// Allocated column of one float component.
    ///
    /// # Panics
    ///
    /// Panics if `component` is out of range.
    #[inline]
    #[must_use]
    pub fn component_float(&self, component: usize) -> &[f32] {
        assert!(component < self.num_float_components, "float component out of range");
        let base = self.stride * component;
        &self.float_data[base..base + self.num_instances_allocated]
    }

    /// Mutable column of one float component.
    ///
    /// # Panics
    ///
    /// Panics if `component` is out of range.
    #[inline]
    pub fn component_float_mut(&mut self, component: usize) -> &mut [f32] {
        assert!(component < self.num_float_components, "float component out of range");
        let base = self.stride * component;
        &mut self.float_data[base..base + self.num_instances_allocated]
    }

    /// Allocated column of one int component.
    ///
    /// # Panics
    ///
    /// Panics if `component` is out of range.
    #[inline]
    #[must_use]
    pub fn component_int(&self, component: usize) -> &[i32] {
        assert!(component < self.num_int_components, "int component out of range");
        let base = self.stride * component;
        &self.int_data[base..base + self.num_instances_allocated]
    }

    /// Mutable column of one int component.
    ///
    /// # Panics
    ///
    /// Panics if `component` is out of range.
    #[inline]
    pub fn component_int_mut(&mut self, component: usize) -> &mut [i32] {
        assert!(component < self.num_int_components, "int component out of range");
        let base = self.stride * component;
        &mut self.int_data[base..base + self.num_instances_allocated]
    }

    #[inline]
    fn float_slot(&self, component: usize, instance: usize) -> usize {
        assert!(component < self.num_float_components, "float component out of range");
        assert!(
            instance < self.num_instances_allocated,
            "instance {instance} beyond allocation of {}",
            self.num_instances_allocated
        );
        self.stride * component + instance
    }

    #[inline]
    fn int_slot(&self, component: usize, instance: usize) -> usize {
        assert!(component < self.num_int_components, "int component out of range");
        assert!(
            instance < self.num_instances_allocated,
            "instance {instance} beyond allocation of {}",
            self.num_instances_allocated
        );
        self.stride * component + instance
    }

    /// One float value.
    ///
    /// # Panics
    ///
    /// Panics if `component` or `instance` is outside the allocation.
    #[inline]
    #[must_use]
    pub fn float(&self, component: usize, instance: usize) -> f32 {
        self.float_data[self.float_slot(component, instance)]
    }

    /// Writes one float value.
    ///
    /// # Panics
    ///
    /// Panics if `component` or `instance` is outside the allocation.
    #[inline]
    pub fn set_float(&mut self, component: usize, instance: usize, value: f32) {
        let slot = self.float_slot(component, instance);
        self.float_data[slot] = value;
    }

    /// One int value.
    ///
    /// # Panics
    ///
    /// Panics if `component` or `instance` is outside the allocation.
    #[inline]
    #[must_use]
    pub fn int(&self, component: usize, instance: usize) -> i32 {
        self.int_data[self.int_slot(component, instance)]
    }

    /// Writes one int value.
    ///
    /// # Panics
    ///
    /// Panics if `component` or `instance` is outside the allocation.
    #[inline]
    pub fn set_int(&mut self, component: usize, instance: usize, value: i32) {
        let slot = self.int_slot(component, instance);
        self.int_data[slot] = value;
    }

    /// Raw bytes of the float columns, padding included.
    #[must_use]
    pub fn float_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.float_data)
    }

    /// Raw bytes of the int columns, padding included.
    #[must_use]
    pub fn int_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.int_data)
    }

    /// Swaps every component of two instances.
    ///
    /// # Panics
    ///
    /// Panics if either instance is outside the allocation.
    pub fn swap_instances(&mut self, a: usize, b: usize) {
        assert!(
            a < self.num_instances_allocated && b < self.num_instances_allocated,
            "swap_instances({a}, {b}) beyond allocation of {}",
            self.num_instances_allocated
        );
        if a == b {
            return;
        }
        for component in 0..self.num_float_components {
            let base = self.stride * component;
            self.float_data.swap(base + a, base + b);
        }
        for component in 0..self.num_int_components {
            let base = self.stride * component;
            self.int_data.swap(base + a, base + b);
        }
    }

    /// Removes an instance by moving the last instance into its slot.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a live instance.
    pub fn kill_instance(&mut self, index: usize) {
        assert!(index < self.num_instances, "kill_instance out of range");
        let last = self.num_instances - 1;
        self.swap_instances(index, last);
        self.num_instances = last;
    }

    /// Copies `count` instances starting at `src_start` into `dest` at
    /// `dest_start`, growing `dest` if needed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LayoutMismatch`] if the buffers have different
    /// component counts and [`CoreError::RangeOutOfBounds`] if the source
    /// range is not fully live.
    pub fn copy_to(
        &self,
        dest: &mut ParticleBuffer,
        src_start: usize,
        dest_start: usize,
        count: usize,
    ) -> CoreResult<()> {
        self.check_compatible(dest)?;
        let src_end = src_start + count;
        if src_end > self.num_instances {
            return Err(CoreError::RangeOutOfBounds {
                start: src_start,
                end: src_end,
                len: self.num_instances,
            });
        }
        if count == 0 {
            return Ok(());
        }

        let dest_end = dest_start + count;
        if dest_end > dest.num_instances_allocated {
            dest.allocate(dest_end, true);
        }
        for component in 0..self.num_float_components {
            dest.component_float_mut(component)[dest_start..dest_end]
                .copy_from_slice(&self.component_float(component)[src_start..src_end]);
        }
        for component in 0..self.num_int_components {
            dest.component_int_mut(component)[dest_start..dest_end]
                .copy_from_slice(&self.component_int(component)[src_start..src_end]);
        }
        dest.num_instances = dest.num_instances.max(dest_end);
        Ok(())
    }

    /// Appends one instance copied from `source`, optionally removing it there.
    ///
    /// Returns the index of the new instance in `self`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::copy_to`].
    pub fn transfer_instance(
        &mut self,
        source: &mut ParticleBuffer,
        index: usize,
        remove_from_source: bool,
    ) -> CoreResult<usize> {
        source.check_compatible(self)?;
        if index >= source.num_instances {
            return Err(CoreError::RangeOutOfBounds {
                start: index,
                end: index + 1,
                len: source.num_instances,
            });
        }

        let dest_index = self.num_instances;
        if dest_index == self.num_instances_allocated {
            self.allocate((dest_index * 2).max(LANES), true);
        }
        source.copy_to(self, index, dest_index, 1)?;
        if remove_from_source {
            source.kill_instance(index);
        }
        Ok(dest_index)
    }

    /// Logs instances `start..start + count` at debug level, one row per
    /// instance with every attribute of `layout` by name.
    ///
    /// `None` dumps through the last live instance. The range is clamped to
    /// the live instances; the clamped range is returned.
    pub fn dump(
        &self,
        layout: &ComponentLayout,
        start: usize,
        count: Option<usize>,
        label: &str,
    ) -> Range<usize> {
        let end = count
            .map_or(self.num_instances, |count| start.saturating_add(count))
            .min(self.num_instances);
        let start = start.min(end);

        if layout.num_float_components() != self.num_float_components
            || layout.num_int_components() != self.num_int_components
        {
            tracing::warn!(label, "dump layout does not match buffer, skipped");
            return start..start;
        }

        tracing::debug!(
            label,
            start,
            end,
            num_instances = self.num_instances,
            allocated = self.num_instances_allocated,
            "particle buffer dump"
        );
        let mut row = String::new();
        for instance in start..end {
            row.clear();
            for entry in layout.entries() {
                if !row.is_empty() {
                    row.push_str(", ");
                }
                let _ = write!(row, "{}=", entry.name);
                if entry.float_count > 0 {
                    push_values(
                        &mut row,
                        (0..entry.float_count).map(|c| self.float(entry.float_offset + c, instance)),
                    );
                } else {
                    push_values(
                        &mut row,
                        (0..entry.int_count).map(|c| self.int(entry.int_offset + c, instance)),
                    );
                }
            }
            tracing::debug!(label, instance, "{row}");
        }
        start..end
    }

    fn check_compatible(&self, other: &ParticleBuffer) -> CoreResult<()> {
        if self.num_float_components == other.num_float_components
            && self.num_int_components == other.num_int_components
        {
            Ok(())
        } else {
            Err(CoreError::LayoutMismatch {
                src_floats: self.num_float_components,
                src_ints: self.num_int_components,
                dst_floats: other.num_float_components,
                dst_ints: other.num_int_components,
            })
        }
    }

    /// Instance currently holding persistent ID `id`.
    #[inline]
    #[must_use]
    pub fn id_to_index(&self, id: i32) -> Option<usize> {
        let slot = *self.id_to_index.get(usize::try_from(id).ok()?)?;
        usize::try_from(slot).ok()
    }

    /// The whole ID-to-index table ([`NO_INDEX`] marks unused IDs).
    #[must_use]
    pub fn id_table(&self) -> &[i32] {
        &self.id_to_index
    }

    /// Rebuilds the ID-to-index table from the ID index column.
    ///
    /// Returns the highest live ID, or `None` if the buffer is empty.
    pub(crate) fn rebuild_id_table(&mut self, id_component: usize, table_len: usize) -> Option<i32> {
        self.id_to_index.clear();
        self.id_to_index.resize(table_len, NO_INDEX);
        let mut max_live = None;
        for instance in 0..self.num_instances {
            let id = self.int(id_component, instance);
            if let Some(slot) = usize::try_from(id).ok().and_then(|i| self.id_to_index.get_mut(i)) {
                // Instance counts are bounded well below i32::MAX by the ID space.
                *slot = instance as i32;
                max_live = max_live.max(Some(id));
            }
        }
        max_live
    }

    /// Device columns, for GPU-resident buffers.
    #[must_use]
    pub fn device(&self) -> Option<&DeviceColumns> {
        self.device.as_ref()
    }

    /// Opaque offset into the external instance-count buffer, if GPU-resident.
    #[must_use]
    pub fn gpu_instance_count_offset(&self) -> Option<u32> {
        self.device.as_ref().map(DeviceColumns::instance_count_offset)
    }

    /// Assigns the opaque instance-count offset. Ignored for host buffers.
    pub fn set_gpu_instance_count_offset(&mut self, offset: u32) {
        if let Some(device) = self.device.as_mut() {
            device.set_instance_count_offset(offset);
        }
    }

    /// Copies the host columns to the device buffers. No-op for host buffers.
    pub fn upload_to_device(&self) {
        if let Some(device) = self.device.as_ref() {
            device.upload(self.float_bytes(), self.int_bytes());
        }
    }
}

/// Appends one value as-is, several as `[a, b, c]`.
fn push_values<T: std::fmt::Display>(row: &mut String, values: impl Iterator<Item = T>) {
    let values: Vec<T> = values.collect();
    if let [single] = values.as_slice() {
        let _ = write!(row, "{single}");
        return;
    }
    row.push('[');
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            row.push_str(", ");
        }
        let _ = write!(row, "{value}");
    }
    row.push(']');
}
