//! # Device Residency
//!
//! GPU-resident datasets mirror their float and int columns into device
//! buffers. The core never talks to a graphics API directly: it goes through
//! [`DeviceBackend`], chosen once when the dataset is created.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Instance-count offset of a buffer that has not been assigned a slot in the
/// indirect-draw count buffer.
pub const INDEFINITE_INSTANCE_COUNT_OFFSET: u32 = u32::MAX;

/// Opaque handle to a buffer owned by a [`DeviceBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceBufferId(pub u64);

/// Allocates and fills device memory for particle columns.
pub trait DeviceBackend: Send + Sync + fmt::Debug {
    /// Creates a buffer of `size_bytes` bytes.
    fn create_buffer(&self, label: &str, size_bytes: u64) -> DeviceBufferId;

    /// Destroys a buffer. Unknown ids are ignored.
    fn destroy_buffer(&self, id: DeviceBufferId);

    /// Writes `bytes` into a buffer starting at `offset`.
    fn write_buffer(&self, id: DeviceBufferId, offset: u64, bytes: &[u8]);
}

/// Device-side counterpart of a particle buffer's columns.
#[derive(Debug)]
pub struct DeviceColumns {
    backend: Arc<dyn DeviceBackend>,
    float_buffer: Option<DeviceBufferId>,
    int_buffer: Option<DeviceBufferId>,
    float_bytes: u64,
    int_bytes: u64,
    instance_count_offset: u32,
}

impl DeviceColumns {
    pub(crate) fn new(backend: Arc<dyn DeviceBackend>) -> Self {
        Self {
            backend,
            float_buffer: None,
            int_buffer: None,
            float_bytes: 0,
            int_bytes: 0,
            instance_count_offset: INDEFINITE_INSTANCE_COUNT_OFFSET,
        }
    }

    /// Re-creates the device buffers when the host columns change size.
    pub(crate) fn resize(&mut self, float_bytes: u64, int_bytes: u64) {
        if float_bytes != self.float_bytes {
            Self::recreate(
                self.backend.as_ref(),
                &mut self.float_buffer,
                "plume.particles.float",
                float_bytes,
            );
            self.float_bytes = float_bytes;
        }
        if int_bytes != self.int_bytes {
            Self::recreate(
                self.backend.as_ref(),
                &mut self.int_buffer,
                "plume.particles.int",
                int_bytes,
            );
            self.int_bytes = int_bytes;
        }
    }

    fn recreate(
        backend: &dyn DeviceBackend,
        slot: &mut Option<DeviceBufferId>,
        label: &str,
        size_bytes: u64,
    ) {
        if let Some(old) = slot.take() {
            backend.destroy_buffer(old);
        }
        if size_bytes > 0 {
            *slot = Some(backend.create_buffer(label, size_bytes));
            tracing::debug!(label, size_bytes, "allocated device column");
        }
    }

    /// Copies the host columns into the device buffers.
    pub(crate) fn upload(&self, float_bytes: &[u8], int_bytes: &[u8]) {
        if let Some(id) = self.float_buffer {
            self.backend.write_buffer(id, 0, float_bytes);
        }
        if let Some(id) = self.int_buffer {
            self.backend.write_buffer(id, 0, int_bytes);
        }
    }

    /// Destroys both device buffers.
    pub(crate) fn release(&mut self) {
        self.resize(0, 0);
    }

    /// Device buffer holding the float columns, if any were allocated.
    #[must_use]
    pub fn float_buffer(&self) -> Option<DeviceBufferId> {
        self.float_buffer
    }

    /// Device buffer holding the int columns, if any were allocated.
    #[must_use]
    pub fn int_buffer(&self) -> Option<DeviceBufferId> {
        self.int_buffer
    }

    /// Size of the float device buffer in bytes.
    #[must_use]
    pub fn float_bytes(&self) -> u64 {
        self.float_bytes
    }

    /// Size of the int device buffer in bytes.
    #[must_use]
    pub fn int_bytes(&self) -> u64 {
        self.int_bytes
    }

    /// Opaque offset into the external instance-count buffer.
    #[must_use]
    pub fn instance_count_offset(&self) -> u32 {
        self.instance_count_offset
    }

    pub(crate) fn set_instance_count_offset(&mut self, offset: u32) {
        self.instance_count_offset = offset;
    }
}

impl Drop for DeviceColumns {
    fn drop(&mut self) {
        self.release();
    }
}

/// Device backend that keeps "device" buffers in host memory.
///
/// Used for headless runs and to verify upload contents.
#[derive(Debug, Default)]
pub struct HostDeviceBackend {
    buffers: Mutex<HashMap<u64, Vec<u8>>>,
    next_id: AtomicU64,
}

impl HostDeviceBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of a buffer's contents.
    #[must_use]
    pub fn read_buffer(&self, id: DeviceBufferId) -> Option<Vec<u8>> {
        self.buffers.lock().get(&id.0).cloned()
    }

    /// Number of buffers currently alive.
    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.buffers.lock().len()
    }
}

impl DeviceBackend for HostDeviceBackend {
    fn create_buffer(&self, _label: &str, size_bytes: u64) -> DeviceBufferId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let len = usize::try_from(size_bytes).unwrap_or(usize::MAX);
        self.buffers.lock().insert(id, vec![0; len]);
        DeviceBufferId(id)
    }

    fn destroy_buffer(&self, id: DeviceBufferId) {
        self.buffers.lock().remove(&id.0);
    }

    fn write_buffer(&self, id: DeviceBufferId, offset: u64, bytes: &[u8]) {
        let mut buffers = self.buffers.lock();
        let Some(buffer) = buffers.get_mut(&id.0) else {
            return;
        };
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        let end = start.saturating_add(bytes.len());
        assert!(end <= buffer.len(), "device write past end of buffer");
        buffer[start..end].copy_from_slice(bytes);
    }
}
