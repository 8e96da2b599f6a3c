//! # WGPU Device Backend
//!
//! Real device memory for GPU-resident datasets. Pass it to
//! `Residency::Device` and every buffer in the dataset mirrors its columns
//! into `wgpu` storage buffers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use plume_core::{DeviceBackend, DeviceBufferId};

use crate::error::{RenderError, RenderResult};

/// [`DeviceBackend`] over a `wgpu` device and queue.
#[derive(Debug)]
pub struct WgpuDeviceBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    buffers: Mutex<HashMap<u64, wgpu::Buffer>>,
    next_id: AtomicU64,
}

impl WgpuDeviceBackend {
    /// Wraps an existing device and queue.
    #[must_use]
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            buffers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Opens a device on any available adapter, without a surface.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::NoAdapter`] when no adapter is present and
    /// [`RenderError::RequestDevice`] when the adapter refuses a device.
    pub fn request_headless() -> RenderResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or(RenderError::NoAdapter)?;

        tracing::debug!(adapter = ?adapter.get_info().name, "using adapter for particle columns");

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Plume Particle Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
            },
            None,
        ))
        .map_err(|e| RenderError::RequestDevice(e.to_string()))?;

        Ok(Self::new(Arc::new(device), Arc::new(queue)))
    }

    /// The device buffers are created on.
    #[must_use]
    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    /// Runs `f` with the `wgpu` buffer behind `id`, for binding in a pass.
    pub fn with_buffer<R>(&self, id: DeviceBufferId, f: impl FnOnce(&wgpu::Buffer) -> R) -> Option<R> {
        self.buffers.lock().get(&id.0).map(f)
    }

    /// Number of buffers currently alive.
    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.buffers.lock().len()
    }
}

impl DeviceBackend for WgpuDeviceBackend {
    fn create_buffer(&self, label: &str, size_bytes: u64) -> DeviceBufferId {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: size_bytes,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.buffers.lock().insert(id, buffer);
        DeviceBufferId(id)
    }

    fn destroy_buffer(&self, id: DeviceBufferId) {
        if let Some(buffer) = self.buffers.lock().remove(&id.0) {
            buffer.destroy();
        }
    }

    fn write_buffer(&self, id: DeviceBufferId, offset: u64, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        if let Some(buffer) = self.buffers.lock().get(&id.0) {
            self.queue.write_buffer(buffer, offset, bytes);
        }
    }
}
