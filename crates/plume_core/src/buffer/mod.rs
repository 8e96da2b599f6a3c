//! # Particle Buffers
//!
//! Per-frame structure-of-arrays storage, optionally mirrored on the GPU.

mod device;
mod particle_buffer;

pub use device::{
    DeviceBackend, DeviceBufferId, DeviceColumns, HostDeviceBackend,
    INDEFINITE_INSTANCE_COUNT_OFFSET,
};
pub use particle_buffer::{ParticleBuffer, COMPONENT_ALIGNMENT_BYTES, NO_INDEX};
