//! # Plume Core
//!
//! Particle attribute storage shared between one simulation writer and any
//! number of render readers:
//! - Structure-of-arrays buffers with SIMD-aligned component columns
//! - Lock-free double (or triple, or more) buffering
//! - Typed accessors that never fail loudly
//!
//! ## Architecture Rules
//!
//! 1. **No mutex on the hot path** - readers and the writer meet through atomics
//! 2. **Never free what is being read** - reclamation waits for the last reader
//! 3. **Layouts are immutable** - component offsets are fixed at compile time
//!
//! ## Example
//!
//! ```rust,ignore
//! use plume_core::{Accessor, Dataset, DatasetConfig, Residency};
//!
//! let mut dataset = Dataset::new(&config, Residency::Host)?;
//! let position = Accessor::<[f32; 3]>::bind(dataset.layout(), "Position");
//!
//! dataset.begin_simulate()?;
//! dataset.allocate(100, false)?;
//! // ... write through `position.destination_writer(&mut dataset)` ...
//! dataset.end_simulate(true)?;
//!
//! // Render thread
//! let current = reader.current_data().unwrap();
//! let p = position.reader(&current).get_safe(0, [0.0; 3]);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod accessor;
pub mod buffer;
pub mod config;
pub mod dataset;
pub mod error;
pub mod layout;
pub mod memory;
pub mod sync;

pub use accessor::{Accessor, AttributeReader, AttributeValue, AttributeWriter};
pub use buffer::{
    DeviceBackend, DeviceBufferId, DeviceColumns, HostDeviceBackend, ParticleBuffer,
    COMPONENT_ALIGNMENT_BYTES, INDEFINITE_INSTANCE_COUNT_OFFSET, NO_INDEX,
};
pub use config::DatasetConfig;
pub use dataset::{Dataset, DatasetReader, ParticleId, Residency};
pub use error::{CoreError, CoreResult};
pub use layout::{
    AttributeDesc, AttributeType, ComponentLayout, ComponentLayoutEntry, PERSISTENT_ID_ATTRIBUTE,
};
pub use memory::{BufferArena, BufferHandle, BufferReadGuard, RetireAction, RetireList};
pub use sync::{SharedLifetime, WRITE_LOCKED};
