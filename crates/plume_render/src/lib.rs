//! # Plume Render
//!
//! Render-side consumers of published particle buffers:
//! - Per-view cull and sort into a draw index list
//! - Frustum planes for view culling
//! - `wgpu` device memory for GPU-resident datasets
//!
//! ## Architecture
//!
//! ```text
//! Dataset::end_simulate ──► current buffer (read guard)
//!                                 │
//!           ┌─────────────────────┼─────────────────────┐
//!           ▼                     ▼                     ▼
//!     build_indices         build_indices         build_indices
//!       (view 0)              (view 1)              (shadow)
//!           ▼                     ▼                     ▼
//!     draw indices          draw indices          draw indices
//! ```
//!
//! ## Mandate
//!
//! - Never write the source buffer
//! - CPU and GPU sorts agree bit for bit on key order
//! - A missing attribute disables a predicate, never a frame

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod culling;
pub mod error;
pub mod gpu;
pub mod sort_cull;

pub use culling::{Frustum, Plane, MAX_CULL_PLANES};
pub use error::{RenderError, RenderResult};
pub use gpu::WgpuDeviceBackend;
pub use sort_cull::{
    DistanceBand, SortCullConfig, SortCullEngine, SortCullRequest, SortCullResult, SortMode,
    SortPath,
};
