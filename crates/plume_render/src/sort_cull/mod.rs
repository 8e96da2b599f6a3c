//! Per-view sorting and culling of particle buffers.
//!
//! Keys and digit order match the GPU compute sort, so a view can move
//! between CPU and GPU sorting without its draw order changing.

mod engine;
pub mod keys;
pub mod radix;
mod request;

pub use engine::{
    SortCullConfig, SortCullEngine, SortCullResult, SortPath, DEFAULT_RADIX_SORT_THRESHOLD,
};
pub use radix::SortEntry;
pub use request::{
    AttributeMatch, DistanceBand, DistanceSource, SortCullRequest, SortMode,
    DEFAULT_POSITION_ATTRIBUTE,
};
