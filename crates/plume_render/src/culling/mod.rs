//! Culling primitives shared by the sort/cull engine.

mod frustum;

pub use frustum::{Frustum, Plane, MAX_CULL_PLANES};
