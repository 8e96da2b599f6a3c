//! # Synchronization Primitives
//!
//! No locks on the hot path. One writer, many readers.
//!
//! ## The Problem
//!
//! ```text
//! Simulation thread:  WRITE frame N+1
//! Render thread:      READ frame N (possibly N-1)
//!
//! Without coordination: torn frames, use-after-free
//! With Mutex:           render stalls behind simulation
//! ```
//!
//! ## The Solution: Atomic Lifetimes
//!
//! ```text
//! counter == 0       buffer free, writer may lock it
//! counter == 1..     readers present, contents frozen
//! counter == MAX     writer owns it, readers back off
//! ```
//!
//! Zero locks. Failures are reported, never waited on.

mod lifetime;

pub use lifetime::{SharedLifetime, WRITE_LOCKED};
