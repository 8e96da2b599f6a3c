//! # Memory Management
//!
//! Buffer slots shared between the simulation writer and render readers.
//!
//! ## Design Philosophy
//!
//! Slots are created once per dataset. During simulation:
//! - No slot is freed while a reader holds it
//! - Reclamation is deferred to the writer's next safe point
//! - Epochs tell readers whether a slot has been recycled

mod arena;

pub use arena::{BufferArena, BufferHandle, BufferReadGuard, RetireAction, RetireList};
