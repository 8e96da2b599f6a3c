//! # Core Error Types
//!
//! Protocol misuse and configuration failures. Binding failures and lock
//! contention never show up here: they degrade to defaults and `false`.

use thiserror::Error;

/// Errors that can occur while driving a dataset or compiling a layout.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Two attributes in one layout share a name.
    #[error("duplicate attribute in layout: {0}")]
    DuplicateAttribute(String),

    /// `begin_simulate` was called while a destination buffer is checked out.
    #[error("simulate pass already in progress on dataset {0}")]
    AlreadySimulating(String),

    /// A destination-only operation was called outside a simulate pass.
    #[error("no simulate pass in progress on dataset {0}")]
    NotSimulating(String),

    /// `reset` or `release_buffers` was called while a destination is checked out.
    #[error("cannot reset dataset {0} while a simulate pass is in progress")]
    ResetWhileSimulating(String),

    /// Every buffer slot in the arena is either current or still being read.
    #[error("buffer pool exhausted: all {capacity} buffers are in use")]
    BufferPoolExhausted {
        /// Arena capacity.
        capacity: usize,
    },

    /// Two buffers with different component counts were asked to exchange rows.
    #[error(
        "component layout mismatch: {src_floats}f/{src_ints}i vs {dst_floats}f/{dst_ints}i"
    )]
    LayoutMismatch {
        /// Float components in the source.
        src_floats: usize,
        /// Int components in the source.
        src_ints: usize,
        /// Float components in the destination.
        dst_floats: usize,
        /// Int components in the destination.
        dst_ints: usize,
    },

    /// An instance range fell outside the source buffer.
    #[error("instance range {start}..{end} out of bounds for {len} instances")]
    RangeOutOfBounds {
        /// First instance of the range.
        start: usize,
        /// One past the last instance of the range.
        end: usize,
        /// Instances in the buffer.
        len: usize,
    },

    /// Invalid configuration file or values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
