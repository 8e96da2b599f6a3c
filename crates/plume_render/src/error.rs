//! # Render Error Types
//!
//! Sort/cull itself never fails; these cover configuration and device setup.

use thiserror::Error;

/// Errors raised while configuring the render side.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Invalid configuration file or values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No graphics adapter matched the request.
    #[error("no suitable graphics adapter found")]
    NoAdapter,

    /// The adapter refused to create a device.
    #[error("device request failed: {0}")]
    RequestDevice(String),
}

/// Result type for render operations.
pub type RenderResult<T> = Result<T, RenderError>;
