//! Error types for figrender.

use thiserror::Error;

/// Result type alias using RenderError.
pub type RenderResult<T> = Result<T, RenderError>;

/// Errors that can occur while rendering.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Invalid canvas dimensions (must be positive and within limits).
    #[error("invalid dimensions: width={width}, height={height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// Caller error: malformed input, mismatched handle, or an
    /// unrecognized named option. Fatal to the call.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Failed to parse a color specification.
    #[error("failed to parse color: {0}")]
    ColorParse(String),

    /// Operation not meaningful for the current device type, with no
    /// safe fallback.
    #[error("{operation} is not supported by this device")]
    UnsupportedTarget { operation: &'static str },
}
