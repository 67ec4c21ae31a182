//! Error types for command encoding

use thiserror::Error;

/// Errors raised while building command bytes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Bulk transfer frame outside 1..=max bytes
    #[error("invalid frame length: {len} (must be 1..={max})")]
    InvalidFrameLength { len: usize, max: usize },

    /// Baud rate that cannot be expressed in the 16-bit BRG register
    #[error("baud rate {0} cannot be generated from the reference clock")]
    InvalidBaudRate(u32),
}

/// Result type for encoding operations
pub type CodecResult<T> = Result<T, CodecError>;
