//! Engine errors
//!
//! Nothing here is fatal: every error is returned to the caller of the
//! operation that hit it, and the caller decides whether to retry.

use bpio_core::CodecError;
use thiserror::Error;

use crate::matcher::WaitError;
use crate::transport::TransportError;

/// Errors reported by the protocol engine
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BpioError {
    /// Failure bubbled up unchanged from the transport
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// No acknowledgment while entering binary mode or a sub-mode
    #[error("Timeout entering {mode} mode (expected {ack:?})")]
    ModeSwitchTimeout { mode: &'static str, ack: &'static str },

    /// A command's acknowledgment did not arrive in time
    #[error("Timeout waiting for acknowledgment of command 0x{command:02X}")]
    AckTimeout { command: u8 },

    /// Payload exceeds what one command can carry
    #[error("Payload of {len} bytes exceeds the {max}-byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    /// Operation invoked in a state that does not allow it
    #[error("Precondition not met: {0}")]
    PreconditionNotMet(String),

    /// A wait was cancelled before it resolved
    #[error("Wait cancelled")]
    Cancelled,

    #[error("Encoding error: {0}")]
    Codec(#[from] CodecError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for engine operations
pub type BpioResult<T> = Result<T, BpioError>;

impl BpioError {
    /// Map a failed acknowledgment wait for `command`
    pub(crate) fn from_ack_wait(command: u8, err: WaitError) -> Self {
        match err {
            WaitError::Timeout => BpioError::AckTimeout { command },
            WaitError::Cancelled => BpioError::Cancelled,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            BpioError::AckTimeout { .. } | BpioError::ModeSwitchTimeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_wait_conversion() {
        let err = BpioError::from_ack_wait(0x62, WaitError::Timeout);
        assert_eq!(err, BpioError::AckTimeout { command: 0x62 });
        assert!(err.is_timeout());
        assert_eq!(
            err.to_string(),
            "Timeout waiting for acknowledgment of command 0x62"
        );

        let err = BpioError::from_ack_wait(0x62, WaitError::Cancelled);
        assert_eq!(err, BpioError::Cancelled);
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_transport_error_passes_through() {
        let err: BpioError = TransportError::ConnectionClosed.into();
        assert_eq!(err, BpioError::Transport(TransportError::ConnectionClosed));
        assert_eq!(err.to_string(), "Transport error: Connection closed");
    }
}
