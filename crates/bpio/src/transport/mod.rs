//! Transport layer for the Bus Pirate link
//!
//! This module provides transports for reaching the device:
//! - Serial adapter for the USB serial port (feature `serial`)
//! - Mock adapter backed by a simulated device, for testing
//!
//! # Example
//!
//! ```ignore
//! use bpio::transport::{create_transport, Transport};
//! use bpio::config::TransportConfig;
//!
//! let config = TransportConfig::Mock(Default::default());
//! let transport = create_transport(&config)?;
//! transport.open().await?;
//! transport.write(&[0x00]).await?;
//! ```

mod adapter;
pub mod error;
pub mod mock;

#[cfg(feature = "serial")]
pub mod serial;

pub use adapter::{InboundChunk, Transport};
pub use error::TransportError;

use std::sync::Arc;

use crate::config::TransportConfig;

/// Create a transport based on configuration
pub fn create_transport(config: &TransportConfig) -> Result<Arc<dyn Transport>, TransportError> {
    match config {
        #[cfg(feature = "serial")]
        TransportConfig::Serial(cfg) => Ok(Arc::new(serial::SerialTransport::new(cfg))),
        #[cfg(not(feature = "serial"))]
        TransportConfig::Serial(_) => Err(TransportError::Unsupported(
            "Serial ports require the 'serial' feature".to_string(),
        )),
        TransportConfig::Mock(cfg) => Ok(Arc::new(mock::MockTransport::new(cfg))),
    }
}
