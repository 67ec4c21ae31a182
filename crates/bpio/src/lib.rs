//! bpio - Bus Pirate binary protocol engine
//!
//! This crate drives a Bus Pirate over a byte-stream transport: it enters
//! binary mode, switches between the SPI and UART sub-modes, configures
//! them and runs transfers, matching each command against the device's
//! acknowledgments.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         BusPirate                            │
//! │                                                             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐ │
//! │  │ SpiSession  │  │ UartSession │  │ BpioConfig          │ │
//! │  │ (settings)  │  │ (settings)  │  │ (defaults/timeouts) │ │
//! │  └──────┬──────┘  └──────┬──────┘  └─────────────────────┘ │
//! │         └───────┬────────┘                                  │
//! │          ┌──────┴───────┐                                   │
//! │          │ModeController│                                   │
//! │          │ (handshakes) │                                   │
//! │          └──────┬───────┘                                   │
//! │          ┌──────┴───────┐     ┌──────────────────┐          │
//! │          │     Link     │─────│ ResponseMatcher  │          │
//! │          │ (pump, lock) │     │ (FIFO waiters)   │          │
//! │          └──────┬───────┘     └──────────────────┘          │
//! │        ┌────────┴────────┐                                  │
//! │        │    Transport    │                                  │
//! │        │ (serial/mock)   │                                  │
//! │        └─────────────────┘                                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Command encoding and the sniffer decoder live in `bpio-core`.

pub mod config;
pub mod error;
pub mod link;
pub mod matcher;
pub mod mode;
pub mod pirate;
pub mod session;
pub mod transport;

pub use config::BpioConfig;
pub use error::{BpioError, BpioResult};
pub use link::{Link, LinkEvent, PendingResponse};
pub use matcher::{ResponseMatcher, WaitError, WaitHandle};
pub use mode::{DeviceState, ModeController, ModeEvent, ModeState};
pub use pirate::BusPirate;
pub use session::{SpiEvent, SpiSession, UartEvent, UartSession};
pub use transport::{create_transport, InboundChunk, Transport, TransportError};

// Re-export for convenience
pub use bpio_core::{
    spi::{SniffMode, SpiOptions, SpiSettings},
    uart::{UartOptions, UartSettings},
    ModeDescriptor, Peripherals, PinOutput, SniffCapture,
};
