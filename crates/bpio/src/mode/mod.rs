//! Mode control for the Bus Pirate binary protocol
//!
//! This module handles the console reset, binary mode entry and the
//! sub-mode handshakes (`SPI1`, `ART1`).

mod controller;

pub use controller::ModeController;

use bpio_core::ModeDescriptor;

/// Where the device is believed to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeState {
    /// Nothing known yet (initial, and after close)
    Unknown,
    /// Console reset written, binary mode not yet confirmed
    ConsoleReset,
    /// Raw bitbang mode (`BBIO1` received)
    Binmode,
    /// A binary sub-mode is active
    Active(ModeDescriptor),
    /// UART transparent bridge; only a power cycle leaves it
    Bridge,
}

impl Default for ModeState {
    fn default() -> Self {
        Self::Unknown
    }
}

impl ModeState {
    /// The active sub-mode, if any
    pub fn active(&self) -> Option<ModeDescriptor> {
        match self {
            ModeState::Active(mode) => Some(*mode),
            _ => None,
        }
    }
}

/// Device state owned by the mode controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceState {
    pub mode: ModeState,
    /// Whether the transport has been opened through the controller
    pub open: bool,
}

/// Mode notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeEvent {
    /// Binary mode reached after connecting
    Connected,
    /// Mode state transition
    Changed { from: ModeState, to: ModeState },
    /// Link closed
    Closed,
}
