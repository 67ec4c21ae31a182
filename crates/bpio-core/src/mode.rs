//! Mode descriptors
//!
//! Each binary sub-mode is entered by writing one id byte while in bitbang
//! mode; the device answers with a short ASCII version string.

use std::fmt;

/// Identity of a binary mode: the byte that selects it and the string that
/// acknowledges it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModeDescriptor {
    /// Command byte written to enter the mode
    pub id: u8,
    /// Short name used in logs and events
    pub name: &'static str,
    /// Acknowledgment string returned by the device
    pub ack: &'static [u8],
}

impl ModeDescriptor {
    /// Raw binary bitbang mode (`BBIO1`)
    pub const BITBANG: ModeDescriptor = ModeDescriptor {
        id: 0x00,
        name: "bitbang",
        ack: b"BBIO1",
    };

    /// Binary SPI mode (`SPI1`)
    pub const SPI: ModeDescriptor = ModeDescriptor {
        id: 0x01,
        name: "spi",
        ack: b"SPI1",
    };

    /// Binary UART mode (`ART1`)
    pub const UART: ModeDescriptor = ModeDescriptor {
        id: 0x03,
        name: "uart",
        ack: b"ART1",
    };

    /// Acknowledgment as text (all acks are ASCII)
    pub fn ack_str(&self) -> &'static str {
        std::str::from_utf8(self.ack).unwrap_or("")
    }
}

impl fmt::Display for ModeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
