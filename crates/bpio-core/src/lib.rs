//! bpio-core - Bus Pirate binary protocol encoding
//!
//! Pure, synchronous building blocks of the Bus Pirate binary protocol:
//! protocol constants, mode descriptors, sub-mode settings and the
//! functions that pack them into command bytes, plus the decoder for the
//! SPI sniffer's escaped dual-channel stream.
//!
//! Nothing in this crate touches a transport; the `bpio` crate drives these
//! encoders over a serial link.
//!
//! # Quick Start
//!
//! ```rust
//! use bpio_core::spi::{self, SpiOptions, SpiSettings, SpiSpeed};
//!
//! let settings = SpiSettings::from_options(&SpiOptions {
//!     speed_khz: Some(250),
//!     ..Default::default()
//! });
//! assert_eq!(settings.speed, SpiSpeed::Khz250);
//! assert_eq!(spi::speed_command(&settings), 0x62);
//! assert_eq!(spi::config_command(&settings), 0x8A);
//! ```
//!
//! # Command Bytes
//!
//! | Command | SPI | UART |
//! |---------|-----|------|
//! | Enter mode (from bitbang) | `0x01` / `SPI1` | `0x03` / `ART1` |
//! | Speed / baud | `0x60..=0x67` | `0x60..=0x69` |
//! | Configuration | `0b1000wxyz` | `0b100wxxyz` |
//! | Bulk transfer | `0x10 + len-1` | `0x10 + len-1` |
//! | Peripherals | `0b0100wxyz` | `0b0100wxyz` |

pub mod error;
pub mod mode;
pub mod periph;
pub mod sniffer;
pub mod spi;
pub mod types;
pub mod uart;

pub use error::{CodecError, CodecResult};
pub use mode::ModeDescriptor;
pub use periph::Peripherals;
pub use sniffer::{SniffCapture, SnifferDecoder};
pub use types::PinOutput;

/// Largest payload carried by one bulk transfer command
pub const MAX_FRAME_LEN: usize = 16;

/// Generic single-byte acknowledgment returned for most commands
pub const ACK: u8 = 0x01;

/// Bytes written to leave the text console and reach binary mode
pub mod console {
    /// Newline sent to escape any menu or prompt in progress
    pub const ENTER: u8 = 0x0D;
    /// Number of newlines sent before the reset byte
    pub const ENTER_COUNT: usize = 10;
    /// Console reset command (`#`)
    pub const RESET: u8 = b'#';
    /// Binary mode entry byte, also "return to bitbang" from any sub-mode
    pub const BINMODE_ENTRY: u8 = 0x00;
}

/// Build the length-coded bulk transfer command for a frame of `len` bytes
///
/// Returns an error for empty frames and frames longer than
/// [`MAX_FRAME_LEN`].
pub fn bulk_command(len: usize) -> CodecResult<u8> {
    if len == 0 || len > MAX_FRAME_LEN {
        return Err(CodecError::InvalidFrameLength {
            len,
            max: MAX_FRAME_LEN,
        });
    }
    Ok(0x10 + (len as u8 - 1))
}

/// Render bytes as uppercase hex for log fields
pub fn hex_bytes(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::mode::ModeDescriptor;
    pub use crate::sniffer::{SniffCapture, SnifferDecoder};
    pub use crate::spi::{SpiOptions, SpiSettings};
    pub use crate::uart::{UartOptions, UartSettings};
    pub use crate::{CodecError, CodecResult};
}
