//! SPI sniffer stream decoder
//!
//! While sniffing, the device streams every captured byte pair as
//! `\` (0x5C), output byte, input byte. Anything outside a record is framing
//! noise (for example the `[`/`]` CS markers) and is dropped. Records may be
//! split across reads, so the decoder remembers how much of the current
//! record is still outstanding.

use std::fmt;

use crate::spi::SNIFF_ESCAPE;

/// Bytes decoded from one or more chunks of sniffer output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SniffCapture {
    /// Bytes driven by the bus master (MOSI)
    pub output: Vec<u8>,
    /// Bytes driven by the target (MISO)
    pub input: Vec<u8>,
}

impl SniffCapture {
    pub fn is_empty(&self) -> bool {
        self.output.is_empty() && self.input.is_empty()
    }
}

impl fmt::Display for SniffCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "out={} in={}",
            crate::hex_bytes(&self.output),
            crate::hex_bytes(&self.input)
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Pending {
    /// Between records
    #[default]
    Idle,
    /// Escape seen; both record bytes outstanding
    Output,
    /// Output byte consumed; input byte outstanding
    Input,
}

/// Stateful decoder for one sniffing session
#[derive(Debug, Clone, Default)]
pub struct SnifferDecoder {
    pending: Pending,
}

impl SnifferDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of record bytes still expected from the next chunk (0, 1 or 2)
    pub fn pending_bytes(&self) -> usize {
        match self.pending {
            Pending::Idle => 0,
            Pending::Output => 2,
            Pending::Input => 1,
        }
    }

    /// Decode one chunk, continuing any record left open by the previous one
    pub fn decode(&mut self, chunk: &[u8]) -> SniffCapture {
        let mut capture = SniffCapture::default();
        for &byte in chunk {
            self.pending = match self.pending {
                Pending::Idle if byte == SNIFF_ESCAPE => Pending::Output,
                Pending::Idle => Pending::Idle,
                Pending::Output => {
                    capture.output.push(byte);
                    Pending::Input
                }
                Pending::Input => {
                    capture.input.push(byte);
                    Pending::Idle
                }
            };
        }
        capture
    }

    /// Forget any partially received record
    pub fn reset(&mut self) {
        self.pending = Pending::Idle;
    }
}
