//! Mock transport backed by a simulated Bus Pirate
//!
//! The simulator implements enough of the binary protocol to exercise the
//! engine end to end: console → bitbang entry, SPI (bulk transfers, chip
//! select, sniffer) and UART (bulk writes, echo, custom baud, bridge). Every
//! `write` call is answered with at most one inbound chunk holding the
//! concatenated replies, the way a USB serial adapter usually batches them.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bpio_core::{console, ModeDescriptor, ACK};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::{InboundChunk, Transport, TransportError};
use crate::config::MockConfig;

/// Reply for an unknown command
const NAK: u8 = 0x00;

type SpiReply = Arc<dyn Fn(u8) -> u8 + Send + Sync>;

/// Mode of the simulated device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedMode {
    Console,
    Bitbang,
    Spi,
    Uart,
    Bridge,
}

/// Bytes the device will treat as data rather than commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Owed {
    None,
    SpiData(usize),
    UartData(usize),
    BrgBytes(usize),
}

struct SimulatedDevice {
    mode: SimulatedMode,
    sniffing: bool,
    owed: Owed,
    spi_reply: SpiReply,
}

impl SimulatedDevice {
    fn new() -> Self {
        Self {
            mode: SimulatedMode::Console,
            sniffing: false,
            owed: Owed::None,
            spi_reply: Arc::new(|b| b),
        }
    }

    fn enter_bitbang(&mut self, out: &mut Vec<u8>) {
        self.mode = SimulatedMode::Bitbang;
        self.sniffing = false;
        self.owed = Owed::None;
        out.extend_from_slice(ModeDescriptor::BITBANG.ack);
    }

    fn process(&mut self, byte: u8, out: &mut Vec<u8>) {
        match self.mode {
            SimulatedMode::Console => {
                if byte == console::BINMODE_ENTRY {
                    self.enter_bitbang(out);
                }
            }
            SimulatedMode::Bitbang => match byte {
                0x00 => self.enter_bitbang(out),
                0x01 => {
                    self.mode = SimulatedMode::Spi;
                    out.extend_from_slice(ModeDescriptor::SPI.ack);
                }
                0x03 => {
                    self.mode = SimulatedMode::Uart;
                    out.extend_from_slice(ModeDescriptor::UART.ack);
                }
                0x0F => {
                    self.mode = SimulatedMode::Console;
                    out.push(ACK);
                }
                _ => {}
            },
            SimulatedMode::Spi => self.process_spi(byte, out),
            SimulatedMode::Uart => self.process_uart(byte, out),
            SimulatedMode::Bridge => {}
        }
    }

    fn process_spi(&mut self, byte: u8, out: &mut Vec<u8>) {
        if let Owed::SpiData(n) = self.owed {
            out.push((self.spi_reply)(byte));
            self.owed = if n > 1 { Owed::SpiData(n - 1) } else { Owed::None };
            return;
        }
        if self.sniffing {
            // Any byte leaves the sniffer
            self.sniffing = false;
            out.push(ACK);
            return;
        }
        match byte {
            0x00 => self.enter_bitbang(out),
            0x01 => out.extend_from_slice(ModeDescriptor::SPI.ack),
            0x02 | 0x03 | 0x40..=0x4F | 0x60..=0x67 | 0x80..=0x8F => out.push(ACK),
            0x0D..=0x0F => {
                self.sniffing = true;
                out.push(ACK);
            }
            0x10..=0x1F => {
                self.owed = Owed::SpiData((byte & 0x0F) as usize + 1);
                out.push(ACK);
            }
            _ => out.push(NAK),
        }
    }

    fn process_uart(&mut self, byte: u8, out: &mut Vec<u8>) {
        match self.owed {
            Owed::UartData(n) => {
                out.push(ACK);
                self.owed = if n > 1 { Owed::UartData(n - 1) } else { Owed::None };
                return;
            }
            Owed::BrgBytes(n) => {
                out.push(ACK);
                self.owed = if n > 1 { Owed::BrgBytes(n - 1) } else { Owed::None };
                return;
            }
            _ => {}
        }
        match byte {
            0x00 => self.enter_bitbang(out),
            0x01 => out.extend_from_slice(ModeDescriptor::UART.ack),
            0x02 | 0x03 | 0x40..=0x4F | 0x60..=0x69 | 0x80..=0x9F => out.push(ACK),
            0x07 => {
                self.owed = Owed::BrgBytes(2);
                out.push(ACK);
            }
            0x0F => self.mode = SimulatedMode::Bridge,
            0x10..=0x1F => {
                self.owed = Owed::UartData((byte & 0x0F) as usize + 1);
                out.push(ACK);
            }
            _ => out.push(NAK),
        }
    }
}

/// Mock transport for testing
pub struct MockTransport {
    config: MockConfig,
    open: AtomicBool,
    muted: AtomicBool,
    incoming_tx: broadcast::Sender<InboundChunk>,
    device: Mutex<SimulatedDevice>,
    /// Every write, in order
    writes: Mutex<Vec<Vec<u8>>>,
    /// Command bytes whose replies are swallowed
    silent: Mutex<HashSet<u8>>,
}

impl MockTransport {
    pub fn new(config: &MockConfig) -> Self {
        let (incoming_tx, _) = broadcast::channel(256);
        Self {
            config: config.clone(),
            open: AtomicBool::new(true),
            muted: AtomicBool::new(false),
            incoming_tx,
            device: Mutex::new(SimulatedDevice::new()),
            writes: Mutex::new(Vec::new()),
            silent: Mutex::new(HashSet::new()),
        }
    }

    /// Inject inbound bytes (simulates unsolicited device output)
    pub fn inject(&self, data: impl Into<bytes::Bytes>) {
        let _ = self.incoming_tx.send(InboundChunk::new(data));
    }

    /// Stop answering writes (device unplugged or hung)
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }

    /// Swallow the replies to writes that start with one of `commands`
    pub fn set_silent_commands(&self, commands: &[u8]) {
        *self.silent.lock() = commands.iter().copied().collect();
    }

    /// Replace the target's SPI response function (default: loopback)
    pub fn set_spi_reply(&self, reply: impl Fn(u8) -> u8 + Send + Sync + 'static) {
        self.device.lock().spi_reply = Arc::new(reply);
    }

    /// All bytes written so far, flattened
    pub fn written(&self) -> Vec<u8> {
        self.writes.lock().concat()
    }

    /// All writes so far, one entry per `write` call
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().clone()
    }

    pub fn clear_written(&self) {
        self.writes.lock().clear();
    }

    /// Current mode of the simulated device
    pub fn device_mode(&self) -> SimulatedMode {
        self.device.lock().mode
    }

    /// Whether the simulated device is streaming sniffer data
    pub fn device_sniffing(&self) -> bool {
        self.device.lock().sniffing
    }

    fn respond(&self, bytes: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut device = self.device.lock();
        for &byte in bytes {
            device.process(byte, &mut out);
        }
        out
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self) -> Result<(), TransportError> {
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), TransportError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        self.writes.lock().push(bytes.to_vec());
        tracing::debug!(bytes = %bpio_core::hex_bytes(bytes), "Mock transport: write");

        let reply = self.respond(bytes);
        let silenced = bytes
            .first()
            .is_some_and(|b| self.silent.lock().contains(b));
        if reply.is_empty() || silenced || self.muted.load(Ordering::SeqCst) {
            return Ok(());
        }

        if self.config.latency_ms > 0 {
            let tx = self.incoming_tx.clone();
            let latency = Duration::from_millis(self.config.latency_ms);
            tokio::spawn(async move {
                tokio::time::sleep(latency).await;
                let _ = tx.send(InboundChunk::new(reply));
            });
        } else {
            let _ = self.incoming_tx.send(InboundChunk::new(reply));
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<InboundChunk> {
        self.incoming_tx.subscribe()
    }

    async fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
