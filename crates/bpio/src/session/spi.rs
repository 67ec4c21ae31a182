//! SPI session

use std::sync::Arc;

use bpio_core::spi::{self, SniffMode, SpiOptions, SpiSettings};
use bpio_core::{bulk_command, hex_bytes, ModeDescriptor, Peripherals, SniffCapture, MAX_FRAME_LEN};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{configure_peripherals_locked, require_started};
use crate::error::{BpioError, BpioResult};
use crate::link::LinkEvent;
use crate::mode::ModeController;

const SPI: ModeDescriptor = ModeDescriptor::SPI;

/// Fill byte clocked out by [`SpiSession::read`]
const READ_FILL: u8 = 0xFF;

/// SPI notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpiEvent {
    /// Configuration applied
    Ready(SpiSettings),
    /// Sniffer mode changed
    SniffMode(SniffMode),
    /// Bytes captured by the sniffer
    Sniff(SniffCapture),
}

#[derive(Debug, Default)]
struct SpiState {
    started: bool,
    settings: SpiSettings,
    sniff: SniffMode,
}

/// Binary SPI mode session
pub struct SpiSession {
    modes: Arc<ModeController>,
    state: RwLock<SpiState>,
    event_tx: broadcast::Sender<SpiEvent>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl SpiSession {
    /// Create a session; must be called from within a Tokio runtime
    pub fn new(modes: Arc<ModeController>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let forwarder = tokio::spawn(forward_sniffer(
            modes.link().subscribe(),
            event_tx.clone(),
        ));
        Self {
            modes,
            state: RwLock::new(SpiState::default()),
            event_tx,
            forwarder: Mutex::new(Some(forwarder)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SpiEvent> {
        self.event_tx.subscribe()
    }

    /// Settings applied by the last successful configuration
    pub fn settings(&self) -> SpiSettings {
        self.state.read().settings
    }

    /// Started, and the device is still in SPI mode
    pub fn is_started(&self) -> bool {
        self.state.read().started && self.modes.is_active(SPI)
    }

    pub fn sniff_mode(&self) -> SniffMode {
        if self.modes.link().is_sniffing() {
            self.state.read().sniff
        } else {
            SniffMode::Off
        }
    }

    /// Enter SPI mode and apply `options`
    pub async fn start(&self, options: &SpiOptions) -> BpioResult<SpiSettings> {
        let _guard = self.modes.link().lock().await;
        self.start_locked(options).await
    }

    /// Apply `options` over the defaults, starting the session first if needed
    pub async fn setopts(&self, options: &SpiOptions) -> BpioResult<SpiSettings> {
        let _guard = self.modes.link().lock().await;
        if self.is_started() {
            self.setopts_locked(options).await
        } else {
            self.start_locked(options).await
        }
    }

    async fn start_locked(&self, options: &SpiOptions) -> BpioResult<SpiSettings> {
        self.modes
            .switch_mode_locked(SPI, self.modes.timeouts().mode_switch())
            .await?;
        {
            let mut state = self.state.write();
            state.started = true;
            state.sniff = SniffMode::Off;
        }
        self.setopts_locked(options).await
    }

    async fn setopts_locked(&self, options: &SpiOptions) -> BpioResult<SpiSettings> {
        let settings = SpiSettings::from_options(options);
        let link = self.modes.link();
        let timeout = self.modes.timeouts().ack();

        let speed = link.command(spi::speed_command(&settings), timeout).await;
        let config = link.command(spi::config_command(&settings), timeout).await;
        speed.and(config)?;

        self.state.write().settings = settings;
        info!(?settings, "SPI ready");
        let _ = self.event_tx.send(SpiEvent::Ready(settings));
        Ok(settings)
    }

    /// Drive chip select to the logical state `enable`
    pub async fn set_cs(&self, enable: bool) -> BpioResult<()> {
        let _guard = self.modes.link().lock().await;
        self.require_started()?;
        self.set_cs_locked(enable).await
    }

    async fn set_cs_locked(&self, enable: bool) -> BpioResult<()> {
        let command = spi::cs_command(enable, self.settings().cs_polarity);
        self.modes
            .link()
            .command(command, self.modes.timeouts().ack())
            .await
    }

    /// Full-duplex transfer; returns one byte read per byte written
    ///
    /// Payloads longer than one frame are split, with chip select held
    /// across all frames whatever `skip_cs` says. For a single frame
    /// `skip_cs` leaves chip select alone.
    pub async fn write_read(&self, bytes: &[u8], skip_cs: bool) -> BpioResult<Vec<u8>> {
        if bytes.is_empty() {
            return Ok(Vec::new());
        }

        let _guard = self.modes.link().lock().await;
        self.require_started()?;

        let frame_cs = bytes.len() > MAX_FRAME_LEN || !skip_cs;
        if frame_cs {
            self.set_cs_locked(true).await?;
        }

        let outcome = self.transfer_locked(bytes).await;

        if !frame_cs {
            return outcome;
        }
        let release = self.set_cs_locked(false).await;
        let read = outcome?;
        release?;
        Ok(read)
    }

    /// Clock out `len` fill bytes and return what the target sent back
    pub async fn read(&self, len: usize) -> BpioResult<Vec<u8>> {
        self.write_read(&vec![READ_FILL; len], false).await
    }

    async fn transfer_locked(&self, bytes: &[u8]) -> BpioResult<Vec<u8>> {
        let link = self.modes.link();
        let timeout = self.modes.timeouts().ack();
        let mut read = Vec::with_capacity(bytes.len());

        for frame in bytes.chunks(MAX_FRAME_LEN) {
            let command = bulk_command(frame.len())?;
            link.command(command, timeout).await?;

            for &byte in frame {
                let reply = link
                    .write_and_wait(&[byte], Vec::new(), timeout)
                    .await?
                    .map_err(|e| BpioError::from_ack_wait(byte, e))?;
                // Only the first byte of a reply belongs to this write
                if let Some(&first) = reply.first() {
                    read.push(first);
                }
            }
        }

        debug!(
            written = %hex_bytes(bytes),
            read = %hex_bytes(&read),
            "SPI transfer"
        );
        Ok(read)
    }

    /// Start or stop the bus sniffer
    ///
    /// Any active mode restarts decoding from a clean state. Turning the
    /// sniffer off when it is not running writes nothing.
    pub async fn sniff(&self, mode: SniffMode) -> BpioResult<()> {
        let _guard = self.modes.link().lock().await;
        self.require_started()?;

        let link = self.modes.link();
        if !mode.is_active() && !link.is_sniffing() {
            return Ok(());
        }

        link.command(mode.command(), self.modes.timeouts().ack())
            .await?;

        if mode.is_active() {
            link.start_sniffer();
        } else {
            link.stop_sniffer();
        }
        self.state.write().sniff = mode;
        info!(?mode, "SPI sniffer mode");
        let _ = self.event_tx.send(SpiEvent::SniffMode(mode));
        Ok(())
    }

    /// Set power supplies, pull-ups, AUX and CS pins
    pub async fn configure_peripherals(&self, peripherals: Peripherals) -> BpioResult<()> {
        let _guard = self.modes.link().lock().await;
        self.require_started()?;
        configure_peripherals_locked(&self.modes, peripherals).await
    }

    fn require_started(&self) -> BpioResult<()> {
        require_started(&self.modes, SPI, self.state.read().started)
    }
}

impl Drop for SpiSession {
    fn drop(&mut self) {
        if let Some(handle) = self.forwarder.lock().take() {
            handle.abort();
        }
    }
}

async fn forward_sniffer(
    mut rx: broadcast::Receiver<LinkEvent>,
    event_tx: broadcast::Sender<SpiEvent>,
) {
    loop {
        match rx.recv().await {
            Ok(LinkEvent::Sniff(capture)) => {
                let _ = event_tx.send(SpiEvent::Sniff(capture));
            }
            Ok(_) => {}
            Err(RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "SPI event forwarder lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
