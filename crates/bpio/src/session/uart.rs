//! UART session

use std::sync::Arc;

use bpio_core::uart::{self, UartOptions, UartSettings};
use bpio_core::{bulk_command, hex_bytes, ModeDescriptor, Peripherals, ACK, MAX_FRAME_LEN};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{configure_peripherals_locked, require_started};
use crate::error::{BpioError, BpioResult};
use crate::link::LinkEvent;
use crate::mode::ModeController;

const UART: ModeDescriptor = ModeDescriptor::UART;

/// UART notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UartEvent {
    /// Configuration applied
    Ready(UartSettings),
    /// Receive echo switched on or off
    EchoChanged(bool),
    /// Bytes received from the target
    Data(Bytes),
    /// Transparent bridge entered; the session is finished
    Bridge,
}

#[derive(Debug, Default)]
struct UartState {
    started: bool,
    settings: UartSettings,
    echo: bool,
    custom_baud: Option<u32>,
}

/// Binary UART mode session
pub struct UartSession {
    modes: Arc<ModeController>,
    state: Arc<RwLock<UartState>>,
    event_tx: broadcast::Sender<UartEvent>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl UartSession {
    /// Create a session; must be called from within a Tokio runtime
    pub fn new(modes: Arc<ModeController>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let state = Arc::new(RwLock::new(UartState::default()));
        let forwarder = tokio::spawn(forward_received(
            modes.link().subscribe(),
            modes.clone(),
            state.clone(),
            event_tx.clone(),
        ));
        Self {
            modes,
            state,
            event_tx,
            forwarder: Mutex::new(Some(forwarder)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UartEvent> {
        self.event_tx.subscribe()
    }

    /// Settings applied by the last successful configuration
    pub fn settings(&self) -> UartSettings {
        self.state.read().settings
    }

    /// Started, and the device is still in UART mode
    pub fn is_started(&self) -> bool {
        self.state.read().started && self.modes.is_active(UART)
    }

    pub fn echo(&self) -> bool {
        self.state.read().echo
    }

    /// Rate programmed with [`set_custom_baud`](Self::set_custom_baud), if any
    pub fn custom_baud(&self) -> Option<u32> {
        self.state.read().custom_baud
    }

    /// Enter UART mode and apply `options`
    pub async fn start(&self, options: &UartOptions) -> BpioResult<UartSettings> {
        let _guard = self.modes.link().lock().await;
        self.start_locked(options).await
    }

    /// Apply `options` over the defaults, starting the session first if needed
    pub async fn setopts(&self, options: &UartOptions) -> BpioResult<UartSettings> {
        let _guard = self.modes.link().lock().await;
        if self.is_started() {
            self.setopts_locked(options).await
        } else {
            self.start_locked(options).await
        }
    }

    async fn start_locked(&self, options: &UartOptions) -> BpioResult<UartSettings> {
        self.modes
            .switch_mode_locked(UART, self.modes.timeouts().mode_switch())
            .await?;
        {
            let mut state = self.state.write();
            state.started = true;
            state.echo = false;
        }
        self.setopts_locked(options).await
    }

    async fn setopts_locked(&self, options: &UartOptions) -> BpioResult<UartSettings> {
        let settings = UartSettings::from_options(options);
        let link = self.modes.link();
        let timeout = self.modes.timeouts().ack();

        let baud = link.command(uart::baud_command(&settings), timeout).await;
        let config = link.command(uart::config_command(&settings), timeout).await;
        baud.and(config)?;

        {
            let mut state = self.state.write();
            state.settings = settings;
            state.custom_baud = None;
        }
        info!(?settings, "UART ready");
        let _ = self.event_tx.send(UartEvent::Ready(settings));
        Ok(settings)
    }

    /// Transmit up to one frame of bytes
    ///
    /// Each payload byte is acknowledged by the device.
    pub async fn write(&self, bytes: &[u8]) -> BpioResult<()> {
        if bytes.len() > MAX_FRAME_LEN {
            return Err(BpioError::PayloadTooLarge {
                len: bytes.len(),
                max: MAX_FRAME_LEN,
            });
        }

        let _guard = self.modes.link().lock().await;
        self.require_started()?;
        if bytes.is_empty() {
            return Ok(());
        }

        let link = self.modes.link();
        let timeout = self.modes.timeouts().ack();
        let command = bulk_command(bytes.len())?;

        link.command(command, timeout).await?;
        link.write_and_wait(bytes, vec![ACK; bytes.len()], timeout)
            .await?
            .map_err(|e| BpioError::from_ack_wait(command, e))?;

        debug!(bytes = %hex_bytes(bytes), "UART write");
        Ok(())
    }

    /// Forward received bytes to the host (`true`) or drop them (`false`)
    pub async fn echo_rx(&self, on: bool) -> BpioResult<()> {
        let _guard = self.modes.link().lock().await;
        self.require_started()?;

        let command = if on { uart::ECHO_ON } else { uart::ECHO_OFF };
        self.modes
            .link()
            .command(command, self.modes.timeouts().ack())
            .await?;

        self.state.write().echo = on;
        info!(on, "UART receive echo");
        let _ = self.event_tx.send(UartEvent::EchoChanged(on));
        Ok(())
    }

    /// Program the baud rate generator for a rate outside the standard table
    pub async fn set_custom_baud(&self, baud: u32) -> BpioResult<()> {
        let commands = uart::custom_baud_commands(baud)?;

        let _guard = self.modes.link().lock().await;
        self.require_started()?;

        let link = self.modes.link();
        let timeout = self.modes.timeouts().ack();
        for command in commands {
            link.command(command, timeout).await?;
        }

        self.state.write().custom_baud = Some(baud);
        info!(baud, "UART custom baud rate");
        Ok(())
    }

    /// Enter the transparent bridge
    ///
    /// The device stops speaking the binary protocol until it is power
    /// cycled; the session cannot be restarted.
    pub async fn bridge(&self) -> BpioResult<()> {
        let _guard = self.modes.link().lock().await;
        self.require_started()?;

        self.modes.link().write(&[uart::BRIDGE]).await?;
        self.modes.enter_bridge();
        self.state.write().started = false;
        let _ = self.event_tx.send(UartEvent::Bridge);
        Ok(())
    }

    /// Set power supplies, pull-ups, AUX and CS pins
    pub async fn configure_peripherals(&self, peripherals: Peripherals) -> BpioResult<()> {
        let _guard = self.modes.link().lock().await;
        self.require_started()?;
        configure_peripherals_locked(&self.modes, peripherals).await
    }

    fn require_started(&self) -> BpioResult<()> {
        require_started(&self.modes, UART, self.state.read().started)
    }
}

impl Drop for UartSession {
    fn drop(&mut self) {
        if let Some(handle) = self.forwarder.lock().take() {
            handle.abort();
        }
    }
}

async fn forward_received(
    mut rx: broadcast::Receiver<LinkEvent>,
    modes: Arc<ModeController>,
    state: Arc<RwLock<UartState>>,
    event_tx: broadcast::Sender<UartEvent>,
) {
    loop {
        match rx.recv().await {
            Ok(LinkEvent::Data(data)) => {
                if state.read().started && modes.is_active(UART) {
                    let _ = event_tx.send(UartEvent::Data(data));
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(n)) => {
                warn!(skipped = n, "UART event forwarder lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
