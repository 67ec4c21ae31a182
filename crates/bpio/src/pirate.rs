//! Bus Pirate handle
//!
//! Wires one transport to a link, a mode controller and the two sub-mode
//! sessions, and applies the configured default options.

use std::sync::Arc;

use bpio_core::spi::{SpiOptions, SpiSettings};
use bpio_core::uart::{UartOptions, UartSettings};
use tokio::sync::broadcast;
use tracing::info;

use crate::config::BpioConfig;
use crate::error::BpioResult;
use crate::link::{Link, LinkEvent};
use crate::mode::{ModeController, ModeEvent};
use crate::session::{SpiSession, UartSession};
use crate::transport::{create_transport, Transport};

/// One Bus Pirate on one transport
pub struct BusPirate {
    config: BpioConfig,
    modes: Arc<ModeController>,
    spi: SpiSession,
    uart: UartSession,
}

impl BusPirate {
    /// Create a handle over an existing transport
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(transport: Arc<dyn Transport>, config: BpioConfig) -> Self {
        let link = Arc::new(Link::new(transport));
        let modes = Arc::new(ModeController::new(
            link,
            config.timeouts.clone(),
            config.binmode.clone(),
        ));
        let spi = SpiSession::new(modes.clone());
        let uart = UartSession::new(modes.clone());
        Self {
            config,
            modes,
            spi,
            uart,
        }
    }

    /// Create the transport named in `config` and a handle over it
    pub fn from_config(config: BpioConfig) -> BpioResult<Self> {
        let transport = create_transport(&config.transport)?;
        Ok(Self::new(transport, config))
    }

    pub fn config(&self) -> &BpioConfig {
        &self.config
    }

    /// Open the transport and bring the device into binary mode
    pub async fn connect(&self) -> BpioResult<()> {
        info!(transport = ?self.config.transport, "Connecting");
        self.modes.connect().await
    }

    pub async fn close(&self) -> BpioResult<()> {
        self.modes.close().await
    }

    pub fn modes(&self) -> &Arc<ModeController> {
        &self.modes
    }

    pub fn spi(&self) -> &SpiSession {
        &self.spi
    }

    pub fn uart(&self) -> &UartSession {
        &self.uart
    }

    /// Unclaimed inbound traffic
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.modes.link().subscribe()
    }

    pub fn mode_events(&self) -> broadcast::Receiver<ModeEvent> {
        self.modes.subscribe()
    }

    /// Start SPI with the configured defaults, overridden by `options`
    pub async fn start_spi(&self, options: &SpiOptions) -> BpioResult<SpiSettings> {
        self.spi.start(&self.config.spi.merged_with(options)).await
    }

    /// Start UART with the configured defaults, overridden by `options`
    pub async fn start_uart(&self, options: &UartOptions) -> BpioResult<UartSettings> {
        self.uart.start(&self.config.uart.merged_with(options)).await
    }
}
