//! Engine configuration
//!
//! Loaded from TOML. Every section is optional; missing values take the
//! defaults below.
//!
//! ```toml
//! [transport]
//! type = "serial"
//! port = "/dev/ttyUSB0"
//!
//! [timeouts]
//! ack_ms = 250
//!
//! [spi]
//! speed_khz = 1000
//! clock_idle = "high"
//! ```

use std::path::Path;
use std::time::Duration;

use bpio_core::spi::SpiOptions;
use bpio_core::uart::UartOptions;
use serde::{Deserialize, Serialize};

use crate::error::{BpioError, BpioResult};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BpioConfig {
    /// Transport configuration
    #[serde(default)]
    pub transport: TransportConfig,
    /// Wait bounds
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Binary mode entry
    #[serde(default)]
    pub binmode: BinmodeConfig,
    /// Default SPI overrides applied by `BusPirate::start_spi`
    #[serde(default)]
    pub spi: SpiOptions,
    /// Default UART overrides applied by `BusPirate::start_uart`
    #[serde(default)]
    pub uart: UartOptions,
}

impl BpioConfig {
    pub fn from_toml_str(content: &str) -> BpioResult<Self> {
        toml::from_str(content).map_err(|e| BpioError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> BpioResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| BpioError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }
}

// =============================================================================
// Transport Configuration
// =============================================================================

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// USB serial port
    Serial(SerialConfig),
    /// Simulated device for testing
    Mock(MockConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Mock(MockConfig::default())
    }
}

/// Serial port configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device path (e.g., "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Host-side baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

fn default_baud_rate() -> u32 {
    115200
}

/// Mock transport configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockConfig {
    /// Simulated reply latency in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
}

// =============================================================================
// Timeouts
// =============================================================================

/// Wait bounds for the handshakes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Binary mode entry (`BBIO1`)
    #[serde(default = "default_binmode_timeout")]
    pub binmode_ms: u64,
    /// Sub-mode entry (`SPI1`, `ART1`)
    #[serde(default = "default_mode_switch_timeout")]
    pub mode_switch_ms: u64,
    /// Single command acknowledgment
    #[serde(default = "default_ack_timeout")]
    pub ack_ms: u64,
}

impl TimeoutConfig {
    pub fn binmode(&self) -> Duration {
        Duration::from_millis(self.binmode_ms)
    }

    pub fn mode_switch(&self) -> Duration {
        Duration::from_millis(self.mode_switch_ms)
    }

    pub fn ack(&self) -> Duration {
        Duration::from_millis(self.ack_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            binmode_ms: default_binmode_timeout(),
            mode_switch_ms: default_mode_switch_timeout(),
            ack_ms: default_ack_timeout(),
        }
    }
}

fn default_binmode_timeout() -> u64 {
    1000
}

fn default_mode_switch_timeout() -> u64 {
    500
}

fn default_ack_timeout() -> u64 {
    200
}

// =============================================================================
// Binary Mode Entry
// =============================================================================

/// How hard to knock when entering binary mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinmodeConfig {
    /// Number of `0x00` writes before giving up on the device answering
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Pause between `0x00` writes in milliseconds
    #[serde(default = "default_interval")]
    pub interval_ms: u64,
    /// Newlines sent by the console reset
    #[serde(default = "default_console_enters")]
    pub console_enters: usize,
}

impl BinmodeConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for BinmodeConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            interval_ms: default_interval(),
            console_enters: default_console_enters(),
        }
    }
}

fn default_attempts() -> u32 {
    20
}

fn default_interval() -> u64 {
    10
}

fn default_console_enters() -> usize {
    bpio_core::console::ENTER_COUNT
}
