//! SPI sub-mode command encoding
//!
//! Configuration is a pair of command bytes: a speed byte from a fixed
//! table and a packed `0b1000wxyz` option byte. Settings are always built
//! fresh from [`SpiSettings::default`] plus the caller's [`SpiOptions`], so
//! one configure call never leaks into the next.

use serde::{Deserialize, Serialize};

use crate::types::PinOutput;

/// Chip-select command that drives CS low
pub const CS_LOW: u8 = 0x02;
/// Chip-select command that drives CS high
pub const CS_HIGH: u8 = 0x03;

/// Escape byte that starts every sniffer record
pub const SNIFF_ESCAPE: u8 = 0x5C;

/// Supported SPI clock speeds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpiSpeed {
    #[default]
    Khz30,
    Khz125,
    Khz250,
    Mhz1,
    Mhz2,
    Khz2600,
    Mhz4,
    Mhz8,
}

impl SpiSpeed {
    /// All speeds, in command-byte order
    pub const ALL: [SpiSpeed; 8] = [
        SpiSpeed::Khz30,
        SpiSpeed::Khz125,
        SpiSpeed::Khz250,
        SpiSpeed::Mhz1,
        SpiSpeed::Mhz2,
        SpiSpeed::Khz2600,
        SpiSpeed::Mhz4,
        SpiSpeed::Mhz8,
    ];

    /// Map a frequency in kHz to a table entry
    ///
    /// Frequencies absent from the table fall back to the default speed
    /// rather than failing.
    pub fn from_khz(khz: u32) -> Self {
        Self::ALL
            .into_iter()
            .find(|s| s.khz() == khz)
            .unwrap_or_default()
    }

    /// Clock frequency in kHz
    pub fn khz(self) -> u32 {
        match self {
            SpiSpeed::Khz30 => 30,
            SpiSpeed::Khz125 => 125,
            SpiSpeed::Khz250 => 250,
            SpiSpeed::Mhz1 => 1000,
            SpiSpeed::Mhz2 => 2000,
            SpiSpeed::Khz2600 => 2600,
            SpiSpeed::Mhz4 => 4000,
            SpiSpeed::Mhz8 => 8000,
        }
    }

    /// Speed command byte (`0b01100xxx`)
    pub fn command(self) -> u8 {
        match self {
            SpiSpeed::Khz30 => 0x60,
            SpiSpeed::Khz125 => 0x61,
            SpiSpeed::Khz250 => 0x62,
            SpiSpeed::Mhz1 => 0x63,
            SpiSpeed::Mhz2 => 0x64,
            SpiSpeed::Khz2600 => 0x65,
            SpiSpeed::Mhz4 => 0x66,
            SpiSpeed::Mhz8 => 0x67,
        }
    }
}

/// Active level of the chip-select line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CsPolarity {
    #[default]
    ActiveLow,
    ActiveHigh,
}

impl CsPolarity {
    pub fn bit(self) -> u8 {
        match self {
            CsPolarity::ActiveLow => 0,
            CsPolarity::ActiveHigh => 1,
        }
    }
}

/// Clock level while the bus is idle (CKP)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockIdle {
    #[default]
    Low,
    High,
}

impl ClockIdle {
    pub fn bit(self) -> u8 {
        match self {
            ClockIdle::Low => 0,
            ClockIdle::High => 1,
        }
    }
}

/// Clock edge on which output changes (CKE)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockEdge {
    IdleToActive,
    #[default]
    ActiveToIdle,
}

impl ClockEdge {
    pub fn bit(self) -> u8 {
        match self {
            ClockEdge::IdleToActive => 0,
            ClockEdge::ActiveToIdle => 1,
        }
    }
}

/// Input sample point (SMP)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleTime {
    #[default]
    Middle,
    End,
}

impl SampleTime {
    pub fn bit(self) -> u8 {
        match self {
            SampleTime::Middle => 0,
            SampleTime::End => 1,
        }
    }
}

/// What the sniffer captures
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SniffMode {
    /// Stop sniffing
    #[default]
    Off,
    /// Capture all traffic regardless of chip select
    All,
    /// Capture while CS is low
    CsLow,
    /// Capture while CS is high
    CsHigh,
}

impl SniffMode {
    /// Sniffer command byte
    pub fn command(self) -> u8 {
        match self {
            SniffMode::Off => 0xFF,
            SniffMode::All => 0x0D,
            SniffMode::CsLow => 0x0E,
            SniffMode::CsHigh => 0x0F,
        }
    }

    pub fn is_active(self) -> bool {
        self != SniffMode::Off
    }
}

/// Caller overrides for SPI configuration; unset fields keep their defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpiOptions {
    /// Clock speed in kHz (unknown values fall back to 30 kHz)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_khz: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cs_polarity: Option<CsPolarity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin_output: Option<PinOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clock_idle: Option<ClockIdle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clock_edge: Option<ClockEdge>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_time: Option<SampleTime>,
}

impl SpiOptions {
    /// Layer `overrides` on top of these options
    pub fn merged_with(&self, overrides: &SpiOptions) -> SpiOptions {
        SpiOptions {
            speed_khz: overrides.speed_khz.or(self.speed_khz),
            cs_polarity: overrides.cs_polarity.or(self.cs_polarity),
            pin_output: overrides.pin_output.or(self.pin_output),
            clock_idle: overrides.clock_idle.or(self.clock_idle),
            clock_edge: overrides.clock_edge.or(self.clock_edge),
            sample_time: overrides.sample_time.or(self.sample_time),
        }
    }
}

/// Complete SPI configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpiSettings {
    pub speed: SpiSpeed,
    pub cs_polarity: CsPolarity,
    pub pin_output: PinOutput,
    pub clock_idle: ClockIdle,
    pub clock_edge: ClockEdge,
    pub sample_time: SampleTime,
}

impl SpiSettings {
    /// Defaults with `options` applied
    pub fn from_options(options: &SpiOptions) -> Self {
        let defaults = Self::default();
        Self {
            speed: options
                .speed_khz
                .map(SpiSpeed::from_khz)
                .unwrap_or(defaults.speed),
            cs_polarity: options.cs_polarity.unwrap_or(defaults.cs_polarity),
            pin_output: options.pin_output.unwrap_or(defaults.pin_output),
            clock_idle: options.clock_idle.unwrap_or(defaults.clock_idle),
            clock_edge: options.clock_edge.unwrap_or(defaults.clock_edge),
            sample_time: options.sample_time.unwrap_or(defaults.sample_time),
        }
    }
}

/// Speed command for these settings
pub fn speed_command(settings: &SpiSettings) -> u8 {
    settings.speed.command()
}

/// Packed configuration byte: `0x80 | w<<3 | x<<2 | y<<1 | z`
///
/// w = pin output, x = clock idle phase, y = clock edge, z = sample time.
pub fn config_command(settings: &SpiSettings) -> u8 {
    0x80 | settings.pin_output.bit() << 3
        | settings.clock_idle.bit() << 2
        | settings.clock_edge.bit() << 1
        | settings.sample_time.bit()
}

/// Chip-select command for the desired logical state
///
/// The physical level is the logical state XOR the configured polarity:
///
/// | enable | polarity    | command |
/// |--------|-------------|---------|
/// | false  | active low  | `0x03`  |
/// | true   | active low  | `0x02`  |
/// | false  | active high | `0x02`  |
/// | true   | active high | `0x03`  |
pub fn cs_command(enable: bool, polarity: CsPolarity) -> u8 {
    CS_HIGH - ((enable as u8) ^ polarity.bit())
}
