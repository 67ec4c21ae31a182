//! UART sub-mode command encoding
//!
//! Like SPI, UART configuration is a baud byte from a fixed table followed by
//! a packed `0b100wxxyz` option byte. Baud rates outside the table can be
//! programmed directly into the baud rate generator with
//! [`custom_baud_commands`].

use serde::{Deserialize, Serialize};

use crate::error::{CodecError, CodecResult};
use crate::types::PinOutput;

/// Enable echo of received bytes to the host
pub const ECHO_ON: u8 = 0x02;
/// Disable echo of received bytes
pub const ECHO_OFF: u8 = 0x03;
/// Set the baud rate generator directly (followed by high and low bytes)
pub const SET_BRG: u8 = 0x07;
/// Enter transparent bridge mode; only a power cycle leaves it
pub const BRIDGE: u8 = 0x0F;

/// Reference clock feeding the baud rate generator
pub const BRG_CLOCK_HZ: u32 = 16_000_000;

/// Baud rates with a dedicated command byte
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UartBaud {
    B300,
    B1200,
    B2400,
    B4800,
    #[default]
    B9600,
    B19200,
    B31250,
    B38400,
    B57600,
    B115200,
}

impl UartBaud {
    pub const ALL: [UartBaud; 10] = [
        UartBaud::B300,
        UartBaud::B1200,
        UartBaud::B2400,
        UartBaud::B4800,
        UartBaud::B9600,
        UartBaud::B19200,
        UartBaud::B31250,
        UartBaud::B38400,
        UartBaud::B57600,
        UartBaud::B115200,
    ];

    /// Map a baud rate to a table entry, falling back to 9600 when the rate
    /// has no command byte
    pub fn from_baud(baud: u32) -> Self {
        Self::ALL
            .into_iter()
            .find(|b| b.baud() == baud)
            .unwrap_or_default()
    }

    /// Exact table lookup
    pub fn lookup(baud: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.baud() == baud)
    }

    pub fn baud(self) -> u32 {
        match self {
            UartBaud::B300 => 300,
            UartBaud::B1200 => 1200,
            UartBaud::B2400 => 2400,
            UartBaud::B4800 => 4800,
            UartBaud::B9600 => 9600,
            UartBaud::B19200 => 19200,
            UartBaud::B31250 => 31250,
            UartBaud::B38400 => 38400,
            UartBaud::B57600 => 57600,
            UartBaud::B115200 => 115200,
        }
    }

    pub fn command(self) -> u8 {
        match self {
            UartBaud::B300 => 0x60,
            UartBaud::B1200 => 0x61,
            UartBaud::B2400 => 0x62,
            UartBaud::B4800 => 0x63,
            UartBaud::B9600 => 0x64,
            UartBaud::B19200 => 0x65,
            UartBaud::B31250 => 0x66,
            UartBaud::B38400 => 0x67,
            UartBaud::B57600 => 0x68,
            UartBaud::B115200 => 0x69,
        }
    }
}

/// Data bits and parity (the `xx` field)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataFormat {
    #[default]
    #[serde(rename = "8n")]
    EightNone,
    #[serde(rename = "8e")]
    EightEven,
    #[serde(rename = "8o")]
    EightOdd,
    #[serde(rename = "9n")]
    NineNone,
}

impl DataFormat {
    pub fn code(self) -> u8 {
        match self {
            DataFormat::EightNone => 0,
            DataFormat::EightEven => 1,
            DataFormat::EightOdd => 2,
            DataFormat::NineNone => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopBits {
    #[default]
    One,
    Two,
}

impl StopBits {
    /// Contribution to the option byte (`y` bit, value 2)
    pub fn field(self) -> u8 {
        match self {
            StopBits::One => 0,
            StopBits::Two => 2,
        }
    }
}

/// Receive line level while idle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdlePolarity {
    #[default]
    High,
    Low,
}

impl IdlePolarity {
    /// Contribution to the option byte (`z` bit)
    pub fn field(self) -> u8 {
        match self {
            IdlePolarity::High => 0,
            IdlePolarity::Low => 1,
        }
    }
}

/// Caller overrides for UART configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UartOptions {
    /// Baud rate (values without a command byte fall back to 9600)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baud: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin_output: Option<PinOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_format: Option<DataFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_bits: Option<StopBits>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_polarity: Option<IdlePolarity>,
}

impl UartOptions {
    /// Layer `overrides` on top of these options
    pub fn merged_with(&self, overrides: &UartOptions) -> UartOptions {
        UartOptions {
            baud: overrides.baud.or(self.baud),
            pin_output: overrides.pin_output.or(self.pin_output),
            data_format: overrides.data_format.or(self.data_format),
            stop_bits: overrides.stop_bits.or(self.stop_bits),
            idle_polarity: overrides.idle_polarity.or(self.idle_polarity),
        }
    }
}

/// Complete UART configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UartSettings {
    pub baud: UartBaud,
    pub pin_output: PinOutput,
    pub data_format: DataFormat,
    pub stop_bits: StopBits,
    pub idle_polarity: IdlePolarity,
}

impl UartSettings {
    pub fn from_options(options: &UartOptions) -> Self {
        let defaults = Self::default();
        Self {
            baud: options.baud.map(UartBaud::from_baud).unwrap_or(defaults.baud),
            pin_output: options.pin_output.unwrap_or(defaults.pin_output),
            data_format: options.data_format.unwrap_or(defaults.data_format),
            stop_bits: options.stop_bits.unwrap_or(defaults.stop_bits),
            idle_polarity: options.idle_polarity.unwrap_or(defaults.idle_polarity),
        }
    }
}

pub fn baud_command(settings: &UartSettings) -> u8 {
    settings.baud.command()
}

/// Packed configuration byte: `0x80 + 16w + 4xx + 2y + z`
pub fn config_command(settings: &UartSettings) -> u8 {
    0x80 + 16 * settings.pin_output.bit()
        + 4 * settings.data_format.code()
        + settings.stop_bits.field()
        + settings.idle_polarity.field()
}

/// Baud rate generator value for an arbitrary rate
///
/// `round(BRG_CLOCK_HZ / (baud * 4) - 1)`, which must fit in 16 bits.
pub fn custom_baud_register(baud: u32) -> CodecResult<u16> {
    if baud == 0 {
        return Err(CodecError::InvalidBaudRate(baud));
    }
    let value = (BRG_CLOCK_HZ as f64 / (baud as f64 * 4.0) - 1.0).round();
    if !(0.0..=u16::MAX as f64).contains(&value) {
        return Err(CodecError::InvalidBaudRate(baud));
    }
    Ok(value as u16)
}

/// The three command bytes that program a custom baud rate
///
/// Each byte is acknowledged separately by the device.
pub fn custom_baud_commands(baud: u32) -> CodecResult<[u8; 3]> {
    let [high, low] = custom_baud_register(baud)?.to_be_bytes();
    Ok([SET_BRG, high, low])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(300, 0x60)]
    #[case(1200, 0x61)]
    #[case(2400, 0x62)]
    #[case(4800, 0x63)]
    #[case(9600, 0x64)]
    #[case(19200, 0x65)]
    #[case(31250, 0x66)]
    #[case(38400, 0x67)]
    #[case(57600, 0x68)]
    #[case(115200, 0x69)]
    fn test_baud_table(#[case] baud: u32, #[case] command: u8) {
        assert_eq!(UartBaud::from_baud(baud).command(), command);
        assert_eq!(UartBaud::lookup(baud).map(UartBaud::baud), Some(baud));
    }

    #[test]
    fn test_unknown_baud_falls_back() {
        assert_eq!(UartBaud::from_baud(250_000), UartBaud::B9600);
        assert_eq!(UartBaud::lookup(250_000), None);
        let settings = UartSettings::from_options(&UartOptions {
            baud: Some(14400),
            ..Default::default()
        });
        assert_eq!(baud_command(&settings), 0x64);
    }

    #[test]
    fn test_default_config_byte() {
        // 3v3 (16) + 8N (0) + one stop bit (0) + idle high (0)
        assert_eq!(config_command(&UartSettings::default()), 0x90);
    }

    #[rstest]
    #[case(PinOutput::HiZ, DataFormat::EightNone, StopBits::One, IdlePolarity::High, 0x80)]
    #[case(PinOutput::V3_3, DataFormat::EightEven, StopBits::One, IdlePolarity::High, 0x94)]
    #[case(PinOutput::V3_3, DataFormat::EightOdd, StopBits::Two, IdlePolarity::High, 0x9A)]
    #[case(PinOutput::HiZ, DataFormat::NineNone, StopBits::Two, IdlePolarity::Low, 0x8F)]
    #[case(PinOutput::V3_3, DataFormat::NineNone, StopBits::Two, IdlePolarity::Low, 0x9F)]
    fn test_config_byte(
        #[case] pin_output: PinOutput,
        #[case] data_format: DataFormat,
        #[case] stop_bits: StopBits,
        #[case] idle_polarity: IdlePolarity,
        #[case] expected: u8,
    ) {
        let settings = UartSettings {
            baud: UartBaud::B115200,
            pin_output,
            data_format,
            stop_bits,
            idle_polarity,
        };
        assert_eq!(config_command(&settings), expected);
    }

    #[test]
    fn test_custom_baud_register() {
        // 16e6 / (9600 * 4) - 1 = 415.67 -> 416
        assert_eq!(custom_baud_register(9600).unwrap(), 416);
        assert_eq!(custom_baud_commands(9600).unwrap(), [0x07, 0x01, 0xA0]);
        // 16e6 / (115200 * 4) - 1 = 33.72 -> 34
        assert_eq!(custom_baud_commands(115200).unwrap(), [0x07, 0x00, 0x22]);
    }

    #[test]
    fn test_custom_baud_out_of_range() {
        assert_eq!(custom_baud_register(0), Err(CodecError::InvalidBaudRate(0)));
        assert!(custom_baud_register(10).is_err());
        assert!(custom_baud_register(8_000_000).is_err());
    }
}
