//! Setting types shared by the SPI and UART sub-modes

use serde::{Deserialize, Serialize};

/// Output driver for the bus pins
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinOutput {
    /// Open drain (high impedance when idle)
    HiZ,
    /// Push-pull 3.3V
    #[default]
    #[serde(rename = "3v3")]
    V3_3,
}

impl PinOutput {
    /// Value of the `w` bit in the configuration byte
    pub fn bit(self) -> u8 {
        match self {
            PinOutput::HiZ => 0,
            PinOutput::V3_3 => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        pin: PinOutput,
    }

    #[test]
    fn test_pin_output_bits() {
        assert_eq!(PinOutput::HiZ.bit(), 0);
        assert_eq!(PinOutput::V3_3.bit(), 1);
        assert_eq!(PinOutput::default(), PinOutput::V3_3);
    }

    #[test]
    fn test_pin_output_names() {
        let w: Wrapper = toml::from_str(r#"pin = "hiz""#).unwrap();
        assert_eq!(w.pin, PinOutput::HiZ);
        let w: Wrapper = toml::from_str(r#"pin = "3v3""#).unwrap();
        assert_eq!(w.pin, PinOutput::V3_3);
    }
}
