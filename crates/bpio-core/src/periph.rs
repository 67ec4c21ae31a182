//! Peripheral control (power supplies, pull-ups, AUX and CS pins)

use serde::{Deserialize, Serialize};

/// State of the on-board peripherals, written as `0b0100wxyz`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Peripherals {
    /// Power supplies on
    pub power: bool,
    /// Pull-up resistors on
    pub pullups: bool,
    /// AUX pin high
    pub aux: bool,
    /// CS pin high
    pub cs: bool,
}

impl Peripherals {
    pub fn command(&self) -> u8 {
        0x40 | (self.power as u8) << 3
            | (self.pullups as u8) << 2
            | (self.aux as u8) << 1
            | self.cs as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peripheral_command() {
        assert_eq!(Peripherals::default().command(), 0x40);
        let all = Peripherals {
            power: true,
            pullups: true,
            aux: true,
            cs: true,
        };
        assert_eq!(all.command(), 0x4F);
        let power_only = Peripherals {
            power: true,
            ..Default::default()
        };
        assert_eq!(power_only.command(), 0x48);
    }
}
