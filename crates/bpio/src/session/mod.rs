//! Sub-mode sessions
//!
//! A session owns the settings of one binary sub-mode and issues its
//! commands through the shared [`Link`](crate::link::Link). Sessions never
//! write without holding the link's operation lock.

mod spi;
mod uart;

pub use spi::{SpiEvent, SpiSession};
pub use uart::{UartEvent, UartSession};

use bpio_core::{ModeDescriptor, Peripherals};
use tracing::debug;

use crate::error::{BpioError, BpioResult};
use crate::mode::ModeController;

/// Fail unless `mode` is the active sub-mode and the session started it
pub(crate) fn require_started(
    modes: &ModeController,
    mode: ModeDescriptor,
    started: bool,
) -> BpioResult<()> {
    if started && modes.is_active(mode) {
        Ok(())
    } else {
        Err(BpioError::PreconditionNotMet(format!(
            "{} session not started",
            mode
        )))
    }
}

/// Write the peripheral byte (`0b0100wxyz`) and wait for its acknowledgment
///
/// The caller holds the operation lock.
pub(crate) async fn configure_peripherals_locked(
    modes: &ModeController,
    peripherals: Peripherals,
) -> BpioResult<()> {
    let command = peripherals.command();
    modes
        .link()
        .command(command, modes.timeouts().ack())
        .await?;
    debug!(?peripherals, "Peripherals configured");
    Ok(())
}
