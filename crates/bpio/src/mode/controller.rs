//! Mode controller

use std::sync::Arc;
use std::time::Duration;

use bpio_core::{console, ModeDescriptor};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{DeviceState, ModeEvent, ModeState};
use crate::config::{BinmodeConfig, TimeoutConfig};
use crate::error::{BpioError, BpioResult};
use crate::link::Link;
use crate::matcher::WaitError;

/// Drives the device between console, bitbang and the binary sub-modes
///
/// Public operations take the link's operation lock; the `*_locked`
/// variants are for callers that already hold it.
pub struct ModeController {
    link: Arc<Link>,
    timeouts: TimeoutConfig,
    binmode: BinmodeConfig,
    state: RwLock<DeviceState>,
    event_tx: broadcast::Sender<ModeEvent>,
}

impl ModeController {
    pub fn new(link: Arc<Link>, timeouts: TimeoutConfig, binmode: BinmodeConfig) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            link,
            timeouts,
            binmode,
            state: RwLock::new(DeviceState::default()),
            event_tx,
        }
    }

    pub fn link(&self) -> &Arc<Link> {
        &self.link
    }

    pub fn timeouts(&self) -> &TimeoutConfig {
        &self.timeouts
    }

    /// Get the current mode state
    pub fn state(&self) -> ModeState {
        self.state.read().mode
    }

    pub fn device_state(&self) -> DeviceState {
        *self.state.read()
    }

    /// The active sub-mode, if any
    pub fn current_mode(&self) -> Option<ModeDescriptor> {
        self.state().active()
    }

    pub fn is_active(&self, mode: ModeDescriptor) -> bool {
        self.state() == ModeState::Active(mode)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ModeEvent> {
        self.event_tx.subscribe()
    }

    /// Open the transport
    pub async fn open(&self) -> BpioResult<()> {
        self.link.open().await?;
        self.state.write().open = true;
        debug!("Link open");
        Ok(())
    }

    /// Close the transport; the mode becomes unknown
    pub async fn close(&self) -> BpioResult<()> {
        let _guard = self.link.lock().await;
        self.link.close().await?;
        self.set_mode(ModeState::Unknown);
        self.state.write().open = false;
        let _ = self.event_tx.send(ModeEvent::Closed);
        info!("Link closed");
        Ok(())
    }

    /// Open the transport, reset the console and enter binary mode
    pub async fn connect(&self) -> BpioResult<()> {
        let _guard = self.link.lock().await;
        self.open().await?;
        self.reset_console_locked().await?;
        self.enter_binary_mode_locked(self.timeouts.binmode()).await?;
        let _ = self.event_tx.send(ModeEvent::Connected);
        info!("Connected");
        Ok(())
    }

    /// Escape any console menu and reset the device; does not wait
    pub async fn reset_console(&self) -> BpioResult<()> {
        let _guard = self.link.lock().await;
        self.reset_console_locked().await
    }

    pub(crate) async fn reset_console_locked(&self) -> BpioResult<()> {
        self.write_console_reset().await?;
        self.set_mode(ModeState::ConsoleReset);
        Ok(())
    }

    async fn write_console_reset(&self) -> BpioResult<()> {
        let mut bytes = vec![console::ENTER; self.binmode.console_enters];
        bytes.push(console::RESET);
        self.link.write(&bytes).await
    }

    /// Knock with `0x00` until the device answers `BBIO1`
    pub async fn enter_binary_mode(&self, timeout: Duration) -> BpioResult<()> {
        let _guard = self.link.lock().await;
        self.enter_binary_mode_locked(timeout).await
    }

    pub(crate) async fn enter_binary_mode_locked(&self, timeout: Duration) -> BpioResult<()> {
        self.knock_binmode(timeout).await?;
        self.set_mode(ModeState::Binmode);
        Ok(())
    }

    async fn knock_binmode(&self, timeout: Duration) -> BpioResult<()> {
        let bitbang = ModeDescriptor::BITBANG;
        let mut pending = self.link.expect(bitbang.ack, timeout);
        let mut ticker = tokio::time::interval(self.binmode.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempts = 0u32;

        loop {
            tokio::select! {
                biased;
                result = pending.wait() => {
                    return match result {
                        Ok(_) => {
                            debug!(attempts, "Binary mode entered");
                            Ok(())
                        }
                        Err(WaitError::Timeout) => {
                            warn!(attempts, "No answer to binary mode entry");
                            Err(mode_timeout(bitbang))
                        }
                        Err(WaitError::Cancelled) => Err(BpioError::Cancelled),
                    };
                }
                _ = ticker.tick(), if attempts < self.binmode.attempts => {
                    attempts += 1;
                    self.link.write(&[console::BINMODE_ENTRY]).await?;
                }
            }
        }
    }

    /// Enter a binary sub-mode
    ///
    /// Outside bitbang mode the console is reset and binary mode entered
    /// first. On failure the state is left unchanged if nothing but the
    /// mode byte was written, and becomes [`ModeState::Unknown`] once the
    /// bootstrap has run.
    pub async fn switch_mode(&self, mode: ModeDescriptor, timeout: Duration) -> BpioResult<()> {
        let _guard = self.link.lock().await;
        self.switch_mode_locked(mode, timeout).await
    }

    pub(crate) async fn switch_mode_locked(
        &self,
        mode: ModeDescriptor,
        timeout: Duration,
    ) -> BpioResult<()> {
        let before = self.state();
        if before == ModeState::Bridge {
            return Err(BpioError::PreconditionNotMet(
                "UART bridge active; power cycle the device".to_string(),
            ));
        }

        let bootstrap = before != ModeState::Binmode;
        match self.try_switch(mode, timeout, bootstrap).await {
            Ok(()) => {
                self.set_mode(ModeState::Active(mode));
                Ok(())
            }
            Err(err) => {
                if bootstrap {
                    self.set_mode(ModeState::Unknown);
                }
                Err(err)
            }
        }
    }

    // Leaves the recorded state alone; the caller commits or rolls back
    async fn try_switch(
        &self,
        mode: ModeDescriptor,
        timeout: Duration,
        bootstrap: bool,
    ) -> BpioResult<()> {
        if bootstrap {
            self.write_console_reset().await?;
            self.knock_binmode(self.timeouts.binmode()).await?;
        }

        match self.link.write_and_wait(&[mode.id], mode.ack, timeout).await? {
            Ok(_) => Ok(()),
            Err(WaitError::Timeout) => {
                warn!(mode = %mode, "No answer to mode switch");
                Err(mode_timeout(mode))
            }
            Err(WaitError::Cancelled) => Err(BpioError::Cancelled),
        }
    }

    /// Record that the device entered the UART bridge
    pub(crate) fn enter_bridge(&self) {
        self.set_mode(ModeState::Bridge);
    }

    fn set_mode(&self, to: ModeState) {
        let from = std::mem::replace(&mut self.state.write().mode, to);
        if from == to {
            return;
        }

        // Any byte written after entering the sniffer ends it on the device
        self.link.stop_sniffer();

        match to {
            ModeState::Active(mode) => info!(mode = %mode, "Mode active"),
            ModeState::Bridge => info!("UART bridge active"),
            _ => debug!(?from, ?to, "Mode state changed"),
        }
        let _ = self.event_tx.send(ModeEvent::Changed { from, to });
    }
}

fn mode_timeout(mode: ModeDescriptor) -> BpioError {
    BpioError::ModeSwitchTimeout {
        mode: mode.name,
        ack: mode.ack_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MockConfig;
    use crate::transport::mock::{MockTransport, SimulatedMode};
    use pretty_assertions::assert_eq;

    fn controller() -> (Arc<MockTransport>, ModeController) {
        let mock = Arc::new(MockTransport::new(&MockConfig::default()));
        let link = Arc::new(Link::new(mock.clone()));
        let modes = ModeController::new(link, TimeoutConfig::default(), BinmodeConfig::default());
        (mock, modes)
    }

    #[tokio::test]
    async fn test_connect_reaches_binmode() {
        let (mock, modes) = controller();
        let mut events = modes.subscribe();

        modes.connect().await.unwrap();

        assert_eq!(modes.state(), ModeState::Binmode);
        assert!(modes.device_state().open);
        assert_eq!(mock.device_mode(), SimulatedMode::Bitbang);

        let mut expected = vec![0x0D; 10];
        expected.push(b'#');
        expected.push(0x00);
        assert_eq!(mock.written(), expected);

        assert_eq!(
            events.recv().await.unwrap(),
            ModeEvent::Changed {
                from: ModeState::Unknown,
                to: ModeState::ConsoleReset
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            ModeEvent::Changed {
                from: ModeState::ConsoleReset,
                to: ModeState::Binmode
            }
        );
        assert_eq!(events.recv().await.unwrap(), ModeEvent::Connected);
    }

    #[tokio::test]
    async fn test_switch_mode_bootstraps_binmode() {
        let (mock, modes) = controller();

        modes
            .switch_mode(ModeDescriptor::SPI, Duration::from_millis(100))
            .await
            .unwrap();

        assert_eq!(modes.current_mode(), Some(ModeDescriptor::SPI));
        assert!(modes.is_active(ModeDescriptor::SPI));
        assert_eq!(mock.device_mode(), SimulatedMode::Spi);
        assert_eq!(mock.written().last(), Some(&0x01));
    }

    #[tokio::test(start_paused = true)]
    async fn test_binmode_timeout_bounds_attempts() {
        let (mock, modes) = controller();
        mock.set_muted(true);

        let err = modes
            .enter_binary_mode(Duration::from_millis(1000))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            BpioError::ModeSwitchTimeout {
                mode: "bitbang",
                ack: "BBIO1"
            }
        );
        assert_eq!(mock.written(), vec![0x00; 20]);
        assert_eq!(modes.state(), ModeState::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mode_switch_timeout_leaves_binmode() {
        let (mock, modes) = controller();
        modes.connect().await.unwrap();
        mock.set_silent_commands(&[ModeDescriptor::UART.id]);

        let err = modes
            .switch_mode(ModeDescriptor::UART, Duration::from_millis(500))
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(modes.state(), ModeState::Binmode);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_switch_from_active_mode_is_unknown() {
        let (mock, modes) = controller();
        modes
            .switch_mode(ModeDescriptor::SPI, Duration::from_millis(100))
            .await
            .unwrap();
        mock.set_silent_commands(&[ModeDescriptor::UART.id]);
        let mut events = modes.subscribe();

        let err = modes
            .switch_mode(ModeDescriptor::UART, Duration::from_millis(500))
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(modes.state(), ModeState::Unknown);
        assert_eq!(modes.current_mode(), None);
        assert_eq!(
            events.recv().await.unwrap(),
            ModeEvent::Changed {
                from: ModeState::Active(ModeDescriptor::SPI),
                to: ModeState::Unknown
            }
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_resets_state() {
        let (_mock, modes) = controller();
        modes.connect().await.unwrap();
        modes.close().await.unwrap();
        assert_eq!(modes.device_state(), DeviceState::default());
    }
}
