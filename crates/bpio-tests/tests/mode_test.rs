//! Binary mode entry and mode switching against the simulated device

mod common;

use std::time::Duration;

use bpio::config::{BpioConfig, MockConfig, TransportConfig};
use bpio::transport::mock::SimulatedMode;
use bpio::{BpioError, ModeDescriptor, ModeEvent, ModeState, SpiOptions, UartOptions};
use common::TestHarness;
use pretty_assertions::assert_eq;
use tokio_test::assert_ok;

#[tokio::test]
async fn test_connect_emits_connected() {
    let harness = TestHarness::new();
    let mut events = harness.pirate.mode_events();

    assert_ok!(harness.pirate.connect().await);

    assert_eq!(harness.pirate.modes().state(), ModeState::Binmode);
    assert_eq!(harness.mock.device_mode(), SimulatedMode::Bitbang);

    let mut connected = false;
    while let Ok(event) = events.try_recv() {
        connected |= event == ModeEvent::Connected;
    }
    assert!(connected);
}

#[tokio::test]
async fn test_switch_between_submodes() {
    let harness = TestHarness::connected().await;
    let modes = harness.pirate.modes();
    let timeout = modes.timeouts().mode_switch();

    assert_ok!(modes.switch_mode(ModeDescriptor::SPI, timeout).await);
    assert_eq!(modes.current_mode(), Some(ModeDescriptor::SPI));
    // Already in bitbang mode: only the mode byte is written
    assert_eq!(harness.mock.written(), vec![0x01]);

    assert_ok!(modes.switch_mode(ModeDescriptor::UART, timeout).await);
    assert_eq!(modes.current_mode(), Some(ModeDescriptor::UART));
    assert_eq!(harness.mock.device_mode(), SimulatedMode::Uart);
    assert_eq!(harness.mock.written().last(), Some(&0x03));
}

#[tokio::test]
async fn test_sessions_track_the_active_mode() {
    let harness = TestHarness::connected().await;

    assert_ok!(harness.pirate.start_spi(&SpiOptions::default()).await);
    assert!(harness.pirate.spi().is_started());

    assert_ok!(harness.pirate.start_uart(&UartOptions::default()).await);
    assert!(harness.pirate.uart().is_started());
    assert!(!harness.pirate.spi().is_started());
}

#[tokio::test]
async fn test_latency_does_not_break_handshakes() {
    let config = BpioConfig {
        transport: TransportConfig::Mock(MockConfig { latency_ms: 3 }),
        ..Default::default()
    };
    let harness = TestHarness::with_config(config);

    assert_ok!(harness.pirate.connect().await);
    assert_ok!(harness.pirate.start_spi(&SpiOptions::default()).await);
    assert_eq!(
        harness.pirate.modes().state(),
        ModeState::Active(ModeDescriptor::SPI)
    );
}

#[tokio::test(start_paused = true)]
async fn test_unresponsive_device_times_out() {
    let harness = TestHarness::new();
    harness.mock.set_muted(true);

    let err = harness.pirate.connect().await.unwrap_err();

    assert_eq!(
        err,
        BpioError::ModeSwitchTimeout {
            mode: "bitbang",
            ack: "BBIO1"
        }
    );
    assert_eq!(harness.pirate.modes().state(), ModeState::ConsoleReset);

    // Bounded knocking: 20 entry bytes after the console reset
    let written = harness.mock.written();
    assert_eq!(written.iter().filter(|&&b| b == 0x00).count(), 20);
}

#[tokio::test(start_paused = true)]
async fn test_failed_switch_keeps_previous_state() {
    let harness = TestHarness::connected().await;
    harness.mock.set_silent_commands(&[ModeDescriptor::SPI.id]);

    let err = harness
        .pirate
        .modes()
        .switch_mode(ModeDescriptor::SPI, Duration::from_millis(100))
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(harness.pirate.modes().state(), ModeState::Binmode);
}

#[tokio::test(start_paused = true)]
async fn test_failed_switch_from_active_mode_forgets_it() {
    let harness = TestHarness::connected().await;
    let spi = harness.pirate.spi();
    assert_ok!(spi.start(&SpiOptions::default()).await);
    harness.mock.set_silent_commands(&[ModeDescriptor::UART.id]);

    let err = harness
        .pirate
        .modes()
        .switch_mode(ModeDescriptor::UART, Duration::from_millis(100))
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(harness.pirate.modes().state(), ModeState::Unknown);
    assert!(!spi.is_started());
    assert!(spi.write_read(&[0x55], false).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_switch_without_binmode_answer_keeps_state() {
    let harness = TestHarness::new();
    assert_ok!(harness.pirate.modes().open().await);
    harness.mock.set_muted(true);
    let mut events = harness.pirate.modes().subscribe();

    let err = harness
        .pirate
        .modes()
        .switch_mode(ModeDescriptor::SPI, Duration::from_millis(100))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        BpioError::ModeSwitchTimeout {
            mode: "bitbang",
            ack: "BBIO1"
        }
    );
    assert_eq!(harness.pirate.modes().state(), ModeState::Unknown);
    // No intermediate console-reset state leaks out
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_close() {
    let harness = TestHarness::connected().await;
    let mut events = harness.pirate.subscribe();

    assert_ok!(harness.pirate.close().await);

    assert_eq!(harness.pirate.modes().state(), ModeState::Unknown);
    assert!(!harness.pirate.modes().device_state().open);
    assert_eq!(events.recv().await.unwrap(), bpio::LinkEvent::Closed);
    assert!(harness.pirate.start_spi(&SpiOptions::default()).await.is_err());
}
