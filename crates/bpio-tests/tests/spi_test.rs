//! SPI session against the simulated device

mod common;

use bpio::{BpioError, Peripherals, SniffCapture, SniffMode, SpiEvent, SpiOptions};
use bpio_core::spi::{ClockEdge, ClockIdle, CsPolarity, SampleTime, SpiSpeed};
use bpio_core::PinOutput;
use common::TestHarness;
use pretty_assertions::assert_eq;
use tokio_test::assert_ok;

fn flash_options() -> SpiOptions {
    SpiOptions {
        speed_khz: Some(250),
        cs_polarity: Some(CsPolarity::ActiveLow),
        pin_output: Some(PinOutput::V3_3),
        clock_idle: Some(ClockIdle::Low),
        clock_edge: Some(ClockEdge::ActiveToIdle),
        sample_time: Some(SampleTime::Middle),
    }
}

#[tokio::test]
async fn test_setopts_writes_speed_then_config() {
    let harness = TestHarness::connected().await;
    let spi = harness.pirate.spi();
    let mut events = spi.subscribe();

    let settings = spi.setopts(&flash_options()).await.unwrap();

    // setopts on a fresh session starts it first
    assert_eq!(
        harness.mock.writes(),
        vec![vec![0x01], vec![0x62], vec![0x8A]]
    );
    assert_eq!(settings.speed, SpiSpeed::Khz250);
    assert_eq!(spi.settings(), settings);
    assert_eq!(events.recv().await.unwrap(), SpiEvent::Ready(settings));

    // Started now: only the two configuration bytes
    harness.mock.clear_written();
    assert_ok!(
        spi.setopts(&SpiOptions {
            speed_khz: Some(999),
            ..Default::default()
        })
        .await
    );
    assert_eq!(harness.mock.writes(), vec![vec![0x60], vec![0x8A]]);
}

#[tokio::test]
async fn test_long_transfer_is_framed_with_one_cs_cycle() {
    let harness = TestHarness::connected().await;
    let spi = harness.pirate.spi();
    harness.mock.set_spi_reply(|b| b ^ 0xFF);
    assert_ok!(spi.start(&SpiOptions::default()).await);
    harness.mock.clear_written();

    let payload: Vec<u8> = (0..20).collect();
    let read = spi.write_read(&payload, false).await.unwrap();

    assert_eq!(read, payload.iter().map(|b| b ^ 0xFF).collect::<Vec<_>>());

    let mut expected = vec![0x02, 0x1F];
    expected.extend_from_slice(&payload[..16]);
    expected.push(0x13);
    expected.extend_from_slice(&payload[16..]);
    expected.push(0x03);
    assert_eq!(harness.mock.written(), expected);
}

#[tokio::test]
async fn test_long_transfer_holds_cs_even_when_skipped() {
    let harness = TestHarness::connected().await;
    let spi = harness.pirate.spi();
    assert_ok!(spi.start(&SpiOptions::default()).await);
    harness.mock.clear_written();

    let read = spi.write_read(&[0u8; 20], true).await.unwrap();
    assert_eq!(read.len(), 20);

    let mut expected = vec![0x02, 0x1F];
    expected.extend_from_slice(&[0x00; 16]);
    expected.push(0x13);
    expected.extend_from_slice(&[0x00; 4]);
    expected.push(0x03);
    assert_eq!(harness.mock.written(), expected);
}

#[tokio::test]
async fn test_concurrent_operations_do_not_interleave() {
    let harness = TestHarness::connected().await;
    let spi = harness.pirate.spi();
    harness.mock.set_spi_reply(|b| b);
    assert_ok!(spi.start(&SpiOptions::default()).await);
    harness.mock.clear_written();

    let (read, cs) = tokio::join!(spi.write_read(&[0xA1, 0xA2], false), spi.set_cs(true));

    assert_eq!(read.unwrap(), vec![0xA1, 0xA2]);
    assert_ok!(cs);
    assert_eq!(
        harness.mock.written(),
        vec![0x02, 0x11, 0xA1, 0xA2, 0x03, 0x02]
    );
}

#[tokio::test(start_paused = true)]
async fn test_lost_data_reply_names_the_byte() {
    let harness = TestHarness::connected().await;
    let spi = harness.pirate.spi();
    assert_ok!(spi.start(&SpiOptions::default()).await);
    harness.mock.set_silent_commands(&[0xA5]);
    harness.mock.clear_written();

    let err = spi.write_read(&[0xA5], false).await.unwrap_err();

    assert_eq!(err, BpioError::AckTimeout { command: 0xA5 });
    // Chip select is still released after the failed transfer
    assert_eq!(harness.mock.written(), vec![0x02, 0x10, 0xA5, 0x03]);
}

#[tokio::test]
async fn test_active_high_chip_select() {
    let harness = TestHarness::connected().await;
    let spi = harness.pirate.spi();
    assert_ok!(
        spi.start(&SpiOptions {
            cs_polarity: Some(CsPolarity::ActiveHigh),
            ..Default::default()
        })
        .await
    );
    harness.mock.clear_written();

    assert_ok!(spi.set_cs(true).await);
    assert_ok!(spi.set_cs(false).await);
    assert_eq!(harness.mock.written(), vec![0x03, 0x02]);
}

#[tokio::test]
async fn test_sniffer_events() {
    let harness = TestHarness::connected().await;
    let spi = harness.pirate.spi();
    assert_ok!(spi.start(&SpiOptions::default()).await);
    let mut events = spi.subscribe();

    assert_ok!(spi.sniff(SniffMode::CsLow).await);
    assert!(harness.mock.device_sniffing());
    assert_eq!(spi.sniff_mode(), SniffMode::CsLow);
    assert_eq!(
        events.recv().await.unwrap(),
        SpiEvent::SniffMode(SniffMode::CsLow)
    );

    harness.mock.inject(vec![0x5C, 0x9F, 0xEF, 0x5C, 0x00]);
    harness.mock.inject(vec![0x12]);

    assert_eq!(
        events.recv().await.unwrap(),
        SpiEvent::Sniff(SniffCapture {
            output: vec![0x9F, 0x00],
            input: vec![0xEF],
        })
    );
    assert_eq!(
        events.recv().await.unwrap(),
        SpiEvent::Sniff(SniffCapture {
            output: vec![],
            input: vec![0x12],
        })
    );

    assert_ok!(spi.sniff(SniffMode::Off).await);
    assert!(!harness.mock.device_sniffing());
    assert_eq!(spi.sniff_mode(), SniffMode::Off);
    assert_eq!(harness.mock.written().last(), Some(&0xFF));
}

#[tokio::test]
async fn test_sniff_requires_start() {
    let harness = TestHarness::connected().await;
    let err = harness
        .pirate
        .spi()
        .sniff(SniffMode::All)
        .await
        .unwrap_err();
    assert!(matches!(err, BpioError::PreconditionNotMet(_)));
    assert!(harness.mock.written().is_empty());
}

#[tokio::test]
async fn test_peripherals() {
    let harness = TestHarness::connected().await;
    let spi = harness.pirate.spi();
    assert_ok!(spi.start(&SpiOptions::default()).await);
    harness.mock.clear_written();

    assert_ok!(
        spi.configure_peripherals(Peripherals {
            power: true,
            pullups: true,
            ..Default::default()
        })
        .await
    );
    assert_eq!(harness.mock.written(), vec![0x4C]);
}

#[tokio::test(start_paused = true)]
async fn test_config_byte_sent_even_when_speed_ack_is_lost() {
    let harness = TestHarness::connected().await;
    harness.mock.set_silent_commands(&[0x62]);

    let err = harness
        .pirate
        .spi()
        .start(&flash_options())
        .await
        .unwrap_err();

    assert_eq!(err, BpioError::AckTimeout { command: 0x62 });
    assert_eq!(harness.mock.written().last(), Some(&0x8A));
    assert_eq!(harness.pirate.modes().link().pending_waiters(), 0);
}
