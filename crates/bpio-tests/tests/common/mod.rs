//! Shared harness for the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use bpio::config::{BpioConfig, MockConfig};
use bpio::transport::mock::MockTransport;
use bpio::BusPirate;
use tracing_subscriber::EnvFilter;

/// Simulated device plus an engine talking to it
pub struct TestHarness {
    pub mock: Arc<MockTransport>,
    pub pirate: BusPirate,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(BpioConfig::default())
    }

    pub fn with_config(config: BpioConfig) -> Self {
        init_tracing();
        let mock_config = match &config.transport {
            bpio::config::TransportConfig::Mock(mock) => mock.clone(),
            _ => MockConfig::default(),
        };
        let mock = Arc::new(MockTransport::new(&mock_config));
        let pirate = BusPirate::new(mock.clone(), config);
        Self { mock, pirate }
    }

    /// Harness already in binary mode, with the handshake bytes cleared
    pub async fn connected() -> Self {
        let harness = Self::new();
        harness
            .pirate
            .connect()
            .await
            .expect("connect to simulated device");
        harness.mock.clear_written();
        harness
    }
}

/// Install a test-friendly subscriber once; later calls are ignored
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
