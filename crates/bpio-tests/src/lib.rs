//! Integration tests for the Bus Pirate protocol engine
//!
//! These tests exercise the full stack against the simulated device in
//! `bpio::transport::mock`:
//! - Mode controller handshakes (console reset, `BBIO1`, `SPI1`, `ART1`)
//! - SPI and UART sessions
//! - Response matching and timeouts
//!
//! # Running Tests
//!
//! ```bash
//! RUST_LOG=bpio=debug cargo test -p bpio-tests
//! ```
//!
//! # Test Structure
//!
//! - `mode_test.rs` - Binary mode entry and mode switching
//! - `spi_test.rs` - SPI configuration, transfers and the sniffer
//! - `uart_test.rs` - UART configuration, writes, echo and bridge

// This crate only contains tests, no library code
