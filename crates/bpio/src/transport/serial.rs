//! Serial port transport (USB CDC / FTDI)

use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serialport::SerialPort;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::SerialConfig;
use crate::transport::{InboundChunk, Transport, TransportError};

const READ_TIMEOUT: Duration = Duration::from_millis(10);
const READ_BUFFER_LEN: usize = 4096;

type Port = Box<dyn SerialPort>;

/// Serial transport with a blocking reader task
pub struct SerialTransport {
    config: SerialConfig,
    port: Arc<Mutex<Option<Port>>>,
    open: Arc<AtomicBool>,
    incoming_tx: broadcast::Sender<InboundChunk>,
    reader_handle: Mutex<Option<JoinHandle<()>>>,
}

impl SerialTransport {
    /// Create a transport; the port is not opened until [`Transport::open`]
    pub fn new(config: &SerialConfig) -> Self {
        let (incoming_tx, _) = broadcast::channel(1024);
        Self {
            config: config.clone(),
            port: Arc::new(Mutex::new(None)),
            open: Arc::new(AtomicBool::new(false)),
            incoming_tx,
            reader_handle: Mutex::new(None),
        }
    }

    fn open_port(config: &SerialConfig) -> Result<Port, TransportError> {
        serialport::new(&config.port, config.baud_rate)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| {
                TransportError::ConnectionFailed(format!("Failed to open {}: {}", config.port, e))
            })
    }

    fn start_reader(&self, mut reader: Port) {
        let incoming_tx = self.incoming_tx.clone();
        let open = self.open.clone();

        let handle = tokio::task::spawn_blocking(move || {
            let mut buf = [0u8; READ_BUFFER_LEN];
            while open.load(Ordering::SeqCst) {
                match reader.read(&mut buf) {
                    Ok(0) => {}
                    Ok(n) => {
                        tracing::trace!(bytes = %bpio_core::hex_bytes(&buf[..n]), "Serial read");
                        // No receivers is fine
                        let _ = incoming_tx.send(InboundChunk::new(buf[..n].to_vec()));
                    }
                    Err(ref e) if e.kind() == ErrorKind::TimedOut => {}
                    Err(e) => {
                        tracing::error!(?e, "Serial read error");
                        open.store(false, Ordering::SeqCst);
                    }
                }
            }
            tracing::debug!("Serial reader stopped");
        });

        *self.reader_handle.lock() = Some(handle);
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn open(&self) -> Result<(), TransportError> {
        if self.open.load(Ordering::SeqCst) {
            return Ok(());
        }

        let config = self.config.clone();
        let port = tokio::task::spawn_blocking(move || Self::open_port(&config))
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("Task join error: {}", e)))??;
        let reader = port
            .try_clone()
            .map_err(|e| TransportError::ConnectionFailed(format!("Failed to clone port: {}", e)))?;

        *self.port.lock() = Some(port);
        self.open.store(true, Ordering::SeqCst);
        self.start_reader(reader);

        tracing::info!(port = %self.config.port, baud = self.config.baud_rate, "Serial port open");
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.open.store(false, Ordering::SeqCst);
        self.port.lock().take();
        // The reader sees the flag and exits within one read timeout
        self.reader_handle.lock().take();
        tracing::info!(port = %self.config.port, "Serial port closed");
        Ok(())
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), TransportError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        let port = self.port.clone();
        let bytes = bytes.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut guard = port.lock();
            let port = guard.as_mut().ok_or(TransportError::ConnectionClosed)?;
            port.write_all(&bytes)
                .and_then(|_| port.flush())
                .map_err(|e| TransportError::WriteFailed(e.to_string()))
        })
        .await
        .map_err(|e| TransportError::WriteFailed(format!("Task join error: {}", e)))??;

        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<InboundChunk> {
        self.incoming_tx.subscribe()
    }

    async fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.open.store(false, Ordering::SeqCst);
    }
}
