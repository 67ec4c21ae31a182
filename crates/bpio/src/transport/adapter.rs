//! Transport trait and types

use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;

use super::TransportError;

/// One delivery of inbound bytes, exactly as the transport produced it
///
/// Chunk boundaries carry no protocol meaning; all framing happens above
/// the transport.
#[derive(Debug, Clone)]
pub struct InboundChunk {
    /// Timestamp when the chunk was read
    pub timestamp: Instant,
    /// Raw bytes
    pub data: Bytes,
}

impl InboundChunk {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            timestamp: Instant::now(),
            data: data.into(),
        }
    }
}

/// Duplex byte stream to the device
///
/// The engine only writes raw bytes and consumes inbound chunks; it never
/// assumes message framing from the transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the underlying link (no-op if already open)
    async fn open(&self) -> Result<(), TransportError>;

    /// Close the underlying link; subscribers observe the channel closing
    /// or no further chunks
    async fn close(&self) -> Result<(), TransportError>;

    /// Write raw bytes
    async fn write(&self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Subscribe to inbound chunks
    fn subscribe(&self) -> broadcast::Receiver<InboundChunk>;

    /// Check if the link is open
    async fn is_open(&self) -> bool;
}
