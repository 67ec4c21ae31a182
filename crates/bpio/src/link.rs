//! Shared link to the device
//!
//! Owns the transport, the [`ResponseMatcher`] and the inbound pump task.
//! Every inbound chunk is offered to the pending waiters first. Whatever they
//! leave goes to the sniffer decoder while sniffing is active, otherwise it is
//! published as [`LinkEvent::Data`].
//!
//! Operations that span several commands take the operation lock
//! ([`Link::lock`]) for their whole duration, so command N+1 of one operation
//! is never interleaved with another operation's bytes.

use std::sync::Arc;
use std::time::Duration;

use bpio_core::{hex_bytes, SniffCapture, SnifferDecoder, ACK};
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, oneshot, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::error::{BpioError, BpioResult};
use crate::matcher::{ResponseMatcher, WaitError, WaitHandle, WaitResult};
use crate::transport::{InboundChunk, Transport};

/// Inbound traffic no waiter claimed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Raw bytes outside any expected response
    Data(Bytes),
    /// Decoded sniffer records
    Sniff(SniffCapture),
    /// The transport went away
    Closed,
}

/// Transport plus matcher, shared by the mode controller and the sessions
pub struct Link {
    transport: Arc<dyn Transport>,
    matcher: Arc<Mutex<ResponseMatcher>>,
    sniffer: Arc<Mutex<Option<SnifferDecoder>>>,
    op_lock: tokio::sync::Mutex<()>,
    event_tx: broadcast::Sender<LinkEvent>,
    pump_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Link {
    /// Create a link and start its inbound pump
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let matcher = Arc::new(Mutex::new(ResponseMatcher::new()));
        let sniffer = Arc::new(Mutex::new(None));

        let handle = tokio::spawn(pump(
            transport.subscribe(),
            matcher.clone(),
            sniffer.clone(),
            event_tx.clone(),
        ));

        Self {
            transport,
            matcher,
            sniffer,
            op_lock: tokio::sync::Mutex::new(()),
            event_tx,
            pump_handle: Mutex::new(Some(handle)),
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Subscribe to unclaimed inbound traffic
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.event_tx.subscribe()
    }

    /// Take the operation lock
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.op_lock.lock().await
    }

    pub async fn open(&self) -> BpioResult<()> {
        self.transport.open().await?;
        Ok(())
    }

    /// Close the transport and drop sniffer state
    pub async fn close(&self) -> BpioResult<()> {
        self.stop_sniffer();
        self.transport.close().await?;
        let _ = self.event_tx.send(LinkEvent::Closed);
        Ok(())
    }

    pub async fn is_open(&self) -> bool {
        self.transport.is_open().await
    }

    /// Write raw bytes
    pub async fn write(&self, bytes: &[u8]) -> BpioResult<()> {
        debug!(bytes = %hex_bytes(bytes), "TX");
        self.transport.write(bytes).await.map_err(|e| {
            error!(error = %e, "Write failed");
            BpioError::from(e)
        })
    }

    /// Register an expectation that fails after `timeout`
    ///
    /// Register before writing the command that triggers the response.
    pub fn expect(&self, expected: impl Into<Vec<u8>>, timeout: Duration) -> PendingResponse<'_> {
        let deadline = Instant::now() + timeout;
        let (handle, rx) = self.matcher.lock().register_channel(expected, Some(deadline));
        PendingResponse {
            matcher: &self.matcher,
            handle,
            deadline,
            rx,
            outcome: None,
        }
    }

    /// Write `bytes` and wait for `expected`
    pub async fn write_and_wait(
        &self,
        bytes: &[u8],
        expected: impl Into<Vec<u8>>,
        timeout: Duration,
    ) -> BpioResult<WaitResult> {
        let mut pending = self.expect(expected, timeout);
        self.write(bytes).await?;
        Ok(pending.wait().await)
    }

    /// Write a single command byte and wait for its `0x01` acknowledgment
    pub async fn command(&self, command: u8, timeout: Duration) -> BpioResult<()> {
        self.write_and_wait(&[command], [ACK], timeout)
            .await?
            .map(|_| ())
            .map_err(|e| BpioError::from_ack_wait(command, e))
    }

    /// Route unclaimed inbound data through a fresh sniffer decoder
    pub fn start_sniffer(&self) {
        *self.sniffer.lock() = Some(SnifferDecoder::new());
        info!("Sniffer active");
    }

    /// Stop decoding and drop any partial record
    pub fn stop_sniffer(&self) {
        if self.sniffer.lock().take().is_some() {
            info!("Sniffer stopped");
        }
    }

    pub fn is_sniffing(&self) -> bool {
        self.sniffer.lock().is_some()
    }

    /// Number of waiters still pending
    pub fn pending_waiters(&self) -> usize {
        self.matcher.lock().len()
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        if let Some(handle) = self.pump_handle.lock().take() {
            handle.abort();
        }
    }
}

/// A registered expectation
///
/// Dropping it before it resolves cancels the waiter.
pub struct PendingResponse<'a> {
    matcher: &'a Mutex<ResponseMatcher>,
    handle: WaitHandle,
    deadline: Instant,
    rx: oneshot::Receiver<WaitResult>,
    outcome: Option<WaitResult>,
}

impl PendingResponse<'_> {
    pub fn handle(&self) -> WaitHandle {
        self.handle
    }

    /// Wait for the match or the deadline
    ///
    /// Safe to call again (for example from a `select!` loop); once resolved
    /// the same outcome is returned.
    pub async fn wait(&mut self) -> WaitResult {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }

        let outcome = match tokio::time::timeout_at(self.deadline, &mut self.rx).await {
            Ok(result) => result.unwrap_or(Err(WaitError::Cancelled)),
            Err(_) => {
                // The matcher delivers the timeout so a racing match cannot
                // also fire
                self.matcher.lock().expire(Instant::now());
                (&mut self.rx).await.unwrap_or(Err(WaitError::Cancelled))
            }
        };
        self.outcome = Some(outcome.clone());
        outcome
    }
}

impl Drop for PendingResponse<'_> {
    fn drop(&mut self) {
        if self.outcome.is_none() {
            self.matcher.lock().cancel(self.handle);
        }
    }
}

async fn pump(
    mut rx: broadcast::Receiver<InboundChunk>,
    matcher: Arc<Mutex<ResponseMatcher>>,
    sniffer: Arc<Mutex<Option<SnifferDecoder>>>,
    event_tx: broadcast::Sender<LinkEvent>,
) {
    loop {
        match rx.recv().await {
            Ok(chunk) => {
                debug!(bytes = %hex_bytes(&chunk.data), "RX");
                let Some(rest) = matcher.lock().feed(&chunk.data) else {
                    continue;
                };

                let event = match sniffer.lock().as_mut() {
                    Some(decoder) => {
                        let capture = decoder.decode(&rest);
                        if capture.is_empty() {
                            continue;
                        }
                        trace!(%capture, "Sniffed");
                        LinkEvent::Sniff(capture)
                    }
                    None => LinkEvent::Data(Bytes::from(rest)),
                };

                if let Err(broadcast::error::SendError(event)) = event_tx.send(event) {
                    warn!(?event, "Unclaimed inbound data dropped");
                }
            }
            Err(RecvError::Lagged(n)) => {
                warn!(skipped = n, "Inbound pump lagged");
            }
            Err(RecvError::Closed) => {
                info!("Inbound channel closed");
                let _ = event_tx.send(LinkEvent::Closed);
                break;
            }
        }
    }
}
