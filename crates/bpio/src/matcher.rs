//! Response matcher
//!
//! Keeps the queue of outstanding expectations ("waiters") and matches each
//! inbound chunk against them, oldest first. A waiter sees only what is left
//! of the chunk it is tried against: an expectation longer than the remaining
//! bytes is not buffered across chunks, it simply stays pending.

use std::collections::VecDeque;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Why a wait ended without a match
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    #[error("Timed out")]
    Timeout,
    #[error("Cancelled")]
    Cancelled,
}

/// Outcome delivered to a waiter's callback
pub type WaitResult = Result<Vec<u8>, WaitError>;

/// Callback invoked exactly once per waiter
pub type WaitCallback = Box<dyn FnOnce(WaitResult) + Send>;

/// Identifies a registered waiter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaitHandle(u64);

struct PendingWait {
    handle: WaitHandle,
    expected: Vec<u8>,
    deadline: Option<Instant>,
    callback: WaitCallback,
}

/// FIFO queue of pending byte-sequence expectations
#[derive(Default)]
pub struct ResponseMatcher {
    pending: VecDeque<PendingWait>,
    next_id: u64,
}

impl ResponseMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an expectation
    ///
    /// An empty `expected` matches whatever is left of the next non-empty
    /// chunk.
    pub fn register(
        &mut self,
        expected: impl Into<Vec<u8>>,
        deadline: Option<Instant>,
        callback: impl FnOnce(WaitResult) + Send + 'static,
    ) -> WaitHandle {
        let handle = WaitHandle(self.next_id);
        self.next_id += 1;

        let expected = expected.into();
        trace!(?handle, expected = %bpio_core::hex_bytes(&expected), "Waiter registered");
        self.pending.push_back(PendingWait {
            handle,
            expected,
            deadline,
            callback: Box::new(callback),
        });
        handle
    }

    /// Register an expectation whose outcome is delivered on a oneshot channel
    pub fn register_channel(
        &mut self,
        expected: impl Into<Vec<u8>>,
        deadline: Option<Instant>,
    ) -> (WaitHandle, oneshot::Receiver<WaitResult>) {
        let (tx, rx) = oneshot::channel();
        let handle = self.register(expected, deadline, move |result| {
            // The waiting task may have gone away
            let _ = tx.send(result);
        });
        (handle, rx)
    }

    /// Match a chunk against the pending waiters
    ///
    /// Returns the bytes no waiter claimed, if any.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<Vec<u8>> {
        self.feed_at(chunk, Instant::now())
    }

    /// [`feed`](Self::feed) with an explicit clock; waiters whose deadline is
    /// at or before `now` are expired first.
    pub fn feed_at(&mut self, chunk: &[u8], now: Instant) -> Option<Vec<u8>> {
        if chunk.is_empty() {
            return None;
        }
        self.expire(now);

        let mut rest = chunk;
        let mut fired = Vec::new();
        let mut i = 0;

        while i < self.pending.len() && !rest.is_empty() {
            let expected_len = self.pending[i].expected.len();
            let take = if expected_len == 0 {
                rest.len()
            } else if rest.len() >= expected_len && rest.starts_with(&self.pending[i].expected) {
                expected_len
            } else {
                i += 1;
                continue;
            };

            if let Some(waiter) = self.pending.remove(i) {
                debug!(
                    handle = ?waiter.handle,
                    matched = %bpio_core::hex_bytes(&rest[..take]),
                    "Waiter matched"
                );
                fired.push((waiter.callback, rest[..take].to_vec()));
            }
            rest = &rest[take..];
        }

        for (callback, matched) in fired {
            callback(Ok(matched));
        }

        if rest.is_empty() {
            None
        } else {
            Some(rest.to_vec())
        }
    }

    /// Remove every waiter whose deadline has passed, failing each with
    /// [`WaitError::Timeout`]. Returns how many expired.
    pub fn expire(&mut self, now: Instant) -> usize {
        let mut expired = Vec::new();
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].deadline.is_some_and(|d| d <= now) {
                if let Some(waiter) = self.pending.remove(i) {
                    expired.push(waiter);
                }
            } else {
                i += 1;
            }
        }

        let count = expired.len();
        for waiter in expired {
            debug!(handle = ?waiter.handle, expected = %bpio_core::hex_bytes(&waiter.expected), "Waiter timed out");
            (waiter.callback)(Err(WaitError::Timeout));
        }
        count
    }

    /// Stop waiting; the callback receives [`WaitError::Cancelled`]
    ///
    /// Returns false if the waiter already resolved.
    pub fn cancel(&mut self, handle: WaitHandle) -> bool {
        let Some(pos) = self.pending.iter().position(|w| w.handle == handle) else {
            return false;
        };
        match self.pending.remove(pos) {
            Some(waiter) => {
                (waiter.callback)(Err(WaitError::Cancelled));
                true
            }
            None => false,
        }
    }

    /// Whether `handle` is still pending
    pub fn contains(&self, handle: WaitHandle) -> bool {
        self.pending.iter().any(|w| w.handle == handle)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
