//! Stream events handed off to a consumer thread.
//!
//! The stream pushes immutable [`StreamEvent`] values into a bounded
//! channel. Consumers own draining the channel and marshalling events into
//! their own runtime. A full channel never blocks the I/O worker: the event
//! is dropped and counted instead.

use crate::state::StreamState;
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Notifications emitted by a stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A lifecycle transition completed.
    StateChanged {
        /// State after the transition
        state: StreamState,
    },

    /// The mark position was reached.
    MarkReached {
        /// Registered mark frame
        frame: u64,
    },

    /// A period boundary was crossed.
    PeriodReached {
        /// Frame of the crossed boundary
        frame: u64,
    },

    /// The render worker found no queued data within one poll interval.
    Underrun {
        /// Frames delivered so far
        position: u64,
    },

    /// The capture worker overwrote the oldest unread buffer.
    Overrun {
        /// Bytes of captured audio discarded
        dropped_bytes: usize,
    },

    /// The backend failed; the stream is stopped and must be released.
    BackendFailed {
        /// Description of the failure
        error: String,
    },
}

/// Sending half of the event channel plus a drop counter.
#[derive(Debug)]
pub struct EventBus {
    tx: Sender<StreamEvent>,
    rx: Receiver<StreamEvent>,
    dropped: AtomicU64,
}

impl EventBus {
    /// Create a channel holding at most `capacity` undelivered events
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = channel::bounded(capacity.max(1));
        Self {
            tx,
            rx,
            dropped: AtomicU64::new(0),
        }
    }

    /// Emit without blocking. Returns `false` if the event was dropped.
    pub fn emit(&self, event: StreamEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!(?event, "event channel full, dropping");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// A receiver for emitted events. All receivers share one queue.
    pub fn subscribe(&self) -> Receiver<StreamEvent> {
        self.rx.clone()
    }

    /// Number of events dropped because the channel was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
