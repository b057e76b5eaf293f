//! Status stream types.

use crate::reconciler::ReconcileOutcome;
use crate::types::{ConnectionState, NotificationId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for an observer.
#[derive(Clone, Debug)]
pub struct ObserverConfig {
    /// Max buffered events before dropping the observer.
    /// Default: 256
    pub buffer_size: usize,

    /// Filter criteria.
    pub filter: ObserverFilter,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            buffer_size: 256,
            filter: ObserverFilter::all(),
        }
    }
}

/// Which event families an observer receives.
#[derive(Clone, Debug, Default)]
pub struct ObserverFilter {
    /// Connection state changes.
    pub include_connection: bool,

    /// Unread counter changes.
    pub include_unread: bool,

    /// Reconciled events, rollbacks and resyncs.
    pub include_records: bool,

    /// Errors.
    pub include_errors: bool,
}

impl ObserverFilter {
    /// Connection toasts only.
    pub fn connection() -> Self {
        Self {
            include_connection: true,
            include_errors: true,
            ..Default::default()
        }
    }

    /// Badge updates only.
    pub fn unread() -> Self {
        Self {
            include_unread: true,
            ..Default::default()
        }
    }

    /// Everything.
    pub fn all() -> Self {
        Self {
            include_connection: true,
            include_unread: true,
            include_records: true,
            include_errors: true,
        }
    }

    pub(crate) fn matches(&self, event: &EngineEvent) -> bool {
        match event {
            EngineEvent::Connection { .. } => self.include_connection,
            EngineEvent::UnreadCount { .. } => self.include_unread,
            EngineEvent::Reconciled { .. }
            | EngineEvent::RolledBack { .. }
            | EngineEvent::Resynced { .. } => self.include_records,
            EngineEvent::Error { .. } => self.include_errors,
            EngineEvent::Dropped { .. } => true,
        }
    }
}

/// Events emitted to observers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    // --- Connection ---
    /// The realtime connection changed state.
    Connection { state: ConnectionState },

    // --- Cache ---
    /// The unread counter changed.
    UnreadCount { count: u64 },

    /// A realtime event was applied.
    Reconciled {
        id: NotificationId,
        outcome: ReconcileOutcome,
    },

    /// An optimistic mark-as-read was reverted.
    RolledBack { id: NotificationId },

    /// The cache was reloaded from the server after a failed batch mutation.
    Resynced { unread: u64 },

    // --- Failures ---
    /// An operation failed. `kind` is [`SyncError::kind`](crate::SyncError::kind).
    Error { kind: String, message: String },

    // --- Lifecycle ---
    /// The observer was dropped.
    Dropped { reason: DropReason },
}

/// Why an observer was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unsubscribed.
    Unsubscribed,
    /// The session was closed.
    SessionClosed,
}

/// Unique identifier for an observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);

/// Handle to receive status events.
pub struct ObserverHandle {
    pub id: ObserverId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<EngineEvent>,
}

impl ObserverHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<EngineEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<EngineEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<EngineEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Wait until an event satisfying `predicate` arrives, skipping others.
    ///
    /// Returns None if `timeout` elapses first or the stream ends.
    pub fn wait_for<F>(&self, timeout: Duration, mut predicate: F) -> Option<EngineEvent>
    where
        F: FnMut(&EngineEvent) -> bool,
    {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.checked_duration_since(std::time::Instant::now())?;
            match self.receiver.recv_timeout(remaining) {
                Ok(event) if predicate(&event) => return Some(event),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }
}
