//! Optimistic read-state mutations.
//!
//! Each mark-as-read is a [`ReadTransaction`]: the cache changes
//! immediately, the backend confirms afterwards, and a rejection replays the
//! reverse step. [`InFlightReadSet`] keeps a second request for the same id
//! from starting while the first is outstanding.
//!
//! Mark-all-read has no transaction. On rejection the session resyncs from
//! the server instead of restoring each record.

mod in_flight;
mod transaction;

pub use in_flight::InFlightReadSet;
pub use transaction::ReadTransaction;

use serde::{Deserialize, Serialize};

/// Result of a successful `mark_as_read` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkOutcome {
    /// The backend confirmed the change.
    Confirmed,
    /// The record was already read; nothing was sent.
    AlreadyRead,
    /// A request for the same id is still running; this call did nothing.
    AlreadyInFlight,
}

/// Result of a successful `mark_all_as_read` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkAllOutcome {
    /// Cached records flipped to read by the optimistic step.
    pub marked: usize,
}
