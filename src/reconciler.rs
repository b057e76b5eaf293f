//! Realtime event reconciliation.
//!
//! Merges INSERT/UPDATE/DELETE events into the cache. Inserts and updates
//! are both upserts underneath: an INSERT for a cached id (fetch and realtime
//! raced) becomes an update, and an UPDATE for an unknown id (the owning page
//! is not loaded yet) becomes an insert.

use crate::cache::{NotificationCache, Upsert};
use crate::types::{ChangeEvent, ChangeKind, NotificationId};
use serde::{Deserialize, Serialize};

/// Direction of an `is_read` change caused by an update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadTransition {
    None,
    MarkedRead,
    MarkedUnread,
}

impl ReadTransition {
    fn between(was_read: bool, now_read: bool) -> Self {
        match (was_read, now_read) {
            (false, true) => ReadTransition::MarkedRead,
            (true, false) => ReadTransition::MarkedUnread,
            _ => ReadTransition::None,
        }
    }
}

/// What reconciling one event did to the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// A new record was prepended.
    Inserted,
    /// An existing record was replaced in place.
    Updated { transition: ReadTransition },
    /// A record was removed.
    Removed { was_unread: bool },
    /// Nothing to do (DELETE for an unknown id).
    Ignored,
}

impl ReconcileOutcome {
    /// Whether the user should be shown this record as a new notification.
    pub fn is_new(&self) -> bool {
        matches!(self, ReconcileOutcome::Inserted)
    }
}

/// Apply one event to the cache and its counter.
///
/// Must be called on the session's serialized mutation path.
pub fn reconcile(cache: &mut NotificationCache, event: ChangeEvent) -> ReconcileOutcome {
    match event.kind {
        ChangeKind::Insert | ChangeKind::Update => upsert(cache, event),
        ChangeKind::Delete => delete(cache, &event.record.id),
    }
}

fn upsert(cache: &mut NotificationCache, event: ChangeEvent) -> ReconcileOutcome {
    let now_read = event.record.is_read;
    match cache.upsert(event.record) {
        Upsert::Inserted => ReconcileOutcome::Inserted,
        Upsert::Replaced(previous) => ReconcileOutcome::Updated {
            transition: ReadTransition::between(previous.is_read, now_read),
        },
    }
}

fn delete(cache: &mut NotificationCache, id: &NotificationId) -> ReconcileOutcome {
    match cache.remove(id) {
        Some(removed) => ReconcileOutcome::Removed {
            was_unread: !removed.is_read,
        },
        None => ReconcileOutcome::Ignored,
    }
}
