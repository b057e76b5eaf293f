//! Optimistic read-state transactions.

use crate::cache::NotificationCache;
use crate::types::NotificationId;

/// One optimistic `is_read` change: the snapshot taken before the forward
/// step, so the reverse step is mechanical.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadTransaction {
    id: NotificationId,
    /// `is_read` before the forward step; None if the id was not cached.
    previous: Option<bool>,
    target: bool,
}

impl ReadTransaction {
    /// Snapshot the record and apply the forward step.
    ///
    /// If the record is absent or already at `target`, nothing changes and
    /// [`applied`](Self::applied) reports false.
    pub fn begin(cache: &mut NotificationCache, id: NotificationId, target: bool) -> Self {
        let previous = cache.get(&id).map(|r| r.is_read);
        if previous.is_some_and(|was| was != target) {
            cache.set_read(&id, target);
        }
        Self {
            id,
            previous,
            target,
        }
    }

    pub fn id(&self) -> &NotificationId {
        &self.id
    }

    pub fn previous(&self) -> Option<bool> {
        self.previous
    }

    /// Whether the forward step changed the cache.
    pub fn applied(&self) -> bool {
        matches!(self.previous, Some(was) if was != self.target)
    }

    /// Whether the record was already at the target value.
    pub fn already_at_target(&self) -> bool {
        self.previous == Some(self.target)
    }

    /// Undo the forward step.
    ///
    /// Only reverts while the record still holds the value this transaction
    /// wrote; a record removed or rewritten by a realtime event in the
    /// meantime is left alone. Returns whether anything changed.
    pub fn revert(self, cache: &mut NotificationCache) -> bool {
        let Some(previous) = self.previous else {
            return false;
        };
        if !self.applied() {
            return false;
        }
        match cache.get(&self.id) {
            Some(current) if current.is_read == self.target => {
                cache.set_read(&self.id, previous);
                true
            }
            _ => false,
        }
    }
}
