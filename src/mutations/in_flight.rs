//! Bookkeeping of mark-as-read round-trips in progress.

use crate::types::NotificationId;
use std::collections::HashSet;

/// Ids with a mark-as-read confirmation outstanding.
#[derive(Debug, Default)]
pub struct InFlightReadSet {
    ids: HashSet<NotificationId>,
}

impl InFlightReadSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `id`. Returns false if a round-trip for it is already running.
    pub fn try_claim(&mut self, id: &NotificationId) -> bool {
        self.ids.insert(id.clone())
    }

    pub fn release(&mut self, id: &NotificationId) -> bool {
        self.ids.remove(id)
    }

    pub fn contains(&self, id: &NotificationId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
