//! Notification cache implementation.

use super::counter::UnreadCounter;
use crate::types::{NotificationId, NotificationRecord, Page, Pagination};
use std::collections::HashSet;

/// Result of applying one fetched page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageOutcome {
    /// Page number that was applied.
    pub page: u32,
    /// Records added to the cache.
    pub inserted: usize,
    /// Records dropped because their id was already cached.
    pub skipped_duplicates: usize,
    /// Whether the server reports a further page.
    pub has_next: bool,
}

/// What an upsert did.
#[derive(Clone, Debug, PartialEq)]
pub enum Upsert {
    Inserted,
    /// Replaced in place; carries the previous version.
    Replaced(NotificationRecord),
}

/// Ordered, de-duplicated notification records plus pagination and the
/// unread counter.
///
/// Records are kept newest-first. Every method that changes the unread
/// population adjusts the counter in the same call, so no caller can observe
/// one without the other.
#[derive(Debug, Default)]
pub struct NotificationCache {
    /// Records, newest first.
    records: Vec<NotificationRecord>,

    /// Ids currently in `records`.
    ids: HashSet<NotificationId>,

    /// Last pagination descriptor received.
    pagination: Pagination,

    /// Unread counter.
    unread: UnreadCounter,
}

impl NotificationCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    // --- Reads ---

    pub fn records(&self) -> &[NotificationRecord] {
        &self.records
    }

    pub fn get(&self, id: &NotificationId) -> Option<&NotificationRecord> {
        self.position(id).map(|pos| &self.records[pos])
    }

    pub fn contains(&self, id: &NotificationId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn pagination(&self) -> &Pagination {
        &self.pagination
    }

    /// Current value of the unread counter.
    pub fn unread_count(&self) -> u64 {
        self.unread.get()
    }

    /// Unread records actually present in the cache (full scan).
    pub fn local_unread(&self) -> u64 {
        self.records.iter().filter(|r| !r.is_read).count() as u64
    }

    fn position(&self, id: &NotificationId) -> Option<usize> {
        if !self.ids.contains(id) {
            return None;
        }
        self.records.iter().position(|r| &r.id == id)
    }

    // --- Pages ---

    /// Replace all records with the first page. The counter is recomputed
    /// from the new records.
    pub fn replace_with_first_page(&mut self, page: Page) -> PageOutcome {
        self.records.clear();
        self.ids.clear();

        let total = page.records.len();
        for record in page.records {
            if self.ids.insert(record.id.clone()) {
                self.records.push(record);
            }
        }

        self.pagination = page.pagination;
        self.unread.set(self.local_unread());

        PageOutcome {
            page: self.pagination.current_page,
            inserted: self.records.len(),
            skipped_duplicates: total - self.records.len(),
            has_next: self.pagination.has_next,
        }
    }

    /// Append a later page, skipping ids that are already cached.
    ///
    /// The counter is left alone: the server-side unread count already
    /// covers records on pages not yet fetched.
    pub fn append_page(&mut self, page: Page) -> PageOutcome {
        let mut inserted = 0;
        let mut skipped = 0;

        for record in page.records {
            if self.ids.insert(record.id.clone()) {
                self.records.push(record);
                inserted += 1;
            } else {
                skipped += 1;
            }
        }

        self.pagination = page.pagination;

        PageOutcome {
            page: self.pagination.current_page,
            inserted,
            skipped_duplicates: skipped,
            has_next: self.pagination.has_next,
        }
    }

    // --- Record mutations ---

    /// Insert at the front if absent, otherwise replace in place.
    pub fn upsert(&mut self, record: NotificationRecord) -> Upsert {
        match self.position(&record.id) {
            Some(pos) => {
                let previous = std::mem::replace(&mut self.records[pos], record);
                self.unread
                    .apply_transition(!previous.is_read, !self.records[pos].is_read);
                Upsert::Replaced(previous)
            }
            None => {
                if !record.is_read {
                    self.unread.increment();
                }
                self.ids.insert(record.id.clone());
                self.records.insert(0, record);
                Upsert::Inserted
            }
        }
    }

    /// Remove by id. Returns the removed record, if it was cached.
    pub fn remove(&mut self, id: &NotificationId) -> Option<NotificationRecord> {
        let pos = self.position(id)?;
        let removed = self.records.remove(pos);
        self.ids.remove(id);
        if !removed.is_read {
            self.unread.decrement();
        }
        Some(removed)
    }

    /// Set `is_read` and return the previous value, or None if not cached.
    pub fn set_read(&mut self, id: &NotificationId, value: bool) -> Option<bool> {
        let pos = self.position(id)?;
        let record = &mut self.records[pos];
        let previous = record.is_read;
        record.is_read = value;
        self.unread.apply_transition(!previous, !value);
        Some(previous)
    }

    /// Mark every cached record read and zero the counter.
    ///
    /// Returns the ids that changed.
    pub fn mark_all_read(&mut self) -> Vec<NotificationId> {
        let mut changed = Vec::new();
        for record in self.records.iter_mut().filter(|r| !r.is_read) {
            record.is_read = true;
            changed.push(record.id.clone());
        }
        self.unread.set(0);
        changed
    }

    /// Overwrite the counter with an authoritative server value.
    pub fn set_unread_count(&mut self, count: u64) {
        self.unread.set(count);
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.records.clear();
        self.ids.clear();
        self.pagination = Pagination::default();
        self.unread.set(0);
    }
}
