//! Unread counter.

/// Number of unread notifications.
///
/// Adjusted by exact deltas as the cache changes; overwritten only by a
/// page-1 scan or an authoritative server count. Never goes below zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UnreadCounter(u64);

impl UnreadCounter {
    pub fn new(value: u64) -> Self {
        UnreadCounter(value)
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    pub fn increment(&mut self) {
        self.0 = self.0.saturating_add(1);
    }

    /// Decrement, clamped at zero.
    pub fn decrement(&mut self) {
        self.0 = self.0.saturating_sub(1);
    }

    /// Apply the delta of one `is_read` transition.
    ///
    /// `was_unread`/`now_unread` describe the record before and after; absent
    /// records count as read.
    pub fn apply_transition(&mut self, was_unread: bool, now_unread: bool) {
        match (was_unread, now_unread) {
            (false, true) => self.increment(),
            (true, false) => self.decrement(),
            _ => {}
        }
    }

    pub fn set(&mut self, value: u64) {
        self.0 = value;
    }
}
