//! Local notification cache.
//!
//! Holds the records fetched so far (newest first), the last pagination
//! descriptor and the unread counter. The counter lives next to the records
//! so that one call updates both.

mod counter;
mod store;

pub use counter::UnreadCounter;
pub use store::{NotificationCache, PageOutcome, Upsert};
