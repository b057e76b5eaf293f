//! Status stream for the UI layer.
//!
//! Observers receive connection changes (for "connecting…/offline" toasts),
//! unread counter changes (for badges), reconciled events, rollbacks,
//! resyncs and errors. Each observer has a bounded buffer; an observer that
//! falls behind is dropped instead of slowing the engine down.
//!
//! # Example
//!
//! ```ignore
//! let handle = session.observe();
//!
//! loop {
//!     match handle.recv() {
//!         Ok(EngineEvent::Connection { state }) => show_toast(state),
//!         Ok(EngineEvent::UnreadCount { count }) => set_badge(count),
//!         Ok(EngineEvent::Dropped { .. }) | Err(_) => break,
//!         Ok(_) => {}
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::StatusBroadcaster;
pub use types::{
    DropReason, EngineEvent, ObserverConfig, ObserverFilter, ObserverHandle, ObserverId,
};
