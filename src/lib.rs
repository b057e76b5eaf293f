//! # Notification Sync
//!
//! A session-scoped notification engine for a mobile client: a paginated
//! local cache of a user's notifications, an unread counter kept consistent
//! with it, live reconciliation of realtime insert/update/delete events,
//! optimistic read-state mutations with rollback, and a supervised realtime
//! connection that reconnects on its own.
//!
//! ## Core Concepts
//!
//! - **Cache**: Newest-first records plus pagination and the unread counter
//! - **Reconciler**: Merges realtime changes without duplicating records
//! - **Mutations**: Optimistic mark-as-read transactions with rollback
//! - **Connection**: State machine owning the subscription and reconnect timer
//! - **Status**: Observable stream of connection, badge and error events
//!
//! ## Example
//!
//! ```ignore
//! use notification_sync::{Backends, NotificationSession, SyncConfig};
//!
//! let session = NotificationSession::open(
//!     "user-1",
//!     Backends::new(api, transport).with_push(push),
//!     SyncConfig::default(),
//! )?;
//!
//! let badge = session.unread_count();
//! session.mark_as_read(&"n-17".into())?;
//! session.load_next_page()?;
//!
//! // Sign-out
//! session.close();
//! ```

pub mod cache;
pub mod config;
pub mod connection;
pub mod error;
pub mod mutations;
pub mod ports;
pub mod reconciler;
pub mod session;
pub mod status;
pub mod types;

// Re-exports
pub use cache::{NotificationCache, PageOutcome, UnreadCounter, Upsert};
pub use config::{ReconnectPolicy, SyncConfig, RECONNECT_FLOOR};
pub use connection::{ChangeHandler, ConnectionMachine, ConnectionSupervisor};
pub use error::{BackendError, Result, SyncError};
pub use mutations::{InFlightReadSet, MarkAllOutcome, MarkOutcome, ReadTransaction};
pub use ports::{
    Backends, ChannelFilter, ChannelSubscription, DeviceRegistry, NoopDevices, NoopPush,
    NotificationApi, PushDispatcher, PushNotification, RealtimeTransport, TransportMessage,
    TransportSink,
};
pub use reconciler::{reconcile, ReadTransition, ReconcileOutcome};
pub use session::NotificationSession;
pub use status::{
    DropReason, EngineEvent, ObserverConfig, ObserverFilter, ObserverHandle, ObserverId,
    StatusBroadcaster,
};
pub use types::*;
