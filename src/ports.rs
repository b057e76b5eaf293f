//! Collaborators the engine consumes.
//!
//! The engine never talks to the network itself. The embedding application
//! implements these traits on top of its HTTP client, realtime SDK, push
//! notification service and device-token storage.

use crate::error::BackendError;
use crate::types::{ChangeEvent, NotificationId, NotificationKind, NotificationRecord, Page};
use crossbeam_channel::{Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::warn;

/// REST side of the notification backend.
pub trait NotificationApi: Send + Sync {
    /// `GET notifications(page, page_size)`. Pages are 1-based.
    fn fetch_page(&self, page: u32, page_size: u32) -> Result<Page, BackendError>;

    /// `GET unreadCount()`.
    fn fetch_unread_count(&self) -> Result<u64, BackendError>;

    /// `PUT markRead(id)`. Returns the record as the server now sees it.
    fn mark_read(&self, id: &NotificationId) -> Result<NotificationRecord, BackendError>;

    /// `PUT markAllRead()`. `Ok(false)` is a soft refusal.
    fn mark_all_read(&self) -> Result<bool, BackendError>;
}

/// What a realtime subscription listens to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelFilter {
    /// Channel name, e.g. `notifications:user-1`.
    pub channel: String,
    /// Only rows owned by this user are delivered.
    pub user_id: String,
}

impl ChannelFilter {
    /// Filter for one user's notification stream.
    pub fn for_user(user_id: &str) -> Self {
        Self {
            channel: format!("notifications:{}", user_id),
            user_id: user_id.to_string(),
        }
    }
}

/// Messages a transport reports for one subscription.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportMessage {
    Connected,
    Disconnected,
    Error(String),
    /// The server asked the client to drop and re-establish the channel.
    ReconnectRequested,
    Change(ChangeEvent),
}

/// Where a transport pushes messages for one subscription.
///
/// Every subscription gets its own generation so messages from a
/// superseded subscription can be told apart and ignored.
#[derive(Clone, Debug)]
pub struct TransportSink {
    generation: u64,
    sender: Sender<(u64, TransportMessage)>,
    /// The supervisor thread draining `sender`. Must be called from it.
    consumer: ThreadId,
}

impl TransportSink {
    /// Must be called on the thread that drains `sender`.
    pub(crate) fn new(generation: u64, sender: Sender<(u64, TransportMessage)>) -> Self {
        Self {
            generation,
            sender,
            consumer: thread::current().id(),
        }
    }

    /// Generation of the subscription this sink belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver a message. Blocks while the supervisor's buffer is full.
    ///
    /// Called synchronously from inside [`RealtimeTransport::open`] (on the
    /// supervisor thread) it never blocks: a message that does not fit is
    /// dropped and logged. Returns false if the message was not queued or
    /// the supervisor has shut down.
    pub fn send(&self, message: TransportMessage) -> bool {
        if thread::current().id() != self.consumer {
            return self.sender.send((self.generation, message)).is_ok();
        }
        match self.sender.try_send((self.generation, message)) {
            Ok(()) => true,
            Err(TrySendError::Full((_, message))) => {
                warn!(
                    generation = self.generation,
                    ?message,
                    "transport buffer full during open, message dropped"
                );
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn connected(&self) -> bool {
        self.send(TransportMessage::Connected)
    }

    pub fn disconnected(&self) -> bool {
        self.send(TransportMessage::Disconnected)
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.send(TransportMessage::Error(message.into()))
    }

    pub fn reconnect_requested(&self) -> bool {
        self.send(TransportMessage::ReconnectRequested)
    }

    pub fn change(&self, event: ChangeEvent) -> bool {
        self.send(TransportMessage::Change(event))
    }
}

/// An open realtime subscription.
pub trait ChannelSubscription: Send {
    /// Stop delivery. Must be safe to call more than once.
    fn close(&mut self);
}

/// Realtime channel provider.
pub trait RealtimeTransport: Send + Sync {
    /// Open a subscription. Lifecycle and data messages flow through `sink`.
    ///
    /// An `Err` means the subscription could not even be requested.
    ///
    /// Runs on the supervisor thread, which is also the only reader of
    /// `sink`. Messages sent before `open` returns are limited to the
    /// configured `transport_buffer`; any beyond that are dropped. Deliver
    /// bulk backlogs from the transport's own thread instead.
    fn open(
        &self,
        filter: &ChannelFilter,
        sink: TransportSink,
    ) -> Result<Box<dyn ChannelSubscription>, BackendError>;
}

/// Payload handed to the push dispatcher for user-visible delivery.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PushNotification {
    pub title: String,
    pub body: String,
    pub kind: NotificationKind,
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl From<&NotificationRecord> for PushNotification {
    fn from(record: &NotificationRecord) -> Self {
        Self {
            title: record.title.clone(),
            body: record.body.clone(),
            kind: record.kind,
            payload: record.payload.clone(),
        }
    }
}

/// Local/system notification presenter. Best-effort.
pub trait PushDispatcher: Send + Sync {
    fn present(&self, notification: &PushNotification) -> Result<(), BackendError>;
}

/// Registers this device for push delivery.
pub trait DeviceRegistry: Send + Sync {
    fn register(&self, user_id: &str) -> Result<(), BackendError>;
    fn unregister(&self, user_id: &str) -> Result<(), BackendError>;
}

/// Dispatcher that drops every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopPush;

impl PushDispatcher for NoopPush {
    fn present(&self, _notification: &PushNotification) -> Result<(), BackendError> {
        Ok(())
    }
}

/// Registry for sessions that do not use push delivery.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopDevices;

impl DeviceRegistry for NoopDevices {
    fn register(&self, _user_id: &str) -> Result<(), BackendError> {
        Ok(())
    }

    fn unregister(&self, _user_id: &str) -> Result<(), BackendError> {
        Ok(())
    }
}

/// The set of collaborators a session runs against.
#[derive(Clone)]
pub struct Backends {
    pub api: Arc<dyn NotificationApi>,
    pub transport: Arc<dyn RealtimeTransport>,
    pub push: Arc<dyn PushDispatcher>,
    pub devices: Arc<dyn DeviceRegistry>,
}

impl Backends {
    /// Backends without push delivery or device registration.
    pub fn new(api: Arc<dyn NotificationApi>, transport: Arc<dyn RealtimeTransport>) -> Self {
        Self {
            api,
            transport,
            push: Arc::new(NoopPush),
            devices: Arc::new(NoopDevices),
        }
    }

    pub fn with_push(mut self, push: Arc<dyn PushDispatcher>) -> Self {
        self.push = push;
        self
    }

    pub fn with_devices(mut self, devices: Arc<dyn DeviceRegistry>) -> Self {
        self.devices = devices;
        self
    }
}
