//! Core types for the notification engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Server-assigned notification identifier.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub String);

impl NotificationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NotificationId({})", self.0)
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NotificationId {
    fn from(s: &str) -> Self {
        NotificationId(s.to_string())
    }
}

impl From<String> for NotificationId {
    fn from(s: String) -> Self {
        NotificationId(s)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or_default();
        Timestamp(micros)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Category of a notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Event,
    News,
    FriendRequest,
    Message,
    System,
    Announcement,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NotificationKind::Event => "event",
            NotificationKind::News => "news",
            NotificationKind::FriendRequest => "friend_request",
            NotificationKind::Message => "message",
            NotificationKind::System => "system",
            NotificationKind::Announcement => "announcement",
        };
        f.write_str(name)
    }
}

/// A single notification as cached on the device.
///
/// Everything but `is_read` is immutable once the server assigns the id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: NotificationId,
    pub title: String,
    pub body: String,
    pub kind: NotificationKind,
    pub is_read: bool,

    /// Application-defined data carried with the notification.
    #[serde(default)]
    pub payload: serde_json::Map<String, serde_json::Value>,

    pub created_at: Timestamp,

    /// Event this notification points at, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_event_id: Option<String>,
}

impl NotificationRecord {
    /// Create an unread record with an empty payload.
    pub fn new(
        id: impl Into<NotificationId>,
        kind: NotificationKind,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            kind,
            is_read: false,
            payload: serde_json::Map::new(),
            created_at: Timestamp::now(),
            related_event_id: None,
        }
    }

    pub fn read(mut self) -> Self {
        self.is_read = true;
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Map<String, serde_json::Value>) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_created_at(mut self, created_at: Timestamp) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_related_event(mut self, event_id: impl Into<String>) -> Self {
        self.related_event_id = Some(event_id.into());
        self
    }
}

/// Pagination descriptor as reported by the server.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page_size: u32,
    pub current_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

/// One response of the paged fetch API.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub records: Vec<NotificationRecord>,
    pub pagination: Pagination,
}

/// Kind of change carried by a realtime event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A single data event from the realtime channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub record: NotificationRecord,
}

impl ChangeEvent {
    pub fn insert(record: NotificationRecord) -> Self {
        Self {
            kind: ChangeKind::Insert,
            record,
        }
    }

    pub fn update(record: NotificationRecord) -> Self {
        Self {
            kind: ChangeKind::Update,
            record,
        }
    }

    pub fn delete(record: NotificationRecord) -> Self {
        Self {
            kind: ChangeKind::Delete,
            record,
        }
    }
}

/// Lifecycle state of the realtime connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        };
        f.write_str(name)
    }
}
