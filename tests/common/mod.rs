//! In-memory backends shared by the integration tests.

#![allow(dead_code)]

use crossbeam_channel::{unbounded, Receiver, Sender};
use notification_sync::{
    BackendError, Backends, ChangeEvent, ChannelFilter, ChannelSubscription, DeviceRegistry, NotificationApi,
    NotificationId, NotificationKind, NotificationRecord, NotificationSession, Page, Pagination,
    PushDispatcher, PushNotification, RealtimeTransport, ReconnectPolicy, SyncConfig, Timestamp,
    TransportSink,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(2);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A record with a deterministic timestamp.
pub fn record(id: &str, is_read: bool) -> NotificationRecord {
    let mut r = NotificationRecord::new(id, NotificationKind::Message, format!("title {}", id), "body")
        .with_created_at(Timestamp(1_700_000_000_000_000));
    r.is_read = is_read;
    r
}

/// `count` records named `n-0..n-{count}`; the first `unread` are unread.
pub fn records(count: usize, unread: usize) -> Vec<NotificationRecord> {
    (0..count)
        .map(|i| record(&format!("n-{}", i), i >= unread))
        .collect()
}

/// Config with short timings for tests; the reconnect floor is lowered to
/// `reconnect`.
pub fn test_config(reconnect: Duration) -> SyncConfig {
    SyncConfig {
        page_size: 5,
        reconnect: ReconnectPolicy::fixed(reconnect).with_test_floor(reconnect),
        ..Default::default()
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

// --- REST backend ---

/// Lets a test hold `mark_read` open until it decides to release it.
pub struct Gate {
    pub entered: Receiver<()>,
    pub release: Sender<()>,
}

/// Server-side notification list with failure injection.
pub struct FakeApi {
    /// Server records, newest first.
    pub server: Mutex<Vec<NotificationRecord>>,
    /// Unread count to report instead of counting `server`.
    pub unread_override: Mutex<Option<u64>>,
    pub fail_fetch: Mutex<Option<BackendError>>,
    pub fail_mark_read: Mutex<Option<BackendError>>,
    pub mark_all_response: Mutex<Result<bool, BackendError>>,
    pub fetch_calls: AtomicUsize,
    pub mark_read_calls: AtomicUsize,
    pub mark_all_calls: AtomicUsize,
    gate: Mutex<Option<(Sender<()>, Receiver<()>)>>,
}

impl FakeApi {
    pub fn new(server: Vec<NotificationRecord>) -> Arc<Self> {
        Arc::new(Self {
            server: Mutex::new(server),
            unread_override: Mutex::new(None),
            fail_fetch: Mutex::new(None),
            fail_mark_read: Mutex::new(None),
            mark_all_response: Mutex::new(Ok(true)),
            fetch_calls: AtomicUsize::new(0),
            mark_read_calls: AtomicUsize::new(0),
            mark_all_calls: AtomicUsize::new(0),
            gate: Mutex::new(None),
        })
    }

    /// Block every `mark_read` call until the gate is released once per call.
    pub fn hold_mark_read(&self) -> Gate {
        let (entered_tx, entered_rx) = unbounded();
        let (release_tx, release_rx) = unbounded();
        *self.gate.lock() = Some((entered_tx, release_rx));
        Gate {
            entered: entered_rx,
            release: release_tx,
        }
    }

    pub fn server_unread(&self) -> u64 {
        self.server.lock().iter().filter(|r| !r.is_read).count() as u64
    }
}

impl NotificationApi for FakeApi {
    fn fetch_page(&self, page: u32, page_size: u32) -> Result<Page, BackendError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.fail_fetch.lock().clone() {
            return Err(e);
        }

        let server = self.server.lock();
        let size = page_size as usize;
        let start = (page as usize - 1) * size;
        let total_pages = server.len().div_ceil(size) as u32;
        let records = server.iter().skip(start).take(size).cloned().collect();

        Ok(Page {
            records,
            pagination: Pagination {
                page_size,
                current_page: page,
                total_items: server.len() as u64,
                total_pages,
                has_next: page < total_pages,
                has_prev: page > 1,
            },
        })
    }

    fn fetch_unread_count(&self) -> Result<u64, BackendError> {
        if let Some(e) = self.fail_fetch.lock().clone() {
            return Err(e);
        }
        Ok(self.unread_override.lock().unwrap_or_else(|| self.server_unread()))
    }

    fn mark_read(&self, id: &NotificationId) -> Result<NotificationRecord, BackendError> {
        self.mark_read_calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.gate.lock().clone();
        if let Some((entered, release)) = gate {
            let _ = entered.send(());
            let _ = release.recv_timeout(WAIT);
        }

        if let Some(e) = self.fail_mark_read.lock().clone() {
            return Err(e);
        }

        let mut server = self.server.lock();
        match server.iter_mut().find(|r| &r.id == id) {
            Some(r) => {
                r.is_read = true;
                Ok(r.clone())
            }
            None => Err(BackendError::Rejected {
                status: 404,
                message: format!("{} not found", id),
            }),
        }
    }

    fn mark_all_read(&self) -> Result<bool, BackendError> {
        self.mark_all_calls.fetch_add(1, Ordering::SeqCst);
        let response = self.mark_all_response.lock().clone();
        if let Ok(true) = response {
            for r in self.server.lock().iter_mut() {
                r.is_read = true;
            }
        }
        response
    }
}

// --- Realtime transport ---

struct FakeSubscription {
    closes: Arc<AtomicUsize>,
    closed: bool,
}

impl ChannelSubscription for FakeSubscription {
    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// One `open` call as seen by the transport.
#[derive(Clone)]
pub struct OpenCall {
    pub at: Instant,
    pub filter: ChannelFilter,
    pub sink: TransportSink,
}

/// Transport that records every open and lets the test drive callbacks.
pub struct FakeTransport {
    pub opens: Mutex<Vec<OpenCall>>,
    pub closes: Arc<AtomicUsize>,
    pub fail_open: Mutex<Option<BackendError>>,
    /// Report `Connected` as soon as a subscription opens.
    pub auto_connect: bool,
    /// Unread inserts to emit synchronously from inside `open`.
    pub burst_on_open: Mutex<usize>,
    /// Sends the sink refused.
    pub refused_sends: AtomicUsize,
}

impl FakeTransport {
    pub fn new(auto_connect: bool) -> Arc<Self> {
        Arc::new(Self {
            opens: Mutex::new(Vec::new()),
            closes: Arc::new(AtomicUsize::new(0)),
            fail_open: Mutex::new(None),
            auto_connect,
            burst_on_open: Mutex::new(0),
            refused_sends: AtomicUsize::new(0),
        })
    }

    pub fn open_count(&self) -> usize {
        self.opens.lock().len()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Sink of the most recent subscription.
    pub fn sink(&self) -> TransportSink {
        self.opens
            .lock()
            .last()
            .map(|call| call.sink.clone())
            .expect("no subscription opened")
    }

    pub fn last_open(&self) -> OpenCall {
        self.opens.lock().last().cloned().expect("no subscription opened")
    }
}

impl RealtimeTransport for FakeTransport {
    fn open(
        &self,
        filter: &ChannelFilter,
        sink: TransportSink,
    ) -> Result<Box<dyn ChannelSubscription>, BackendError> {
        if let Some(e) = self.fail_open.lock().clone() {
            return Err(e);
        }
        self.opens.lock().push(OpenCall {
            at: Instant::now(),
            filter: filter.clone(),
            sink: sink.clone(),
        });
        if self.auto_connect {
            sink.connected();
        }
        for i in 0..*self.burst_on_open.lock() {
            let event = ChangeEvent::insert(record(&format!("burst-{}", i), false));
            if !sink.change(event) {
                self.refused_sends.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(Box::new(FakeSubscription {
            closes: Arc::clone(&self.closes),
            closed: false,
        }))
    }
}

// --- Push and device registry ---

#[derive(Default)]
pub struct RecordingPush {
    pub presented: Mutex<Vec<PushNotification>>,
    pub fail: Mutex<bool>,
}

impl PushDispatcher for RecordingPush {
    fn present(&self, notification: &PushNotification) -> Result<(), BackendError> {
        if *self.fail.lock() {
            return Err(BackendError::Unavailable("notifications disabled".into()));
        }
        self.presented.lock().push(notification.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingDevices {
    pub registered: Mutex<Vec<String>>,
    pub unregistered: Mutex<Vec<String>>,
}

impl DeviceRegistry for RecordingDevices {
    fn register(&self, user_id: &str) -> Result<(), BackendError> {
        self.registered.lock().push(user_id.to_string());
        Ok(())
    }

    fn unregister(&self, user_id: &str) -> Result<(), BackendError> {
        self.unregistered.lock().push(user_id.to_string());
        Ok(())
    }
}

// --- Harness ---

pub struct Harness {
    pub api: Arc<FakeApi>,
    pub transport: Arc<FakeTransport>,
    pub push: Arc<RecordingPush>,
    pub devices: Arc<RecordingDevices>,
}

impl Harness {
    pub fn new(server: Vec<NotificationRecord>) -> Self {
        init_tracing();
        Self {
            api: FakeApi::new(server),
            transport: FakeTransport::new(true),
            push: Arc::new(RecordingPush::default()),
            devices: Arc::new(RecordingDevices::default()),
        }
    }

    pub fn with_transport(mut self, transport: Arc<FakeTransport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn backends(&self) -> Backends {
        Backends::new(self.api.clone(), self.transport.clone())
            .with_push(self.push.clone())
            .with_devices(self.devices.clone())
    }

    /// A started session for `user-1`.
    pub fn session(&self, config: SyncConfig) -> NotificationSession {
        let session = NotificationSession::new("user-1", self.backends(), config).unwrap();
        session.start().unwrap();
        session
    }
}
