//! Session-scoped notification engine tying all components together.

use crate::cache::{NotificationCache, PageOutcome};
use crate::config::SyncConfig;
use crate::connection::{ChangeHandler, ConnectionSupervisor};
use crate::error::{BackendError, Result, SyncError};
use crate::mutations::{InFlightReadSet, MarkAllOutcome, MarkOutcome, ReadTransaction};
use crate::ports::{Backends, DeviceRegistry, NotificationApi, PushDispatcher, PushNotification};
use crate::reconciler::{reconcile, ReconcileOutcome};
use crate::status::{ObserverConfig, ObserverHandle, StatusBroadcaster};
use crate::types::{ChangeEvent, ConnectionState, NotificationId, NotificationRecord, Pagination};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything behind the serialized mutation path.
#[derive(Default)]
struct SessionState {
    cache: NotificationCache,
    in_flight: InFlightReadSet,
    /// Pages with a fetch outstanding.
    loading: HashSet<u32>,
    /// Bumped on close; results computed under an older epoch are dropped.
    epoch: u64,
    closed: bool,
}

/// State shared with the connection supervisor thread.
struct Shared {
    /// Single lock every cache mutation goes through.
    state: Mutex<SessionState>,
    api: Arc<dyn NotificationApi>,
    push: Arc<dyn PushDispatcher>,
    /// Counter events are published while `state` is held, so observers
    /// see them in commit order.
    status: Arc<StatusBroadcaster>,
    present_inserts: bool,
}

impl Shared {
    fn apply_event(&self, event: ChangeEvent) -> Result<ReconcileOutcome> {
        let id = event.record.id.clone();
        let push = self
            .present_inserts
            .then(|| PushNotification::from(&event.record));

        let outcome = {
            let mut state = self.state.lock();
            if state.closed {
                debug!(id = %id, "dropping realtime change for closed session");
                return Err(SyncError::SessionClosed);
            }
            let before = state.cache.unread_count();
            let outcome = reconcile(&mut state.cache, event);
            let after = state.cache.unread_count();

            debug!(id = %id, ?outcome, unread = after, "reconciled realtime change");
            self.status.reconciled(id.clone(), outcome);
            if before != after {
                self.status.unread_count(after);
            }
            outcome
        };

        if let (true, Some(notification)) = (outcome.is_new(), push) {
            if let Err(e) = self.push.present(&notification) {
                warn!(id = %id, error = %e, "push dispatch failed");
            }
        }
        Ok(outcome)
    }

    fn release(&self, id: &NotificationId) {
        self.state.lock().in_flight.release(id);
    }
}

impl ChangeHandler for Shared {
    fn handle_change(&self, event: ChangeEvent) {
        let _ = self.apply_event(event);
    }
}

/// Releases an in-flight id however the round-trip ends.
struct InFlightGuard<'a> {
    shared: &'a Shared,
    id: NotificationId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.shared.release(&self.id);
    }
}

/// The notification engine for one signed-in user.
///
/// Owns the cache, the unread counter, the in-flight set and the realtime
/// connection. Every cache mutation (page loads, realtime events, optimistic
/// changes and their rollbacks) goes through one lock; backend calls run
/// outside it. Created at sign-in, closed at sign-out.
pub struct NotificationSession {
    user_id: String,
    config: SyncConfig,
    shared: Arc<Shared>,
    devices: Arc<dyn DeviceRegistry>,
    supervisor: ConnectionSupervisor,
}

impl NotificationSession {
    /// Create a session. No backend call is made until [`start`](Self::start).
    pub fn new(
        user_id: impl Into<String>,
        backends: Backends,
        config: SyncConfig,
    ) -> Result<Self> {
        config.validate()?;

        let status = Arc::new(StatusBroadcaster::with_buffer(config.status_buffer));
        let shared = Arc::new(Shared {
            state: Mutex::new(SessionState::default()),
            api: backends.api,
            push: backends.push,
            status: Arc::clone(&status),
            present_inserts: config.present_inserts,
        });

        let handler: Arc<dyn ChangeHandler> = Arc::clone(&shared) as Arc<dyn ChangeHandler>;
        let supervisor = ConnectionSupervisor::spawn(
            backends.transport,
            handler,
            status,
            config.reconnect.clone(),
            config.transport_buffer,
        )?;

        Ok(Self {
            user_id: user_id.into(),
            config,
            shared,
            devices: backends.devices,
            supervisor,
        })
    }

    /// Create and start a session.
    ///
    /// Only setup failures are returned; a failed initial load leaves an
    /// empty, subscribed session that can be refreshed later.
    pub fn open(
        user_id: impl Into<String>,
        backends: Backends,
        config: SyncConfig,
    ) -> Result<Self> {
        let session = Self::new(user_id, backends, config)?;
        if let Err(e) = session.start() {
            warn!(user = %session.user_id, error = %e, "session started degraded");
        }
        Ok(session)
    }

    /// Register the device, load the first page and the unread count, and
    /// subscribe to the realtime channel.
    ///
    /// The subscription is attempted even if the initial load fails; the
    /// first error is returned.
    pub fn start(&self) -> Result<()> {
        info!(user = %self.user_id, "starting notification session");

        if let Err(e) = self.devices.register(&self.user_id) {
            warn!(user = %self.user_id, error = %e, "device registration failed");
        }

        let loaded = self.refresh();
        let subscribed = self.subscribe(&self.user_id);
        loaded.and(subscribed)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // --- Reads ---

    /// Records loaded so far, newest first.
    pub fn current_page(&self) -> Vec<NotificationRecord> {
        self.shared.state.lock().cache.records().to_vec()
    }

    pub fn get(&self, id: &NotificationId) -> Option<NotificationRecord> {
        self.shared.state.lock().cache.get(id).cloned()
    }

    pub fn unread_count(&self) -> u64 {
        self.shared.state.lock().cache.unread_count()
    }

    pub fn pagination(&self) -> Pagination {
        self.shared.state.lock().cache.pagination().clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    /// Whether a mark-as-read for `id` is awaiting confirmation.
    pub fn is_in_flight(&self, id: &NotificationId) -> bool {
        self.shared.state.lock().in_flight.contains(id)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    // --- Status stream ---

    /// Observe every engine event.
    pub fn observe(&self) -> ObserverHandle {
        self.shared.status.observe()
    }

    /// Observe with a custom buffer or filter.
    pub fn observe_with(&self, config: ObserverConfig) -> ObserverHandle {
        self.shared.status.subscribe(config)
    }

    // --- Pages ---

    /// Fetch one page. Page 1 replaces the cache; later pages append.
    ///
    /// On failure the cache is left as it was.
    pub fn load_page(&self, page: u32) -> Result<PageOutcome> {
        let page = page.max(1);
        let epoch = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(SyncError::SessionClosed);
            }
            if !state.loading.insert(page) {
                return Err(SyncError::LoadInProgress(page));
            }
            state.epoch
        };

        debug!(page, page_size = self.config.page_size, "fetching notifications page");
        let fetched = self.shared.api.fetch_page(page, self.config.page_size);

        let outcome = {
            let mut state = self.shared.state.lock();
            state.loading.remove(&page);
            if state.epoch != epoch || state.closed {
                debug!(page, "discarding page fetched for a closed session");
                return Err(SyncError::SessionClosed);
            }

            let mut fetched = match fetched {
                Ok(fetched) => fetched,
                Err(e) => {
                    drop(state);
                    return Err(self.fetch_failed(e));
                }
            };
            if fetched.pagination.current_page == 0 {
                fetched.pagination.current_page = page;
            }

            let before = state.cache.unread_count();
            let outcome = if page == 1 {
                state.cache.replace_with_first_page(fetched)
            } else {
                state.cache.append_page(fetched)
            };
            let after = state.cache.unread_count();
            if before != after {
                self.shared.status.unread_count(after);
            }
            outcome
        };

        info!(
            page,
            inserted = outcome.inserted,
            skipped = outcome.skipped_duplicates,
            has_next = outcome.has_next,
            "loaded notifications page"
        );
        Ok(outcome)
    }

    /// Fetch the page after the last one loaded.
    pub fn load_next_page(&self) -> Result<PageOutcome> {
        let next = {
            let state = self.shared.state.lock();
            let pagination = state.cache.pagination();
            if pagination.current_page == 0 {
                1
            } else if pagination.has_next {
                pagination.current_page + 1
            } else {
                return Err(SyncError::NoMorePages);
            }
        };
        self.load_page(next)
    }

    /// Pull the authoritative unread count; it replaces the local value.
    pub fn refresh_unread_count(&self) -> Result<u64> {
        let epoch = self.current_epoch()?;

        let count = match self.shared.api.fetch_unread_count() {
            Ok(count) => count,
            Err(e) => return Err(self.fetch_failed(e)),
        };

        let mut state = self.shared.state.lock();
        if state.epoch != epoch || state.closed {
            return Err(SyncError::SessionClosed);
        }
        let before = state.cache.unread_count();
        state.cache.set_unread_count(count);
        if before != count {
            debug!(local = before, server = count, "unread count corrected by server");
            self.shared.status.unread_count(count);
        }
        Ok(count)
    }

    /// Reload page 1 and the authoritative unread count.
    pub fn refresh(&self) -> Result<u64> {
        self.load_page(1)?;
        self.refresh_unread_count()
    }

    fn fetch_failed(&self, e: BackendError) -> SyncError {
        warn!(error = %e, "notification fetch failed");
        let error = SyncError::Fetch(e);
        self.shared.status.error(&error);
        error
    }

    fn current_epoch(&self) -> Result<u64> {
        let state = self.shared.state.lock();
        if state.closed {
            return Err(SyncError::SessionClosed);
        }
        Ok(state.epoch)
    }

    // --- Mutations ---

    /// Mark one notification read, optimistically.
    ///
    /// The cache and counter change before the backend is asked. If the
    /// backend refuses, the change is reverted and the error returned. A
    /// second call for the same id while the first is outstanding does
    /// nothing.
    pub fn mark_as_read(&self, id: &NotificationId) -> Result<MarkOutcome> {
        let (transaction, epoch) = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(SyncError::SessionClosed);
            }
            if !state.in_flight.try_claim(id) {
                debug!(id = %id, "mark-as-read already in flight");
                return Ok(MarkOutcome::AlreadyInFlight);
            }

            let transaction = ReadTransaction::begin(&mut state.cache, id.clone(), true);
            if transaction.already_at_target() {
                state.in_flight.release(id);
                return Ok(MarkOutcome::AlreadyRead);
            }
            if transaction.applied() {
                self.shared.status.unread_count(state.cache.unread_count());
            }
            (transaction, state.epoch)
        };
        let _guard = InFlightGuard {
            shared: &self.shared,
            id: id.clone(),
        };

        match self.shared.api.mark_read(id) {
            Ok(_) => {
                debug!(id = %id, "mark-as-read confirmed");
                Ok(MarkOutcome::Confirmed)
            }
            Err(source) => {
                let reverted = {
                    let mut state = self.shared.state.lock();
                    if state.epoch != epoch || state.closed {
                        debug!(id = %id, "mark-as-read failed after close, not rolling back");
                        return Err(SyncError::SessionClosed);
                    }
                    let reverted = transaction.revert(&mut state.cache);
                    if reverted {
                        self.shared.status.rolled_back(id.clone());
                        self.shared.status.unread_count(state.cache.unread_count());
                    }
                    reverted
                };

                warn!(
                    id = %id,
                    error = %source,
                    rolled_back = reverted,
                    "mark-as-read rejected"
                );

                let error = SyncError::MutationRejected {
                    id: id.clone(),
                    source,
                };
                self.shared.status.error(&error);
                Err(error)
            }
        }
    }

    /// Mark everything read, optimistically.
    ///
    /// On failure the previous per-record state is not restored; the cache
    /// is resynced from the server (page 1 plus unread count) instead.
    pub fn mark_all_as_read(&self) -> Result<MarkAllOutcome> {
        let (marked, epoch) = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(SyncError::SessionClosed);
            }
            let before = state.cache.unread_count();
            let marked = state.cache.mark_all_read().len();
            if before != 0 {
                self.shared.status.unread_count(0);
            }
            (marked, state.epoch)
        };

        let source = match self.shared.api.mark_all_read() {
            Ok(true) => {
                info!(marked, "marked all notifications read");
                return Ok(MarkAllOutcome { marked });
            }
            Ok(false) => BackendError::Rejected {
                status: 200,
                message: "server reported success=false".into(),
            },
            Err(e) => e,
        };

        warn!(error = %source, "mark-all-read rejected, resyncing");
        if self.current_epoch().ok() != Some(epoch) {
            return Err(SyncError::SessionClosed);
        }
        match self.refresh() {
            Ok(unread) => self.shared.status.resynced(unread),
            Err(e) => warn!(error = %e, "resync after mark-all-read failed"),
        }

        let error = SyncError::BatchRejected(source);
        self.shared.status.error(&error);
        Err(error)
    }

    // --- Realtime ---

    /// Apply one realtime change. This is the path the connection
    /// supervisor uses for every data event.
    pub fn apply_event(&self, event: ChangeEvent) -> Result<ReconcileOutcome> {
        self.shared.apply_event(event)
    }

    /// Subscribe the realtime channel for `user_id`, replacing any current
    /// subscription.
    pub fn subscribe(&self, user_id: &str) -> Result<()> {
        if self.is_closed() {
            return Err(SyncError::SessionClosed);
        }
        self.supervisor.subscribe(user_id)
    }

    /// Close the realtime channel. Safe from any state.
    pub fn unsubscribe(&self) -> Result<()> {
        self.supervisor.unsubscribe()
    }

    // --- Lifecycle ---

    /// Tear the session down: close the channel, unregister the device,
    /// discard the cache and end every observer stream.
    ///
    /// Confirmations still in flight are ignored when they return. Idempotent.
    pub fn close(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.epoch += 1;
            state.cache.clear();
            state.loading.clear();
        }

        if let Err(e) = self.supervisor.unsubscribe() {
            warn!(error = %e, "unsubscribe during close failed");
        }
        if let Err(e) = self.devices.unregister(&self.user_id) {
            warn!(user = %self.user_id, error = %e, "device unregistration failed");
        }
        self.shared.status.close();
        info!(user = %self.user_id, "notification session closed");
    }
}

impl Drop for NotificationSession {
    fn drop(&mut self) {
        self.close();
    }
}
