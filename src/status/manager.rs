//! Broadcaster fanning engine events out to observers.

use crate::error::SyncError;
use crate::reconciler::ReconcileOutcome;
use crate::types::{ConnectionState, NotificationId};
use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{DropReason, EngineEvent, ObserverConfig, ObserverHandle, ObserverId};

/// Internal observer state.
struct Observer {
    config: ObserverConfig,
    sender: Sender<EngineEvent>,
}

impl Observer {
    /// Try to send an event. Returns false if the buffer is full or the
    /// receiver is gone (observer will be dropped).
    fn try_send(&self, event: EngineEvent) -> bool {
        self.sender.try_send(event).is_ok()
    }
}

/// Manages observers and broadcasts events.
///
/// Publishing never blocks: an observer whose buffer is full is dropped.
pub struct StatusBroadcaster {
    /// Active observers by ID.
    observers: RwLock<HashMap<ObserverId, Observer>>,
    /// Counter for generating observer IDs.
    next_id: AtomicU64,
    /// Buffer size used by [`observe`](Self::observe).
    default_buffer: usize,
}

impl StatusBroadcaster {
    /// Create a broadcaster with the default observer buffer.
    pub fn new() -> Self {
        Self::with_buffer(ObserverConfig::default().buffer_size)
    }

    /// Create a broadcaster whose default observers buffer `buffer` events.
    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            default_buffer: buffer.max(1),
        }
    }

    /// Observe every event with the default buffer.
    pub fn observe(&self) -> ObserverHandle {
        self.subscribe(ObserverConfig {
            buffer_size: self.default_buffer,
            ..Default::default()
        })
    }

    /// Register a new observer.
    pub fn subscribe(&self, config: ObserverConfig) -> ObserverHandle {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size.max(1));

        self.observers
            .write()
            .insert(id, Observer { config, sender });

        ObserverHandle { id, receiver }
    }

    /// Unregister an observer.
    pub fn unsubscribe(&self, id: ObserverId) {
        if let Some(observer) = self.observers.write().remove(&id) {
            let _ = observer.sender.try_send(EngineEvent::Dropped {
                reason: DropReason::Unsubscribed,
            });
        }
    }

    /// Drop every observer, telling each the session is over.
    pub fn close(&self) {
        let drained: Vec<Observer> = self.observers.write().drain().map(|(_, o)| o).collect();
        for observer in drained {
            let _ = observer.sender.try_send(EngineEvent::Dropped {
                reason: DropReason::SessionClosed,
            });
        }
    }

    /// Get observer count.
    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    // --- Publishing ---

    pub fn connection(&self, state: ConnectionState) {
        self.publish(EngineEvent::Connection { state });
    }

    pub fn unread_count(&self, count: u64) {
        self.publish(EngineEvent::UnreadCount { count });
    }

    pub fn reconciled(&self, id: NotificationId, outcome: ReconcileOutcome) {
        self.publish(EngineEvent::Reconciled { id, outcome });
    }

    pub fn rolled_back(&self, id: NotificationId) {
        self.publish(EngineEvent::RolledBack { id });
    }

    pub fn resynced(&self, unread: u64) {
        self.publish(EngineEvent::Resynced { unread });
    }

    pub fn error(&self, error: &SyncError) {
        self.publish(EngineEvent::Error {
            kind: error.kind().to_string(),
            message: error.to_string(),
        });
    }

    /// Send `event` to every matching observer. Drops observers that fail
    /// to receive.
    pub fn publish(&self, event: EngineEvent) {
        let mut to_remove = Vec::new();

        {
            let observers = self.observers.read();
            for (id, observer) in observers.iter() {
                if observer.config.filter.matches(&event) && !observer.try_send(event.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut observers = self.observers.write();
            for id in to_remove {
                if let Some(observer) = observers.remove(&id) {
                    tracing::debug!(observer = id.0, "dropping slow status observer");
                    let _ = observer.sender.try_send(EngineEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::types::ObserverFilter;
    use std::time::Duration;

    #[test]
    fn test_subscribe_unsubscribe() {
        let broadcaster = StatusBroadcaster::new();

        let handle = broadcaster.observe();
        assert_eq!(broadcaster.observer_count(), 1);

        broadcaster.unsubscribe(handle.id);
        assert_eq!(broadcaster.observer_count(), 0);
        assert!(matches!(
            handle.try_recv(),
            Ok(EngineEvent::Dropped {
                reason: DropReason::Unsubscribed
            })
        ));
    }

    #[test]
    fn test_filter_connection_only() {
        let broadcaster = StatusBroadcaster::new();
        let handle = broadcaster.subscribe(ObserverConfig {
            filter: ObserverFilter::connection(),
            ..Default::default()
        });

        broadcaster.unread_count(3);
        broadcaster.connection(ConnectionState::Connecting);

        let event = handle.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(
            event,
            EngineEvent::Connection {
                state: ConnectionState::Connecting
            }
        );
        assert!(handle.recv_timeout(Duration::from_millis(20)).is_err());
    }

    #[test]
    fn test_drop_slow_observer() {
        let broadcaster = StatusBroadcaster::new();
        let _handle = broadcaster.subscribe(ObserverConfig {
            buffer_size: 2,
            ..Default::default()
        });

        for count in 0..10 {
            broadcaster.unread_count(count);
        }

        assert_eq!(broadcaster.observer_count(), 0);
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let broadcaster = StatusBroadcaster::new();
        let handle = broadcaster.observe();
        drop(handle);

        broadcaster.connection(ConnectionState::Connected);
        assert_eq!(broadcaster.observer_count(), 0);
    }

    #[test]
    fn test_close_notifies_observers() {
        let broadcaster = StatusBroadcaster::new();
        let handle = broadcaster.observe();
        broadcaster.close();

        assert_eq!(broadcaster.observer_count(), 0);
        assert_eq!(
            handle.try_recv().unwrap(),
            EngineEvent::Dropped {
                reason: DropReason::SessionClosed
            }
        );
    }
}
