//! Connection supervisor: owns the realtime subscription and its reconnect
//! timer on a dedicated thread.

use crate::config::ReconnectPolicy;
use crate::error::{Result, SyncError};
use crate::ports::{
    ChannelFilter, ChannelSubscription, RealtimeTransport, TransportMessage, TransportSink,
};
use crate::status::StatusBroadcaster;
use crate::types::{ChangeEvent, ConnectionState};
use crossbeam_channel::{after, bounded, never, select, Receiver, Sender};
use parking_lot::RwLock;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::state::{Action, ConnectionMachine, Transition};

/// Receives every data event of the current subscription, in arrival order.
pub trait ChangeHandler: Send + Sync {
    fn handle_change(&self, event: ChangeEvent);
}

/// Commands sent to the supervisor thread.
enum Command {
    Subscribe {
        user_id: String,
        reply: Sender<Result<()>>,
    },
    Unsubscribe {
        reply: Sender<()>,
    },
    Shutdown,
}

/// The subscription currently held open.
struct Active {
    generation: u64,
    handle: Box<dyn ChannelSubscription>,
}

/// State owned by the supervisor thread.
struct Worker {
    machine: ConnectionMachine,
    transport: Arc<dyn RealtimeTransport>,
    handler: Arc<dyn ChangeHandler>,
    status: Arc<StatusBroadcaster>,
    shared_state: Arc<RwLock<ConnectionState>>,
    policy: ReconnectPolicy,

    /// Filter of the current subscription target.
    filter: Option<ChannelFilter>,
    active: Option<Active>,
    next_generation: u64,
    messages_tx: Sender<(u64, TransportMessage)>,

    /// When the pending reconnect fires.
    reconnect_at: Option<Instant>,
}

impl Worker {
    fn run(mut self, commands: Receiver<Command>, messages: Receiver<(u64, TransportMessage)>) {
        loop {
            let timer = match self.reconnect_at {
                Some(at) => after(at.saturating_duration_since(Instant::now())),
                None => never(),
            };

            select! {
                recv(commands) -> command => match command {
                    Ok(Command::Subscribe { user_id, reply }) => {
                        let result = self.subscribe(&user_id);
                        let _ = reply.send(result);
                    }
                    Ok(Command::Unsubscribe { reply }) => {
                        self.unsubscribe();
                        let _ = reply.send(());
                    }
                    Ok(Command::Shutdown) | Err(_) => {
                        self.unsubscribe();
                        debug!("connection supervisor stopped");
                        return;
                    }
                },
                recv(messages) -> message => {
                    if let Ok((generation, message)) = message {
                        self.on_message(generation, message);
                    }
                },
                recv(timer) -> _ => {
                    self.reconnect_at = None;
                    self.on_reconnect_due();
                },
            }
        }
    }

    fn subscribe(&mut self, user_id: &str) -> Result<()> {
        let filter = ChannelFilter::for_user(user_id);
        if self.filter.as_ref() != Some(&filter) && self.active.is_some() {
            info!(user = user_id, "replacing realtime subscription");
        }
        self.filter = Some(filter);

        let transition = self.machine.subscribe();
        self.apply(transition);

        match self.state() {
            ConnectionState::Error => Err(SyncError::Transport(format!(
                "could not open realtime channel for {}",
                user_id
            ))),
            _ => Ok(()),
        }
    }

    fn unsubscribe(&mut self) {
        let transition = self.machine.unsubscribe();
        self.reconnect_at = None;
        self.apply(transition);
        self.filter = None;
    }

    fn on_message(&mut self, generation: u64, message: TransportMessage) {
        let current = self.active.as_ref().map(|a| a.generation);
        if current != Some(generation) {
            debug!(generation, ?current, "ignoring message from superseded subscription");
            return;
        }

        match message {
            TransportMessage::Change(event) => {
                debug!(id = %event.record.id, kind = ?event.kind, "realtime change");
                self.handler.handle_change(event);
            }
            TransportMessage::Connected => {
                let transition = self.machine.connected();
                self.apply(transition);
            }
            TransportMessage::Disconnected => {
                let transition = self.machine.disconnected();
                self.apply(transition);
            }
            TransportMessage::ReconnectRequested => {
                info!("transport requested a reconnect");
                let transition = self.machine.disconnected();
                self.apply(transition);
            }
            TransportMessage::Error(message) => {
                warn!(error = %message, "realtime channel failed");
                let transition = self.machine.failed();
                self.apply(transition);
                self.status.error(&SyncError::Transport(message));
            }
        }
    }

    fn on_reconnect_due(&mut self) {
        let transition = self.machine.reconnect_due();
        if transition.action == Action::None {
            debug!(state = %self.state(), "stale reconnect timer");
            return;
        }
        info!(attempt = self.machine.attempt(), "reconnecting realtime channel");
        self.apply(transition);
    }

    /// Carry out a transition's action and publish the new state.
    fn apply(&mut self, transition: Transition) {
        match transition.action {
            Action::None => {}
            Action::Open => self.open(),
            Action::Close => self.close(),
            Action::ScheduleReconnect { attempt } => {
                let delay = self.policy.delay_for(attempt);
                info!(?delay, attempt, "realtime channel disconnected, reconnect scheduled");
                self.reconnect_at = Some(Instant::now() + delay);
                self.status.error(&SyncError::TransportDisconnected);
            }
            Action::CancelReconnect => self.reconnect_at = None,
        }

        // `open` may have moved the machine on
        let state = self.machine.state();
        let previous = {
            let mut shared = self.shared_state.write();
            std::mem::replace(&mut *shared, state)
        };
        if previous != state {
            info!(from = %previous, to = %state, "connection state changed");
            self.status.connection(state);
        }
    }

    fn open(&mut self) {
        self.close();
        self.reconnect_at = None;

        let Some(filter) = self.filter.clone() else {
            warn!("open requested without a subscription target");
            self.machine.unsubscribe();
            return;
        };

        let generation = self.next_generation;
        self.next_generation += 1;
        let sink = TransportSink::new(generation, self.messages_tx.clone());

        match self.transport.open(&filter, sink) {
            Ok(handle) => {
                debug!(channel = %filter.channel, generation, "realtime subscription opened");
                self.active = Some(Active { generation, handle });
            }
            Err(e) => {
                warn!(
                    channel = %filter.channel,
                    error = %e,
                    "failed to open realtime subscription"
                );
                let reconnecting = self.machine.attempt() > 0;
                if reconnecting {
                    let transition = self.machine.reopen_failed();
                    if let Action::ScheduleReconnect { attempt } = transition.action {
                        self.reconnect_at = Some(Instant::now() + self.policy.delay_for(attempt));
                    }
                } else {
                    self.machine.failed();
                    self.status.error(&SyncError::Transport(e.to_string()));
                }
            }
        }
    }

    fn close(&mut self) {
        if let Some(mut active) = self.active.take() {
            debug!(generation = active.generation, "closing realtime subscription");
            active.handle.close();
        }
    }

    fn state(&self) -> ConnectionState {
        self.machine.state()
    }
}

/// Owns the realtime channel lifecycle.
///
/// All transitions happen on one thread driven by a `select!` over control
/// commands, transport messages and the reconnect timer, so a stale timer,
/// a late transport callback and an explicit unsubscribe never race.
pub struct ConnectionSupervisor {
    commands: Sender<Command>,
    state: Arc<RwLock<ConnectionState>>,
    thread: Option<JoinHandle<()>>,
}

impl ConnectionSupervisor {
    /// Start the supervisor thread. Nothing is subscribed yet.
    pub fn spawn(
        transport: Arc<dyn RealtimeTransport>,
        handler: Arc<dyn ChangeHandler>,
        status: Arc<StatusBroadcaster>,
        policy: ReconnectPolicy,
        transport_buffer: usize,
    ) -> Result<Self> {
        let (commands_tx, commands_rx) = bounded(16);
        let (messages_tx, messages_rx) = bounded(transport_buffer.max(1));
        let state = Arc::new(RwLock::new(ConnectionState::Disconnected));

        let worker = Worker {
            machine: ConnectionMachine::new(),
            transport,
            handler,
            status,
            shared_state: Arc::clone(&state),
            policy,
            filter: None,
            active: None,
            next_generation: 1,
            messages_tx,
            reconnect_at: None,
        };

        let thread = std::thread::Builder::new()
            .name("notification-connection".into())
            .spawn(move || worker.run(commands_rx, messages_rx))
            .map_err(|e| SyncError::Transport(format!("failed to start supervisor: {}", e)))?;

        Ok(Self {
            commands: commands_tx,
            state,
            thread: Some(thread),
        })
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Subscribe to `user_id`'s notification stream, replacing any current
    /// subscription. Returns once the channel has been requested.
    pub fn subscribe(&self, user_id: &str) -> Result<()> {
        let (reply_tx, reply_rx) = bounded(1);
        self.commands
            .send(Command::Subscribe {
                user_id: user_id.to_string(),
                reply: reply_tx,
            })
            .map_err(|_| SyncError::SupervisorStopped)?;
        reply_rx.recv().map_err(|_| SyncError::SupervisorStopped)?
    }

    /// Close the subscription and cancel any pending reconnect. Idempotent.
    pub fn unsubscribe(&self) -> Result<()> {
        let (reply_tx, reply_rx) = bounded(1);
        self.commands
            .send(Command::Unsubscribe { reply: reply_tx })
            .map_err(|_| SyncError::SupervisorStopped)?;
        reply_rx.recv().map_err(|_| SyncError::SupervisorStopped)
    }

    /// Stop the thread, closing any open subscription.
    pub fn shutdown(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.commands.send(Command::Shutdown);
            if thread.join().is_err() {
                warn!("connection supervisor thread panicked");
            }
        }
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
