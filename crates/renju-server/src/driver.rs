//! Server driver.
//!
//! Ties together the session table, the dispatcher, the object store, the
//! event bus with its notifier, and the time wheel. Pure logic in the
//! action pattern: the runtime feeds [`ServerEvent`]s in and executes the
//! returned [`ServerAction`]s, so the whole request path runs under test
//! without a socket in sight.
//!
//! Request data flow: frame in → session decrypt → packet decode →
//! dispatcher → handler → room mutation → event publish → notifier → outbox
//! → session encrypt → frame out. The outbox drain at the end of each event
//! keeps responses ahead of the pushes they trigger.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use renju_core::{
    Environment, EventBus, ObjectStore, Session, SessionAction, SessionCrypto, TimeWheel,
};
use renju_proto::Frame;

use crate::{
    handlers::{self, HandlerCtx},
    notifier::Notifier,
    outbox::Outbox,
};

/// Driver configuration.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Idle time before a session is evicted.
    pub session_timeout: Duration,
    /// Time-wheel slot count.
    pub wheel_slots: usize,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Board size for new rooms.
    pub default_board_size: u32,
    /// Cap for lobby snapshots, pull and push alike.
    pub lobby_snapshot_max: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            session_timeout: renju_core::DEFAULT_SESSION_TIMEOUT,
            wheel_slots: TimeWheel::<WheelTask>::DEFAULT_SLOTS,
            max_connections: 10_000,
            default_board_size: renju_core::board::DEFAULT_BOARD_SIZE,
            lobby_snapshot_max: 10,
        }
    }
}

/// Events the driver processes, produced by the runtime.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A connection was accepted.
    ConnectionAccepted {
        /// Runtime-assigned connection id.
        conn_id: u64,
    },
    /// A complete frame arrived on a connection.
    FrameReceived {
        /// Source connection.
        conn_id: u64,
        /// The frame.
        frame: Frame,
    },
    /// A connection went away (peer close or transport error).
    ConnectionClosed {
        /// The closed connection.
        conn_id: u64,
        /// Reason, for the log line.
        reason: String,
    },
    /// Periodic tick driving the time wheel (once per second).
    Tick,
}

/// Actions the driver produces, executed by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAction {
    /// Send a frame on a connection.
    SendFrame {
        /// Target connection.
        conn_id: u64,
        /// Frame to send.
        frame: Frame,
    },
    /// Close a connection.
    Close {
        /// Connection to close.
        conn_id: u64,
        /// Reason, for the log line.
        reason: String,
    },
}

/// Deferred bookkeeping tasks on the time wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WheelTask {
    /// Check a session's heartbeat against the timeout.
    ExpiryCheck {
        /// Session to check.
        session_id: u64,
    },
}

/// The sans-IO server core.
pub struct ServerDriver<E: Environment> {
    conns: HashSet<u64>,
    sessions: HashMap<u64, Session<E::Instant>>,
    conn_to_session: HashMap<u64, u64>,
    session_to_conn: HashMap<u64, u64>,
    used_session_ids: HashSet<u64>,
    store: Arc<ObjectStore>,
    bus: Arc<EventBus>,
    outbox: Outbox,
    _notifier: Notifier,
    wheel: TimeWheel<WheelTask>,
    crypto: Arc<dyn SessionCrypto>,
    env: E,
    config: DriverConfig,
}

impl<E: Environment> ServerDriver<E> {
    /// Wire up a driver: attaches the notifier to the bus and prepares the
    /// time wheel.
    pub fn new(
        env: E,
        store: Arc<ObjectStore>,
        crypto: Arc<dyn SessionCrypto>,
        config: DriverConfig,
    ) -> Self {
        let bus = Arc::new(EventBus::new());
        let outbox = Outbox::new();
        let notifier = Notifier::attach(
            &bus,
            Arc::clone(&store),
            outbox.clone(),
            config.lobby_snapshot_max,
        );

        Self {
            conns: HashSet::new(),
            sessions: HashMap::new(),
            conn_to_session: HashMap::new(),
            session_to_conn: HashMap::new(),
            used_session_ids: HashSet::new(),
            store,
            bus,
            outbox,
            _notifier: notifier,
            wheel: TimeWheel::new(config.wheel_slots),
            crypto,
            env,
            config,
        }
    }

    /// Process one event and return the actions to execute.
    pub fn process_event(&mut self, event: ServerEvent) -> Vec<ServerAction> {
        match event {
            ServerEvent::ConnectionAccepted { conn_id } => self.handle_accepted(conn_id),
            ServerEvent::FrameReceived { conn_id, frame } => self.handle_frame(conn_id, &frame),
            ServerEvent::ConnectionClosed { conn_id, reason } => {
                self.handle_closed(conn_id, &reason)
            },
            ServerEvent::Tick => self.handle_tick(),
        }
    }

    fn handle_accepted(&mut self, conn_id: u64) -> Vec<ServerAction> {
        if self.conns.len() >= self.config.max_connections {
            tracing::warn!(conn_id, "refusing connection: at capacity");
            return vec![ServerAction::Close {
                conn_id,
                reason: "max connections exceeded".to_string(),
            }];
        }

        self.conns.insert(conn_id);
        tracing::debug!(conn_id, total = self.conns.len(), "connection accepted");
        Vec::new()
    }

    fn handle_frame(&mut self, conn_id: u64, frame: &Frame) -> Vec<ServerAction> {
        if !self.conns.contains(&conn_id) {
            return Vec::new();
        }

        let now = self.env.now();
        let session_id = match self.conn_to_session.get(&conn_id) {
            Some(&id) => id,
            None => self.open_session(conn_id, now),
        };

        let Some(session) = self.sessions.get_mut(&session_id) else {
            return Vec::new();
        };

        let reply_iv = self.env.random_iv();
        let session_actions = session.handle_frame(frame, self.crypto.as_ref(), now, reply_iv);

        let mut actions = Vec::new();
        for action in session_actions {
            match action {
                SessionAction::SendFrame(frame) => {
                    actions.push(ServerAction::SendFrame { conn_id, frame });
                },
                SessionAction::Close { reason } => {
                    tracing::debug!(session_id, %reason, "session destroyed");
                    self.destroy_session(session_id);
                    actions.push(ServerAction::Close { conn_id, reason });
                },
                SessionAction::Deliver(packet) => {
                    let ctx = HandlerCtx {
                        store: &self.store,
                        bus: &self.bus,
                        outbox: &self.outbox,
                        lobby_snapshot_max: self.config.lobby_snapshot_max,
                        default_board_size: self.config.default_board_size,
                        unix_now_secs: self.env.unix_now_secs(),
                    };
                    handlers::dispatch(&ctx, &packet);
                },
            }
        }

        self.drain_outbox(&mut actions);
        actions
    }

    fn handle_closed(&mut self, conn_id: u64, reason: &str) -> Vec<ServerAction> {
        self.conns.remove(&conn_id);

        if let Some(&session_id) = self.conn_to_session.get(&conn_id) {
            tracing::info!(conn_id, session_id, reason, "connection closed");
            self.destroy_session(session_id);
        } else {
            tracing::debug!(conn_id, reason, "connection closed before session");
        }

        Vec::new()
    }

    fn handle_tick(&mut self) -> Vec<ServerAction> {
        let now = self.env.now();
        let mut actions = Vec::new();

        for task in self.wheel.tick() {
            match task {
                WheelTask::ExpiryCheck { session_id } => {
                    let Some(session) = self.sessions.get(&session_id) else {
                        continue; // already gone; the check dies with it
                    };

                    if session.is_expired(now, self.config.session_timeout) {
                        tracing::info!(session_id, "session expired");
                        let conn_id = self.session_to_conn.get(&session_id).copied();
                        self.destroy_session(session_id);
                        if let Some(conn_id) = conn_id {
                            self.conns.remove(&conn_id);
                            actions.push(ServerAction::Close {
                                conn_id,
                                reason: "session timeout".to_string(),
                            });
                        }
                    } else {
                        // Still alive: re-arm for the remaining window.
                        let elapsed = now - session.last_heartbeat();
                        let remaining = self
                            .config
                            .session_timeout
                            .saturating_sub(elapsed)
                            .as_secs()
                            .max(1) as usize;
                        self.wheel.schedule(remaining, WheelTask::ExpiryCheck { session_id });
                    }
                },
            }
        }

        // Expiry publishes no events, but tick-driven handlers may exist
        // some day; keep the drain unconditional.
        self.drain_outbox(&mut actions);
        actions
    }

    /// Mint a session for a connection's first frame. Session ids are
    /// random, non-zero, and never reused within the process lifetime.
    fn open_session(&mut self, conn_id: u64, now: E::Instant) -> u64 {
        let mut session_id = self.env.random_u64();
        while session_id == 0 || self.used_session_ids.contains(&session_id) {
            session_id = self.env.random_u64();
        }
        self.used_session_ids.insert(session_id);

        self.sessions.insert(session_id, Session::new(session_id, now));
        self.conn_to_session.insert(conn_id, session_id);
        self.session_to_conn.insert(session_id, conn_id);

        self.wheel.schedule(
            (self.config.session_timeout.as_secs().max(1)) as usize,
            WheelTask::ExpiryCheck { session_id },
        );

        tracing::debug!(conn_id, session_id, "session opened");
        session_id
    }

    /// Remove a session and every index entry referencing it. Publishes no
    /// event; the notifier treats missing reverse lookups as "drop".
    fn destroy_session(&mut self, session_id: u64) {
        if let Some(mut session) = self.sessions.remove(&session_id) {
            session.close();
        }
        if let Some(conn_id) = self.session_to_conn.remove(&session_id) {
            self.conn_to_session.remove(&conn_id);
        }
        self.store.unbind_session(session_id);
    }

    /// Seal queued packets onto their sessions. Packets for missing or
    /// not-yet-active sessions are silently dropped.
    fn drain_outbox(&mut self, actions: &mut Vec<ServerAction>) {
        for packet in self.outbox.drain() {
            let Some(session) = self.sessions.get(&packet.session_id) else {
                continue;
            };
            let Some(&conn_id) = self.session_to_conn.get(&packet.session_id) else {
                continue;
            };

            match session.seal_packet(&packet, self.env.random_iv()) {
                Ok(Some(frame)) => actions.push(ServerAction::SendFrame { conn_id, frame }),
                Ok(None) => {}, // not active: drop
                Err(err) => {
                    tracing::error!(session_id = packet.session_id, %err, "failed to seal packet");
                },
            }
        }
    }

    /// Number of tracked connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.conns.len()
    }

    /// Number of live sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// The shared object store.
    #[must_use]
    pub fn store(&self) -> &Arc<ObjectStore> {
        &self.store
    }
}

impl<E: Environment> std::fmt::Debug for ServerDriver<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerDriver")
            .field("connections", &self.conns.len())
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}
