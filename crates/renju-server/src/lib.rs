//! Production server for the renju game backend.
//!
//! This crate wraps [`renju_core`]'s sans-IO logic with real I/O. The
//! [`ServerDriver`] processes events and returns actions (pure logic, no
//! sockets); [`Server`] executes those actions on a tokio TCP runtime.
//!
//! # Components
//!
//! - [`ServerDriver`]: session table + dispatcher + notifier, action-based
//! - [`Server`]: accept loop, per-connection reader/writer tasks, tick task
//! - `handlers`: the auth/lobby/room/game handler families
//! - [`storage`]: persistence gateway backends (memory, redb)
//! - [`SystemEnv`]: production environment (real time, OS RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod error;
mod handlers;
mod notifier;
mod outbox;
pub mod storage;
mod system_env;

use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use bytes::BytesMut;
pub use driver::{DriverConfig, ServerAction, ServerDriver, ServerEvent};
pub use error::ServerError;
pub use notifier::Notifier;
pub use outbox::Outbox;
use renju_core::{ObjectStore, SessionCrypto};
use renju_proto::Frame;
pub use system_env::SystemEnv;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::{mpsc, watch, Mutex, RwLock},
};

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind, e.g. `0.0.0.0:8080` or `[::]:8080`.
    pub bind_address: String,
    /// Driver configuration (timeouts, limits).
    pub driver: DriverConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self { bind_address: "0.0.0.0:8080".to_string(), driver: DriverConfig::default() }
    }
}

/// One live connection as the runtime sees it.
struct ConnHandle {
    /// Encoded frames for the writer task.
    writer: mpsc::UnboundedSender<Vec<u8>>,
    /// Close signal for the reader task.
    close: watch::Sender<bool>,
}

/// Connection map shared between the accept loop, the tick task, and every
/// connection task.
struct SharedState {
    conns: RwLock<HashMap<u64, ConnHandle>>,
}

/// Production server: driver + TCP listener.
pub struct Server {
    listener: TcpListener,
    driver: Arc<Mutex<ServerDriver<SystemEnv>>>,
}

impl Server {
    /// Bind the listener and wire up the driver.
    ///
    /// # Errors
    ///
    /// - [`ServerError::Io`] when the address cannot be bound.
    pub async fn bind(
        config: ServerRuntimeConfig,
        store: Arc<ObjectStore>,
        crypto: Arc<dyn SessionCrypto>,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.bind_address).await?;
        let env = SystemEnv::new();
        let driver = ServerDriver::new(env, store, crypto, config.driver);

        Ok(Self { listener, driver: Arc::new(Mutex::new(driver)) })
    }

    /// Local address the listener is bound to.
    ///
    /// # Errors
    ///
    /// - [`ServerError::Io`] when the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Run until the process is stopped: accept connections, feed the
    /// driver, execute its actions.
    ///
    /// # Errors
    ///
    /// - [`ServerError::Io`] when the listener fails fatally.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("server listening on {}", self.listener.local_addr()?);

        let shared = Arc::new(SharedState { conns: RwLock::new(HashMap::new()) });

        // Tick task: drives the time wheel once per second.
        let tick_driver = Arc::clone(&self.driver);
        let tick_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                let actions = tick_driver.lock().await.process_event(ServerEvent::Tick);
                execute_actions(actions, &tick_shared).await;
            }
        });

        let mut next_conn_id: u64 = 0;
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    next_conn_id += 1;
                    let conn_id = next_conn_id;
                    tracing::debug!(conn_id, %peer, "accepted");

                    let driver = Arc::clone(&self.driver);
                    let shared = Arc::clone(&shared);
                    tokio::spawn(async move {
                        handle_connection(conn_id, stream, driver, shared).await;
                    });
                },
                Err(err) => {
                    tracing::error!(%err, "accept failed");
                },
            }
        }
    }
}

/// Drive one connection: reader loop here, writer loop in a child task.
async fn handle_connection(
    conn_id: u64,
    stream: TcpStream,
    driver: Arc<Mutex<ServerDriver<SystemEnv>>>,
    shared: Arc<SharedState>,
) {
    let (mut read_half, mut write_half) = stream.into_split();
    let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let (close_tx, mut close_rx) = watch::channel(false);

    shared
        .conns
        .write()
        .await
        .insert(conn_id, ConnHandle { writer: writer_tx, close: close_tx });

    // Writer task: owns the write half, drains the outbound channel.
    tokio::spawn(async move {
        while let Some(bytes) = writer_rx.recv().await {
            if let Err(err) = write_half.write_all(&bytes).await {
                tracing::debug!(conn_id, %err, "write failed");
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    {
        let actions =
            driver.lock().await.process_event(ServerEvent::ConnectionAccepted { conn_id });
        execute_actions(actions, &shared).await;
    }

    let mut buf = BytesMut::with_capacity(8 * 1024);
    let mut close_reason = "peer disconnected".to_string();

    'conn: loop {
        tokio::select! {
            // Driver-requested close (eviction, handshake failure).
            _ = close_rx.changed() => {
                close_reason = "closed by server".to_string();
                break 'conn;
            },

            result = read_half.read_buf(&mut buf) => {
                match result {
                    Ok(0) => break 'conn,
                    Ok(_) => {},
                    Err(err) => {
                        close_reason = err.to_string();
                        break 'conn;
                    },
                }

                // Split off every complete frame in the buffer.
                loop {
                    match Frame::decode(&mut buf) {
                        Ok(Some(frame)) => {
                            let actions = driver
                                .lock()
                                .await
                                .process_event(ServerEvent::FrameReceived { conn_id, frame });
                            execute_actions(actions, &shared).await;
                        },
                        Ok(None) => break,
                        Err(err) => {
                            // Malformed peer: close without a reply.
                            tracing::warn!(conn_id, %err, "malformed frame, closing");
                            close_reason = err.to_string();
                            break 'conn;
                        },
                    }
                }
            },
        }
    }

    shared.conns.write().await.remove(&conn_id);

    let actions = driver
        .lock()
        .await
        .process_event(ServerEvent::ConnectionClosed { conn_id, reason: close_reason });
    execute_actions(actions, &shared).await;
}

/// Execute driver actions against the connection map.
async fn execute_actions(actions: Vec<ServerAction>, shared: &SharedState) {
    for action in actions {
        match action {
            ServerAction::SendFrame { conn_id, frame } => match frame.to_bytes() {
                Ok(bytes) => {
                    let conns = shared.conns.read().await;
                    if let Some(handle) = conns.get(&conn_id) {
                        // A full or closed channel means the connection is
                        // on its way out; the close path cleans up.
                        let _ = handle.writer.send(bytes);
                    }
                },
                Err(err) => {
                    tracing::error!(conn_id, %err, "failed to encode outbound frame");
                },
            },

            ServerAction::Close { conn_id, reason } => {
                tracing::info!(conn_id, reason, "closing connection");
                let mut conns = shared.conns.write().await;
                if let Some(handle) = conns.remove(&conn_id) {
                    let _ = handle.close.send(true);
                }
            },
        }
    }
}
