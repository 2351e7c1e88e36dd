//! Shared test harness: a deterministic environment and a client half that
//! speaks the real wire protocol against the sans-IO driver.

// Each integration test binary compiles this module separately and uses a
// different subset of it.
#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use renju_core::{
    crypto::PUBLIC_LEN, DevKeyExchange, Environment, ObjectStore, SessionKey,
};
use renju_proto::{Frame, Packet, Status, IV_LEN};
use renju_server::{storage::MemoryGateway, DriverConfig, ServerAction, ServerDriver, ServerEvent};

/// Fixed server identity for every test.
pub const SERVER_PUBLIC: [u8; PUBLIC_LEN] = [0x5A; PUBLIC_LEN];

/// Deterministic environment: virtual time advanced by hand, counter RNG.
#[derive(Clone)]
pub struct TestEnv {
    start: Instant,
    offset: Arc<Mutex<Duration>>,
    rng: Arc<AtomicU64>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
            rng: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Advance virtual time.
    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }
}

impl Environment for TestEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        self.start + *self.offset.lock().unwrap()
    }

    fn unix_now_secs(&self) -> u64 {
        1_700_000_000 + self.offset.lock().unwrap().as_secs()
    }

    fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        async {}
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        // Deterministic, never-repeating stream.
        for chunk in buffer.chunks_mut(8) {
            let value = self.rng.fetch_add(1, Ordering::Relaxed);
            let bytes = value.to_be_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}

/// The driver under test plus its collaborators.
pub struct Harness {
    pub driver: ServerDriver<TestEnv>,
    pub env: TestEnv,
    pub store: Arc<ObjectStore>,
    pub gateway: MemoryGateway,
    next_conn: u64,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(DriverConfig::default())
    }

    pub fn with_config(config: DriverConfig) -> Self {
        let env = TestEnv::new();
        let gateway = MemoryGateway::new();
        let store = Arc::new(ObjectStore::new(Arc::new(gateway.clone())));
        let crypto = Arc::new(DevKeyExchange::with_public(SERVER_PUBLIC));
        let driver = ServerDriver::new(env.clone(), store.clone(), crypto, config);

        Self { driver, env, store, gateway, next_conn: 0 }
    }

    /// Accept a connection and run the full handshake, returning the
    /// client's half of the session.
    pub fn connect(&mut self) -> TestClient {
        self.next_conn += 1;
        let conn_id = self.next_conn;

        let actions =
            self.driver.process_event(ServerEvent::ConnectionAccepted { conn_id });
        assert!(actions.is_empty(), "accept should be silent");

        // Hello -> NewSession carrying the session id and server public.
        let hello = Frame::control(Status::Hello, 0, Vec::new());
        let actions =
            self.driver.process_event(ServerEvent::FrameReceived { conn_id, frame: hello });
        let new_session = single_frame(&actions, conn_id);
        assert_eq!(new_session.status, Status::NewSession);
        let session_id = new_session.session_id;

        let mut server_public = [0u8; PUBLIC_LEN];
        server_public.copy_from_slice(&new_session.payload[..PUBLIC_LEN]);
        assert_eq!(server_public, SERVER_PUBLIC);

        // Pending{clientPub} -> Activated.
        let mut client_public = [0u8; PUBLIC_LEN];
        self.env.random_bytes(&mut client_public);
        let key = DevKeyExchange::shared_key(&client_public, &server_public);

        let pending = Frame::control(Status::Pending, session_id, client_public.to_vec());
        let actions =
            self.driver.process_event(ServerEvent::FrameReceived { conn_id, frame: pending });
        let activated = single_frame(&actions, conn_id);
        assert_eq!(activated.status, Status::Activated);

        TestClient { conn_id, session_id, key }
    }

    /// Send one application packet and return everything the driver did.
    pub fn send(&mut self, client: &TestClient, packet: &Packet) -> Vec<ServerAction> {
        let frame = client.seal(packet, self.fresh_iv());
        self.driver.process_event(ServerEvent::FrameReceived { conn_id: client.conn_id, frame })
    }

    /// Send a request and return only the packets pushed to `client`.
    pub fn request(&mut self, client: &TestClient, packet: &Packet) -> Vec<Packet> {
        let actions = self.send(client, packet);
        client.unseal_all(&actions)
    }

    pub fn tick(&mut self) -> Vec<ServerAction> {
        self.driver.process_event(ServerEvent::Tick)
    }

    pub fn close(&mut self, client: &TestClient) -> Vec<ServerAction> {
        self.driver.process_event(ServerEvent::ConnectionClosed {
            conn_id: client.conn_id,
            reason: "test close".to_string(),
        })
    }

    fn fresh_iv(&self) -> [u8; IV_LEN] {
        let mut iv = [0u8; IV_LEN];
        self.env.random_bytes(&mut iv);
        iv
    }
}

/// Client half of one session: id, key, and codec helpers.
pub struct TestClient {
    pub conn_id: u64,
    pub session_id: u64,
    key: SessionKey,
}

impl TestClient {
    /// Encrypt a packet into an active frame, as the real client would.
    pub fn seal(&self, packet: &Packet, iv: [u8; IV_LEN]) -> Frame {
        let mut body = packet.clone();
        body.session_id = self.session_id;
        let plaintext = body.to_bytes().expect("packet should encode");
        Frame::active(self.session_id, iv, self.key.encrypt(&plaintext, &iv))
    }

    /// Encrypt arbitrary plaintext into an active frame. For tests that
    /// need a well-encrypted but malformed packet body.
    pub fn seal_raw(&self, plaintext: &[u8], iv: [u8; IV_LEN]) -> Frame {
        Frame::active(self.session_id, iv, self.key.encrypt(plaintext, &iv))
    }

    /// Decrypt every active frame addressed to this client.
    pub fn unseal_all(&self, actions: &[ServerAction]) -> Vec<Packet> {
        actions
            .iter()
            .filter_map(|action| match action {
                ServerAction::SendFrame { conn_id, frame }
                    if *conn_id == self.conn_id && frame.status == Status::Active =>
                {
                    let iv = frame.iv.expect("active frames carry an IV");
                    let plaintext =
                        self.key.decrypt(&frame.payload, &iv).expect("should decrypt");
                    Some(Packet::decode(self.session_id, &plaintext).expect("should decode"))
                },
                _ => None,
            })
            .collect()
    }
}

/// Expect exactly one frame action, addressed to `conn_id`.
pub fn single_frame(actions: &[ServerAction], conn_id: u64) -> Frame {
    let frames: Vec<&Frame> = actions
        .iter()
        .filter_map(|action| match action {
            ServerAction::SendFrame { conn_id: c, frame } if *c == conn_id => Some(frame),
            _ => None,
        })
        .collect();
    assert_eq!(frames.len(), 1, "expected exactly one frame, got {actions:?}");
    frames[0].clone()
}

/// First packet of a given type, if any.
pub fn find_packet(packets: &[Packet], msg_type: renju_proto::MsgType) -> Option<Packet> {
    packets.iter().find(|p| p.msg_type == msg_type.to_u16()).cloned()
}
