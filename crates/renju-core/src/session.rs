//! Session layer state machine.
//!
//! One [`Session`] per accepted connection. The state machine terminates the
//! framed, encrypted wire protocol: it walks the handshake, decrypts active
//! frames into packets, and seals outbound packets back into frames.
//!
//! Pure state machine in the action pattern: time is passed in, side effects
//! come back as [`SessionAction`]s for the driver to execute.
//!
//! # State machine
//!
//! ```text
//! (new socket)
//!      │ Hello
//!      ▼
//!  Greeting ── send NewSession{serverPub, sig} ──▶ KeyPending
//!                                                     │ Pending{clientPub}
//!                                  derive ok ─────────┼──────── derive fails
//!                                      ▼                             ▼
//!                            send Activated, Active        send Error, Closed
//! ```
//!
//! Wire reactions follow the error taxonomy: handshake violations send an
//! Error frame and destroy the session; decrypt failures on active frames
//! send an Error frame and keep the session; packet decode failures after a
//! good decrypt send an encrypted Error packet.

use std::{ops::Sub, time::Duration};

use renju_proto::{Frame, Packet, Status, IV_LEN};

use crate::{
    crypto::{SessionCrypto, SessionKey},
    error::SessionError,
};

/// Default idle timeout before a session is evicted.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Handshake phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Connection seen, `Hello` not yet answered.
    Greeting,
    /// `NewSession` sent, waiting for the peer's public value.
    KeyPending,
    /// Shared key in place; application traffic flows.
    Active,
    /// Destroyed; the driver is tearing the connection down.
    Closed,
}

/// Actions returned by the session state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Send this frame to the peer.
    SendFrame(Frame),
    /// A decrypted, decoded application packet for the dispatcher.
    Deliver(Packet),
    /// Destroy the session and close the socket.
    Close {
        /// Reason, for the log line.
        reason: String,
    },
}

/// A terminated wire connection.
///
/// Generic over the instant type so tests can run on virtual time.
#[derive(Debug)]
pub struct Session<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    id: u64,
    phase: SessionPhase,
    key: Option<SessionKey>,
    last_heartbeat: I,
}

impl<I> Session<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a session in `Greeting` phase.
    ///
    /// The id must be unique for the process lifetime; the driver mints it
    /// from the environment's RNG on the first well-formed frame.
    pub fn new(id: u64, now: I) -> Self {
        Self { id, phase: SessionPhase::Greeting, key: None, last_heartbeat: now }
    }

    /// Session id, as carried in every frame after `NewSession`.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current handshake phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// True once the handshake completed and traffic flows.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.phase == SessionPhase::Active
    }

    /// True when no frame has refreshed the session within `timeout`.
    #[must_use]
    pub fn is_expired(&self, now: I, timeout: Duration) -> bool {
        now - self.last_heartbeat > timeout
    }

    /// Instant of the last TTL refresh.
    #[must_use]
    pub fn last_heartbeat(&self) -> I {
        self.last_heartbeat
    }

    /// Mark the session closed.
    pub fn close(&mut self) {
        self.phase = SessionPhase::Closed;
    }

    /// Process one inbound frame.
    ///
    /// `reply_iv` is fresh randomness from the caller, used if the reaction
    /// is an encrypted reply (random bytes are provided by the caller so the
    /// state machine stays pure). Every failure mode has a defined wire
    /// reaction, so this never errors; the returned actions are the complete
    /// reaction.
    pub fn handle_frame(
        &mut self,
        frame: &Frame,
        crypto: &dyn SessionCrypto,
        now: I,
        reply_iv: [u8; IV_LEN],
    ) -> Vec<SessionAction> {
        match frame.status {
            Status::Hello => self.handle_hello(crypto),
            Status::Pending => self.handle_pending(frame, crypto, now),
            Status::Active => self.handle_active(frame, now, reply_iv),
            // Server-originated statuses coming back from a peer are not
            // valid requests.
            Status::NewSession
            | Status::Activated
            | Status::Inactive
            | Status::Error
            | Status::InvalidRequest => {
                vec![SessionAction::SendFrame(Frame::control(
                    Status::InvalidRequest,
                    self.id,
                    Vec::new(),
                ))]
            },
        }
    }

    /// Seal an outbound packet into an active frame.
    ///
    /// Returns `Ok(None)` when the session is not active: outbound packets
    /// to dead or half-open sessions are silently dropped.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Encode`] if the packet body fails to encode.
    pub fn seal_packet(
        &self,
        packet: &Packet,
        iv: [u8; IV_LEN],
    ) -> Result<Option<Frame>, SessionError> {
        let Some(key) = (self.phase == SessionPhase::Active).then_some(()).and(self.key.as_ref())
        else {
            return Ok(None);
        };

        let plaintext = packet.to_bytes()?;
        let ciphertext = key.encrypt(&plaintext, &iv);
        Ok(Some(Frame::active(self.id, iv, ciphertext)))
    }

    fn handle_hello(&mut self, crypto: &dyn SessionCrypto) -> Vec<SessionAction> {
        match self.phase {
            SessionPhase::Greeting | SessionPhase::KeyPending => {
                self.phase = SessionPhase::KeyPending;

                let mut payload = crypto.server_public_bytes();
                payload.extend_from_slice(&crypto.signature());

                vec![SessionAction::SendFrame(Frame::control(
                    Status::NewSession,
                    self.id,
                    payload,
                ))]
            },
            SessionPhase::Active | SessionPhase::Closed => {
                // Handshake status out of phase: error and destroy.
                self.phase = SessionPhase::Closed;
                vec![
                    SessionAction::SendFrame(Frame::control(Status::Error, self.id, Vec::new())),
                    SessionAction::Close { reason: "Hello on active session".to_string() },
                ]
            },
        }
    }

    fn handle_pending(
        &mut self,
        frame: &Frame,
        crypto: &dyn SessionCrypto,
        now: I,
    ) -> Vec<SessionAction> {
        match self.phase {
            SessionPhase::KeyPending => match crypto.derive(&frame.payload) {
                Ok(key) => {
                    self.key = Some(key);
                    self.phase = SessionPhase::Active;
                    self.last_heartbeat = now;

                    vec![SessionAction::SendFrame(Frame::control(
                        Status::Activated,
                        self.id,
                        Vec::new(),
                    ))]
                },
                Err(err) => {
                    self.phase = SessionPhase::Closed;
                    vec![
                        SessionAction::SendFrame(Frame::control(
                            Status::Error,
                            self.id,
                            Vec::new(),
                        )),
                        SessionAction::Close { reason: format!("key derivation failed: {err}") },
                    ]
                },
            },
            // Duplicate Pending after activation: re-confirm.
            SessionPhase::Active => {
                vec![SessionAction::SendFrame(Frame::control(
                    Status::Activated,
                    self.id,
                    Vec::new(),
                ))]
            },
            SessionPhase::Greeting | SessionPhase::Closed => {
                self.phase = SessionPhase::Closed;
                vec![
                    SessionAction::SendFrame(Frame::control(Status::Error, self.id, Vec::new())),
                    SessionAction::Close { reason: "Pending before Hello".to_string() },
                ]
            },
        }
    }

    fn handle_active(
        &mut self,
        frame: &Frame,
        now: I,
        reply_iv: [u8; IV_LEN],
    ) -> Vec<SessionAction> {
        if self.phase != SessionPhase::Active {
            return vec![SessionAction::SendFrame(Frame::control(
                Status::Inactive,
                self.id,
                Vec::new(),
            ))];
        }

        let Some(iv) = frame.iv else {
            // Active frames must carry an IV; refuse without state change.
            return vec![SessionAction::SendFrame(Frame::control(
                Status::Error,
                self.id,
                Vec::new(),
            ))];
        };

        let key = self.key.as_ref().unwrap_or_else(|| {
            unreachable!("active phase implies a negotiated key")
        });

        let plaintext = match key.decrypt(&frame.payload, &iv) {
            Ok(plaintext) => plaintext,
            Err(_) => {
                return vec![SessionAction::SendFrame(Frame::control(
                    Status::Error,
                    self.id,
                    Vec::new(),
                ))];
            },
        };

        let packet = match Packet::decode(self.id, &plaintext) {
            Ok(packet) => packet,
            Err(err) => {
                // Decrypt succeeded, so the peer holds the key; answer with
                // an encrypted Error packet and keep the session.
                let reply = Packet::error(self.id, format!("Malformed packet: {err}"));
                return match self.seal_packet(&reply, reply_iv) {
                    Ok(Some(frame)) => vec![SessionAction::SendFrame(frame)],
                    _ => Vec::new(),
                };
            },
        };

        self.last_heartbeat = now;

        if packet.msg_type == 0 {
            // Heartbeat: TTL refreshed, nothing to dispatch.
            return Vec::new();
        }

        vec![SessionAction::Deliver(packet)]
    }
}
