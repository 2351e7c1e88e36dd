//! Sans-IO domain logic for the renju game server.
//!
//! Everything in this crate is pure state-machine code: no sockets, no
//! clocks, no global singletons. Time comes in through method parameters or
//! the [`env::Environment`] abstraction, randomness through the same, and
//! side effects go out as return values (frames to send, events to publish)
//! for the server driver to execute.
//!
//! # Layers
//!
//! - [`session`]: handshake and per-connection encryption state.
//! - [`crypto`]: the crypto collaborator seam (key agreement is pluggable,
//!   the symmetric AEAD is built in).
//! - [`board`] / [`room`] / [`user`]: the authoritative game rules.
//! - [`store`]: users, rooms, and the bidirectional index maps.
//! - [`events`]: the typed publish/subscribe bus connecting domain logic to
//!   the notifier.
//! - [`timewheel`]: deferred-task scheduling for session expiry.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod board;
pub mod crypto;
pub mod env;
pub mod error;
pub mod events;
pub mod room;
pub mod session;
pub mod store;
pub mod timewheel;
pub mod user;

pub use board::{Board, BoardError, Cell};
pub use crypto::{CryptoError, DevKeyExchange, SessionCrypto, SessionKey};
pub use env::Environment;
pub use error::SessionError;
pub use events::{EventBus, EventKind, GameEvent, Subscription, ALL_EVENT_KINDS};
pub use room::{
    NegStatus, NegotiationOutcome, Room, RoomConfig, RoomError, RoomSettingsUpdate, RoomStatus,
};
pub use session::{Session, SessionAction, SessionPhase, DEFAULT_SESSION_TIMEOUT};
pub use store::{
    GameRecord, GatewayError, ObjectStore, PersistenceGateway, StoreError, GUEST_ID_BASE,
};
pub use timewheel::TimeWheel;
pub use user::{rank_for_score, User, RANK_TABLE};
