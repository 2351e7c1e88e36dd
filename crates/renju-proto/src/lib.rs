//! Wire protocol for the renju game server.
//!
//! Two layers ride on a single TCP stream:
//!
//! - [`Frame`]: the transport unit. A small big-endian header (magic, status,
//!   session id, optional IV) followed by a length-prefixed opaque payload.
//!   Frames carry the session handshake; once a session is active the payload
//!   is ciphertext.
//! - [`Packet`]: the application message inside an active frame's decrypted
//!   payload. A message type plus a typed parameter map where every value is
//!   self-describing on the wire.
//!
//! Both encodings are the compatibility contract: they must round-trip
//! bit-exactly and reject malformed input rather than guessing.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod errors;
mod frame;
mod packet;

pub use errors::{ProtocolError, Result};
pub use frame::{Frame, Status, IV_LEN, MAGIC, MAX_PAYLOAD_SIZE};
pub use packet::{MsgType, Packet, Value};
