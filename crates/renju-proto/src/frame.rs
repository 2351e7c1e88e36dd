//! Frame codec: the transport unit on the wire.
//!
//! Layout (all integers big-endian):
//!
//! ```text
//! magic:u16 | status:u8 | sessionId:u64 | ivLen:u8 | iv:ivLen |
//! payloadLen:u32 | payload:payloadLen
//! ```
//!
//! The IV is present (16 bytes) only on `Active` frames; every other status
//! carries `ivLen = 0`. The payload is opaque to this layer: handshake bytes
//! before activation, ciphertext after.
//!
//! # Invariants
//!
//! - `iv.is_some()` iff `status == Status::Active` for frames built through
//!   the constructors; the decoder accepts what the wire says and leaves the
//!   status/IV pairing to the session layer.
//! - `payload.len()` never exceeds [`MAX_PAYLOAD_SIZE`]; enforced on encode
//!   and decode, and on decode before any allocation.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::errors::{ProtocolError, Result};

/// Protocol magic, first two bytes of every frame.
pub const MAGIC: u16 = 0x524A;

/// Fixed IV size for active frames.
pub const IV_LEN: usize = 16;

/// Maximum payload size (1 MiB). Oversize frames close the connection.
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Bytes before the IV: magic (2) + status (1) + session id (8) + ivLen (1).
const PREFIX_LEN: usize = 12;

/// Frame status codes.
///
/// `Hello` through `Activated` drive the handshake; `Active` carries
/// encrypted application traffic; the rest are server-side error replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    /// Client greeting, first frame on a new connection.
    Hello = 1,
    /// Server reply carrying the session id, server public key and signature.
    NewSession = 2,
    /// Client reply carrying its public key.
    Pending = 3,
    /// Server confirmation that the shared key is in place.
    Activated = 4,
    /// Encrypted application frame.
    Active = 5,
    /// Server refusal: the session is not active.
    Inactive = 6,
    /// Server-side error during handshake or decryption.
    Error = 7,
    /// Frame status not valid for the session's phase.
    InvalidRequest = 8,
}

impl Status {
    /// Status as its wire byte.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse a wire byte. `None` if outside the defined set.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Hello),
            2 => Some(Self::NewSession),
            3 => Some(Self::Pending),
            4 => Some(Self::Activated),
            5 => Some(Self::Active),
            6 => Some(Self::Inactive),
            7 => Some(Self::Error),
            8 => Some(Self::InvalidRequest),
            _ => None,
        }
    }
}

/// One on-wire frame.
///
/// Holds raw payload bytes, not a decoded packet: the transport can
/// reassemble and route frames without touching the application layer, and
/// ciphertext stays opaque until the session layer decrypts it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame status.
    pub status: Status,
    /// Session id this frame belongs to. Zero on the very first `Hello`,
    /// server-assigned afterwards.
    pub session_id: u64,
    /// Encryption IV, present only on `Active` frames.
    pub iv: Option<[u8; IV_LEN]>,
    /// Opaque payload bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Build a handshake or error frame (no IV).
    #[must_use]
    pub fn control(status: Status, session_id: u64, payload: impl Into<Bytes>) -> Self {
        debug_assert_ne!(status, Status::Active, "active frames carry an IV");
        Self { status, session_id, iv: None, payload: payload.into() }
    }

    /// Build an `Active` frame carrying ciphertext under the given IV.
    #[must_use]
    pub fn active(session_id: u64, iv: [u8; IV_LEN], payload: impl Into<Bytes>) -> Self {
        Self { status: Status::Active, session_id, iv: Some(iv), payload: payload.into() }
    }

    /// Total encoded size of this frame.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        PREFIX_LEN + self.iv.map_or(0, |iv| iv.len()) + 4 + self.payload.len()
    }

    /// Encode into a buffer.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::PayloadTooLarge`] when the payload exceeds
    ///   [`MAX_PAYLOAD_SIZE`].
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        dst.put_u16(MAGIC);
        dst.put_u8(self.status.to_u8());
        dst.put_u64(self.session_id);

        match &self.iv {
            Some(iv) => {
                dst.put_u8(iv.len() as u8);
                dst.put_slice(iv);
            },
            None => dst.put_u8(0),
        }

        dst.put_u32(self.payload.len() as u32);
        dst.put_slice(&self.payload);

        Ok(())
    }

    /// Encode into a fresh byte vector.
    ///
    /// # Errors
    ///
    /// Same as [`Frame::encode`].
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode(&mut buf)?;
        Ok(buf)
    }

    /// Try to split one frame off the front of a stream buffer.
    ///
    /// Returns `Ok(None)` while the buffer holds less than a full frame
    /// (header plus `payloadLen` bytes); the caller reads more and retries.
    /// On success the frame's bytes are consumed from `buf`.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::InvalidMagic`]: peer is malformed; close without
    ///   a reply.
    /// - [`ProtocolError::InvalidStatus`] / [`ProtocolError::BadIvLength`]:
    ///   structurally invalid header.
    /// - [`ProtocolError::PayloadTooLarge`]: declared length above the cap;
    ///   close the connection. Checked before the payload is buffered.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>> {
        if buf.len() < PREFIX_LEN {
            return Ok(None);
        }

        let magic = u16::from_be_bytes([buf[0], buf[1]]);
        if magic != MAGIC {
            return Err(ProtocolError::InvalidMagic { found: magic });
        }

        let status = Status::from_u8(buf[2]).ok_or(ProtocolError::InvalidStatus(buf[2]))?;

        let iv_len = buf[11] as usize;
        if iv_len != 0 && iv_len != IV_LEN {
            return Err(ProtocolError::BadIvLength(buf[11]));
        }

        if buf.len() < PREFIX_LEN + iv_len + 4 {
            return Ok(None);
        }

        let len_at = PREFIX_LEN + iv_len;
        let payload_len =
            u32::from_be_bytes([buf[len_at], buf[len_at + 1], buf[len_at + 2], buf[len_at + 3]])
                as usize;

        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge { size: payload_len, max: MAX_PAYLOAD_SIZE });
        }

        let total = PREFIX_LEN + iv_len + 4 + payload_len;
        if buf.len() < total {
            return Ok(None);
        }

        let mut frame_bytes = buf.split_to(total);
        frame_bytes.advance(3); // magic + status, already validated
        let session_id = frame_bytes.get_u64();
        frame_bytes.advance(1); // ivLen, already read

        let iv = if iv_len == IV_LEN {
            let mut iv = [0u8; IV_LEN];
            iv.copy_from_slice(&frame_bytes[..IV_LEN]);
            frame_bytes.advance(IV_LEN);
            Some(iv)
        } else {
            None
        };

        frame_bytes.advance(4); // payloadLen, already read
        let payload = frame_bytes.freeze();
        debug_assert_eq!(payload.len(), payload_len);

        Ok(Some(Self { status, session_id, iv, payload }))
    }
}
