//! Packet codec: the application message inside an active frame.
//!
//! Layout (big-endian):
//!
//! ```text
//! msgType:u16 | paramCount:u16 | param*
//! param := nameLen:u16 | name:nameLen | valueTag:u8 | value
//! ```
//!
//! Value tags: 1=bool (u8), 2=u32, 3=u64, 4=i32, 5=string (u32 length +
//! UTF-8). The tag set is closed: decoding rejects anything else. Message
//! types are partitioned by range, and that partitioning is the dispatcher's
//! routing key; unknown message types decode fine and are refused one layer
//! up with an Error packet.
//!
//! # Invariants
//!
//! - `encode` then `decode` reproduces the packet exactly, including
//!   parameter order (insertion order is preserved).
//! - Decoding consumes the whole input; trailing bytes are an error.

use bytes::BufMut;

use crate::errors::{ProtocolError, Result};

/// Application message types, partitioned by range:
///
/// - 0: heartbeat (session TTL refresh only)
/// - 100–199: authentication
/// - 200–299: lobby
/// - 300–399: room
/// - 400–499: game
/// - 9900–9999: error / push
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MsgType {
    /// Keepalive; refreshes the session TTL, no other processing.
    Heartbeat = 0,

    /// Log in with username and password.
    Login = 100,
    /// Create an account and log in.
    SignIn = 101,
    /// Log in as an anonymous guest.
    LoginAsGuest = 102,
    /// Release the session's user binding.
    LogOut = 103,
    /// Query a user's public profile.
    GetUser = 104,

    /// Create a room with the caller as owner.
    CreateRoom = 200,
    /// Join a room by id.
    JoinRoom = 201,
    /// Join any free room, creating one if none exists.
    QuickMatch = 202,
    /// Pull a bounded snapshot of users.
    UpdateUsersToLobby = 203,
    /// Pull a bounded snapshot of rooms.
    UpdateRoomsToLobby = 204,

    /// Seat negotiation.
    SyncSeat = 300,
    /// Owner-only room configuration edit.
    SyncRoomSetting = 301,
    /// Chat line to the room.
    ChatMessage = 302,
    /// Leave the current room.
    ExitRoom = 303,
    /// Pull the room's member list.
    SyncUsersToRoom = 304,

    /// Place a stone.
    MakeMove = 400,
    /// Undo negotiation (ask / accept / reject).
    UndoMove = 401,
    /// Draw negotiation (ask / accept / reject).
    Draw = 402,
    /// Unilateral resignation.
    GiveUp = 403,
    /// Owner starts the game.
    GameStarted = 404,
    /// Game-over push.
    GameEnded = 405,
    /// Pull or push a full game snapshot.
    SyncGame = 406,

    /// Error reply carrying a human-readable reason.
    Error = 9900,
}

impl MsgType {
    /// Message type as its wire value.
    #[must_use]
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Parse a wire value. `None` for anything outside the closed set.
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::Heartbeat),
            100 => Some(Self::Login),
            101 => Some(Self::SignIn),
            102 => Some(Self::LoginAsGuest),
            103 => Some(Self::LogOut),
            104 => Some(Self::GetUser),
            200 => Some(Self::CreateRoom),
            201 => Some(Self::JoinRoom),
            202 => Some(Self::QuickMatch),
            203 => Some(Self::UpdateUsersToLobby),
            204 => Some(Self::UpdateRoomsToLobby),
            300 => Some(Self::SyncSeat),
            301 => Some(Self::SyncRoomSetting),
            302 => Some(Self::ChatMessage),
            303 => Some(Self::ExitRoom),
            304 => Some(Self::SyncUsersToRoom),
            400 => Some(Self::MakeMove),
            401 => Some(Self::UndoMove),
            402 => Some(Self::Draw),
            403 => Some(Self::GiveUp),
            404 => Some(Self::GameStarted),
            405 => Some(Self::GameEnded),
            406 => Some(Self::SyncGame),
            9900 => Some(Self::Error),
            _ => None,
        }
    }
}

/// A self-describing parameter value.
///
/// The tag set is closed; the decoder rejects unknown tags rather than
/// skipping them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Tag 1: boolean, one byte on the wire.
    Bool(bool),
    /// Tag 2: unsigned 32-bit.
    U32(u32),
    /// Tag 3: unsigned 64-bit.
    U64(u64),
    /// Tag 4: signed 32-bit, two's complement.
    I32(i32),
    /// Tag 5: UTF-8 string with u32 length prefix.
    Str(String),
}

impl Value {
    /// Wire tag for this value.
    #[must_use]
    pub fn tag(&self) -> u8 {
        match self {
            Self::Bool(_) => 1,
            Self::U32(_) => 2,
            Self::U64(_) => 3,
            Self::I32(_) => 4,
            Self::Str(_) => 5,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::U32(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::U64(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::I32(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// In-memory form of an application message.
///
/// Carries the owning session id (assigned by the session layer, not part of
/// the packet encoding), the raw message type, and the parameter map in
/// insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Session the packet belongs to. For inbound packets, the sender; for
    /// outbound, the recipient.
    pub session_id: u64,
    /// Raw message type. Use [`Packet::msg_type`] for the decoded enum.
    pub msg_type: u16,
    /// Parameters in insertion order.
    pub params: Vec<(String, Value)>,
}

impl Packet {
    /// Create an empty packet of the given type.
    #[must_use]
    pub fn new(session_id: u64, msg_type: MsgType) -> Self {
        Self { session_id, msg_type: msg_type.to_u16(), params: Vec::new() }
    }

    /// Create an Error packet carrying a human-readable reason.
    #[must_use]
    pub fn error(session_id: u64, reason: impl Into<String>) -> Self {
        Self::new(session_id, MsgType::Error).with("error", reason.into())
    }

    /// Message type as enum. `None` if outside the closed set (the
    /// dispatcher replies with an Error packet in that case).
    #[must_use]
    pub fn msg_type(&self) -> Option<MsgType> {
        MsgType::from_u16(self.msg_type)
    }

    /// Set a parameter, replacing any previous value under the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self.params.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.params.push((name, value));
        }
    }

    /// Builder-style [`Packet::set`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Raw parameter lookup.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Typed accessor: bool parameter.
    #[must_use]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name) {
            Some(Value::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    /// Typed accessor: u32 parameter.
    #[must_use]
    pub fn get_u32(&self, name: &str) -> Option<u32> {
        match self.get(name) {
            Some(Value::U32(v)) => Some(*v),
            _ => None,
        }
    }

    /// Typed accessor: u64 parameter.
    #[must_use]
    pub fn get_u64(&self, name: &str) -> Option<u64> {
        match self.get(name) {
            Some(Value::U64(v)) => Some(*v),
            _ => None,
        }
    }

    /// Typed accessor: i32 parameter.
    #[must_use]
    pub fn get_i32(&self, name: &str) -> Option<i32> {
        match self.get(name) {
            Some(Value::I32(v)) => Some(*v),
            _ => None,
        }
    }

    /// Typed accessor: string parameter.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(Value::Str(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Encode the packet body (the bytes that get encrypted into an active
    /// frame's payload).
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::TooManyParams`] when the count exceeds u16.
    /// - [`ProtocolError::NameTooLong`] when a name exceeds u16 bytes.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let count = u16::try_from(self.params.len())
            .map_err(|_| ProtocolError::TooManyParams { count: self.params.len() })?;

        dst.put_u16(self.msg_type);
        dst.put_u16(count);

        for (name, value) in &self.params {
            let name_len = u16::try_from(name.len())
                .map_err(|_| ProtocolError::NameTooLong { len: name.len() })?;
            dst.put_u16(name_len);
            dst.put_slice(name.as_bytes());
            dst.put_u8(value.tag());

            match value {
                Value::Bool(v) => dst.put_u8(u8::from(*v)),
                Value::U32(v) => dst.put_u32(*v),
                Value::U64(v) => dst.put_u64(*v),
                Value::I32(v) => dst.put_i32(*v),
                Value::Str(v) => {
                    dst.put_u32(v.len() as u32);
                    dst.put_slice(v.as_bytes());
                },
            }
        }

        Ok(())
    }

    /// Encode into a fresh byte vector.
    ///
    /// # Errors
    ///
    /// Same as [`Packet::encode`].
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        Ok(buf)
    }

    /// Decode a packet body, attributing it to `session_id`.
    ///
    /// Unknown message types are accepted (the dispatcher refuses them);
    /// unknown value tags and trailing bytes are not.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::UnexpectedEof`] on truncated input.
    /// - [`ProtocolError::UnknownValueTag`] for tags outside 1–5.
    /// - [`ProtocolError::InvalidUtf8`] for non-UTF-8 names or strings.
    /// - [`ProtocolError::TrailingBytes`] when input outlives the declared
    ///   parameter count.
    pub fn decode(session_id: u64, bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor { bytes, pos: 0 };

        let msg_type = cursor.read_u16()?;
        let count = cursor.read_u16()?;

        let mut params = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name_len = cursor.read_u16()? as usize;
            let name_bytes = cursor.read_slice(name_len)?;
            let name = std::str::from_utf8(name_bytes)
                .map_err(|_| ProtocolError::InvalidUtf8 { context: "param name" })?
                .to_string();

            let tag = cursor.read_u8()?;
            let value = match tag {
                1 => match cursor.read_u8()? {
                    0 => Value::Bool(false),
                    1 => Value::Bool(true),
                    other => return Err(ProtocolError::InvalidBool(other)),
                },
                2 => Value::U32(cursor.read_u32()?),
                3 => Value::U64(cursor.read_u64()?),
                4 => Value::I32(cursor.read_u32()? as i32),
                5 => {
                    let len = cursor.read_u32()? as usize;
                    let str_bytes = cursor.read_slice(len)?;
                    let s = std::str::from_utf8(str_bytes)
                        .map_err(|_| ProtocolError::InvalidUtf8 { context: "string value" })?;
                    Value::Str(s.to_string())
                },
                other => return Err(ProtocolError::UnknownValueTag(other)),
            };

            params.push((name, value));
        }

        if cursor.pos != bytes.len() {
            return Err(ProtocolError::TrailingBytes { remaining: bytes.len() - cursor.pos });
        }

        Ok(Self { session_id, msg_type, params })
    }
}

/// Bounds-checked reader over the packet body.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(ProtocolError::UnexpectedEof { expected: len, actual: self.remaining() });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_slice(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        let b = self.read_slice(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let b = self.read_slice(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let b = self.read_slice(8)?;
        Ok(u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_all_value_kinds() {
        let packet = Packet::new(7, MsgType::MakeMove)
            .with("success", true)
            .with("x", 7u32)
            .with("roomId", 1u64)
            .with("delta", -42i32)
            .with("username", "gomoku_fan");

        let bytes = packet.to_bytes().unwrap();
        let decoded = Packet::decode(7, &bytes).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn empty_packet_round_trip() {
        let packet = Packet::new(0, MsgType::Heartbeat);
        let bytes = packet.to_bytes().unwrap();
        assert_eq!(bytes.len(), 4);
        assert_eq!(Packet::decode(0, &bytes).unwrap(), packet);
    }

    #[test]
    fn set_replaces_existing_value() {
        let mut packet = Packet::new(1, MsgType::Login);
        packet.set("username", "a");
        packet.set("username", "b");

        assert_eq!(packet.params.len(), 1);
        assert_eq!(packet.get_str("username"), Some("b"));
    }

    #[test]
    fn typed_accessors_refuse_wrong_type() {
        let packet = Packet::new(1, MsgType::Login).with("x", 3u32);
        assert_eq!(packet.get_u32("x"), Some(3));
        assert_eq!(packet.get_u64("x"), None);
        assert_eq!(packet.get_str("x"), None);
        assert_eq!(packet.get_bool("missing"), None);
    }

    #[test]
    fn unknown_msg_type_decodes() {
        let mut packet = Packet::new(1, MsgType::Login);
        packet.msg_type = 777;
        let bytes = packet.to_bytes().unwrap();

        let decoded = Packet::decode(1, &bytes).unwrap();
        assert_eq!(decoded.msg_type, 777);
        assert_eq!(decoded.msg_type(), None);
    }

    #[test]
    fn reject_unknown_value_tag() {
        let packet = Packet::new(1, MsgType::Login).with("k", 1u32);
        let mut bytes = packet.to_bytes().unwrap();
        // Tag byte sits right after msgType(2) + count(2) + nameLen(2) + "k".
        bytes[7] = 9;

        assert_eq!(Packet::decode(1, &bytes).unwrap_err(), ProtocolError::UnknownValueTag(9));
    }

    #[test]
    fn reject_truncated_input() {
        let packet = Packet::new(1, MsgType::Login).with("username", "abc");
        let bytes = packet.to_bytes().unwrap();

        for cut in 5..bytes.len() {
            let err = Packet::decode(1, &bytes[..cut]).unwrap_err();
            assert!(
                matches!(err, ProtocolError::UnexpectedEof { .. }),
                "cut at {cut} gave {err:?}"
            );
        }
    }

    #[test]
    fn reject_trailing_bytes() {
        let packet = Packet::new(1, MsgType::LogOut);
        let mut bytes = packet.to_bytes().unwrap();
        bytes.push(0);

        assert_eq!(
            Packet::decode(1, &bytes).unwrap_err(),
            ProtocolError::TrailingBytes { remaining: 1 }
        );
    }

    #[test]
    fn negative_i32_round_trips() {
        let packet = Packet::new(1, MsgType::SyncGame).with("lastX", -1i32);
        let bytes = packet.to_bytes().unwrap();
        assert_eq!(Packet::decode(1, &bytes).unwrap().get_i32("lastX"), Some(-1));
    }

    #[test]
    fn msg_type_ranges_partition_families() {
        assert_eq!(MsgType::Login.to_u16() / 100, 1);
        assert_eq!(MsgType::QuickMatch.to_u16() / 100, 2);
        assert_eq!(MsgType::SyncSeat.to_u16() / 100, 3);
        assert_eq!(MsgType::SyncGame.to_u16() / 100, 4);
        assert_eq!(MsgType::Error.to_u16() / 100, 99);
    }

    #[test]
    fn msg_type_round_trips() {
        for raw in [0u16, 100, 104, 200, 204, 300, 304, 400, 406, 9900] {
            let msg_type = MsgType::from_u16(raw).expect("defined type");
            assert_eq!(msg_type.to_u16(), raw);
        }
        assert_eq!(MsgType::from_u16(105), None);
        assert_eq!(MsgType::from_u16(500), None);
    }
}
