//! Protocol error types.
//!
//! Every decode failure is a distinct variant so the session layer can pick
//! the right reaction: transport errors (bad magic, oversize) close the
//! connection, packet-level errors become Error packets on a live session.

use thiserror::Error;

/// Convenience result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced by the frame and packet codecs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame did not start with the protocol magic. The peer is not speaking
    /// this protocol; the connection must be closed without a reply.
    #[error("invalid magic: {found:#06x}")]
    InvalidMagic {
        /// The two bytes that were found instead.
        found: u16,
    },

    /// Frame status byte is outside the defined set.
    #[error("invalid frame status: {0}")]
    InvalidStatus(u8),

    /// IV length field was neither 0 nor the fixed IV size.
    #[error("invalid iv length: {0}")]
    BadIvLength(u8),

    /// Declared payload length exceeds the configured cap.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Declared payload size.
        size: usize,
        /// Maximum permitted size.
        max: usize,
    },

    /// Packet body ended before a field was complete.
    #[error("truncated packet: needed {expected} more bytes, had {actual}")]
    UnexpectedEof {
        /// Bytes the next field required.
        expected: usize,
        /// Bytes actually remaining.
        actual: usize,
    },

    /// Parameter value tag is outside the closed tag set. No out-of-band
    /// extension is permitted.
    #[error("unknown value tag: {0}")]
    UnknownValueTag(u8),

    /// Boolean value byte other than 0 or 1.
    #[error("invalid bool byte: {0}")]
    InvalidBool(u8),

    /// Parameter name or string value was not valid UTF-8.
    #[error("invalid utf-8 in {context}")]
    InvalidUtf8 {
        /// Which field failed validation.
        context: &'static str,
    },

    /// Bytes remained after the declared parameter count was consumed.
    #[error("trailing bytes after packet: {remaining}")]
    TrailingBytes {
        /// Number of unconsumed bytes.
        remaining: usize,
    },

    /// Too many parameters to encode in the u16 count field.
    #[error("too many params: {count}")]
    TooManyParams {
        /// Number of parameters requested.
        count: usize,
    },

    /// Parameter name longer than the u16 length field allows.
    #[error("param name too long: {len} bytes")]
    NameTooLong {
        /// Byte length of the offending name.
        len: usize,
    },
}

impl ProtocolError {
    /// True when the error means the peer is malformed or hostile and the
    /// connection should be dropped without a reply.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidMagic { .. } | Self::PayloadTooLarge { .. } | Self::BadIvLength(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_fatal() {
        assert!(ProtocolError::InvalidMagic { found: 0xdead }.is_fatal());
        assert!(ProtocolError::PayloadTooLarge { size: 10, max: 1 }.is_fatal());
        assert!(ProtocolError::BadIvLength(7).is_fatal());
    }

    #[test]
    fn packet_errors_are_recoverable() {
        assert!(!ProtocolError::UnknownValueTag(9).is_fatal());
        assert!(!ProtocolError::UnexpectedEof { expected: 4, actual: 1 }.is_fatal());
        assert!(!ProtocolError::TrailingBytes { remaining: 3 }.is_fatal());
    }

    #[test]
    fn display_includes_detail() {
        let err = ProtocolError::PayloadTooLarge { size: 2_000_000, max: 1_048_576 };
        assert_eq!(err.to_string(), "payload too large: 2000000 bytes (max 1048576)");
    }
}
