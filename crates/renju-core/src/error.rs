//! Error types for the session layer.
//!
//! Wire-protocol failures have defined on-wire reactions and are expressed
//! as session actions, not errors; `SessionError` covers the cases where the
//! session layer itself cannot produce a frame.

use renju_proto::ProtocolError;
use thiserror::Error;

use crate::crypto::CryptoError;

/// Errors from session-layer operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Outbound packet failed to encode.
    #[error("packet encode failed: {0}")]
    Encode(#[from] ProtocolError),

    /// Crypto operation failed outside a context with a wire reaction.
    #[error("crypto failure: {0}")]
    Crypto(#[from] CryptoError),
}
