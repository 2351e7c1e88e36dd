//! Server error types.

use renju_core::GatewayError;
use renju_proto::ProtocolError;
use thiserror::Error;

/// Errors from server startup and runtime plumbing.
///
/// Protocol violations on individual connections are handled locally (close
/// or error frame) and never surface here; this type is for the paths that
/// take the process down or fail a whole subsystem.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Socket operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame encoding failed on the outbound path.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Persistence gateway failed during startup.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),
}
