//! Error types for the recording core.

use recorder_mux::MuxError;
use recorder_protocol::ProtocolError;
use thiserror::Error;

/// Errors that end a recording.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// Connection, handshake or metadata failure.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The container could not be set up or finished.
    #[error("Mux error: {0}")]
    Mux(#[from] MuxError),

    /// Configuration is missing or invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The recording thread panicked.
    #[error("Recording thread panicked")]
    ThreadPanicked,
}
