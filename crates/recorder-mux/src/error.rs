//! Error types for the muxer module.

use recorder_protocol::{CodecId, StreamKind};
use thiserror::Error;

/// Errors that can occur while writing a container.
#[derive(Debug, Error)]
pub enum MuxError {
    /// The container cannot carry this codec.
    #[error("Unsupported codec for {container}: {codec}")]
    UnsupportedCodec {
        container: &'static str,
        codec: CodecId,
    },

    /// Stream index was never declared.
    #[error("Unknown stream index: {0}")]
    UnknownStream(usize),

    /// The container carries at most one stream of this kind.
    #[error("Duplicate {0} stream")]
    DuplicateStream(StreamKind),

    /// A stream was declared or the header written twice.
    #[error("Header already written")]
    HeaderAlreadyWritten,

    /// A unit was written before the header.
    #[error("Header not written")]
    HeaderNotWritten,

    /// Extradata could not be turned into a decoder configuration.
    #[error("Invalid extradata: {0}")]
    InvalidExtradata(String),

    /// A unit payload could not be packaged.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The container was already closed.
    #[error("Container closed")]
    Closed,

    /// The receiving side of a channel adapter went away.
    #[error("Channel disconnected")]
    ChannelDisconnected,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
