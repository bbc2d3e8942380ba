//! Error types for the protocol module.

use thiserror::Error;

/// Errors that can occur while talking to the mirroring service.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Socket setup or handshake failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The peer closed the connection before the requested bytes arrived.
    #[error("Short read: expected {expected} bytes, received {received}")]
    ShortRead { expected: usize, received: usize },

    /// The connection errored before the requested bytes arrived.
    #[error("Read failed after {received} of {expected} bytes: {source}")]
    ReadFailed {
        expected: usize,
        received: usize,
        #[source]
        source: std::io::Error,
    },

    /// A header was read but its payload was cut short.
    #[error("Truncated payload: header declared {declared} bytes, received {received}")]
    TruncatedPayload { declared: usize, received: usize },

    /// A header declared a payload larger than the configured limit.
    #[error("Payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    /// The announced video codec tag is not one we can record.
    #[error("Unsupported video codec tag 0x{0:08x}")]
    UnsupportedVideoCodec(u32),
}

impl ProtocolError {
    /// Whether this error marks the end of the stream rather than a defect
    /// in the data that was received.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(
            self,
            Self::ShortRead { .. } | Self::ReadFailed { .. } | Self::TruncatedPayload { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn test_end_of_stream_classification() {
        assert!(ProtocolError::ShortRead {
            expected: 12,
            received: 3
        }
        .is_end_of_stream());
        assert!(ProtocolError::TruncatedPayload {
            declared: 100,
            received: 40
        }
        .is_end_of_stream());
        assert!(ProtocolError::ReadFailed {
            expected: 4,
            received: 0,
            source: io::Error::new(io::ErrorKind::ConnectionReset, "reset"),
        }
        .is_end_of_stream());

        assert!(!ProtocolError::PayloadTooLarge { len: 10, max: 5 }.is_end_of_stream());
        assert!(!ProtocolError::ConnectionFailed("refused".into()).is_end_of_stream());
    }

    #[test]
    fn test_error_display_and_source() {
        let err = ProtocolError::UnsupportedVideoCodec(0x7670_3038);
        assert!(err.to_string().contains("0x76703038"));

        let err = ProtocolError::ReadFailed {
            expected: 12,
            received: 5,
            source: io::Error::new(io::ErrorKind::TimedOut, "timed out"),
        };
        assert!(err.to_string().contains("5 of 12"));
        assert!(err.source().is_some());
    }
}
