//! Connection setup and handshake.

use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info, instrument};

use crate::error::ProtocolError;
use crate::ProtocolResult;

/// Socket options applied when connecting.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Deadline for establishing the TCP connection.
    pub connect_timeout: Option<Duration>,

    /// Deadline for each blocking read. The protocol has no timeout of its
    /// own; without this a stalled peer stalls the receive loop.
    pub read_timeout: Option<Duration>,
}

/// Connect to the mirroring service and send the session identifier.
///
/// The identifier is written as-is, with no terminator. Any failure here is
/// fatal for the session.
#[instrument(name = "recorder_connect", skip(session_id, options))]
pub fn connect(addr: &str, session_id: &str, options: &ConnectOptions) -> ProtocolResult<TcpStream> {
    let mut stream = match options.connect_timeout {
        Some(timeout) => {
            let resolved = addr
                .to_socket_addrs()
                .map_err(|e| ProtocolError::ConnectionFailed(format!("resolve {}: {}", addr, e)))?
                .next()
                .ok_or_else(|| {
                    ProtocolError::ConnectionFailed(format!("no address for {}", addr))
                })?;
            TcpStream::connect_timeout(&resolved, timeout)
        }
        None => TcpStream::connect(addr),
    }
    .map_err(|e| ProtocolError::ConnectionFailed(format!("TCP connect failed: {}", e)))?;

    debug!("TCP connection established, sending session id");

    stream
        .set_read_timeout(options.read_timeout)
        .map_err(|e| ProtocolError::ConnectionFailed(format!("set read timeout: {}", e)))?;

    stream
        .write_all(session_id.as_bytes())
        .and_then(|_| stream.flush())
        .map_err(|e| ProtocolError::ConnectionFailed(format!("Handshake write failed: {}", e)))?;

    info!(addr, "Connected to mirroring service");
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_handshake_sends_session_id() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut received = Vec::new();
            socket.read_to_end(&mut received).unwrap();
            received
        });

        let options = ConnectOptions {
            connect_timeout: Some(Duration::from_secs(5)),
            read_timeout: Some(Duration::from_secs(5)),
        };
        let stream = connect(&addr, "0123456789abcdef", &options).unwrap();
        drop(stream);

        assert_eq!(server.join().unwrap(), b"0123456789abcdef");
    }

    #[test]
    fn test_connection_refused_is_fatal() {
        // Bind then drop to get a port nobody listens on.
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let err = connect(
            &format!("127.0.0.1:{}", port),
            "session",
            &ConnectOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ProtocolError::ConnectionFailed(_)));
        assert!(!err.is_end_of_stream());
    }
}
