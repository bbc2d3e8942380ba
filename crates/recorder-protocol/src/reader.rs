//! Exact-length reads over a blocking connection.

use std::io::{self, Read};

use bytes::Bytes;

use crate::error::ProtocolError;
use crate::ProtocolResult;

/// Reads exact-length spans from a blocking byte source.
///
/// A read either returns the full span or fails; callers never see a
/// partially filled buffer.
pub struct ByteReader<R> {
    inner: R,
    bytes_read: u64,
}

impl<R: Read> ByteReader<R> {
    /// Wrap a blocking reader.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            bytes_read: 0,
        }
    }

    /// Read exactly `len` bytes.
    pub fn read_exact(&mut self, len: usize) -> ProtocolResult<Bytes> {
        let mut buf = vec![0u8; len];
        self.fill(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    /// Read exactly `N` bytes into an array.
    pub fn read_array<const N: usize>(&mut self) -> ProtocolResult<[u8; N]> {
        let mut buf = [0u8; N];
        self.fill(&mut buf)?;
        Ok(buf)
    }

    /// Read a big-endian u32.
    pub fn read_u32_be(&mut self) -> ProtocolResult<u32> {
        Ok(u32::from_be_bytes(self.read_array::<4>()?))
    }

    /// Total bytes consumed from the source so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Get a reference to the underlying reader.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Unwrap the underlying reader.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn fill(&mut self, buf: &mut [u8]) -> ProtocolResult<()> {
        let expected = buf.len();
        let mut filled = 0;

        while filled < expected {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(ProtocolError::ShortRead {
                        expected,
                        received: filled,
                    })
                }
                Ok(n) => {
                    filled += n;
                    self.bytes_read += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(ProtocolError::ReadFailed {
                        expected,
                        received: filled,
                        source,
                    })
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Hands out at most `chunk` bytes per read call.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        chunk: usize,
        interrupt_next: bool,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.interrupt_next {
                self.interrupt_next = false;
                return Err(io::Error::new(io::ErrorKind::Interrupted, "signal"));
            }
            let n = buf.len().min(self.chunk).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            self.interrupt_next = true;
            Ok(n)
        }
    }

    #[test]
    fn test_read_exact_across_partial_reads() {
        let mut reader = ByteReader::new(Trickle {
            data: (0u8..10).collect(),
            pos: 0,
            chunk: 3,
            interrupt_next: false,
        });

        let span = reader.read_exact(7).unwrap();
        assert_eq!(span.as_ref(), &[0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(reader.bytes_read(), 7);
    }

    #[test]
    fn test_short_read_reports_progress() {
        let mut reader = ByteReader::new(Cursor::new(vec![1u8, 2, 3]));

        match reader.read_exact(8) {
            Err(ProtocolError::ShortRead { expected, received }) => {
                assert_eq!(expected, 8);
                assert_eq!(received, 3);
            }
            other => panic!("expected ShortRead, got {:?}", other),
        }
    }

    #[test]
    fn test_read_u32_be() {
        let mut reader = ByteReader::new(Cursor::new(vec![0x68, 0x32, 0x36, 0x34]));
        assert_eq!(reader.read_u32_be().unwrap(), 0x6832_3634);
    }

    #[test]
    fn test_read_error_is_surfaced() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            }
        }

        let mut reader = ByteReader::new(Broken);
        let err = reader.read_array::<4>().unwrap_err();
        assert!(matches!(err, ProtocolError::ReadFailed { received: 0, .. }));
        assert!(err.is_end_of_stream());
    }

    #[test]
    fn test_zero_length_read() {
        let mut reader = ByteReader::new(Cursor::new(Vec::<u8>::new()));
        assert!(reader.read_exact(0).unwrap().is_empty());
    }
}
