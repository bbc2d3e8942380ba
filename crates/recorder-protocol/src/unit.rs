//! Access units and the decoder that reads them off the wire.

use std::io::Read;

use bytes::Bytes;
use tracing::trace;

use crate::codec::StreamKind;
use crate::error::ProtocolError;
use crate::header::FrameHeader;
use crate::reader::ByteReader;
use crate::{ProtocolResult, DEFAULT_MAX_PAYLOAD_LEN, FRAME_HEADER_LEN};

/// What an access unit carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// Codec configuration (parameter sets, decoder setup bytes).
    Config,
    /// A decodable frame.
    Media,
}

/// One unit of the elementary stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    /// Config or media.
    pub kind: UnitKind,

    /// Presentation timestamp in microseconds. Always `None` for config units.
    pub pts: Option<u64>,

    /// Whether the keyframe bit was set.
    pub is_keyframe: bool,

    /// Unit payload.
    pub payload: Bytes,

    /// Stream the unit belongs to, once classified.
    pub stream: Option<StreamKind>,
}

impl AccessUnit {
    /// Create a config unit.
    pub fn config(payload: Bytes) -> Self {
        Self {
            kind: UnitKind::Config,
            pts: None,
            is_keyframe: false,
            payload,
            stream: None,
        }
    }

    /// Create a media unit.
    pub fn media(pts: u64, is_keyframe: bool, payload: Bytes) -> Self {
        Self {
            kind: UnitKind::Media,
            pts: Some(pts),
            is_keyframe,
            payload,
            stream: None,
        }
    }

    /// Build a unit from a decoded header and its payload.
    pub fn from_header(header: &FrameHeader, payload: Bytes) -> Self {
        let kind = if header.is_config() {
            UnitKind::Config
        } else {
            UnitKind::Media
        };

        Self {
            kind,
            pts: header.pts(),
            is_keyframe: header.is_keyframe(),
            payload,
            stream: None,
        }
    }

    /// Tag the unit with its stream.
    pub fn with_stream(mut self, stream: StreamKind) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Whether this is a config unit.
    pub fn is_config(&self) -> bool {
        self.kind == UnitKind::Config
    }
}

/// Reads header + payload pairs and turns them into [`AccessUnit`]s.
pub struct UnitDecoder {
    max_payload_len: usize,
    units_decoded: u64,
}

impl UnitDecoder {
    /// Create a decoder with the given payload size limit.
    pub fn new(max_payload_len: usize) -> Self {
        Self {
            max_payload_len,
            units_decoded: 0,
        }
    }

    /// Read the next access unit.
    ///
    /// A short read while reading the header is reported as
    /// [`ProtocolError::ShortRead`]; a short read inside the payload as
    /// [`ProtocolError::TruncatedPayload`]. Neither yields a partial unit.
    pub fn read_unit<R: Read>(&mut self, reader: &mut ByteReader<R>) -> ProtocolResult<AccessUnit> {
        let header_bytes = reader.read_array::<FRAME_HEADER_LEN>()?;
        let header = FrameHeader::decode(&header_bytes);

        let declared = header.payload_len();
        if declared > self.max_payload_len {
            return Err(ProtocolError::PayloadTooLarge {
                len: declared,
                max: self.max_payload_len,
            });
        }

        let payload = reader.read_exact(declared).map_err(|e| match e {
            ProtocolError::ShortRead { received, .. }
            | ProtocolError::ReadFailed { received, .. } => {
                ProtocolError::TruncatedPayload { declared, received }
            }
            other => other,
        })?;

        self.units_decoded += 1;
        trace!(
            config = header.is_config(),
            key = header.is_keyframe(),
            pts = ?header.pts(),
            len = declared,
            "Decoded access unit"
        );

        Ok(AccessUnit::from_header(&header, payload))
    }

    /// Number of complete units decoded so far.
    pub fn units_decoded(&self) -> u64 {
        self.units_decoded
    }
}

impl Default for UnitDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FLAG_CONFIG, FLAG_KEY_FRAME};
    use std::io::Cursor;

    fn frame(field: u64, payload: &[u8]) -> Vec<u8> {
        let mut out = field.to_be_bytes().to_vec();
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_decode_config_then_media() {
        let mut wire = frame(FLAG_CONFIG | 99, &[0, 0, 0, 1, 0x67]);
        wire.extend(frame(FLAG_KEY_FRAME | 5_000, &[0, 0, 0, 1, 0x65, 0x88]));
        let mut reader = ByteReader::new(Cursor::new(wire));
        let mut decoder = UnitDecoder::default();

        let config = decoder.read_unit(&mut reader).unwrap();
        assert_eq!(config.kind, UnitKind::Config);
        assert_eq!(config.pts, None);
        assert!(!config.is_keyframe);
        assert_eq!(config.payload.as_ref(), &[0, 0, 0, 1, 0x67]);

        let media = decoder.read_unit(&mut reader).unwrap();
        assert_eq!(media.kind, UnitKind::Media);
        assert_eq!(media.pts, Some(5_000));
        assert!(media.is_keyframe);
        assert_eq!(media.stream, None);
        assert_eq!(decoder.units_decoded(), 2);
    }

    #[test]
    fn test_keyframe_flag_kept_on_config() {
        let wire = frame(FLAG_CONFIG | FLAG_KEY_FRAME, &[1, 2]);
        let mut reader = ByteReader::new(Cursor::new(wire));

        let unit = UnitDecoder::default().read_unit(&mut reader).unwrap();
        assert!(unit.is_config());
        assert!(unit.is_keyframe);
    }

    #[test]
    fn test_truncated_payload() {
        let mut wire = frame(1_000, &[9u8; 10]);
        wire.truncate(FRAME_HEADER_LEN + 4);
        let mut reader = ByteReader::new(Cursor::new(wire));
        let mut decoder = UnitDecoder::default();

        match decoder.read_unit(&mut reader) {
            Err(ProtocolError::TruncatedPayload { declared, received }) => {
                assert_eq!(declared, 10);
                assert_eq!(received, 4);
            }
            other => panic!("expected TruncatedPayload, got {:?}", other),
        }
        assert_eq!(decoder.units_decoded(), 0);
    }

    #[test]
    fn test_short_header() {
        let mut reader = ByteReader::new(Cursor::new(vec![0u8; 7]));
        let err = UnitDecoder::default().read_unit(&mut reader).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::ShortRead {
                expected: 12,
                received: 7
            }
        ));
    }

    #[test]
    fn test_payload_limit() {
        let wire = frame(0, &[0u8; 32]);
        let mut reader = ByteReader::new(Cursor::new(wire));

        let err = UnitDecoder::new(16).read_unit(&mut reader).unwrap_err();
        assert!(matches!(err, ProtocolError::PayloadTooLarge { len: 32, max: 16 }));
        assert!(!err.is_end_of_stream());
    }

    #[test]
    fn test_empty_payload() {
        let wire = frame(42, &[]);
        let mut reader = ByteReader::new(Cursor::new(wire));

        let unit = UnitDecoder::default().read_unit(&mut reader).unwrap();
        assert_eq!(unit.pts, Some(42));
        assert!(unit.payload.is_empty());
    }
}
