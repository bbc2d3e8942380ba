//! Stream metadata sent once before any access unit.

use std::io::Read;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::codec::{CodecId, StreamKind};
use crate::error::ProtocolError;
use crate::reader::ByteReader;
use crate::ProtocolResult;

/// Codecs and dimensions announced by the peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMetadata {
    /// Video codec (required).
    pub video_codec: CodecId,

    /// Video width in pixels.
    pub width: u32,

    /// Video height in pixels.
    pub height: u32,

    /// Audio codec, if the peer sends audio.
    pub audio_codec: Option<CodecId>,
}

impl StreamMetadata {
    /// Read the metadata block: video tag, width, height, audio tag.
    pub fn read<R: Read>(reader: &mut ByteReader<R>) -> ProtocolResult<Self> {
        let video_tag = reader.read_u32_be()?;
        let width = reader.read_u32_be()?;
        let height = reader.read_u32_be()?;
        let audio_tag = reader.read_u32_be()?;

        let video_codec = match CodecId::from_tag(video_tag) {
            Some(codec) if codec.kind() == StreamKind::Video => codec,
            _ => return Err(ProtocolError::UnsupportedVideoCodec(video_tag)),
        };

        let audio_codec = match CodecId::from_tag(audio_tag) {
            Some(codec) if codec.kind() == StreamKind::Audio => Some(codec),
            Some(codec) => {
                warn!(%codec, "Video codec announced in the audio slot, ignoring audio");
                None
            }
            None => None,
        };

        info!(
            video = %video_codec,
            width,
            height,
            audio = ?audio_codec,
            "Received stream metadata"
        );

        Ok(Self {
            video_codec,
            width,
            height,
            audio_codec,
        })
    }

    /// Codec of the given stream, if the stream exists.
    pub fn codec(&self, kind: StreamKind) -> Option<CodecId> {
        match kind {
            StreamKind::Video => Some(self.video_codec),
            StreamKind::Audio => self.audio_codec,
        }
    }

    /// Whether the peer announced an audio stream.
    pub fn has_audio(&self) -> bool {
        self.audio_codec.is_some()
    }

    /// Streams carried by this session, video first.
    pub fn streams(&self) -> impl Iterator<Item = (StreamKind, CodecId)> + '_ {
        [StreamKind::Video, StreamKind::Audio]
            .into_iter()
            .filter_map(|kind| self.codec(kind).map(|codec| (kind, codec)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn block(video: &[u8; 4], width: u32, height: u32, audio: &[u8; 4]) -> Vec<u8> {
        let mut out = video.to_vec();
        out.extend_from_slice(&width.to_be_bytes());
        out.extend_from_slice(&height.to_be_bytes());
        out.extend_from_slice(audio);
        out
    }

    #[test]
    fn test_read_video_and_audio() {
        let mut reader = ByteReader::new(Cursor::new(block(b"h264", 1080, 2340, b"opus")));
        let meta = StreamMetadata::read(&mut reader).unwrap();

        assert_eq!(meta.video_codec, CodecId::H264);
        assert_eq!((meta.width, meta.height), (1080, 2340));
        assert_eq!(meta.audio_codec, Some(CodecId::Opus));
        assert_eq!(
            meta.streams().collect::<Vec<_>>(),
            vec![
                (StreamKind::Video, CodecId::H264),
                (StreamKind::Audio, CodecId::Opus)
            ]
        );
    }

    #[test]
    fn test_absent_audio() {
        let mut reader = ByteReader::new(Cursor::new(block(b"h265", 720, 1280, &[0; 4])));
        let meta = StreamMetadata::read(&mut reader).unwrap();

        assert_eq!(meta.video_codec, CodecId::H265);
        assert!(!meta.has_audio());
        assert_eq!(meta.streams().count(), 1);
    }

    #[test]
    fn test_unknown_audio_is_not_fatal() {
        let mut reader = ByteReader::new(Cursor::new(block(b"\0av1", 720, 1280, b"flac")));
        let meta = StreamMetadata::read(&mut reader).unwrap();
        assert_eq!(meta.audio_codec, None);
    }

    #[test]
    fn test_unknown_video_is_fatal() {
        let mut reader = ByteReader::new(Cursor::new(block(b"vp09", 720, 1280, b"opus")));
        let err = StreamMetadata::read(&mut reader).unwrap_err();
        assert!(matches!(err, ProtocolError::UnsupportedVideoCodec(_)));
    }

    #[test]
    fn test_truncated_metadata() {
        let mut wire = block(b"h264", 720, 1280, b"opus");
        wire.truncate(9);
        let mut reader = ByteReader::new(Cursor::new(wire));
        assert!(StreamMetadata::read(&mut reader)
            .unwrap_err()
            .is_end_of_stream());
    }
}
