//! Codec identifiers announced in the stream metadata.
//!
//! The peer sends each codec as a 4-byte ASCII tag read as a big-endian u32.
//! Three-letter names are left-padded with a zero byte (`"\0aac"`).

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Elementary stream kinds carried by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    /// Stable index of the stream within a session (video first).
    pub const fn index(self) -> usize {
        match self {
            Self::Video => 0,
            Self::Audio => 1,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => f.write_str("video"),
            Self::Audio => f.write_str("audio"),
        }
    }
}

/// Codecs the mirroring service can announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecId {
    H264,
    H265,
    Av1,
    Opus,
    Aac,
    /// Raw 16-bit little-endian PCM.
    Pcm16Le,
}

impl CodecId {
    pub const H264_TAG: u32 = u32::from_be_bytes(*b"h264");
    pub const H265_TAG: u32 = u32::from_be_bytes(*b"h265");
    pub const AV1_TAG: u32 = u32::from_be_bytes(*b"\0av1");
    pub const OPUS_TAG: u32 = u32::from_be_bytes(*b"opus");
    pub const AAC_TAG: u32 = u32::from_be_bytes(*b"\0aac");
    pub const RAW_TAG: u32 = u32::from_be_bytes(*b"\0raw");

    /// Resolve a wire tag. Unknown tags resolve to `None`.
    ///
    /// An all-zero tag is the peer's way of saying "no stream" and is not
    /// worth a warning.
    pub fn from_tag(tag: u32) -> Option<Self> {
        let codec = match tag {
            Self::H264_TAG => Self::H264,
            Self::H265_TAG => Self::H265,
            Self::AV1_TAG => Self::Av1,
            Self::OPUS_TAG => Self::Opus,
            Self::AAC_TAG => Self::Aac,
            Self::RAW_TAG => Self::Pcm16Le,
            0 => {
                debug!("Empty codec tag, no stream");
                return None;
            }
            _ => {
                warn!("Unknown codec tag 0x{:08x}", tag);
                return None;
            }
        };
        Some(codec)
    }

    /// The wire tag for this codec.
    pub const fn tag(self) -> u32 {
        match self {
            Self::H264 => Self::H264_TAG,
            Self::H265 => Self::H265_TAG,
            Self::Av1 => Self::AV1_TAG,
            Self::Opus => Self::OPUS_TAG,
            Self::Aac => Self::AAC_TAG,
            Self::Pcm16Le => Self::RAW_TAG,
        }
    }

    /// Which kind of elementary stream this codec produces.
    pub const fn kind(self) -> StreamKind {
        match self {
            Self::H264 | Self::H265 | Self::Av1 => StreamKind::Video,
            Self::Opus | Self::Aac | Self::Pcm16Le => StreamKind::Audio,
        }
    }

    /// Whether a decoder needs setup bytes from a config unit before the
    /// first media unit.
    pub const fn requires_extradata(self) -> bool {
        !matches!(self, Self::Pcm16Le)
    }

    /// Whether media units of this codec are an Annex B byte stream, so
    /// every payload starts with a start code.
    pub const fn is_annex_b(self) -> bool {
        matches!(self, Self::H264 | Self::H265)
    }

    /// Short human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::H265 => "h265",
            Self::Av1 => "av1",
            Self::Opus => "opus",
            Self::Aac => "aac",
            Self::Pcm16Le => "pcm_s16le",
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
