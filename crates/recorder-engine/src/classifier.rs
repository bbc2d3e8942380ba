//! Routing of access units to streams.

use serde::{Deserialize, Serialize};

use recorder_protocol::{StreamKind, StreamMetadata};

use crate::error::RecorderError;
use crate::RecorderResult;

/// Four-byte Annex B start code that marks a video payload.
pub const ANNEX_B_START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// How the recorder decides which stream a unit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    /// Sniff payloads when audio was announced, otherwise everything is video.
    #[default]
    Auto,
    /// Always sniff payloads.
    ContentSniffing,
    /// Everything is video.
    VideoOnly,
}

/// Stream classifier for a single session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamRouting {
    /// Every unit belongs to one stream.
    Fixed(StreamKind),
    /// Payloads starting with an Annex B start code are video, the rest audio.
    ContentSniffing,
}

impl StreamRouting {
    /// Pick the routing for a session.
    ///
    /// Sniffing needs every video payload to start with a start code, so it
    /// is refused when audio shares the wire with a non-Annex B video codec.
    pub fn for_session(mode: RoutingMode, metadata: &StreamMetadata) -> RecorderResult<Self> {
        let routing = match mode {
            RoutingMode::Auto if metadata.has_audio() => Self::ContentSniffing,
            RoutingMode::Auto | RoutingMode::VideoOnly => Self::Fixed(StreamKind::Video),
            RoutingMode::ContentSniffing => Self::ContentSniffing,
        };

        if routing == Self::ContentSniffing && !metadata.video_codec.is_annex_b() {
            return Err(RecorderError::Config(format!(
                "cannot separate audio from {} video by content, use video_only routing",
                metadata.video_codec
            )));
        }
        Ok(routing)
    }

    /// Stream of a unit with the given payload.
    pub fn classify(&self, payload: &[u8]) -> StreamKind {
        match self {
            Self::Fixed(kind) => *kind,
            Self::ContentSniffing if payload.starts_with(&ANNEX_B_START_CODE) => StreamKind::Video,
            Self::ContentSniffing => StreamKind::Audio,
        }
    }
}
