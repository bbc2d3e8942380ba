//! Per-unit frame header.
//!
//! ```text
//! +--------+--------+------------------------------+------------------+
//! | bit 63 | bit 62 | bits 0..=61                  | 4 bytes          |
//! | config | key    | pts (us, media units only)   | payload length   |
//! +--------+--------+------------------------------+------------------+
//! ```
//!
//! All fields are big-endian.

use crate::{FLAG_CONFIG, FLAG_KEY_FRAME, FRAME_HEADER_LEN, PTS_MASK};

/// Decoded 12-byte unit header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    is_config: bool,
    is_keyframe: bool,
    pts: u64,
    payload_len: u32,
}

impl FrameHeader {
    /// Decode a header from its wire bytes.
    pub fn decode(bytes: &[u8; FRAME_HEADER_LEN]) -> Self {
        let mut field = [0u8; 8];
        field.copy_from_slice(&bytes[..8]);
        let field = u64::from_be_bytes(field);

        let mut len = [0u8; 4];
        len.copy_from_slice(&bytes[8..]);

        Self {
            is_config: field & FLAG_CONFIG != 0,
            is_keyframe: field & FLAG_KEY_FRAME != 0,
            pts: field & PTS_MASK,
            payload_len: u32::from_be_bytes(len),
        }
    }

    /// Whether the unit carries codec configuration.
    pub fn is_config(&self) -> bool {
        self.is_config
    }

    /// Whether the unit is a keyframe.
    pub fn is_keyframe(&self) -> bool {
        self.is_keyframe
    }

    /// Presentation timestamp in microseconds; `None` for config units,
    /// whose timestamp bits are meaningless.
    pub fn pts(&self) -> Option<u64> {
        (!self.is_config).then_some(self.pts)
    }

    /// Declared payload length in bytes.
    pub fn payload_len(&self) -> usize {
        self.payload_len as usize
    }

    /// Re-derive the 8-byte flags+timestamp field.
    ///
    /// Timestamp bits of a config header are not preserved.
    pub fn flags_field(&self) -> u64 {
        let mut field = self.pts().unwrap_or(0);
        if self.is_config {
            field |= FLAG_CONFIG;
        }
        if self.is_keyframe {
            field |= FLAG_KEY_FRAME;
        }
        field
    }
}
