//! Wire protocol of the screen-mirroring capture stream.
//!
//! The peer sends, in order:
//! - stream metadata (video codec tag, width, height, audio codec tag),
//! - a sequence of access units, each a 12-byte header followed by its payload.
//!
//! This crate turns those bytes into [`StreamMetadata`] and [`AccessUnit`]s.
//! It is receive-only.

mod codec;
mod connection;
mod error;
mod header;
mod metadata;
mod reader;
mod unit;

pub use codec::{CodecId, StreamKind};
pub use connection::{connect, ConnectOptions};
pub use error::ProtocolError;
pub use header::FrameHeader;
pub use metadata::StreamMetadata;
pub use reader::ByteReader;
pub use unit::{AccessUnit, UnitDecoder, UnitKind};

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Size of the per-unit header on the wire.
pub const FRAME_HEADER_LEN: usize = 12;

/// Bit 63 of the header field: the unit carries codec configuration.
pub const FLAG_CONFIG: u64 = 1 << 63;

/// Bit 62 of the header field: the unit is a keyframe.
pub const FLAG_KEY_FRAME: u64 = 1 << 62;

/// Bits 0..=61 of the header field: presentation timestamp in microseconds.
pub const PTS_MASK: u64 = FLAG_KEY_FRAME - 1;

/// Default upper bound for a single payload.
pub const DEFAULT_MAX_PAYLOAD_LEN: usize = 64 * 1024 * 1024;
