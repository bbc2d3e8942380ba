//! Container writers for recorded access units.
//!
//! The recording core talks to a container through the [`Muxer`] trait:
//! it declares the streams once their extradata is known, writes the header
//! exactly once, then hands over finished units in presentation order.
//!
//! Two adapters ship with this crate:
//! - [`FlvMuxer`] writes an FLV file (H.264 video, AAC or PCM audio).
//! - [`ChannelMuxer`] forwards everything over a crossbeam channel.

mod channel;
mod error;
mod flv;
mod nal;
mod timebase;

pub use channel::{ChannelMuxer, MuxEvent};
pub use error::MuxError;
pub use flv::FlvMuxer;
pub use nal::{
    build_avc_decoder_config, extract_sps_pps, nals_to_avcc, parse_annex_b,
    strip_parameter_sets, NalUnit, NalUnitType,
};
pub use timebase::TimeBase;

use bytes::Bytes;
use recorder_protocol::{CodecId, StreamKind};

/// Result type for muxer operations.
pub type MuxResult<T> = Result<T, MuxError>;

/// Stream description handed to [`Muxer::declare_stream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSpec {
    /// Video or audio.
    pub kind: StreamKind,

    /// Codec of the elementary stream.
    pub codec: CodecId,

    /// Raw bytes of the stream's first config unit (empty if the codec needs none).
    pub extradata: Bytes,

    /// Width in pixels (video only).
    pub width: Option<u32>,

    /// Height in pixels (video only).
    pub height: Option<u32>,
}

/// A finished access unit, timed in the adapter's time base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxUnit {
    /// Index returned by [`Muxer::declare_stream`].
    pub stream_index: usize,

    /// Presentation timestamp.
    pub pts: u64,

    /// Duration until the next unit of the same stream.
    pub duration: u64,

    /// Whether this unit is a sync point.
    pub is_keyframe: bool,

    /// Unit payload (inline parameter sets included when they changed).
    pub payload: Bytes,
}

/// Contract between the recording core and a container writer.
///
/// Opening the container is the adapter's constructor; everything after
/// that goes through this trait.
pub trait Muxer {
    /// Declare a stream and return its index. Only valid before the header.
    fn declare_stream(&mut self, spec: StreamSpec) -> MuxResult<usize>;

    /// Clock in which timestamps and durations of the stream are expressed.
    fn time_base(&self, stream_index: usize) -> MuxResult<TimeBase>;

    /// Write the container header. Called exactly once.
    fn write_header(&mut self) -> MuxResult<()>;

    /// Write one access unit.
    fn write_unit(&mut self, unit: MuxUnit) -> MuxResult<()>;

    /// Finish the container and release its resources.
    fn close(&mut self) -> MuxResult<()>;

    /// Adapter name for diagnostics.
    fn name(&self) -> &'static str;
}

impl<M: Muxer + ?Sized> Muxer for Box<M> {
    fn declare_stream(&mut self, spec: StreamSpec) -> MuxResult<usize> {
        (**self).declare_stream(spec)
    }

    fn time_base(&self, stream_index: usize) -> MuxResult<TimeBase> {
        (**self).time_base(stream_index)
    }

    fn write_header(&mut self) -> MuxResult<()> {
        (**self).write_header()
    }

    fn write_unit(&mut self, unit: MuxUnit) -> MuxResult<()> {
        (**self).write_unit(unit)
    }

    fn close(&mut self) -> MuxResult<()> {
        (**self).close()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
