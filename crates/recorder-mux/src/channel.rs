//! Muxer adapter that forwards everything over a channel.
//!
//! The consumer may be a live preview or remuxer on another thread, or the
//! same thread draining the receiver after the session ends. Timestamps
//! stay in microseconds.

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::debug;

use crate::error::MuxError;
use crate::timebase::TimeBase;
use crate::{MuxResult, MuxUnit, Muxer, StreamSpec};

/// Events emitted by [`ChannelMuxer`], in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuxEvent {
    StreamDeclared(usize, StreamSpec),
    HeaderWritten,
    Unit(MuxUnit),
    Closed,
}

/// Forwards container operations as [`MuxEvent`]s.
pub struct ChannelMuxer {
    tx: Sender<MuxEvent>,
    streams: Vec<StreamSpec>,
    header_written: bool,
    closed: bool,
}

impl ChannelMuxer {
    /// Create a muxer and the receiving end of its event channel.
    ///
    /// The channel is unbounded, so sends never block on a consumer that
    /// only drains after recording.
    pub fn new() -> (Self, Receiver<MuxEvent>) {
        let (tx, rx) = unbounded();
        let muxer = Self {
            tx,
            streams: Vec::new(),
            header_written: false,
            closed: false,
        };
        (muxer, rx)
    }

    fn send(&self, event: MuxEvent) -> MuxResult<()> {
        self.tx
            .send(event)
            .map_err(|_| MuxError::ChannelDisconnected)
    }
}

impl Muxer for ChannelMuxer {
    fn declare_stream(&mut self, spec: StreamSpec) -> MuxResult<usize> {
        if self.header_written {
            return Err(MuxError::HeaderAlreadyWritten);
        }
        if self.streams.iter().any(|s| s.kind == spec.kind) {
            return Err(MuxError::DuplicateStream(spec.kind));
        }

        let index = self.streams.len();
        self.send(MuxEvent::StreamDeclared(index, spec.clone()))?;
        self.streams.push(spec);
        Ok(index)
    }

    fn time_base(&self, stream_index: usize) -> MuxResult<TimeBase> {
        if stream_index < self.streams.len() {
            Ok(TimeBase::MICROSECONDS)
        } else {
            Err(MuxError::UnknownStream(stream_index))
        }
    }

    fn write_header(&mut self) -> MuxResult<()> {
        if self.header_written {
            return Err(MuxError::HeaderAlreadyWritten);
        }
        if self.closed {
            return Err(MuxError::Closed);
        }
        self.send(MuxEvent::HeaderWritten)?;
        self.header_written = true;
        Ok(())
    }

    fn write_unit(&mut self, unit: MuxUnit) -> MuxResult<()> {
        if self.closed {
            return Err(MuxError::Closed);
        }
        if !self.header_written {
            return Err(MuxError::HeaderNotWritten);
        }
        if unit.stream_index >= self.streams.len() {
            return Err(MuxError::UnknownStream(unit.stream_index));
        }
        self.send(MuxEvent::Unit(unit))
    }

    fn close(&mut self) -> MuxResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        debug!("Channel muxer closed");
        self.send(MuxEvent::Closed)
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

impl Drop for ChannelMuxer {
    fn drop(&mut self) {
        // Receiver may already be gone; nothing left to report to.
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use recorder_protocol::{CodecId, StreamKind};

    fn spec(kind: StreamKind, codec: CodecId) -> StreamSpec {
        StreamSpec {
            kind,
            codec,
            extradata: Bytes::from_static(&[0xAA]),
            width: None,
            height: None,
        }
    }

    #[test]
    fn test_event_order() {
        let (mut muxer, rx) = ChannelMuxer::new();

        assert_eq!(muxer.declare_stream(spec(StreamKind::Video, CodecId::H265)).unwrap(), 0);
        assert_eq!(muxer.declare_stream(spec(StreamKind::Audio, CodecId::Opus)).unwrap(), 1);
        muxer.write_header().unwrap();

        let unit = MuxUnit {
            stream_index: 1,
            pts: 20_000,
            duration: 20_000,
            is_keyframe: false,
            payload: Bytes::from_static(&[1, 2]),
        };
        muxer.write_unit(unit.clone()).unwrap();
        drop(muxer);

        let events: Vec<_> = rx.iter().collect();
        assert_eq!(events.len(), 5);
        assert!(matches!(events[0], MuxEvent::StreamDeclared(0, _)));
        assert!(matches!(events[1], MuxEvent::StreamDeclared(1, _)));
        assert_eq!(events[2], MuxEvent::HeaderWritten);
        assert_eq!(events[3], MuxEvent::Unit(unit));
        assert_eq!(events[4], MuxEvent::Closed);
    }

    #[test]
    fn test_state_checks() {
        let (mut muxer, _rx) = ChannelMuxer::new();
        muxer.declare_stream(spec(StreamKind::Video, CodecId::Av1)).unwrap();

        assert!(matches!(
            muxer.declare_stream(spec(StreamKind::Video, CodecId::H264)),
            Err(MuxError::DuplicateStream(StreamKind::Video))
        ));
        assert!(matches!(muxer.time_base(1), Err(MuxError::UnknownStream(1))));
        assert_eq!(muxer.time_base(0).unwrap(), TimeBase::MICROSECONDS);

        muxer.write_header().unwrap();
        assert!(matches!(muxer.write_header(), Err(MuxError::HeaderAlreadyWritten)));

        muxer.close().unwrap();
        muxer.close().unwrap();
    }

    #[test]
    fn test_same_thread_consumer_never_blocks() {
        let (mut muxer, rx) = ChannelMuxer::new();
        muxer.declare_stream(spec(StreamKind::Video, CodecId::H264)).unwrap();
        muxer.write_header().unwrap();

        for i in 0..1_000u64 {
            muxer
                .write_unit(MuxUnit {
                    stream_index: 0,
                    pts: i * 1_000,
                    duration: 1_000,
                    is_keyframe: i == 0,
                    payload: Bytes::from_static(&[0, 0, 0, 1, 0x41]),
                })
                .unwrap();
        }
        muxer.close().unwrap();

        let units = rx
            .try_iter()
            .filter(|e| matches!(e, MuxEvent::Unit(_)))
            .count();
        assert_eq!(units, 1_000);
    }

    #[test]
    fn test_disconnected_receiver() {
        let (mut muxer, rx) = ChannelMuxer::new();
        drop(rx);
        assert!(matches!(
            muxer.declare_stream(spec(StreamKind::Video, CodecId::H264)),
            Err(MuxError::ChannelDisconnected)
        ));
    }
}
