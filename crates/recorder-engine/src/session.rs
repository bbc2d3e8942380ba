//! Recording session and receive loop.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, instrument, warn};

use recorder_mux::{MuxError, MuxUnit, Muxer, StreamSpec, TimeBase};
use recorder_protocol::{
    AccessUnit, ByteReader, CodecId, StreamKind, StreamMetadata, UnitDecoder, UnitKind,
    DEFAULT_MAX_PAYLOAD_LEN,
};

use crate::classifier::{RoutingMode, StreamRouting};
use crate::merger::ParameterSetMerger;
use crate::stats::{RecordingSummary, StatsCollector};
use crate::timeline::{TimedUnit, Timeline};
use crate::{RecorderResult, DEFAULT_FALLBACK_DURATION_US};

/// Tunables of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub routing: RoutingMode,
    pub fallback_duration_us: u64,
    pub max_payload_len: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            routing: RoutingMode::Auto,
            fallback_duration_us: DEFAULT_FALLBACK_DURATION_US,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
        }
    }
}

struct StreamState {
    kind: StreamKind,
    codec: CodecId,
    extradata: Option<Bytes>,
    /// Muxer index and clock, set when the header is written.
    muxer_stream: Option<(usize, TimeBase)>,
    timeline: Timeline,
}

impl StreamState {
    fn is_ready(&self) -> bool {
        self.extradata.is_some() || !self.codec.requires_extradata()
    }
}

/// State of one recording, from metadata to container close.
///
/// The container header is written as soon as every announced stream has
/// its initial config. Media units that arrive earlier are dropped.
pub struct Session<M: Muxer> {
    metadata: StreamMetadata,
    muxer: M,
    routing: StreamRouting,
    fallback_duration_us: u64,
    streams: Vec<StreamState>,
    merger: ParameterSetMerger,
    header_written: bool,
    /// Announced streams the container refused at header time.
    rejected: Vec<StreamKind>,
    stats: Arc<StatsCollector>,
}

impl<M: Muxer> Session<M> {
    /// Create a session. Fails if the routing cannot serve the announced
    /// streams.
    pub fn new(
        metadata: StreamMetadata,
        muxer: M,
        options: &SessionOptions,
    ) -> RecorderResult<Self> {
        Self::with_stats(metadata, muxer, options, Arc::new(StatsCollector::new()))
    }

    /// Create a session that reports into an existing collector.
    pub fn with_stats(
        metadata: StreamMetadata,
        muxer: M,
        options: &SessionOptions,
        stats: Arc<StatsCollector>,
    ) -> RecorderResult<Self> {
        let routing = StreamRouting::for_session(options.routing, &metadata)?;
        // A fixed route only ever feeds one stream; declaring the others
        // would hold the header back forever.
        let streams = metadata
            .streams()
            .filter(|(kind, _)| match routing {
                StreamRouting::Fixed(fixed) => *kind == fixed,
                StreamRouting::ContentSniffing => true,
            })
            .map(|(kind, codec)| StreamState {
                kind,
                codec,
                extradata: None,
                muxer_stream: None,
                timeline: Timeline::new(),
            })
            .collect();

        info!(
            muxer = muxer.name(),
            ?routing,
            audio = metadata.has_audio(),
            "Recording session created"
        );
        stats.start();

        Ok(Self {
            metadata,
            muxer,
            routing,
            fallback_duration_us: options.fallback_duration_us,
            streams,
            merger: ParameterSetMerger::new(),
            header_written: false,
            rejected: Vec::new(),
            stats,
        })
    }

    pub fn metadata(&self) -> &StreamMetadata {
        &self.metadata
    }

    pub fn stats(&self) -> &Arc<StatsCollector> {
        &self.stats
    }

    pub fn header_written(&self) -> bool {
        self.header_written
    }

    pub fn muxer(&self) -> &M {
        &self.muxer
    }

    /// Route one decoded unit through the pipeline.
    ///
    /// Only header setup failures are returned; rejected unit writes are
    /// logged and counted.
    pub fn handle_unit(&mut self, unit: AccessUnit) -> RecorderResult<()> {
        self.stats.record_unit(unit.payload.len(), unit.is_config());

        let kind = self.routing.classify(&unit.payload);
        let unit = unit.with_stream(kind);

        let Some(slot) = self.streams.iter().position(|s| s.kind == kind) else {
            if unit.kind == UnitKind::Media {
                self.stats.record_dropped();
            }
            if self.rejected.contains(&kind) {
                debug!(stream = %kind, "Unit for stream the container refused, dropping");
            } else {
                warn!(stream = %kind, "Unit for undeclared stream, dropping");
            }
            return Ok(());
        };

        match unit.kind {
            UnitKind::Config => self.handle_config(slot, unit.payload),
            UnitKind::Media => {
                self.handle_media(slot, unit);
                Ok(())
            }
        }
    }

    fn handle_config(&mut self, slot: usize, payload: Bytes) -> RecorderResult<()> {
        let stream = &mut self.streams[slot];

        if !self.header_written && stream.extradata.is_none() {
            debug!(stream = %stream.kind, len = payload.len(), "Initial config captured as extradata");
            stream.extradata = Some(payload);
            return self.try_write_header();
        }

        self.merger.buffer_config(stream.kind, payload);
        Ok(())
    }

    fn handle_media(&mut self, slot: usize, unit: AccessUnit) {
        if !self.header_written {
            self.stats.record_dropped();
            warn!(
                stream = %self.streams[slot].kind,
                pts = ?unit.pts,
                "Media unit before container header, dropping"
            );
            return;
        }

        let kind = self.streams[slot].kind;
        let unit = self.merger.merge(kind, unit);
        if let Some(timed) = self.streams[slot].timeline.push(unit) {
            self.write(slot, timed);
        }
    }

    fn try_write_header(&mut self) -> RecorderResult<()> {
        if self.header_written || !self.streams.iter().all(StreamState::is_ready) {
            return Ok(());
        }

        let mut declared = Vec::with_capacity(self.streams.len());
        for mut stream in std::mem::take(&mut self.streams) {
            let (width, height) = match stream.kind {
                StreamKind::Video => (Some(self.metadata.width), Some(self.metadata.height)),
                StreamKind::Audio => (None, None),
            };
            let spec = StreamSpec {
                kind: stream.kind,
                codec: stream.codec,
                extradata: stream.extradata.clone().unwrap_or_default(),
                width,
                height,
            };

            let index = match self.muxer.declare_stream(spec) {
                Ok(index) => index,
                // Audio the container cannot carry is dropped; video still records.
                Err(MuxError::UnsupportedCodec { container, codec })
                    if stream.kind == StreamKind::Audio =>
                {
                    warn!(
                        container,
                        %codec,
                        "Audio codec not supported by container, recording video only"
                    );
                    self.rejected.push(stream.kind);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let time_base = self.muxer.time_base(index)?;
            debug!(stream = %stream.kind, index, %time_base, "Stream declared");
            stream.muxer_stream = Some((index, time_base));
            declared.push(stream);
        }
        self.streams = declared;

        self.muxer.write_header()?;
        self.header_written = true;
        self.stats.mark_header_written();

        info!(streams = self.streams.len(), "Container header written");
        Ok(())
    }

    fn write(&mut self, slot: usize, timed: TimedUnit) {
        let stream = &self.streams[slot];
        let Some((index, time_base)) = stream.muxer_stream else {
            self.stats.record_dropped();
            return;
        };

        let end_us = timed.pts.saturating_add(timed.duration);
        let unit = MuxUnit {
            stream_index: index,
            pts: time_base.from_micros(timed.pts),
            duration: time_base.from_micros(timed.duration),
            is_keyframe: timed.unit.is_keyframe,
            payload: timed.unit.payload,
        };

        match self.muxer.write_unit(unit) {
            Ok(()) => self.stats.record_written(end_us),
            Err(e) => {
                self.stats.record_write_failure();
                warn!(stream = %stream.kind, pts_us = timed.pts, "Failed to write unit: {}", e);
            }
        }
    }

    /// Flush held units, close the container and return the summary.
    #[instrument(name = "session_finish", skip(self))]
    pub fn finish(mut self) -> RecorderResult<RecordingSummary> {
        if self.header_written {
            for slot in 0..self.streams.len() {
                if let Some(timed) = self.streams[slot].timeline.finish(self.fallback_duration_us) {
                    self.write(slot, timed);
                }
            }
        } else {
            warn!("Stream ended before every stream sent its config, no header written");
        }

        let closed = self.muxer.close();
        self.stats.finish();
        closed?;

        let summary = self.stats.snapshot();
        info!(
            units_written = summary.units_written,
            units_dropped = summary.units_dropped,
            write_failures = summary.write_failures,
            media_duration_us = summary.media_duration_us,
            "Recording finished"
        );
        Ok(summary)
    }
}

/// Decode units until the stream ends or `stop` is set.
///
/// Protocol errors end the loop; the caller still finishes the session.
pub(crate) fn receive_loop<R: Read, M: Muxer>(
    reader: &mut ByteReader<R>,
    decoder: &mut UnitDecoder,
    session: &mut Session<M>,
    stop: Option<&AtomicBool>,
) -> RecorderResult<()> {
    loop {
        if stop.is_some_and(|s| s.load(Ordering::SeqCst)) {
            info!("Stop requested, ending receive loop");
            return Ok(());
        }

        match decoder.read_unit(reader) {
            Ok(unit) => session.handle_unit(unit)?,
            Err(e) if e.is_end_of_stream() => {
                info!(
                    units = decoder.units_decoded(),
                    bytes = reader.bytes_read(),
                    "End of stream: {}",
                    e
                );
                return Ok(());
            }
            Err(e) => {
                warn!("Protocol error, ending receive loop: {}", e);
                return Ok(());
            }
        }
    }
}

/// Record everything `reader` carries into `muxer`.
///
/// Reads the stream metadata, then units until the peer closes the stream.
#[instrument(name = "run_session", skip_all, fields(muxer = muxer.name()))]
pub fn run_session<R: Read, M: Muxer>(
    reader: R,
    muxer: M,
    options: &SessionOptions,
) -> RecorderResult<RecordingSummary> {
    let mut reader = ByteReader::new(reader);
    let metadata = StreamMetadata::read(&mut reader)?;

    let mut session = Session::new(metadata, muxer, options)?;
    let mut decoder = UnitDecoder::new(options.max_payload_len);
    receive_loop(&mut reader, &mut decoder, &mut session, None)?;
    session.finish()
}
