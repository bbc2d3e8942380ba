//! FLV file writer.
//!
//! ```text
//! +============+==================+==============+==================+=====
//! | FLV Header | PrevTagSize0 (0) | Tag 1        | PrevTagSize1     | ...
//! | (9 bytes)  | (4 bytes)        | (11+N bytes) | (4 bytes)        |
//! +============+==================+==============+==================+=====
//! ```
//!
//! The first tag is an `onMetaData` script tag. Its `duration` entry is
//! written as zero and patched in place when the container is closed, which
//! is why the writer must be seekable.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, info, instrument, warn};

use recorder_protocol::{CodecId, StreamKind};

use crate::error::MuxError;
use crate::nal::{build_avc_decoder_config, extract_sps_pps, nals_to_avcc, parse_annex_b, strip_parameter_sets};
use crate::timebase::TimeBase;
use crate::{MuxResult, MuxUnit, Muxer, StreamSpec};

const FLV_SIGNATURE: &[u8; 3] = b"FLV";
const FLV_VERSION: u8 = 0x01;
const FLV_HEADER_SIZE: u32 = 9;
const FLV_FLAG_AUDIO: u8 = 0x04;
const FLV_FLAG_VIDEO: u8 = 0x01;

const TAG_AUDIO: u8 = 8;
const TAG_VIDEO: u8 = 9;
const TAG_SCRIPT: u8 = 18;
const TAG_HEADER_SIZE: usize = 11;
const MAX_TAG_DATA: usize = 0x00FF_FFFF;

const VIDEO_CODEC_AVC: u8 = 7;
const AVC_SEQUENCE_HEADER: u8 = 0;
const AVC_NALU: u8 = 1;

/// AAC, 44 kHz flag, 16-bit, stereo (FLV requires these bits for AAC).
const AUDIO_HEADER_AAC: u8 = 0xAF;
/// Linear PCM little endian, 44 kHz flag, 16-bit, stereo.
const AUDIO_HEADER_PCM_LE: u8 = 0x3F;
const AUDIO_CODEC_AAC: u8 = 10;
const AUDIO_CODEC_PCM_LE: u8 = 3;
const AAC_SEQUENCE_HEADER: u8 = 0;
const AAC_RAW: u8 = 1;

const AMF0_NUMBER: u8 = 0x00;
const AMF0_STRING: u8 = 0x02;
const AMF0_ECMA_ARRAY: u8 = 0x08;
const AMF0_OBJECT_END: [u8; 3] = [0x00, 0x00, 0x09];

struct FlvStream {
    spec: StreamSpec,
    /// Current AVC decoder configuration record (video only).
    avc_config: Option<Bytes>,
}

/// Writes access units into an FLV container.
///
/// Supports H.264 video and AAC or raw PCM audio.
pub struct FlvMuxer<W: Write + Seek> {
    writer: W,
    comment: String,
    streams: Vec<FlvStream>,
    header_written: bool,
    closed: bool,
    bytes_written: u64,
    duration_offset: Option<u64>,
    end_ms: u64,
}

impl FlvMuxer<BufWriter<File>> {
    /// Create the output file and prepare a muxer for it.
    #[instrument(name = "flv_create", skip(comment))]
    pub fn create(path: &Path, comment: &str) -> MuxResult<Self> {
        let file = File::create(path)?;
        info!(path = %path.display(), "Opened FLV container");
        Ok(Self::new(BufWriter::new(file), comment))
    }
}

impl<W: Write + Seek> FlvMuxer<W> {
    /// Wrap a seekable writer positioned at the start of the container.
    pub fn new(writer: W, comment: &str) -> Self {
        Self {
            writer,
            comment: comment.to_string(),
            streams: Vec::new(),
            header_written: false,
            closed: false,
            bytes_written: 0,
            duration_offset: None,
            end_ms: 0,
        }
    }

    /// Get a reference to the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Total container bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn stream(&self, index: usize) -> MuxResult<&FlvStream> {
        self.streams.get(index).ok_or(MuxError::UnknownStream(index))
    }

    fn find(&self, kind: StreamKind) -> Option<&FlvStream> {
        self.streams.iter().find(|s| s.spec.kind == kind)
    }

    fn write_all(&mut self, bytes: &[u8]) -> MuxResult<()> {
        self.writer.write_all(bytes)?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    /// Write one tag followed by its PreviousTagSize.
    fn write_tag(&mut self, tag_type: u8, timestamp_ms: u32, data: &[u8]) -> MuxResult<()> {
        if data.len() > MAX_TAG_DATA {
            return Err(MuxError::InvalidPayload(format!(
                "tag of {} bytes exceeds FLV limit",
                data.len()
            )));
        }

        let size = data.len() as u32;
        let mut header = BytesMut::with_capacity(TAG_HEADER_SIZE);
        header.put_u8(tag_type);
        header.put_uint(size as u64, 3);
        header.put_uint((timestamp_ms & 0x00FF_FFFF) as u64, 3);
        header.put_u8((timestamp_ms >> 24) as u8);
        header.put_uint(0, 3);

        self.write_all(&header)?;
        self.write_all(data)?;
        self.write_all(&(TAG_HEADER_SIZE as u32 + size).to_be_bytes())
    }

    fn write_metadata(&mut self) -> MuxResult<()> {
        let video = self.find(StreamKind::Video).map(|s| s.spec.clone());
        let audio = self.find(StreamKind::Audio).map(|s| s.spec.clone());

        let mut entries: Vec<(&str, AmfValue)> = vec![("duration", AmfValue::Number(0.0))];
        if let Some(video) = &video {
            if let (Some(w), Some(h)) = (video.width, video.height) {
                entries.push(("width", AmfValue::Number(w as f64)));
                entries.push(("height", AmfValue::Number(h as f64)));
            }
            entries.push(("videocodecid", AmfValue::Number(VIDEO_CODEC_AVC as f64)));
        }
        if let Some(audio) = &audio {
            let id = match audio.codec {
                CodecId::Aac => AUDIO_CODEC_AAC,
                _ => AUDIO_CODEC_PCM_LE,
            };
            entries.push(("audiocodecid", AmfValue::Number(id as f64)));
        }
        if !self.comment.is_empty() {
            entries.push(("comment", AmfValue::String(self.comment.clone())));
        }

        let mut body = BytesMut::new();
        body.put_u8(AMF0_STRING);
        put_amf_key(&mut body, "onMetaData");
        body.put_u8(AMF0_ECMA_ARRAY);
        body.put_u32(entries.len() as u32);

        let mut duration_pos = None;
        for (key, value) in &entries {
            put_amf_key(&mut body, key);
            if *key == "duration" {
                // Position of the f64 right after the number marker.
                duration_pos = Some(body.len() + 1);
            }
            value.put(&mut body);
        }
        body.put_slice(&AMF0_OBJECT_END);

        let tag_start = self.bytes_written;
        self.duration_offset =
            duration_pos.map(|pos| tag_start + TAG_HEADER_SIZE as u64 + pos as u64);
        self.write_tag(TAG_SCRIPT, 0, &body)
    }

    fn write_sequence_headers(&mut self) -> MuxResult<()> {
        let mut tags = Vec::new();
        for stream in &self.streams {
            match (stream.spec.codec, &stream.avc_config) {
                (CodecId::H264, Some(config)) => {
                    tags.push((TAG_VIDEO, video_tag_body(config, true, AVC_SEQUENCE_HEADER)));
                }
                (CodecId::Aac, _) => {
                    tags.push((
                        TAG_AUDIO,
                        audio_tag_body(AUDIO_HEADER_AAC, Some(AAC_SEQUENCE_HEADER), &stream.spec.extradata),
                    ));
                }
                _ => {}
            }
        }

        for (tag_type, body) in tags {
            self.write_tag(tag_type, 0, &body)?;
        }
        Ok(())
    }

    fn write_video(&mut self, index: usize, timestamp_ms: u32, unit: &MuxUnit) -> MuxResult<()> {
        let nals = parse_annex_b(&unit.payload);
        if nals.is_empty() {
            return Err(MuxError::InvalidPayload(
                "video unit has no Annex B start code".to_string(),
            ));
        }

        // Parameter sets sent inline replace the current decoder configuration.
        if let Some(config) = extract_sps_pps(&nals)
            .and_then(|(sps, pps)| build_avc_decoder_config(&sps, &pps))
        {
            if self.streams[index].avc_config.as_ref() != Some(&config) {
                debug!(timestamp_ms, "Parameter sets changed, writing new sequence header");
                let body = video_tag_body(&config, true, AVC_SEQUENCE_HEADER);
                self.write_tag(TAG_VIDEO, timestamp_ms, &body)?;
                self.streams[index].avc_config = Some(config);
            }
        }

        let frame = strip_parameter_sets(&nals);
        if frame.is_empty() {
            return Ok(());
        }

        let body = video_tag_body(&nals_to_avcc(&frame), unit.is_keyframe, AVC_NALU);
        self.write_tag(TAG_VIDEO, timestamp_ms, &body)
    }

    fn write_audio(&mut self, codec: CodecId, timestamp_ms: u32, unit: &MuxUnit) -> MuxResult<()> {
        if unit.payload.is_empty() {
            return Ok(());
        }

        let body = match codec {
            CodecId::Aac => audio_tag_body(AUDIO_HEADER_AAC, Some(AAC_RAW), &unit.payload),
            _ => audio_tag_body(AUDIO_HEADER_PCM_LE, None, &unit.payload),
        };
        self.write_tag(TAG_AUDIO, timestamp_ms, &body)
    }

    fn patch_duration(&mut self) -> MuxResult<()> {
        let Some(offset) = self.duration_offset else {
            return Ok(());
        };

        let seconds = self.end_ms as f64 / 1000.0;
        self.writer.seek(SeekFrom::Start(offset))?;
        self.writer.write_all(&seconds.to_be_bytes())?;
        self.writer.seek(SeekFrom::End(0))?;
        Ok(())
    }
}

impl<W: Write + Seek> Muxer for FlvMuxer<W> {
    fn declare_stream(&mut self, spec: StreamSpec) -> MuxResult<usize> {
        if self.header_written {
            return Err(MuxError::HeaderAlreadyWritten);
        }
        if self.find(spec.kind).is_some() {
            return Err(MuxError::DuplicateStream(spec.kind));
        }

        let avc_config = match spec.codec {
            CodecId::H264 => {
                let nals = parse_annex_b(&spec.extradata);
                let config = extract_sps_pps(&nals)
                    .and_then(|(sps, pps)| build_avc_decoder_config(&sps, &pps))
                    .ok_or_else(|| {
                        MuxError::InvalidExtradata("no usable SPS/PPS in H.264 config".to_string())
                    })?;
                Some(config)
            }
            CodecId::Aac if spec.extradata.is_empty() => {
                return Err(MuxError::InvalidExtradata(
                    "empty AAC AudioSpecificConfig".to_string(),
                ))
            }
            CodecId::Aac | CodecId::Pcm16Le => None,
            codec => {
                return Err(MuxError::UnsupportedCodec {
                    container: "flv",
                    codec,
                })
            }
        };

        debug!(kind = %spec.kind, codec = %spec.codec, "Declared FLV stream");
        self.streams.push(FlvStream { spec, avc_config });
        Ok(self.streams.len() - 1)
    }

    fn time_base(&self, stream_index: usize) -> MuxResult<TimeBase> {
        self.stream(stream_index).map(|_| TimeBase::MILLISECONDS)
    }

    fn write_header(&mut self) -> MuxResult<()> {
        if self.header_written {
            return Err(MuxError::HeaderAlreadyWritten);
        }
        if self.closed {
            return Err(MuxError::Closed);
        }

        let mut flags = 0;
        if self.find(StreamKind::Video).is_some() {
            flags |= FLV_FLAG_VIDEO;
        }
        if self.find(StreamKind::Audio).is_some() {
            flags |= FLV_FLAG_AUDIO;
        }

        let mut header = BytesMut::with_capacity(13);
        header.put_slice(FLV_SIGNATURE);
        header.put_u8(FLV_VERSION);
        header.put_u8(flags);
        header.put_u32(FLV_HEADER_SIZE);
        header.put_u32(0);
        self.write_all(&header)?;

        self.write_metadata()?;
        self.write_sequence_headers()?;
        self.header_written = true;

        info!(streams = self.streams.len(), "Wrote FLV header");
        Ok(())
    }

    fn write_unit(&mut self, unit: MuxUnit) -> MuxResult<()> {
        if self.closed {
            return Err(MuxError::Closed);
        }
        if !self.header_written {
            return Err(MuxError::HeaderNotWritten);
        }

        let codec = self.stream(unit.stream_index)?.spec.codec;
        let timestamp_ms = unit.pts.min(u32::MAX as u64) as u32;

        match codec.kind() {
            StreamKind::Video => self.write_video(unit.stream_index, timestamp_ms, &unit)?,
            StreamKind::Audio => self.write_audio(codec, timestamp_ms, &unit)?,
        }

        self.end_ms = self.end_ms.max(unit.pts.saturating_add(unit.duration));
        Ok(())
    }

    fn close(&mut self) -> MuxResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if self.header_written {
            self.patch_duration()?;
        }
        self.writer.flush()?;

        info!(
            bytes = self.bytes_written,
            duration_ms = self.end_ms,
            "Closed FLV container"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "flv"
    }
}

impl<W: Write + Seek> Drop for FlvMuxer<W> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close FLV container: {}", e);
        }
    }
}

/// Video tag body: frame type + codec id, AVC packet type, composition
/// time (always 0; the stream has no B-frame reordering), then data.
fn video_tag_body(data: &[u8], is_keyframe: bool, packet_type: u8) -> Bytes {
    let frame_type = if is_keyframe { 0x10 } else { 0x20 };
    let mut buf = BytesMut::with_capacity(5 + data.len());
    buf.put_u8(frame_type | VIDEO_CODEC_AVC);
    buf.put_u8(packet_type);
    buf.put_uint(0, 3);
    buf.put_slice(data);
    buf.freeze()
}

fn audio_tag_body(header: u8, packet_type: Option<u8>, data: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(2 + data.len());
    buf.put_u8(header);
    if let Some(packet_type) = packet_type {
        buf.put_u8(packet_type);
    }
    buf.put_slice(data);
    buf.freeze()
}

enum AmfValue {
    Number(f64),
    String(String),
}

impl AmfValue {
    fn put(&self, buf: &mut BytesMut) {
        match self {
            Self::Number(n) => {
                buf.put_u8(AMF0_NUMBER);
                buf.put_f64(*n);
            }
            Self::String(s) => {
                buf.put_u8(AMF0_STRING);
                put_amf_key(buf, s);
            }
        }
    }
}

/// AMF0 short string without marker: u16 length + UTF-8 bytes.
fn put_amf_key(buf: &mut BytesMut, s: &str) {
    let bytes = &s.as_bytes()[..s.len().min(u16::MAX as usize)];
    buf.put_u16(bytes.len() as u16);
    buf.put_slice(bytes);
}
