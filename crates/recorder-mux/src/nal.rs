//! H.264 NAL unit helpers.
//!
//! The mirroring service sends H.264 as an Annex B byte stream: every NAL
//! unit is preceded by a `00 00 01` or `00 00 00 01` start code, and parameter
//! sets (SPS/PPS) arrive in config units. FLV instead wants AVCC framing
//! (4-byte big-endian length prefixes) and an AVC decoder configuration
//! record built from the SPS and PPS.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

/// NAL unit types the recorder cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalUnitType {
    /// Non-IDR slice (P/B frame).
    NonIdrSlice,
    /// IDR slice (keyframe).
    IdrSlice,
    /// Supplemental Enhancement Information.
    Sei,
    /// Sequence Parameter Set.
    Sps,
    /// Picture Parameter Set.
    Pps,
    /// Access Unit Delimiter.
    Aud,
    /// Anything else.
    Other(u8),
}

impl From<u8> for NalUnitType {
    fn from(header: u8) -> Self {
        match header & 0x1F {
            1 => Self::NonIdrSlice,
            5 => Self::IdrSlice,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::Aud,
            other => Self::Other(other),
        }
    }
}

/// A NAL unit without its start code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NalUnit {
    pub nal_type: NalUnitType,
    /// NAL header byte and body.
    pub data: Bytes,
}

impl NalUnit {
    /// Whether this NAL belongs in the decoder configuration rather than
    /// in a frame.
    pub fn is_parameter_set(&self) -> bool {
        matches!(self.nal_type, NalUnitType::Sps | NalUnitType::Pps)
    }
}

/// Find the next start code at or after `from`.
///
/// Returns `(position, start_code_len)`.
fn find_start_code(data: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 {
            if data[i + 2] == 1 {
                return Some((i, 3));
            }
            if data[i + 2] == 0 && i + 3 < data.len() && data[i + 3] == 1 {
                return Some((i, 4));
            }
        }
        i += 1;
    }
    None
}

/// Split an Annex B byte stream into NAL units.
///
/// Bytes before the first start code are ignored. The returned units share
/// memory with `data`.
pub fn parse_annex_b(data: &Bytes) -> Vec<NalUnit> {
    let mut nals = Vec::new();
    let mut next = find_start_code(data, 0);

    while let Some((pos, code_len)) = next {
        let start = pos + code_len;
        next = find_start_code(data, start);
        let end = next.map_or(data.len(), |(p, _)| p);

        if start < end {
            nals.push(NalUnit {
                nal_type: NalUnitType::from(data[start]),
                data: data.slice(start..end),
            });
        }
    }

    nals
}

/// Frame NAL units with 4-byte big-endian length prefixes.
pub fn nals_to_avcc<'a>(nals: impl IntoIterator<Item = &'a NalUnit>) -> Bytes {
    let mut buf = BytesMut::new();
    for nal in nals {
        buf.put_u32(nal.data.len() as u32);
        buf.put_slice(&nal.data);
    }
    buf.freeze()
}

/// Pick the last SPS and last PPS out of a list of NAL units.
pub fn extract_sps_pps(nals: &[NalUnit]) -> Option<(Bytes, Bytes)> {
    let sps = nals
        .iter()
        .rev()
        .find(|nal| nal.nal_type == NalUnitType::Sps)?;
    let pps = nals
        .iter()
        .rev()
        .find(|nal| nal.nal_type == NalUnitType::Pps)?;

    Some((sps.data.clone(), pps.data.clone()))
}

/// Drop parameter sets and delimiters, keeping only what belongs in a frame.
pub fn strip_parameter_sets(nals: &[NalUnit]) -> Vec<NalUnit> {
    nals.iter()
        .filter(|nal| !nal.is_parameter_set() && nal.nal_type != NalUnitType::Aud)
        .cloned()
        .collect()
}

/// Build an AVC decoder configuration record (ISO 14496-15) from one SPS
/// and one PPS.
///
/// Layout: version(1) profile(1) compat(1) level(1) 0xFF (4-byte lengths)
/// 0xE1 (one SPS) sps_len(2) sps 0x01 (one PPS) pps_len(2) pps.
pub fn build_avc_decoder_config(sps: &[u8], pps: &[u8]) -> Option<Bytes> {
    if sps.len() < 4 || pps.is_empty() {
        debug!(sps_len = sps.len(), pps_len = pps.len(), "Parameter sets too short");
        return None;
    }
    if sps.len() > u16::MAX as usize || pps.len() > u16::MAX as usize {
        return None;
    }

    let mut buf = BytesMut::with_capacity(11 + sps.len() + pps.len());
    buf.put_u8(0x01);
    buf.put_slice(&sps[1..4]);
    buf.put_u8(0xFF);
    buf.put_u8(0xE1);
    buf.put_u16(sps.len() as u16);
    buf.put_slice(sps);
    buf.put_u8(0x01);
    buf.put_u16(pps.len() as u16);
    buf.put_slice(pps);

    Some(buf.freeze())
}
