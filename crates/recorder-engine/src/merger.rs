//! Parameter-set merging.
//!
//! Config units that arrive after the container header cannot go into the
//! extradata any more. They are held here and prepended to the next media
//! unit of the same stream, so the decoder sees the new parameters right
//! before the frame that needs them.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use recorder_protocol::{AccessUnit, StreamKind};

/// Pending config payloads, at most one per stream.
#[derive(Debug, Default)]
pub struct ParameterSetMerger {
    pending: [Option<Bytes>; 2],
}

impl ParameterSetMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a config payload. A newer config replaces an older one.
    pub fn buffer_config(&mut self, stream: StreamKind, payload: Bytes) {
        let slot = &mut self.pending[stream.index()];
        if slot.is_some() {
            debug!(%stream, "Replacing pending config");
        }
        *slot = Some(payload);
    }

    /// Whether a config is waiting for the next media unit of `stream`.
    pub fn has_pending(&self, stream: StreamKind) -> bool {
        self.pending[stream.index()].is_some()
    }

    /// Prepend the pending config, if any, to a media unit.
    pub fn merge(&mut self, stream: StreamKind, mut unit: AccessUnit) -> AccessUnit {
        let Some(config) = self.pending[stream.index()].take() else {
            return unit;
        };

        let mut merged = BytesMut::with_capacity(config.len() + unit.payload.len());
        merged.put_slice(&config);
        merged.put_slice(&unit.payload);
        unit.payload = merged.freeze();

        debug!(%stream, config_len = config.len(), "Merged pending config into media unit");
        unit
    }
}
