//! Recording statistics.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Outcome of a recording, also used for live snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingSummary {
    /// Wall-clock start, unix milliseconds.
    pub started_at_ms: Option<u64>,

    /// Wall-clock finish, unix milliseconds. `None` while recording.
    pub finished_at_ms: Option<u64>,

    /// End of the last written unit, in microseconds of media time.
    pub media_duration_us: u64,

    /// Units read off the wire.
    pub units_received: u64,

    /// Config units among them.
    pub config_units: u64,

    /// Media units accepted by the container.
    pub units_written: u64,

    /// Media units discarded (before the header or on an undeclared stream).
    pub units_dropped: u64,

    /// Media units the container rejected.
    pub write_failures: u64,

    /// Payload bytes read off the wire.
    pub bytes_received: u64,

    /// Whether the container header was written.
    pub header_written: bool,

    /// Size of the output file, when recording to a file.
    pub output_bytes: Option<u64>,
}

/// Counters shared between the receive loop and observers.
pub struct StatsCollector {
    started_at: RwLock<Option<SystemTime>>,
    finished_at: RwLock<Option<SystemTime>>,
    media_duration_us: AtomicU64,
    units_received: AtomicU64,
    config_units: AtomicU64,
    units_written: AtomicU64,
    units_dropped: AtomicU64,
    write_failures: AtomicU64,
    bytes_received: AtomicU64,
    header_written: AtomicBool,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            started_at: RwLock::new(None),
            finished_at: RwLock::new(None),
            media_duration_us: AtomicU64::new(0),
            units_received: AtomicU64::new(0),
            config_units: AtomicU64::new(0),
            units_written: AtomicU64::new(0),
            units_dropped: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            header_written: AtomicBool::new(false),
        }
    }

    /// Mark the start of the recording.
    pub fn start(&self) {
        *self.started_at.write() = Some(SystemTime::now());
        *self.finished_at.write() = None;
    }

    /// Mark the end of the recording.
    pub fn finish(&self) {
        *self.finished_at.write() = Some(SystemTime::now());
        debug!("Recording statistics finalized");
    }

    pub fn record_unit(&self, payload_len: usize, is_config: bool) {
        self.units_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(payload_len as u64, Ordering::Relaxed);
        if is_config {
            self.config_units.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_written(&self, end_us: u64) {
        self.units_written.fetch_add(1, Ordering::Relaxed);
        self.media_duration_us.fetch_max(end_us, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.units_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_header_written(&self) {
        self.header_written.store(true, Ordering::Relaxed);
    }

    /// Current counters.
    pub fn snapshot(&self) -> RecordingSummary {
        RecordingSummary {
            started_at_ms: self.started_at.read().map(unix_ms),
            finished_at_ms: self.finished_at.read().map(unix_ms),
            media_duration_us: self.media_duration_us.load(Ordering::Relaxed),
            units_received: self.units_received.load(Ordering::Relaxed),
            config_units: self.config_units.load(Ordering::Relaxed),
            units_written: self.units_written.load(Ordering::Relaxed),
            units_dropped: self.units_dropped.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            header_written: self.header_written.load(Ordering::Relaxed),
            output_bytes: None,
        }
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn unix_ms(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = StatsCollector::new();
        stats.start();
        stats.record_unit(10, true);
        stats.record_unit(100, false);
        stats.record_unit(50, false);
        stats.record_written(40_000);
        stats.record_written(20_000);
        stats.record_dropped();
        stats.record_write_failure();
        stats.mark_header_written();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.units_received, 3);
        assert_eq!(snapshot.config_units, 1);
        assert_eq!(snapshot.bytes_received, 160);
        assert_eq!(snapshot.units_written, 2);
        assert_eq!(snapshot.media_duration_us, 40_000);
        assert_eq!(snapshot.units_dropped, 1);
        assert_eq!(snapshot.write_failures, 1);
        assert!(snapshot.header_written);
        assert!(snapshot.started_at_ms.is_some());
        assert!(snapshot.finished_at_ms.is_none());
    }

    #[test]
    fn test_finish_sets_finish_time() {
        let stats = StatsCollector::new();
        stats.start();
        stats.finish();

        let snapshot = stats.snapshot();
        let started = snapshot.started_at_ms.unwrap();
        let finished = snapshot.finished_at_ms.unwrap();
        assert!(finished >= started);
    }

    #[test]
    fn test_summary_serializes() {
        let json = serde_json::to_value(RecordingSummary::default()).unwrap();
        assert_eq!(json["units_written"], 0);
        assert_eq!(json["header_written"], false);
    }
}
