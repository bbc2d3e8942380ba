//! Per-stream timestamp normalization.
//!
//! Timestamps are rebased so the first media unit of a stream starts at
//! zero. The wire carries no durations, so each unit is held until the next
//! one arrives and its duration is the gap between the two. The last unit
//! gets a fixed fallback duration when the stream ends.

use tracing::warn;

use recorder_protocol::AccessUnit;

/// A media unit with its rebased timestamp and duration, in microseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedUnit {
    pub unit: AccessUnit,
    pub pts: u64,
    pub duration: u64,
}

/// Origin and held unit of one stream.
#[derive(Debug, Default)]
pub struct Timeline {
    origin: Option<u64>,
    held: Option<(AccessUnit, u64)>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw timestamp of the first media unit, once seen.
    pub fn origin(&self) -> Option<u64> {
        self.origin
    }

    /// Whether a unit is waiting for its successor.
    pub fn is_holding(&self) -> bool {
        self.held.is_some()
    }

    /// Hold `unit` and release the previously held unit with its duration.
    ///
    /// Units without a timestamp are ignored.
    pub fn push(&mut self, unit: AccessUnit) -> Option<TimedUnit> {
        let raw = unit.pts?;
        let origin = *self.origin.get_or_insert(raw);

        let pts = raw.checked_sub(origin).unwrap_or_else(|| {
            warn!(raw, origin, "Timestamp before stream origin, clamping to 0");
            0
        });

        let released = self.held.take().map(|(held, held_pts)| {
            let duration = pts.checked_sub(held_pts).unwrap_or_else(|| {
                warn!(pts, held_pts, "Timestamp went backwards, using zero duration");
                0
            });
            TimedUnit {
                unit: held,
                pts: held_pts,
                duration,
            }
        });

        self.held = Some((unit, pts));
        released
    }

    /// Release the held unit with `fallback_duration`.
    pub fn finish(&mut self, fallback_duration: u64) -> Option<TimedUnit> {
        self.held.take().map(|(unit, pts)| TimedUnit {
            unit,
            pts,
            duration: fallback_duration,
        })
    }
}
