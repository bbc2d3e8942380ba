//! Rational clocks used by container adapters.

use std::fmt;

/// Microseconds per second; the clock of the wire protocol.
const MICROS_PER_SECOND: u128 = 1_000_000;

/// A clock expressed as `num / den` seconds per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    pub num: u32,
    pub den: u32,
}

impl TimeBase {
    /// Microsecond clock (the protocol's own).
    pub const MICROSECONDS: TimeBase = TimeBase::new(1, 1_000_000);

    /// Millisecond clock (FLV).
    pub const MILLISECONDS: TimeBase = TimeBase::new(1, 1_000);

    /// 90 kHz clock common to MPEG containers.
    pub const MPEG_90K: TimeBase = TimeBase::new(1, 90_000);

    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// Convert a microsecond value into ticks of this clock, rounding to
    /// the nearest tick.
    pub fn from_micros(&self, micros: u64) -> u64 {
        let scale = self.num as u128 * MICROS_PER_SECOND;
        if scale == 0 {
            return 0;
        }
        let ticks = (micros as u128 * self.den as u128 + scale / 2) / scale;
        ticks.min(u64::MAX as u128) as u64
    }
}

impl fmt::Display for TimeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}
