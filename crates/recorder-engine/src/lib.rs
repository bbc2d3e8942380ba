//! Recording core for the screen-mirroring capture stream.
//!
//! This crate classifies decoded access units, folds parameter-set updates
//! into the following frame, derives per-unit durations, and hands the
//! result to a [`recorder_mux::Muxer`].

mod classifier;
mod config;
mod error;
mod merger;
mod recorder;
mod session;
mod stats;
mod timeline;

pub use classifier::{RoutingMode, StreamRouting, ANNEX_B_START_CODE};
pub use config::RecorderConfig;
pub use error::RecorderError;
pub use merger::ParameterSetMerger;
pub use recorder::{spawn_recording, Recorder, RecordingHandle};
pub use session::{run_session, Session, SessionOptions};
pub use stats::{RecordingSummary, StatsCollector};
pub use timeline::{TimedUnit, Timeline};

/// Result type for recorder operations.
pub type RecorderResult<T> = Result<T, RecorderError>;

/// Duration given to the last unit of a stream, in microseconds.
pub const DEFAULT_FALLBACK_DURATION_US: u64 = 100_000;

/// Comment stored in the container metadata.
pub const DEFAULT_COMMENT: &str = "Recorded by mirror-recorder";

/// Name of the thread started by [`spawn_recording`].
pub const RECORDER_THREAD_NAME: &str = "mirror-recorder";
