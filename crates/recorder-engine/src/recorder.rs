//! Recording entry points.

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use tracing::{error, info, instrument};

use recorder_mux::FlvMuxer;
use recorder_protocol::{connect, ByteReader, StreamMetadata, UnitDecoder};

use crate::classifier::StreamRouting;
use crate::config::RecorderConfig;
use crate::error::RecorderError;
use crate::session::{receive_loop, Session};
use crate::stats::{RecordingSummary, StatsCollector};
use crate::{RecorderResult, RECORDER_THREAD_NAME};

/// Records one connection to an FLV file.
pub struct Recorder {
    config: RecorderConfig,
    stats: Arc<StatsCollector>,
    should_stop: Arc<AtomicBool>,
}

impl Recorder {
    /// Create a recorder. Fails if the configuration is invalid.
    pub fn new(config: RecorderConfig) -> RecorderResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            stats: Arc::new(StatsCollector::new()),
            should_stop: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Live counters of this recorder.
    pub fn stats(&self) -> Arc<StatsCollector> {
        Arc::clone(&self.stats)
    }

    /// Ask the receive loop to stop after the current unit.
    pub fn stop(&self) {
        self.should_stop.store(true, Ordering::SeqCst);
    }

    /// Connect, record until the peer closes the stream, and close the file.
    #[instrument(name = "recorder_run", skip(self), fields(addr = %self.config.server_addr))]
    pub fn run(&self) -> RecorderResult<RecordingSummary> {
        let stream = connect(
            &self.config.server_addr,
            &self.config.session_id,
            &self.config.connect_options(),
        )?;

        let mut reader = ByteReader::new(stream);
        let metadata = StreamMetadata::read(&mut reader)?;

        let options = self.config.session_options();
        // Refuse an unusable routing before the output file is created.
        StreamRouting::for_session(options.routing, &metadata)?;

        let muxer = FlvMuxer::create(&self.config.output_path, &self.config.comment)?;
        let mut session =
            Session::with_stats(metadata, muxer, &options, Arc::clone(&self.stats))?;
        let mut decoder = UnitDecoder::new(options.max_payload_len);

        receive_loop(&mut reader, &mut decoder, &mut session, Some(&self.should_stop))?;

        let mut summary = session.finish()?;
        summary.output_bytes = fs::metadata(&self.config.output_path)
            .ok()
            .map(|m| m.len());

        info!(
            path = %self.config.output_path.display(),
            output_bytes = ?summary.output_bytes,
            "Recording saved"
        );
        Ok(summary)
    }
}

/// A recording running on its own thread.
pub struct RecordingHandle {
    stats: Arc<StatsCollector>,
    should_stop: Arc<AtomicBool>,
    result_rx: Receiver<RecorderResult<RecordingSummary>>,
    thread: Option<JoinHandle<()>>,
}

impl RecordingHandle {
    /// Current counters.
    pub fn snapshot(&self) -> RecordingSummary {
        self.stats.snapshot()
    }

    /// Ask the recording to stop after the current unit.
    pub fn stop(&self) {
        self.should_stop.store(true, Ordering::SeqCst);
    }

    /// Wait up to `timeout` for the recording to end.
    ///
    /// Returns `None` if it is still running.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<RecorderResult<RecordingSummary>> {
        match self.result_rx.recv_timeout(timeout) {
            Ok(result) => {
                self.join_thread();
                Some(result)
            }
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.join_thread();
                Some(Err(RecorderError::ThreadPanicked))
            }
        }
    }

    /// Block until the recording ends.
    pub fn join(mut self) -> RecorderResult<RecordingSummary> {
        let result = self
            .result_rx
            .recv()
            .unwrap_or(Err(RecorderError::ThreadPanicked));
        self.join_thread();
        result
    }

    fn join_thread(&mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RecordingHandle {
    fn drop(&mut self) {
        // The thread may be blocked in a read; signal it but do not wait.
        if self.thread.is_some() {
            self.stop();
        }
    }
}

/// Start a recording on a dedicated thread.
pub fn spawn_recording(config: RecorderConfig) -> RecorderResult<RecordingHandle> {
    let recorder = Recorder::new(config)?;
    let stats = recorder.stats();
    let should_stop = Arc::clone(&recorder.should_stop);
    let (result_tx, result_rx) = bounded(1);

    let thread = thread::Builder::new()
        .name(RECORDER_THREAD_NAME.to_string())
        .spawn(move || {
            let result = recorder.run();
            if let Err(e) = &result {
                error!("Recording failed: {}", e);
            }
            let _ = result_tx.send(result);
        })?;

    Ok(RecordingHandle {
        stats,
        should_stop,
        result_rx,
        thread: Some(thread),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::path::PathBuf;

    fn temp_output(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{}-{}.flv", name, std::process::id()))
    }

    fn header(flags: u64, pts: u64, len: u32) -> Vec<u8> {
        let mut out = (flags | pts).to_be_bytes().to_vec();
        out.extend_from_slice(&len.to_be_bytes());
        out
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(matches!(
            Recorder::new(RecorderConfig::default()),
            Err(RecorderError::Config(_))
        ));
    }

    #[test]
    fn test_connection_refused_is_fatal() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let recorder = Recorder::new(RecorderConfig {
            server_addr: addr.to_string(),
            session_id: "deadbeef".to_string(),
            output_path: temp_output("refused"),
            ..Default::default()
        })
        .unwrap();

        assert!(matches!(recorder.run(), Err(RecorderError::Protocol(_))));
    }

    #[test]
    fn test_spawned_recording_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let output = temp_output("spawned");

        let server = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut session_id = [0u8; 8];
            socket.read_exact(&mut session_id).unwrap();
            assert_eq!(&session_id, b"deadbeef");

            let mut wire = Vec::new();
            for value in [u32::from_be_bytes(*b"h264"), 640, 480, 0] {
                wire.extend_from_slice(&value.to_be_bytes());
            }
            let config = [
                0, 0, 0, 1, 0x67, 0x42, 0xC0, 0x1E, 0x8D, 0x68, 0, 0, 0, 1, 0x68, 0xCE, 0x01,
                0xA8,
            ];
            wire.extend(header(1 << 63, 0, config.len() as u32));
            wire.extend_from_slice(&config);
            for (i, pts) in [0u64, 33_333, 66_666].into_iter().enumerate() {
                let frame = [0, 0, 0, 1, if i == 0 { 0x65 } else { 0x41 }, 0x88];
                let key = if i == 0 { 1 << 62 } else { 0 };
                wire.extend(header(key, pts, frame.len() as u32));
                wire.extend_from_slice(&frame);
            }
            socket.write_all(&wire).unwrap();
        });

        let handle = spawn_recording(RecorderConfig {
            server_addr: addr.to_string(),
            session_id: "deadbeef".to_string(),
            output_path: output.clone(),
            ..Default::default()
        })
        .unwrap();

        server.join().unwrap();
        let summary = handle.join().unwrap();

        assert!(summary.header_written);
        assert_eq!(summary.units_received, 4);
        assert_eq!(summary.config_units, 1);
        assert_eq!(summary.units_written, 3);
        assert_eq!(summary.media_duration_us, 166_666);
        assert!(summary.finished_at_ms.is_some());

        let bytes = fs::read(&output).unwrap();
        assert_eq!(&bytes[..3], b"FLV");
        assert_eq!(summary.output_bytes, Some(bytes.len() as u64));
        let _ = fs::remove_file(&output);
    }
}
