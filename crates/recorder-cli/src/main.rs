//! Command-line recorder for screen-mirroring sessions.
//!
//! Usage: `mirror-recorder <config.json>`
//!
//! Records one session to the configured output file and prints the
//! recording summary as JSON on stdout.

use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::info;

use recorder_engine::{Recorder, RecorderConfig};

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let Some(config_path) = env::args_os().nth(1).map(PathBuf::from) else {
        bail!("usage: mirror-recorder <config.json>");
    };

    let config = RecorderConfig::from_json_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!(
        addr = %config.server_addr,
        output = %config.output_path.display(),
        "Starting recorder"
    );

    let recorder = Recorder::new(config).context("Invalid configuration")?;
    let summary = recorder.run().context("Recording failed")?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
