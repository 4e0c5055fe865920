//! H.264 RTP streaming CLI application

// Use jemalloc for better memory management (optional feature)
#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use anyhow::{Context, Result};
use clap::Parser;
use h264_rtp_streamer::capture::{self, SourceKind};
use h264_rtp_streamer::config::Config;
use h264_rtp_streamer::{CodecSession, Pipeline, Transport};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "h264-rtp")]
#[command(about = "Stream a camera as H.264 over RTP/UDP")]
#[command(version)]
struct Cli {
    /// Path to configuration file (defaults are used if it does not exist)
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Override RTP destination host
    #[arg(long)]
    dest_host: Option<String>,

    /// Override RTP destination port
    #[arg(long)]
    dest_port: Option<u16>,

    /// Override codec ("h264", "raw")
    #[arg(long)]
    codec: Option<String>,

    /// Use the synthetic test pattern instead of a camera
    #[arg(long)]
    test_pattern: bool,

    /// Stop after this many frames
    #[arg(long)]
    frames: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    fmt().with_env_filter(filter).with_target(false).init();

    info!("H.264 RTP streamer starting");

    let config = load_config(&cli)?;

    info!(
        source = ?config.capture.source,
        resolution = %format!("{}x{}", config.capture.width, config.capture.height),
        fps = %config.capture.fps,
        codec = %config.encoder.codec,
        dest = %format!("{}:{}", config.transport.dest_host, config.transport.dest_port),
        "Configuration loaded"
    );

    let stop = Arc::new(AtomicBool::new(false));
    let worker_stop = Arc::clone(&stop);
    let mut worker = tokio::task::spawn_blocking(move || run_stream(config, &worker_stop));

    // Wait for Ctrl+C or for the stream to end on its own
    info!("Streaming started, press Ctrl+C to stop");
    tokio::select! {
        result = &mut worker => return result?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutting down");
        }
    }

    stop.store(true, Ordering::Relaxed);
    worker.await?
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if Path::new(&cli.config).exists() {
        info!(config_path = %cli.config, "Loading configuration");
        Config::load(&cli.config).with_context(|| format!("loading {}", cli.config))?
    } else {
        warn!(config_path = %cli.config, "Config file not found, using defaults");
        Config::default()
    };

    if let Some(host) = &cli.dest_host {
        config.transport.dest_host = host.clone();
    }
    if let Some(port) = cli.dest_port {
        config.transport.dest_port = port;
    }
    if let Some(codec) = &cli.codec {
        config.encoder.codec = codec.clone();
    }
    if cli.test_pattern {
        config.capture.source = SourceKind::TestPattern;
    }
    if let Some(frames) = cli.frames {
        config.pipeline.max_frames = frames;
    }

    config.validate()?;
    Ok(config)
}

fn run_stream(config: Config, stop: &AtomicBool) -> Result<()> {
    let source = capture::open_source(&config.capture_config()).context("opening frame source")?;

    let mut session = CodecSession::new(config.codec_config());
    session
        .init(&config.encoder.codec)
        .with_context(|| format!("initializing codec '{}'", config.encoder.codec))?;

    let transport = Transport::new(config.transport_config()).context("opening RTP transport")?;

    let mut pipeline = Pipeline::new(source, session, transport, config.pipeline_config());
    let stats = pipeline.run(stop)?;

    info!(
        captured = %stats.frames_captured,
        encoded = %stats.units_encoded,
        sent = %stats.units_sent,
        bytes = %stats.bytes_sent,
        "Stream finished"
    );

    Ok(())
}
