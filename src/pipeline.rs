//! Capture → encode → transport loop
//!
//! One synchronous thread drives every stage. Empty captures and frames the
//! encoder is still holding are absorbed by the loop, failed sends are logged
//! and counted, and codec or capture faults end the run.

use crate::capture::{CaptureError, FrameSource};
use crate::codec::{CodecError, CodecSession};
use crate::rtp::{TimestampGenerator, TimestampMode};
use crate::streamer::{Transport, TransportStats};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("codec failed: {0}")]
    Codec(#[from] CodecError),
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Target frame rate used for pacing and video-clock timestamps
    pub fps: u32,
    pub timestamp_mode: TimestampMode,
    /// Stop after this many captured frames (0 = unbounded)
    pub max_frames: u64,
    /// Log statistics every N captured frames (0 = never)
    pub stats_interval_frames: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            timestamp_mode: TimestampMode::default(),
            max_frames: 0,
            stats_interval_frames: 100,
        }
    }
}

/// Counters accumulated over a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_captured: u64,
    pub empty_polls: u64,
    /// Frames submitted without an access unit coming out
    pub frames_buffered: u64,
    pub units_encoded: u64,
    pub keyframes: u64,
    pub units_sent: u64,
    pub send_failures: u64,
    pub bytes_sent: u64,
}

/// Rates over the interval since the previous stats report
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateReport {
    /// Access units sent per second
    pub fps: f64,
    pub bitrate_kbps: f64,
    /// Fraction of datagrams rejected over the whole run
    pub send_failure_rate: f64,
}

/// What one cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The source had nothing this cycle
    NoFrame,

    /// The frame was submitted but the encoder produced no output yet
    Buffered,

    /// An access unit went out
    Sent {
        pts: u64,
        timestamp: u32,
        fragments: usize,
        keyframe: bool,
    },

    /// An access unit was produced but the transport reported a failure
    SendFailed,
}

pub struct Pipeline {
    source: Box<dyn FrameSource>,
    session: CodecSession,
    transport: Transport,
    config: PipelineConfig,
    timestamps: TimestampGenerator,
    stats: PipelineStats,
    last_report: (Instant, TransportStats),
}

impl Pipeline {
    /// Wires the stages together; `session` must already be initialized
    pub fn new(
        source: Box<dyn FrameSource>,
        session: CodecSession,
        transport: Transport,
        config: PipelineConfig,
    ) -> Self {
        let timestamps = TimestampGenerator::new(config.timestamp_mode, config.fps);

        Self {
            source,
            session,
            transport,
            config,
            timestamps,
            stats: PipelineStats::default(),
            last_report: (Instant::now(), TransportStats::default()),
        }
    }

    /// Runs capture, encode and send once
    pub fn run_cycle(&mut self) -> Result<CycleOutcome, PipelineError> {
        let Some(frame) = self.source.capture()? else {
            self.stats.empty_polls += 1;
            return Ok(CycleOutcome::NoFrame);
        };
        self.stats.frames_captured += 1;

        let Some(unit) = self.session.encode_frame(&frame)? else {
            self.stats.frames_buffered += 1;
            return Ok(CycleOutcome::Buffered);
        };
        self.stats.units_encoded += 1;
        if unit.keyframe {
            self.stats.keyframes += 1;
        }

        let timestamp = self.timestamps.timestamp_for(unit.pts);

        match self.transport.send_access_unit(&unit, timestamp) {
            Ok(report) => {
                self.stats.units_sent += 1;
                self.stats.bytes_sent += report.bytes as u64;
                Ok(CycleOutcome::Sent {
                    pts: unit.pts,
                    timestamp,
                    fragments: report.fragments,
                    keyframe: unit.keyframe,
                })
            }
            Err(e) => {
                warn!(pts = unit.pts, error = %e, "Failed to send access unit");
                self.stats.send_failures += 1;
                Ok(CycleOutcome::SendFailed)
            }
        }
    }

    /// Loops until `stop` is set, `max_frames` is reached, or a stage fails
    ///
    /// Each cycle is followed by a sleep for whatever remains of the frame
    /// interval.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<PipelineStats, PipelineError> {
        let frame_interval = Duration::from_secs_f64(1.0 / f64::from(self.config.fps.max(1)));

        info!(
            source = %self.source.describe(),
            fps = %self.config.fps,
            max_frames = %self.config.max_frames,
            dest = %self.transport.destination(),
            "Pipeline started"
        );

        self.last_report = (Instant::now(), self.transport.stats());

        while !stop.load(Ordering::Relaxed) {
            if self.config.max_frames > 0 && self.stats.frames_captured >= self.config.max_frames {
                debug!(frames = %self.stats.frames_captured, "Frame limit reached");
                break;
            }

            let started = Instant::now();
            let outcome = self.run_cycle()?;

            if outcome != CycleOutcome::NoFrame {
                self.report_progress();
            }

            if let Some(residual) = frame_interval.checked_sub(started.elapsed()) {
                thread::sleep(residual);
            }
        }

        info!(
            captured = %self.stats.frames_captured,
            encoded = %self.stats.units_encoded,
            sent = %self.stats.units_sent,
            send_failures = %self.stats.send_failures,
            "Pipeline stopped"
        );

        Ok(self.stats.clone())
    }

    /// Logs counters and rates every `stats_interval_frames` captured frames
    fn report_progress(&mut self) -> Option<RateReport> {
        let interval = self.config.stats_interval_frames;
        if interval == 0 || self.stats.frames_captured % interval != 0 {
            return None;
        }

        let now = Instant::now();
        let transport = self.transport.stats();
        let (since, previous) = &self.last_report;
        let elapsed = now.duration_since(*since).as_secs_f64();

        let rates = RateReport {
            fps: transport.calculate_fps(previous, elapsed),
            bitrate_kbps: transport.calculate_bitrate_kbps(previous, elapsed),
            send_failure_rate: transport.send_failure_rate(),
        };

        info!(
            fps = %format!("{:.1}", rates.fps),
            kbps = %format!("{:.0}", rates.bitrate_kbps),
            send_failure_rate = %format!("{:.3}", rates.send_failure_rate),
            captured = %self.stats.frames_captured,
            buffered = %self.stats.frames_buffered,
            encoded = %self.stats.units_encoded,
            keyframes = %self.stats.keyframes,
            sent = %self.stats.units_sent,
            send_failures = %self.stats.send_failures,
            rtp_packets = %transport.fragments_sent,
            bytes = %transport.bytes_sent,
            "Stats"
        );

        self.last_report = (now, transport);
        Some(rates)
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn session(&self) -> &CodecSession {
        &self.session
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Tears the pipeline apart, handing back the encoder and transport
    pub fn into_parts(self) -> (CodecSession, Transport) {
        (self.session, self.transport)
    }
}
