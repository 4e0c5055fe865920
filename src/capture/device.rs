//! GStreamer-based raw camera capture

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use tracing::{debug, info, warn};

use super::platform::{self, PlatformInfo};
use super::{CaptureConfig, CaptureError, CaptureStats, FrameSource, PixelFormat, RawFrame};

/// How long one `capture()` call waits for a sample before reporting
/// "no frame this cycle"
const PULL_TIMEOUT_MS: u64 = 100;

/// Camera opened through a GStreamer pipeline ending in an appsink
///
/// Frames are delivered as BGR at the configured size; scaling and color
/// conversion happen inside the pipeline.
pub struct DeviceCapture {
    config: CaptureConfig,
    device_path: String,
    pipeline: Option<gst::Pipeline>,
    app_sink: Option<gst_app::AppSink>,
    stats: CaptureStats,
}

impl DeviceCapture {
    /// Creates a new capture instance
    pub fn new(config: CaptureConfig) -> Result<Self, CaptureError> {
        if config.width == 0 || config.height == 0 {
            return Err(CaptureError::InvalidFrame(format!(
                "capture size {}x{} has a zero dimension",
                config.width, config.height
            )));
        }

        gst::init()?;

        let device_path = platform::resolve_device_path(platform::detect_platform(), &config.device);

        Ok(Self {
            config,
            device_path,
            pipeline: None,
            app_sink: None,
            stats: CaptureStats::default(),
        })
    }

    /// Starts capture
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.pipeline.is_some() {
            return Err(CaptureError::Pipeline("Already running".to_string()));
        }

        info!(
            device = %self.device_path,
            resolution = %format!("{}x{}", self.config.width, self.config.height),
            fps = %self.config.fps,
            "Starting camera capture"
        );

        let pipeline_desc = self.build_pipeline_string(platform::detect_platform());
        debug!(pipeline = %pipeline_desc, "Creating GStreamer pipeline");

        let pipeline = gst::parse::launch(&pipeline_desc)?
            .dynamic_cast::<gst::Pipeline>()
            .map_err(|_| CaptureError::Pipeline("Not a pipeline".to_string()))?;

        let app_sink = pipeline
            .by_name("sink")
            .ok_or_else(|| CaptureError::Pipeline("No appsink found".to_string()))?
            .dynamic_cast::<gst_app::AppSink>()
            .map_err(|_| CaptureError::Pipeline("Not an appsink".to_string()))?;

        // Keep at most two frames queued; stale frames are dropped
        app_sink.set_property("max-buffers", 2u32);
        app_sink.set_property("drop", true);
        app_sink.set_property("emit-signals", false);

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| CaptureError::StateChange(format!("{:?}", e)))?;

        self.pipeline = Some(pipeline);
        self.app_sink = Some(app_sink);

        info!("Camera capture started");
        Ok(())
    }

    /// Stops capture
    pub fn stop(&mut self) -> Result<(), CaptureError> {
        self.app_sink = None;

        if let Some(pipeline) = self.pipeline.take() {
            pipeline
                .set_state(gst::State::Null)
                .map_err(|e| CaptureError::StateChange(format!("{:?}", e)))?;

            info!(
                frames = %self.stats.frames_captured,
                empty = %self.stats.empty_polls,
                "Camera capture stopped"
            );
        }

        Ok(())
    }

    fn build_pipeline_string(&self, platform: PlatformInfo) -> String {
        let source = match platform {
            PlatformInfo::MacOS => format!("avfvideosrc device-index={}", self.device_path),
            PlatformInfo::RaspberryPi if !self.device_path.starts_with("/dev/") => {
                format!("libcamerasrc camera-name=\"{}\"", self.device_path)
            }
            PlatformInfo::RaspberryPi | PlatformInfo::Linux => {
                format!("v4l2src device={}", self.device_path)
            }
        };

        format!(
            "{} ! videorate ! videoconvert ! videoscale ! video/x-raw,format={},width={},height={},framerate={}/1 \
             ! queue max-size-buffers=2 leaky=downstream ! appsink name=sink sync=false",
            source,
            PixelFormat::Bgr24.caps_name(),
            self.config.width,
            self.config.height,
            self.config.fps
        )
    }
}

/// Copies a mapped buffer into a tightly packed frame
///
/// GStreamer pads BGR rows to a 4-byte stride.
fn pack_rows(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>, CaptureError> {
    let width = width as usize;
    let height = height as usize;
    let row_bytes = width * PixelFormat::Bgr24.bytes_per_pixel();
    let stride = (row_bytes + 3) & !3;

    if data.len() == row_bytes * height {
        return Ok(data.to_vec());
    }

    if data.len() < stride * height.saturating_sub(1) + row_bytes {
        return Err(CaptureError::InvalidFrame(format!(
            "buffer of {} bytes is too small for {}x{} BGR",
            data.len(),
            width,
            height
        )));
    }

    let mut packed = Vec::with_capacity(row_bytes * height);
    for row in 0..height {
        let start = row * stride;
        packed.extend_from_slice(&data[start..start + row_bytes]);
    }
    Ok(packed)
}

impl FrameSource for DeviceCapture {
    fn capture(&mut self) -> Result<Option<RawFrame>, CaptureError> {
        let app_sink = self.app_sink.as_ref().ok_or(CaptureError::NotRunning)?;

        if app_sink.is_eos() {
            warn!(device = %self.device_path, "Capture pipeline reached end of stream");
            return Err(CaptureError::NotRunning);
        }

        let Some(sample) = app_sink.try_pull_sample(gst::ClockTime::from_mseconds(PULL_TIMEOUT_MS)) else {
            self.stats.empty_polls += 1;
            return Ok(None);
        };

        let Some(buffer) = sample.buffer() else {
            self.stats.empty_polls += 1;
            return Ok(None);
        };

        let map = buffer
            .map_readable()
            .map_err(|_| CaptureError::Pipeline("Unreadable buffer".to_string()))?;
        let data = pack_rows(map.as_slice(), self.config.width, self.config.height)?;

        let frame = RawFrame::new(data, self.config.width, self.config.height, PixelFormat::Bgr24)?;
        self.stats.frames_captured += 1;
        Ok(Some(frame))
    }

    fn stats(&self) -> CaptureStats {
        self.stats.clone()
    }

    fn describe(&self) -> String {
        format!(
            "device {} {}x{}@{}",
            self.device_path, self.config.width, self.config.height, self.config.fps
        )
    }
}

impl Drop for DeviceCapture {
    fn drop(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            let _ = pipeline.set_state(gst::State::Null);
        }
    }
}
