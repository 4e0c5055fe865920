//! Frame sources feeding the encoder
//!
//! The core only depends on [`FrameSource`]: one call per pipeline cycle,
//! returning a frame or nothing. Two sources ship with the crate:
//!
//! - [`TestPatternSource`]: deterministic moving color bars, always built
//! - [`DeviceCapture`]: a camera opened through GStreamer (`gstreamer` feature)

#[cfg(feature = "gstreamer")]
mod device;
mod frame;
mod platform;

#[cfg(feature = "gstreamer")]
pub use device::DeviceCapture;
pub use frame::{PixelFormat, RawFrame};
pub use platform::{default_device_path, detect_platform, resolve_device_path, PlatformInfo};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[cfg(feature = "gstreamer")]
    #[error("GStreamer error: {0}")]
    Gst(#[from] gstreamer::glib::Error),

    #[cfg(feature = "gstreamer")]
    #[error("GStreamer bool error: {0}")]
    GstBool(#[from] gstreamer::glib::BoolError),

    #[error("state change error: {0}")]
    StateChange(String),

    #[error("pipeline error: {0}")]
    Pipeline(String),

    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("capture source unavailable: {0}")]
    Unavailable(String),

    #[error("capture not running")]
    NotRunning,
}

/// Where frames come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// A camera device
    #[default]
    Device,

    /// Synthetic color bars
    TestPattern,
}

/// Capture configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub source: SourceKind,
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// Statistics for capture
#[derive(Debug, Clone, Default)]
pub struct CaptureStats {
    pub frames_captured: u64,
    pub empty_polls: u64,
}

/// The capture contract consumed by the pipeline
///
/// `Ok(None)` means "nothing this cycle" and is not an error.
pub trait FrameSource {
    fn capture(&mut self) -> Result<Option<RawFrame>, CaptureError>;

    fn stats(&self) -> CaptureStats;

    /// Human readable description for logs
    fn describe(&self) -> String;
}

/// Opens the source selected by `config`
pub fn open_source(config: &CaptureConfig) -> Result<Box<dyn FrameSource>, CaptureError> {
    match config.source {
        SourceKind::TestPattern => {
            info!(
                resolution = %format!("{}x{}", config.width, config.height),
                "Using synthetic test pattern"
            );
            Ok(Box::new(TestPatternSource::new(config.width, config.height)))
        }
        SourceKind::Device => open_device(config),
    }
}

#[cfg(feature = "gstreamer")]
fn open_device(config: &CaptureConfig) -> Result<Box<dyn FrameSource>, CaptureError> {
    let mut capture = DeviceCapture::new(config.clone())?;
    capture.start()?;
    Ok(Box::new(capture))
}

#[cfg(not(feature = "gstreamer"))]
fn open_device(config: &CaptureConfig) -> Result<Box<dyn FrameSource>, CaptureError> {
    Err(CaptureError::Unavailable(format!(
        "device '{}' requested but the crate was built without the `gstreamer` feature",
        config.device
    )))
}

/// Eight vertical color bars scrolling left by a few pixels per frame
pub struct TestPatternSource {
    width: u32,
    height: u32,
    format: PixelFormat,
    frame_index: u64,
    stats: CaptureStats,
}

const BARS: [(u8, u8, u8); 8] = [
    (255, 255, 255),
    (255, 255, 0),
    (0, 255, 255),
    (0, 255, 0),
    (255, 0, 255),
    (255, 0, 0),
    (0, 0, 255),
    (0, 0, 0),
];

impl TestPatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: PixelFormat::Bgr24,
            frame_index: 0,
            stats: CaptureStats::default(),
        }
    }

    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    /// Renders frame `index` without advancing the source
    pub fn render(&self, index: u64) -> Result<RawFrame, CaptureError> {
        let w = self.width as usize;
        let h = self.height as usize;
        let bpp = self.format.bytes_per_pixel();
        let (ro, go, bo) = self.format.rgb_offsets();
        let bar_width = (w / BARS.len()).max(1);
        let shift = (index as usize * 4) % w.max(1);

        let mut row = vec![255u8; w * bpp];
        for x in 0..w {
            let (r, g, b) = BARS[((x + shift) / bar_width) % BARS.len()];
            let px = &mut row[x * bpp..(x + 1) * bpp];
            px[ro] = r;
            px[go] = g;
            px[bo] = b;
        }

        let mut data = Vec::with_capacity(w * h * bpp);
        for _ in 0..h {
            data.extend_from_slice(&row);
        }

        RawFrame::new(data, self.width, self.height, self.format)
    }
}

impl FrameSource for TestPatternSource {
    fn capture(&mut self) -> Result<Option<RawFrame>, CaptureError> {
        let frame = self.render(self.frame_index)?;
        self.frame_index += 1;
        self.stats.frames_captured += 1;
        Ok(Some(frame))
    }

    fn stats(&self) -> CaptureStats {
        self.stats.clone()
    }

    fn describe(&self) -> String {
        format!("test-pattern {}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_dimensions() {
        let mut source = TestPatternSource::new(64, 48);
        let frame = source.capture().unwrap().unwrap();

        assert_eq!(frame.width(), 64);
        assert_eq!(frame.height(), 48);
        assert_eq!(frame.data().len(), 64 * 48 * 3);
        assert_eq!(source.stats().frames_captured, 1);
    }

    #[test]
    fn test_pattern_is_deterministic_and_moves() {
        let source = TestPatternSource::new(64, 8);
        assert_eq!(source.render(3).unwrap(), source.render(3).unwrap());
        assert_ne!(source.render(0).unwrap(), source.render(1).unwrap());
    }

    #[test]
    fn test_pattern_first_bar_is_white() {
        let source = TestPatternSource::new(64, 2).with_format(PixelFormat::Rgb24);
        let frame = source.render(0).unwrap();
        assert_eq!(&frame.data()[..3], &[255, 255, 255]);
    }

    #[test]
    fn test_open_test_pattern() {
        let config = CaptureConfig {
            source: SourceKind::TestPattern,
            device: "0".to_string(),
            width: 32,
            height: 16,
            fps: 30,
        };

        let mut source = open_source(&config).unwrap();
        assert!(source.capture().unwrap().is_some());
        assert!(source.describe().contains("32x16"));
    }

    #[cfg(not(feature = "gstreamer"))]
    #[test]
    fn test_device_requires_feature() {
        let config = CaptureConfig {
            source: SourceKind::Device,
            device: "0".to_string(),
            width: 32,
            height: 16,
            fps: 30,
        };

        assert!(matches!(open_source(&config), Err(CaptureError::Unavailable(_))));
    }
}
