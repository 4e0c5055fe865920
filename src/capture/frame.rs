//! Raw interleaved frames handed from capture to the codec session

use serde::{Deserialize, Serialize};

use super::CaptureError;

/// Interleaved pixel layouts accepted by the codec session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 3 bytes per pixel, blue first (camera stacks default to this)
    #[default]
    Bgr24,
    Rgb24,
    Bgra32,
    Rgba32,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgr24 | PixelFormat::Rgb24 => 3,
            PixelFormat::Bgra32 | PixelFormat::Rgba32 => 4,
        }
    }

    /// Byte offsets of the red, green and blue channels within one pixel
    pub fn rgb_offsets(self) -> (usize, usize, usize) {
        match self {
            PixelFormat::Bgr24 | PixelFormat::Bgra32 => (2, 1, 0),
            PixelFormat::Rgb24 | PixelFormat::Rgba32 => (0, 1, 2),
        }
    }

    /// GStreamer caps format string
    pub fn caps_name(self) -> &'static str {
        match self {
            PixelFormat::Bgr24 => "BGR",
            PixelFormat::Rgb24 => "RGB",
            PixelFormat::Bgra32 => "BGRA",
            PixelFormat::Rgba32 => "RGBA",
        }
    }
}

/// One captured picture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl RawFrame {
    /// Wraps a pixel buffer, checking its length against the dimensions
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Result<Self, CaptureError> {
        if width == 0 || height == 0 {
            return Err(CaptureError::InvalidFrame(format!(
                "zero-sized frame {}x{}",
                width, height
            )));
        }

        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(CaptureError::InvalidFrame(format!(
                "{}x{} {:?} needs {} bytes, got {}",
                width,
                height,
                format,
                expected,
                data.len()
            )));
        }

        Ok(Self {
            data,
            width,
            height,
            format,
        })
    }

    /// A frame filled with one color, given as (r, g, b)
    pub fn solid(width: u32, height: u32, format: PixelFormat, rgb: (u8, u8, u8)) -> Result<Self, CaptureError> {
        let bpp = format.bytes_per_pixel();
        let (ro, go, bo) = format.rgb_offsets();

        let mut pixel = [255u8; 4];
        pixel[ro] = rgb.0;
        pixel[go] = rgb.1;
        pixel[bo] = rgb.2;

        let count = width as usize * height as usize;
        let mut data = Vec::with_capacity(count * bpp);
        for _ in 0..count {
            data.extend_from_slice(&pixel[..bpp]);
        }

        Self::new(data, width, height, format)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }
}
