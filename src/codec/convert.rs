//! Resizing and interleaved → planar 4:2:0 conversion
//!
//! The planar buffer is one contiguous allocation laid out as
//! `Y (w*h) | U (w*h/4) | V (w*h/4)`, so U starts at `w*h` and V at
//! `w*h*5/4`. Any other layout corrupts the bitstream.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb, Rgba};

use super::CodecError;
use crate::capture::{PixelFormat, RawFrame};

// BT.601 video-range coefficients in 8-bit fixed point: Y in 16..=235,
// Cb/Cr in 16..=240. OpenH264 streams carry no full-range flag.
const Y_R: i32 = 66;
const Y_G: i32 = 129;
const Y_B: i32 = 25;
const U_R: i32 = -38;
const U_G: i32 = -74;
const U_B: i32 = 112;
const V_R: i32 = 112;
const V_G: i32 = -94;
const V_B: i32 = -18;
const ROUND: i32 = 128;
const LUMA_OFFSET: i32 = 16;
const CHROMA_OFFSET: i32 = 128;

/// Reusable I420 frame buffer owned by a codec session
#[derive(Debug, Clone)]
pub struct PlanarFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl PlanarFrame {
    /// Allocates a zeroed buffer for `width`×`height`
    ///
    /// Allocation failure is reported instead of aborting the process.
    pub fn allocate(width: u32, height: u32) -> Result<Self, CodecError> {
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(CodecError::Configuration(format!(
                "planar 4:2:0 needs non-zero even dimensions, got {}x{}",
                width, height
            )));
        }

        let size = i420_size(width, height);
        let mut data = Vec::new();
        data.try_reserve_exact(size).map_err(|e| {
            CodecError::Resource(format!("cannot allocate {} byte planar frame: {}", size, e))
        })?;
        data.resize(size, 0);

        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn luma_size(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn chroma_size(&self) -> usize {
        self.luma_size() / 4
    }

    pub fn y_plane(&self) -> &[u8] {
        &self.data[..self.luma_size()]
    }

    pub fn u_plane(&self) -> &[u8] {
        let start = self.luma_size();
        &self.data[start..start + self.chroma_size()]
    }

    pub fn v_plane(&self) -> &[u8] {
        let start = self.luma_size() + self.chroma_size();
        &self.data[start..start + self.chroma_size()]
    }

    /// The whole contiguous Y|U|V buffer
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Converts `frame` into this buffer, resizing first if its dimensions differ
    pub fn fill_from(&mut self, frame: &RawFrame) -> Result<(), CodecError> {
        if frame.width() == self.width && frame.height() == self.height {
            interleaved_to_i420(frame.data(), frame.format(), self.width, self.height, &mut self.data);
        } else {
            let resized = resize_interleaved(frame, self.width, self.height)?;
            interleaved_to_i420(&resized, frame.format(), self.width, self.height, &mut self.data);
        }
        Ok(())
    }
}

/// Total bytes of an I420 frame
pub fn i420_size(width: u32, height: u32) -> usize {
    let luma = width as usize * height as usize;
    luma + luma / 2
}

/// Bilinear resize of an interleaved frame, channel order preserved
pub fn resize_interleaved(frame: &RawFrame, width: u32, height: u32) -> Result<Vec<u8>, CodecError> {
    let invalid = || {
        CodecError::Configuration(format!(
            "frame buffer does not match {}x{} {:?}",
            frame.width(),
            frame.height(),
            frame.format()
        ))
    };

    match frame.format().bytes_per_pixel() {
        3 => {
            let src = ImageBuffer::<Rgb<u8>, &[u8]>::from_raw(frame.width(), frame.height(), frame.data())
                .ok_or_else(invalid)?;
            Ok(imageops::resize(&src, width, height, FilterType::Triangle).into_raw())
        }
        _ => {
            let src = ImageBuffer::<Rgba<u8>, &[u8]>::from_raw(frame.width(), frame.height(), frame.data())
                .ok_or_else(invalid)?;
            Ok(imageops::resize(&src, width, height, FilterType::Triangle).into_raw())
        }
    }
}

#[inline]
fn luma(r: i32, g: i32, b: i32) -> i32 {
    ((Y_R * r + Y_G * g + Y_B * b + ROUND) >> 8) + LUMA_OFFSET
}

#[inline]
fn chroma(r: i32, g: i32, b: i32) -> (i32, i32) {
    let u = ((U_R * r + U_G * g + U_B * b + ROUND) >> 8) + CHROMA_OFFSET;
    let v = ((V_R * r + V_G * g + V_B * b + ROUND) >> 8) + CHROMA_OFFSET;
    (u, v)
}

#[inline]
fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Converts interleaved pixels to I420 (BT.601, video range)
///
/// Chroma is computed from the average color of each 2×2 block. `dst` must
/// hold at least `i420_size(width, height)` bytes and `src` exactly
/// `width*height` pixels.
pub fn interleaved_to_i420(src: &[u8], format: PixelFormat, width: u32, height: u32, dst: &mut [u8]) {
    let w = width as usize;
    let h = height as usize;
    let bpp = format.bytes_per_pixel();
    let (ro, go, bo) = format.rgb_offsets();
    let luma_size = w * h;
    let chroma_size = luma_size / 4;

    let (y_plane, chroma_planes) = dst.split_at_mut(luma_size);
    let (u_plane, v_plane) = chroma_planes.split_at_mut(chroma_size);

    let rgb_at = |x: usize, y: usize| -> (i32, i32, i32) {
        let idx = (y * w + x) * bpp;
        (src[idx + ro] as i32, src[idx + go] as i32, src[idx + bo] as i32)
    };

    for y in 0..h {
        for x in 0..w {
            let (r, g, b) = rgb_at(x, y);
            y_plane[y * w + x] = clamp_u8(luma(r, g, b));
        }
    }

    let cw = w / 2;
    for cy in 0..h / 2 {
        for cx in 0..cw {
            let (mut r, mut g, mut b) = (0, 0, 0);
            for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                let (pr, pg, pb) = rgb_at(cx * 2 + dx, cy * 2 + dy);
                r += pr;
                g += pg;
                b += pb;
            }
            let (u, v) = chroma((r + 2) >> 2, (g + 2) >> 2, (b + 2) >> 2);

            let idx = cy * cw + cx;
            u_plane[idx] = clamp_u8(u);
            v_plane[idx] = clamp_u8(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_sizes_and_offsets() {
        let planar = PlanarFrame::allocate(640, 480).unwrap();

        assert_eq!(planar.as_bytes().len(), 640 * 480 * 3 / 2);
        assert_eq!(planar.y_plane().len(), 640 * 480);
        assert_eq!(planar.u_plane().len(), 640 * 480 / 4);
        assert_eq!(planar.v_plane().len(), 640 * 480 / 4);

        let base = planar.as_bytes().as_ptr() as usize;
        assert_eq!(planar.u_plane().as_ptr() as usize - base, 640 * 480);
        assert_eq!(planar.v_plane().as_ptr() as usize - base, 640 * 480 * 5 / 4);
    }

    #[test]
    fn test_odd_dimensions_rejected() {
        assert!(matches!(PlanarFrame::allocate(641, 480), Err(CodecError::Configuration(_))));
        assert!(matches!(PlanarFrame::allocate(0, 480), Err(CodecError::Configuration(_))));
    }

    #[test]
    fn test_grey_levels() {
        let mut planar = PlanarFrame::allocate(4, 4).unwrap();

        planar.fill_from(&RawFrame::solid(4, 4, PixelFormat::Bgr24, (255, 255, 255)).unwrap()).unwrap();
        assert!(planar.y_plane().iter().all(|&v| v == 235));
        assert!(planar.u_plane().iter().all(|&v| v == 128));
        assert!(planar.v_plane().iter().all(|&v| v == 128));

        planar.fill_from(&RawFrame::solid(4, 4, PixelFormat::Bgr24, (0, 0, 0)).unwrap()).unwrap();
        assert!(planar.y_plane().iter().all(|&v| v == 16));
        assert!(planar.u_plane().iter().all(|&v| v == 128));
        assert!(planar.v_plane().iter().all(|&v| v == 128));
    }

    #[test]
    fn test_channel_order_respected() {
        let mut from_bgr = PlanarFrame::allocate(2, 2).unwrap();
        let mut from_rgba = PlanarFrame::allocate(2, 2).unwrap();

        from_bgr.fill_from(&RawFrame::solid(2, 2, PixelFormat::Bgr24, (255, 0, 0)).unwrap()).unwrap();
        from_rgba.fill_from(&RawFrame::solid(2, 2, PixelFormat::Rgba32, (255, 0, 0)).unwrap()).unwrap();

        assert_eq!(from_bgr.as_bytes(), from_rgba.as_bytes());
        // Pure red in video range, as OpenCV's BGR2YUV_I420 gives it
        assert_eq!(from_bgr.y_plane()[0], 82);
        assert_eq!(from_bgr.u_plane()[0], 90);
        assert_eq!(from_bgr.v_plane()[0], 240);
    }

    #[test]
    fn test_chroma_averages_two_by_two_blocks() {
        // Left column white, right column black: every block averages to mid grey
        let mut data = Vec::new();
        for _ in 0..2 {
            data.extend_from_slice(&[255, 255, 255, 0, 0, 0]);
        }
        let frame = RawFrame::new(data, 2, 2, PixelFormat::Rgb24).unwrap();

        let mut planar = PlanarFrame::allocate(2, 2).unwrap();
        planar.fill_from(&frame).unwrap();

        assert_eq!(planar.y_plane(), &[235, 16, 235, 16]);
        assert_eq!(planar.u_plane(), &[128]);
        assert_eq!(planar.v_plane(), &[128]);
    }

    #[test]
    fn test_resize_before_conversion() {
        let small = RawFrame::solid(320, 240, PixelFormat::Bgr24, (0, 0, 255)).unwrap();
        let mut planar = PlanarFrame::allocate(640, 480).unwrap();
        planar.fill_from(&small).unwrap();

        assert_eq!(planar.y_plane().len(), 640 * 480);
        assert_eq!(planar.u_plane().len(), 640 * 480 / 4);
        assert_eq!(planar.v_plane().len(), 640 * 480 / 4);

        let first = planar.y_plane()[0];
        assert!(planar.y_plane().iter().all(|&v| v == first));
    }

    #[test]
    fn test_resize_is_deterministic() {
        let source = crate::capture::TestPatternSource::new(100, 60);
        let frame = source.render(2).unwrap();

        let a = resize_interleaved(&frame, 64, 48).unwrap();
        let b = resize_interleaved(&frame, 64, 48).unwrap();
        assert_eq!(a.len(), 64 * 48 * 3);
        assert_eq!(a, b);
    }
}
