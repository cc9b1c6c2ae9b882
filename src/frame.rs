//! Frame types for captured video

use image::{imageops, GrayImage, RgbImage};

/// Default capture width in pixels.
pub const FRAME_WIDTH: u32 = 640;
/// Default capture height in pixels.
pub const FRAME_HEIGHT: u32 = 480;

/// A single captured color frame.
///
/// The broadcast loop owns the frame for the duration of one cycle. Every
/// per-subscriber path works on an independent copy (`clone` or a derived
/// grayscale buffer), so annotations drawn for one viewer can never leak
/// into another viewer's output or into the next capture.
#[derive(Debug, Clone)]
pub struct Frame {
    /// RGB pixel data at the fixed capture resolution
    pub image: RgbImage,
    /// Timestamp in microseconds since capture start
    pub timestamp_us: u64,
}

impl Frame {
    /// Create a frame from an RGB buffer
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            timestamp_us: 0,
        }
    }

    /// Set the timestamp and return self (builder pattern)
    pub fn with_timestamp(mut self, timestamp_us: u64) -> Self {
        self.timestamp_us = timestamp_us;
        self
    }

    /// Frame width in pixels
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Frame height in pixels
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Convert to a grayscale buffer (luma, 8-bit).
    ///
    /// Always allocates a fresh buffer; the color frame is untouched.
    pub fn to_gray(&self) -> GrayImage {
        imageops::grayscale(&self.image)
    }
}

/// Convert one planar YUV420 (I420) frame to RGB.
///
/// This is the raw format the camera subprocess writes to stdout: a full
/// `width * height` luma plane followed by two quarter-size chroma planes.
/// Returns `None` when `data` is too short for the given dimensions, so a
/// torn read at process shutdown degrades to a skipped frame.
pub fn yuv420_to_rgb(data: &[u8], width: u32, height: u32) -> Option<RgbImage> {
    let (w, h) = (width as usize, height as usize);
    let y_len = w * h;
    let c_len = (w / 2) * (h / 2);
    if data.len() < y_len + 2 * c_len {
        return None;
    }

    let (y_plane, rest) = data.split_at(y_len);
    let (u_plane, v_plane) = rest.split_at(c_len);

    let mut out = RgbImage::new(width, height);
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let (xi, yi) = (x as usize, y as usize);
        let luma = y_plane[yi * w + xi] as i32;
        let ci = (yi / 2) * (w / 2) + xi / 2;
        let u = u_plane[ci] as i32 - 128;
        let v = v_plane[ci] as i32 - 128;

        // BT.601 full-range integer conversion
        let r = luma + ((91_881 * v) >> 16);
        let g = luma - ((22_554 * u + 46_802 * v) >> 16);
        let b = luma + ((116_130 * u) >> 16);

        pixel.0 = [clamp_u8(r), clamp_u8(g), clamp_u8(b)];
    }
    Some(out)
}

fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}
