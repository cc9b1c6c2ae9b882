//! Synthetic frame source for development and tests without camera hardware
//!
//! Renders a flat scene with a single bright block. With movement enabled
//! the block slides one step per frame, which reliably trips frame
//! differencing; with movement off consecutive frames are pixel-identical.

use image::{Rgb, RgbImage};

use super::FrameSource;
use crate::{Frame, FRAME_HEIGHT, FRAME_WIDTH};

const BACKGROUND: Rgb<u8> = Rgb([40, 40, 40]);
const BLOCK: Rgb<u8> = Rgb([255, 255, 255]);
const BLOCK_SIZE: u32 = 64;
const STEP: u32 = 8;

/// Deterministic synthetic camera.
pub struct TestPattern {
    width: u32,
    height: u32,
    frame_index: u64,
    moving: bool,
}

impl TestPattern {
    /// Source at the default capture resolution, block stationary.
    pub fn new() -> Self {
        Self::with_size(FRAME_WIDTH, FRAME_HEIGHT)
    }

    /// Source at a custom resolution.
    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame_index: 0,
            moving: false,
        }
    }

    /// Advance the block each frame (true) or hold it still (false).
    pub fn set_moving(&mut self, moving: bool) {
        self.moving = moving;
    }

    /// Builder-style variant of [`set_moving`](Self::set_moving).
    pub fn moving(mut self) -> Self {
        self.moving = true;
        self
    }

    fn render(&self) -> RgbImage {
        let mut img = RgbImage::from_pixel(self.width, self.height, BACKGROUND);

        // Block slides horizontally through the lower half, wrapping around
        let travel = self.width.saturating_sub(BLOCK_SIZE).max(1);
        let offset = if self.moving {
            (self.frame_index as u32 * STEP) % travel
        } else {
            travel / 2
        };
        let top = self.height / 2;

        for y in top..(top + BLOCK_SIZE).min(self.height) {
            for x in offset..(offset + BLOCK_SIZE).min(self.width) {
                img.put_pixel(x, y, BLOCK);
            }
        }
        img
    }
}

impl Default for TestPattern {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for TestPattern {
    fn read(&mut self) -> Option<Frame> {
        let frame = Frame::new(self.render()).with_timestamp(self.frame_index * 33_333);
        self.frame_index += 1;
        Some(frame)
    }
}
