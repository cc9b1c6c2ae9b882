//! Annotation drawing: bounding boxes and the fixed motion label
//!
//! A tiny built-in 5x7 glyph set covers the label text; pulling in a font
//! rasterizer for one fixed string is not worth the dependency.

use image::{Rgb, RgbImage};

use super::ops::Region;

/// Rendered glyph scale (each font pixel becomes `SCALE` x `SCALE`)
const SCALE: u32 = 2;
/// Glyph cell width including 1px spacing, before scaling
const CELL_W: u32 = 6;

/// Draw the outline of `region` with the given stroke thickness. Pixels
/// outside the image are skipped, so boxes near the border stay safe.
pub fn rect(img: &mut RgbImage, region: &Region, color: Rgb<u8>, thickness: u32) {
    let (x0, y0) = (region.x, region.y);
    let (x1, y1) = (region.x + region.w, region.y + region.h);

    for t in 0..thickness {
        for x in x0.saturating_sub(t)..=x1 + t {
            put(img, x, y0.saturating_sub(t), color);
            put(img, x, y1 + t, color);
        }
        for y in y0.saturating_sub(t)..=y1 + t {
            put(img, x0.saturating_sub(t), y, color);
            put(img, x1 + t, y, color);
        }
    }
}

/// Render `text` at (x, y) using the built-in glyphs. Characters without a
/// glyph advance the cursor but draw nothing.
pub fn label(img: &mut RgbImage, text: &str, x: u32, y: u32, color: Rgb<u8>) {
    let mut cursor = x;
    for ch in text.chars() {
        if let Some(rows) = glyph(ch) {
            for (row, &bits) in rows.iter().enumerate() {
                for col in 0..5u32 {
                    if bits & (0b10000 >> col) != 0 {
                        for sy in 0..SCALE {
                            for sx in 0..SCALE {
                                put(
                                    img,
                                    cursor + col * SCALE + sx,
                                    y + row as u32 * SCALE + sy,
                                    color,
                                );
                            }
                        }
                    }
                }
            }
        }
        cursor += CELL_W * SCALE;
    }
}

fn put(img: &mut RgbImage, x: u32, y: u32, color: Rgb<u8>) {
    if x < img.width() && y < img.height() {
        img.put_pixel(x, y, color);
    }
}

/// 5x7 bitmap rows (MSB = leftmost column) for the characters the motion
/// label needs.
fn glyph(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'o' => [0b00000, 0b00000, 0b01110, 0b10001, 0b10001, 0b10001, 0b01110],
        't' => [0b00100, 0b00100, 0b11111, 0b00100, 0b00100, 0b00100, 0b00011],
        'i' => [0b00100, 0b00000, 0b01100, 0b00100, 0b00100, 0b00100, 0b01110],
        'n' => [0b00000, 0b00000, 0b10110, 0b11001, 0b10001, 0b10001, 0b10001],
        'e' => [0b00000, 0b00000, 0b01110, 0b10001, 0b11111, 0b10000, 0b01110],
        'c' => [0b00000, 0b00000, 0b01110, 0b10001, 0b10000, 0b10001, 0b01110],
        'd' => [0b00001, 0b00001, 0b01101, 0b10011, 0b10001, 0b10011, 0b01101],
        ' ' => [0b00000; 7],
        _ => return None,
    };
    Some(rows)
}
