//! Binary mask operations for the detection pipeline
//!
//! Masks are `GrayImage`s holding only 0 or 255. Everything here works on
//! raw pixels; the blur and grayscale steps come from the `image` crate.

use image::GrayImage;

/// Axis-aligned bounding box of a detected region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Region {
    /// Enclosed area in pixels
    pub fn area(&self) -> u32 {
        self.w * self.h
    }
}

/// Pixel-wise absolute difference. Both images must share dimensions.
pub fn abs_diff(a: &GrayImage, b: &GrayImage) -> GrayImage {
    debug_assert_eq!(a.dimensions(), b.dimensions());
    let mut out = GrayImage::new(a.width(), a.height());
    for ((pa, pb), po) in a.pixels().zip(b.pixels()).zip(out.pixels_mut()) {
        po[0] = pa[0].abs_diff(pb[0]);
    }
    out
}

/// Binarize: pixels strictly above `cutoff` become 255, the rest 0.
pub fn threshold(img: &GrayImage, cutoff: u8) -> GrayImage {
    let mut out = GrayImage::new(img.width(), img.height());
    for (p, po) in img.pixels().zip(out.pixels_mut()) {
        po[0] = if p[0] > cutoff { 255 } else { 0 };
    }
    out
}

/// Morphological dilation with a square window of half-width `radius`.
pub fn dilate(mask: &GrayImage, radius: u32) -> GrayImage {
    morph(mask, radius, true)
}

/// Morphological erosion with a square window of half-width `radius`.
pub fn erode(mask: &GrayImage, radius: u32) -> GrayImage {
    morph(mask, radius, false)
}

/// Morphological closing (dilate then erode): fills gaps smaller than the
/// window without growing the region overall.
pub fn close(mask: &GrayImage, radius: u32) -> GrayImage {
    erode(&dilate(mask, radius), radius)
}

fn morph(mask: &GrayImage, radius: u32, grow: bool) -> GrayImage {
    let (w, h) = mask.dimensions();
    let r = radius as i64;
    let mut out = GrayImage::new(w, h);
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let mut hit = !grow;
            'window: for wy in y - r..=y + r {
                for wx in x - r..=x + r {
                    if wx < 0 || wy < 0 || wx >= w as i64 || wy >= h as i64 {
                        continue;
                    }
                    let on = mask.get_pixel(wx as u32, wy as u32)[0] != 0;
                    if grow && on {
                        hit = true;
                        break 'window;
                    }
                    if !grow && !on {
                        hit = false;
                        break 'window;
                    }
                }
            }
            out.put_pixel(x as u32, y as u32, image::Luma([if hit { 255 } else { 0 }]));
        }
    }
    out
}

/// Extract 8-connected regions from a binary mask, keeping only those with
/// at least `min_area` set pixels. Returns their bounding boxes.
pub fn find_regions(mask: &GrayImage, min_area: u32) -> Vec<Region> {
    let (w, h) = mask.dimensions();
    let mut visited = vec![false; (w * h) as usize];
    let mut regions = Vec::new();
    let mut stack = Vec::new();

    for sy in 0..h {
        for sx in 0..w {
            let idx = (sy * w + sx) as usize;
            if visited[idx] || mask.get_pixel(sx, sy)[0] == 0 {
                continue;
            }

            let (mut min_x, mut min_y, mut max_x, mut max_y) = (sx, sy, sx, sy);
            let mut pixels = 0u32;
            visited[idx] = true;
            stack.push((sx, sy));

            while let Some((x, y)) = stack.pop() {
                pixels += 1;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);

                for dy in -1i64..=1 {
                    for dx in -1i64..=1 {
                        let (nx, ny) = (x as i64 + dx, y as i64 + dy);
                        if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                            continue;
                        }
                        let (nx, ny) = (nx as u32, ny as u32);
                        let nidx = (ny * w + nx) as usize;
                        if !visited[nidx] && mask.get_pixel(nx, ny)[0] != 0 {
                            visited[nidx] = true;
                            stack.push((nx, ny));
                        }
                    }
                }
            }

            if pixels >= min_area {
                regions.push(Region {
                    x: min_x,
                    y: min_y,
                    w: max_x - min_x + 1,
                    h: max_y - min_y + 1,
                });
            }
        }
    }

    regions
}
