//! Motion detection over an explicit reference frame
//!
//! Detection is a pure function: the caller passes the previous reference
//! frame in and receives the updated reference back, so the update policy
//! stays testable in isolation and no detector state is shared between
//! subscribers. The pipeline mirrors the classic frame-differencing
//! approach: blur to suppress sensor noise, absolute difference against the
//! reference, binary threshold, morphological cleanup, then connected-region
//! extraction with an area cutoff.

mod draw;
mod ops;

use image::{imageops, GrayImage, Rgb, RgbImage};

use crate::Frame;

pub use ops::Region;

/// Fixed label burned into annotated frames.
const MOTION_LABEL: &str = "Motion Detected";
/// Box and label color. Drawn before the grayscale conversion, so only the
/// resulting luma matters; white survives as maximum brightness.
const ANNOTATION_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// How the reference frame evolves after each comparison.
///
/// The choice changes detection sensitivity: a static baseline flags any
/// deviation from the initial scene (including slow drift such as lighting
/// changes), while a rolling reference only reacts to frame-to-frame change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferencePolicy {
    /// Keep the first processed frame as a fixed baseline.
    StaticBackground,
    /// Replace the reference with the current frame after every comparison.
    #[default]
    RollingPrevious,
}

impl ReferencePolicy {
    /// Parse a configuration value (`"static"` / `"rolling"`).
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "static" => Some(Self::StaticBackground),
            "rolling" => Some(Self::RollingPrevious),
            _ => None,
        }
    }
}

/// Tuning constants for the detector. All values are explicit rather than
/// derived; the defaults match the reference deployment.
#[derive(Debug, Clone)]
pub struct MotionConfig {
    /// Gaussian blur strength; sigma 3.5 covers roughly a 21x21 window
    pub blur_sigma: f32,
    /// Per-pixel difference cutoff (0-255 scale) for the binary mask
    pub diff_threshold: u8,
    /// Minimum connected-region size in pixels; smaller regions are noise
    pub min_area: u32,
    /// 3x3 dilation passes applied to merge nearby motion fragments
    pub dilate_iterations: u32,
    /// Reference frame update policy
    pub policy: ReferencePolicy,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 3.5,
            diff_threshold: 25,
            min_area: 1000,
            dilate_iterations: 2,
            policy: ReferencePolicy::default(),
        }
    }
}

/// Result of one detection pass.
#[derive(Debug)]
pub struct Detection {
    /// Copy of the input color frame, with boxes and label burned in when
    /// motion was found (otherwise pixel-identical to the input)
    pub annotated: RgbImage,
    /// True when at least one region passed the area cutoff
    pub motion: bool,
    /// Updated reference frame the caller must store for the next pass
    pub reference: GrayImage,
    /// Bounding boxes of the qualifying regions
    pub regions: Vec<Region>,
}

/// Run one detection pass against `reference`.
///
/// With no reference yet (fresh subscriber), this bootstraps: the blurred
/// grayscale of the input becomes the reference and the frame is returned
/// unannotated with `motion = false`, since no comparison is possible.
pub fn detect(frame: &Frame, reference: Option<&GrayImage>, cfg: &MotionConfig) -> Detection {
    let gray = imageops::grayscale(&frame.image);
    let blurred = imageops::blur(&gray, cfg.blur_sigma);

    let Some(reference) = reference else {
        return Detection {
            annotated: frame.image.clone(),
            motion: false,
            reference: blurred,
            regions: Vec::new(),
        };
    };

    let diff = ops::abs_diff(reference, &blurred);
    let mut mask = ops::threshold(&diff, cfg.diff_threshold);
    // Close small gaps first, then grow remaining fragments together
    mask = ops::close(&mask, 2);
    for _ in 0..cfg.dilate_iterations {
        mask = ops::dilate(&mask, 1);
    }

    let regions = ops::find_regions(&mask, cfg.min_area);
    let motion = !regions.is_empty();

    let mut annotated = frame.image.clone();
    for region in &regions {
        draw::rect(&mut annotated, region, ANNOTATION_COLOR, 2);
    }
    if motion {
        draw::label(&mut annotated, MOTION_LABEL, 10, 10, ANNOTATION_COLOR);
    }

    let next_reference = match cfg.policy {
        ReferencePolicy::StaticBackground => reference.clone(),
        ReferencePolicy::RollingPrevious => blurred,
    };

    Detection {
        annotated,
        motion,
        reference: next_reference,
        regions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn solid_frame(luma: u8) -> Frame {
        Frame::new(RgbImage::from_pixel(
            crate::FRAME_WIDTH,
            crate::FRAME_HEIGHT,
            Rgb([luma, luma, luma]),
        ))
    }

    /// Solid frame with a white square of `size` pixels at (x, y)
    fn frame_with_block(luma: u8, x: u32, y: u32, size: u32) -> Frame {
        let mut frame = solid_frame(luma);
        for by in y..y + size {
            for bx in x..x + size {
                frame.image.put_pixel(bx, by, Rgb([255, 255, 255]));
            }
        }
        frame
    }

    // ========== Bootstrap ==========

    #[test]
    fn first_pass_bootstraps_reference_without_motion() {
        let frame = solid_frame(50);
        let det = detect(&frame, None, &MotionConfig::default());

        assert!(!det.motion);
        assert!(det.regions.is_empty());
        assert_eq!(det.annotated, frame.image);
        assert_eq!(det.reference.dimensions(), frame.image.dimensions());
        // Reference is the blurred grayscale of a uniform frame: uniform luma
        assert_eq!(det.reference.get_pixel(100, 100)[0], 50);
    }

    // ========== No motion ==========

    #[test]
    fn identical_consecutive_frames_report_no_motion() {
        let frame = solid_frame(50);
        let cfg = MotionConfig::default();

        let first = detect(&frame, None, &cfg);
        let second = detect(&frame, Some(&first.reference), &cfg);

        assert!(!second.motion);
        assert_eq!(second.annotated, frame.image, "output must be untouched");
    }

    #[test]
    fn small_region_below_area_cutoff_is_rejected() {
        let cfg = MotionConfig::default();
        let baseline = detect(&solid_frame(50), None, &cfg);

        // 10x10 changed region: far below the 1000 px minimum even after
        // blur spread and dilation
        let moved = frame_with_block(50, 300, 200, 10);
        let det = detect(&moved, Some(&baseline.reference), &cfg);

        assert!(!det.motion, "regions found: {:?}", det.regions);
    }

    // ========== Motion ==========

    #[test]
    fn large_region_is_detected_with_enclosing_box() {
        let cfg = MotionConfig::default();
        let baseline = detect(&solid_frame(50), None, &cfg);

        let moved = frame_with_block(50, 300, 200, 50);
        let det = detect(&moved, Some(&baseline.reference), &cfg);

        assert!(det.motion);
        let region = det
            .regions
            .iter()
            .find(|r| r.x <= 300 && r.y <= 200 && r.x + r.w >= 350 && r.y + r.h >= 250)
            .unwrap_or_else(|| panic!("no box encloses the changed area: {:?}", det.regions));
        assert!(region.w < 100 && region.h < 100, "box far too large: {:?}", region);
    }

    #[test]
    fn motion_burns_annotation_into_the_copy_only() {
        let cfg = MotionConfig::default();
        let baseline = detect(&solid_frame(50), None, &cfg);

        let moved = frame_with_block(50, 300, 200, 50);
        let det = detect(&moved, Some(&baseline.reference), &cfg);

        assert!(det.motion);
        assert_ne!(det.annotated, moved.image, "boxes must be drawn");
        // Label lands in the top-left corner, which is background in the input
        let labeled = (10..60).any(|x| det.annotated.get_pixel(x, 12).0 == [255, 255, 255]);
        assert!(labeled, "label missing from annotated frame");
        // Input frame itself is never mutated
        assert_eq!(moved.image.get_pixel(0, 0).0, [50, 50, 50]);
    }

    // ========== Reference policies ==========

    #[test]
    fn rolling_policy_replaces_reference_each_pass() {
        let cfg = MotionConfig {
            policy: ReferencePolicy::RollingPrevious,
            ..MotionConfig::default()
        };
        let first = detect(&solid_frame(50), None, &cfg);
        let second = detect(&solid_frame(200), Some(&first.reference), &cfg);

        // Reference now tracks the newest frame
        assert_eq!(second.reference.get_pixel(100, 100)[0], 200);

        // So a third frame identical to the second is quiet again
        let third = detect(&solid_frame(200), Some(&second.reference), &cfg);
        assert!(!third.motion);
    }

    #[test]
    fn static_policy_keeps_the_original_baseline() {
        let cfg = MotionConfig {
            policy: ReferencePolicy::StaticBackground,
            ..MotionConfig::default()
        };
        let first = detect(&solid_frame(50), None, &cfg);
        let second = detect(&solid_frame(200), Some(&first.reference), &cfg);

        // Baseline unchanged: still the first frame
        assert_eq!(second.reference.get_pixel(100, 100)[0], 50);

        // Any frame deviating from the fixed baseline keeps tripping
        let third = detect(&solid_frame(200), Some(&second.reference), &cfg);
        assert!(third.motion);
    }

    #[test]
    fn reference_policy_parse() {
        assert_eq!(
            ReferencePolicy::parse("static"),
            Some(ReferencePolicy::StaticBackground)
        );
        assert_eq!(
            ReferencePolicy::parse("rolling"),
            Some(ReferencePolicy::RollingPrevious)
        );
        assert_eq!(ReferencePolicy::parse("other"), None);
    }
}
