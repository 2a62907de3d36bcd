//! Diagnostic overlay raster.
//!
//! Draws the located fiducials over a greyscale copy of the scan: found
//! marks are circled in green with a cross on the measured centre,
//! missing marks get a red X at the site where they were expected.

use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_cross_mut, draw_hollow_circle_mut, draw_line_segment_mut};
use panfid_pipeline::{FiducialStatus, LocateResult};

/// Colour for found marks.
pub const FOUND_COLOR: Rgb<u8> = Rgb([0, 220, 0]);

/// Colour for missing marks.
pub const MISSING_COLOR: Rgb<u8> = Rgb([230, 0, 0]);

/// Render `result` over `scan`.
///
/// `radius` is the circle radius (and half the X size) in pixels.
/// Fiducial coordinates are 1-based, so pixel `(x, y)` of the overlay
/// shows image position `(x + 1, y + 1)`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn to_overlay(scan: &GrayImage, result: &LocateResult, radius: u32) -> RgbImage {
    let mut canvas = RgbImage::from_fn(scan.width(), scan.height(), |x, y| {
        let v = scan.get_pixel(x, y).0[0];
        Rgb([v, v, v])
    });
    let r = i32::try_from(radius).unwrap_or(i32::MAX);
    let rf = radius as f32;

    for f in &result.fiducials {
        let x = (f.sample - 1.0) as f32;
        let y = (f.line - 1.0) as f32;
        match f.status {
            FiducialStatus::Found => {
                let (cx, cy) = (x.round() as i32, y.round() as i32);
                draw_hollow_circle_mut(&mut canvas, (cx, cy), r, FOUND_COLOR);
                draw_cross_mut(&mut canvas, FOUND_COLOR, cx, cy);
            }
            FiducialStatus::Missing => {
                draw_line_segment_mut(
                    &mut canvas,
                    (x - rf, y - rf),
                    (x + rf, y + rf),
                    MISSING_COLOR,
                );
                draw_line_segment_mut(
                    &mut canvas,
                    (x - rf, y + rf),
                    (x + rf, y - rf),
                    MISSING_COLOR,
                );
            }
        }
    }
    canvas
}
