//! Threshold preview: the working buffer with counted pixels in red.
//!
//! ROI pixels at or above the cutoff are painted [`ABOVE_COLOR`]; the
//! rest of the image stays grayscale. The ROI outline is drawn on top in
//! [`OUTLINE_COLOR`].

use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;

use crate::roi::{RoiMask, RoiPolygon};
use crate::threshold::check_dimensions;
use crate::types::PipelineError;

/// Fill color for counted pixels.
pub const ABOVE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Stroke color for the ROI outline.
pub const OUTLINE_COLOR: Rgb<u8> = Rgb([255, 255, 0]);

/// Render the preview for one image.
///
/// `polygon` is optional so a preview can be shown before the ROI is
/// frozen; without it no outline is drawn.
///
/// # Errors
///
/// Returns [`PipelineError::DimensionMismatch`] if the buffer and mask
/// sizes differ.
#[allow(clippy::cast_possible_truncation)]
pub fn render_overlay(
    buffer: &GrayImage,
    mask: &RoiMask,
    threshold: f64,
    polygon: Option<&RoiPolygon>,
) -> Result<RgbImage, PipelineError> {
    check_dimensions(buffer, mask)?;

    let mut canvas = RgbImage::from_fn(buffer.width(), buffer.height(), |x, y| {
        let v = buffer.get_pixel(x, y).0[0];
        if mask.contains(x, y) && f64::from(v) >= threshold {
            ABOVE_COLOR
        } else {
            Rgb([v, v, v])
        }
    });

    if let Some(polygon) = polygon {
        for (a, b) in polygon.edges() {
            draw_line_segment_mut(
                &mut canvas,
                (a.x as f32, a.y as f32),
                (b.x as f32, b.y as f32),
                OUTLINE_COLOR,
            );
        }
    }
    Ok(canvas)
}
