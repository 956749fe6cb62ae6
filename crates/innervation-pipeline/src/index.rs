//! Innervation index: share of ROI pixels at or above the cutoff.

use image::GrayImage;
use rayon::prelude::*;

use crate::roi::RoiMask;
use crate::threshold::check_dimensions;
use crate::types::{IndexResult, PipelineError};

/// Count ROI pixels and those with value `>= threshold`.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyRoi`] when the mask selects no pixels,
/// [`PipelineError::DimensionMismatch`] for mismatched sizes, and
/// [`PipelineError::InvalidThreshold`] for a non-finite cutoff.
#[allow(clippy::cast_precision_loss)]
pub fn compute_index(
    buffer: &GrayImage,
    mask: &RoiMask,
    threshold: f64,
) -> Result<IndexResult, PipelineError> {
    check_dimensions(buffer, mask)?;
    if !threshold.is_finite() {
        return Err(PipelineError::InvalidThreshold(threshold));
    }
    if mask.is_empty() {
        return Err(PipelineError::EmptyRoi);
    }

    let (roi, above) = buffer
        .as_raw()
        .par_iter()
        .zip(mask.as_slice().par_iter())
        .filter(|&(_, &inside)| inside)
        .map(|(&v, _)| (1u64, u64::from(f64::from(v) >= threshold)))
        .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1 + b.1));

    let index_percent = above as f64 / roi as f64 * 100.0;
    log::debug!("index {above}/{roi} = {index_percent:.6}%");
    Ok(IndexResult {
        roi_pixel_count: roi,
        above_threshold_count: above,
        index_percent,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::normalize::percentile_stretch;
    use crate::roi::RoiPolygon;
    use crate::threshold::resolve;
    use crate::types::{Dimensions, ImageFrame, NormalizationParams, Point, ThresholdMode};

    fn dims_of(img: &GrayImage) -> Dimensions {
        Dimensions {
            width: img.width(),
            height: img.height(),
        }
    }

    /// 4x4 image of 50 with a bright 2x2 block of 250 in the corner.
    fn block_image() -> GrayImage {
        GrayImage::from_fn(4, 4, |x, y| image::Luma([if x < 2 && y < 2 { 250 } else { 50 }]))
    }

    #[test]
    fn counts_pixels_at_or_above_cutoff() {
        let img = GrayImage::from_fn(4, 1, |x, _| image::Luma([[10, 99, 100, 200][x as usize]]));
        let mask = RoiMask::full(dims_of(&img));
        let result = compute_index(&img, &mask, 100.0).unwrap();
        assert_eq!(result.roi_pixel_count, 4);
        assert_eq!(result.above_threshold_count, 2);
        assert!((result.index_percent - 50.0).abs() < 1e-12);
    }

    #[test]
    fn index_stays_in_percent_range() {
        let img = GrayImage::from_fn(13, 7, |x, y| image::Luma([((x * 31 + y * 17) % 256) as u8]));
        let mask = RoiMask::full(dims_of(&img));
        for cutoff in [0.0, 1.0, 63.5, 128.0, 254.0, 255.0] {
            let r = compute_index(&img, &mask, cutoff).unwrap();
            assert!(r.above_threshold_count <= r.roi_pixel_count);
            assert!((0.0..=100.0).contains(&r.index_percent));
        }
        let all = compute_index(&img, &mask, 0.0).unwrap();
        assert!((all.index_percent - 100.0).abs() < 1e-12);
    }

    #[test]
    fn only_roi_pixels_count() {
        let img = block_image();
        let mask = RoiPolygon::new(vec![
            Point::new(2.0, 0.0),
            Point::new(4.0, 0.0),
            Point::new(4.0, 4.0),
            Point::new(2.0, 4.0),
        ])
        .unwrap()
        .rasterize(dims_of(&img));
        let result = compute_index(&img, &mask, 150.0).unwrap();
        assert_eq!(result.roi_pixel_count, 8);
        assert_eq!(result.above_threshold_count, 0);
        assert!(result.index_percent.abs() < f64::EPSILON);
    }

    #[test]
    fn empty_mask_is_an_error() {
        let img = block_image();
        let mask = RoiPolygon::new(vec![
            Point::new(-5.0, -5.0),
            Point::new(-1.0, -5.0),
            Point::new(-1.0, -1.0),
        ])
        .unwrap()
        .rasterize(dims_of(&img));
        assert!(matches!(
            compute_index(&img, &mask, 10.0),
            Err(PipelineError::EmptyRoi)
        ));
    }

    #[test]
    fn mismatched_sizes_rejected() {
        let img = block_image();
        let mask = RoiMask::full(Dimensions {
            width: 4,
            height: 5,
        });
        assert!(matches!(
            compute_index(&img, &mask, 10.0),
            Err(PipelineError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn block_image_end_to_end_is_a_quarter() {
        let frame = ImageFrame::from_gray8(&block_image());
        let (normalized, _) = percentile_stretch(&frame, &NormalizationParams::default()).unwrap();
        let mask = RoiPolygon::full_image(frame.dimensions()).rasterize(frame.dimensions());

        for mode in [ThresholdMode::Automatic, ThresholdMode::Manual(150.0)] {
            let threshold = resolve(mode, &normalized, &mask).unwrap();
            let result = compute_index(&normalized, &mask, threshold.value).unwrap();
            assert_eq!(result.roi_pixel_count, 16);
            assert_eq!(result.above_threshold_count, 4);
            assert!((result.index_percent - 25.0).abs() < 1e-12, "{mode:?}");
        }
    }
}
