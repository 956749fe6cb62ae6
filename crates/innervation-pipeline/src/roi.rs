//! Polygonal region of interest and its pixel mask.
//!
//! A [`RoiDraft`] collects vertices while the user draws. Finishing the
//! draft closes the outline (last vertex back to the first) and freezes
//! it into a [`RoiPolygon`], which can then be rasterized into a
//! [`RoiMask`] matching the image size.
//!
//! Rasterization uses the even-odd rule, evaluated per scanline at pixel
//! centers `(x + 0.5, y + 0.5)`. For each row the x-intersections of the
//! centre line with every edge are sorted, and pixels whose centres fall
//! in `[x0, x1)`, `[x2, x3)`, ... are inside. Edges are half-open in y so
//! a vertex shared by two edges is counted once. Self-intersecting
//! outlines are accepted and follow the same rule.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, PipelineError, Point};

/// Smallest vertex count that encloses an area.
pub const MIN_VERTICES: usize = 3;

/// An outline being drawn. Vertices can be appended until it is
/// finished.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoiDraft {
    vertices: Vec<Point>,
}

impl RoiDraft {
    /// Start an empty outline.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            vertices: Vec::new(),
        }
    }

    /// Append a vertex in image pixel coordinates.
    ///
    /// Vertices outside the image are allowed; they are clipped during
    /// rasterization.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidVertex`] for NaN or infinite
    /// coordinates, leaving the draft unchanged.
    pub fn add_vertex(&mut self, point: Point) -> Result<(), PipelineError> {
        if !point.is_finite() {
            return Err(PipelineError::InvalidVertex {
                x: point.x,
                y: point.y,
            });
        }
        self.vertices.push(point);
        Ok(())
    }

    /// Vertices collected so far.
    #[must_use]
    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    /// Close and freeze the outline.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InsufficientVertices`] with fewer than
    /// [`MIN_VERTICES`] vertices. The draft is left untouched so drawing
    /// can continue.
    pub fn finish(&self) -> Result<RoiPolygon, PipelineError> {
        RoiPolygon::new(self.vertices.clone())
    }
}

/// A closed, frozen outline with at least three vertices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoiPolygon {
    vertices: Vec<Point>,
}

impl RoiPolygon {
    /// Freeze a vertex list into a polygon.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InsufficientVertices`] for fewer than
    /// three vertices and [`PipelineError::InvalidVertex`] for a
    /// non-finite coordinate.
    pub fn new(vertices: Vec<Point>) -> Result<Self, PipelineError> {
        if vertices.len() < MIN_VERTICES {
            return Err(PipelineError::InsufficientVertices {
                count: vertices.len(),
            });
        }
        if let Some(bad) = vertices.iter().find(|p| !p.is_finite()) {
            return Err(PipelineError::InvalidVertex { x: bad.x, y: bad.y });
        }
        Ok(Self { vertices })
    }

    /// Axis-aligned rectangle covering `dimensions` exactly.
    #[must_use]
    pub fn full_image(dimensions: Dimensions) -> Self {
        let w = f64::from(dimensions.width);
        let h = f64::from(dimensions.height);
        Self {
            vertices: vec![
                Point::new(0.0, 0.0),
                Point::new(w, 0.0),
                Point::new(w, h),
                Point::new(0.0, h),
            ],
        }
    }

    /// The outline's vertices, in drawing order.
    #[must_use]
    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    /// Closed edges, including the implicit last-to-first edge.
    pub fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        self.vertices
            .iter()
            .zip(self.vertices.iter().cycle().skip(1))
            .map(|(&a, &b)| (a, b))
    }

    /// Rasterize into a mask of the given size.
    #[must_use]
    pub fn rasterize(&self, dimensions: Dimensions) -> RoiMask {
        rasterize(self, dimensions)
    }
}

/// Boolean membership grid derived from a [`RoiPolygon`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoiMask {
    dimensions: Dimensions,
    bits: Vec<bool>,
    pixel_count: u64,
}

impl RoiMask {
    /// Mask with every pixel selected.
    #[must_use]
    pub fn full(dimensions: Dimensions) -> Self {
        let n = dimensions.pixel_count();
        Self {
            dimensions,
            bits: vec![true; n],
            pixel_count: n as u64,
        }
    }

    /// Mask dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Row-major membership flags.
    #[must_use]
    pub fn as_slice(&self) -> &[bool] {
        &self.bits
    }

    /// Number of selected pixels.
    #[must_use]
    pub const fn pixel_count(&self) -> u64 {
        self.pixel_count
    }

    /// Whether no pixel is selected.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.pixel_count == 0
    }

    /// Whether pixel `(x, y)` is selected. Out-of-range pixels are not.
    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.dimensions.width
            && y < self.dimensions.height
            && self.bits[y as usize * self.dimensions.width as usize + x as usize]
    }
}

/// Even-odd scanline fill of `polygon` onto a `dimensions`-sized grid.
#[must_use]
pub fn rasterize(polygon: &RoiPolygon, dimensions: Dimensions) -> RoiMask {
    let width = dimensions.width as usize;
    let mut bits = vec![false; dimensions.pixel_count()];
    if width == 0 {
        return RoiMask {
            dimensions,
            bits,
            pixel_count: 0,
        };
    }

    bits.par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| fill_row(polygon, y, row));

    let pixel_count = bits.iter().filter(|&&b| b).count() as u64;
    log::debug!(
        "rasterized {}-vertex ROI into {} of {} pixels",
        polygon.vertices().len(),
        pixel_count,
        dimensions.pixel_count(),
    );
    RoiMask {
        dimensions,
        bits,
        pixel_count,
    }
}

/// Mark the inside spans of one scanline.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn fill_row(polygon: &RoiPolygon, y: usize, row: &mut [bool]) {
    let yc = y as f64 + 0.5;
    let mut crossings: Vec<f64> = polygon
        .edges()
        .filter(|(a, b)| (a.y > yc) != (b.y > yc))
        .map(|(a, b)| (yc - a.y).mul_add((b.x - a.x) / (b.y - a.y), a.x))
        .collect();
    crossings.sort_by(f64::total_cmp);

    let width = row.len() as f64;
    for span in crossings.chunks_exact(2) {
        // Pixel x is inside when span[0] <= x + 0.5 < span[1].
        let start = (span[0] - 0.5).ceil().clamp(0.0, width) as usize;
        let end = (span[1] - 0.5).ceil().clamp(0.0, width) as usize;
        if start < end {
            row[start..end].fill(true);
        }
    }
}
