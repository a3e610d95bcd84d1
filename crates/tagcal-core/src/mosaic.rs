//! Tag-mosaic grid geometry.
//!
//! The calibration target is a planar, row-major grid of fiducial tags with a
//! fixed physical spacing. The id → grid-cell → metric-position convention is
//! load-bearing: persisted calibrations assume it, so it must not change.

use serde::{Deserialize, Serialize};

use crate::{Pt2, Pt3, Real};

/// A planar grid of fiducial tags used as the calibration target.
///
/// Tag ids map to grid cells row-major: `row = id / width`,
/// `col = id % width`; a cell's metric center is
/// `(col * spacing, row * spacing, 0)` in the mosaic frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TagMosaic {
    /// Number of tags per mosaic row.
    pub width: u32,
    /// Center-to-center tag spacing in meters.
    pub spacing: Real,
    /// Physical edge length of a single tag in meters.
    pub tag_size: Real,
}

impl TagMosaic {
    /// # Panics
    ///
    /// Panics if `width` is zero or the physical dimensions are non-positive.
    pub fn new(width: u32, spacing: Real, tag_size: Real) -> Self {
        assert!(width > 0, "mosaic width must be positive");
        assert!(
            spacing > 0.0 && tag_size > 0.0,
            "mosaic dimensions must be positive"
        );
        Self {
            width,
            spacing,
            tag_size,
        }
    }

    #[inline]
    pub fn row(&self, id: u32) -> u32 {
        id / self.width
    }

    #[inline]
    pub fn col(&self, id: u32) -> u32 {
        id % self.width
    }

    /// Metric center of a tag in the mosaic frame (Z = 0 plane).
    pub fn center(&self, id: u32) -> Pt3 {
        Pt3::new(
            self.col(id) as Real * self.spacing,
            self.row(id) as Real * self.spacing,
            0.0,
        )
    }

    /// 2D center of a tag on the mosaic plane.
    pub fn center_2d(&self, id: u32) -> Pt2 {
        let c = self.center(id);
        Pt2::new(c.x, c.y)
    }

    /// Metric corner positions of a tag, ordered `(-,-), (+,-), (+,+), (-,+)`
    /// relative to the tag center (matches detector corner order).
    pub fn corners(&self, id: u32) -> [Pt3; 4] {
        let c = self.center(id);
        let h = self.tag_size * 0.5;
        [
            Pt3::new(c.x - h, c.y - h, 0.0),
            Pt3::new(c.x + h, c.y - h, 0.0),
            Pt3::new(c.x + h, c.y + h, 0.0),
            Pt3::new(c.x - h, c.y + h, 0.0),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_major_indexing() {
        let mosaic = TagMosaic::new(6, 0.1, 0.08);
        assert_eq!(mosaic.row(0), 0);
        assert_eq!(mosaic.col(0), 0);
        assert_eq!(mosaic.row(5), 0);
        assert_eq!(mosaic.col(5), 5);
        assert_eq!(mosaic.row(6), 1);
        assert_eq!(mosaic.col(6), 0);
        assert_eq!(mosaic.row(13), 2);
        assert_eq!(mosaic.col(13), 1);
    }

    #[test]
    fn metric_positions() {
        let mosaic = TagMosaic::new(6, 0.1, 0.08);
        let c = mosaic.center(7); // row 1, col 1
        assert!((c.x - 0.1).abs() < 1e-12);
        assert!((c.y - 0.1).abs() < 1e-12);
        assert_eq!(c.z, 0.0);
    }

    #[test]
    fn corner_order_and_size() {
        let mosaic = TagMosaic::new(4, 0.1, 0.06);
        let corners = mosaic.corners(0);
        assert!((corners[0].x - (-0.03)).abs() < 1e-12);
        assert!((corners[0].y - (-0.03)).abs() < 1e-12);
        assert!((corners[2].x - 0.03).abs() < 1e-12);
        assert!((corners[2].y - 0.03).abs() < 1e-12);
        // opposite corners span the tag diagonal
        let diag = (corners[2] - corners[0]).norm();
        assert!((diag - 0.06 * (2.0_f64).sqrt()).abs() < 1e-12);
    }
}
