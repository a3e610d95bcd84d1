//! Detector observation types.
//!
//! Tag detections are produced by an external detector and consumed as-is;
//! the calibration core never touches raw pixels. An [`ImageSet`] is one
//! synchronized capture across all cameras.

use std::collections::BTreeMap;

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use crate::{Pt2, Pt3, TagMosaic, Vec2};

/// A single detected tag: id plus pixel corner quad and center.
///
/// Immutable once produced by the detector. Corner order is
/// `(-,-), (+,-), (+,+), (-,+)` relative to the tag's own frame, matching
/// [`TagMosaic::corners`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TagObservation {
    pub id: u32,
    pub center: Pt2,
    pub corners: [Pt2; 4],
}

/// All tag detections of one camera in one captured image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    pub observations: Vec<TagObservation>,
}

impl CameraFrame {
    pub fn new(width: u32, height: u32, observations: Vec<TagObservation>) -> Result<Self> {
        ensure!(width > 0 && height > 0, "image size must be non-zero");
        Ok(Self {
            width,
            height,
            observations,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Whether this frame carries enough structure to constrain a calibration
    /// step: at least `min_tags` detections spanning at least two distinct
    /// mosaic rows **and** two distinct columns. A single row or column of
    /// tags cannot constrain both focal axes.
    pub fn spans_mosaic(&self, mosaic: &TagMosaic, min_tags: usize) -> bool {
        if self.observations.len() < min_tags {
            return false;
        }
        let mut rows = std::collections::BTreeSet::new();
        let mut cols = std::collections::BTreeSet::new();
        for obs in &self.observations {
            rows.insert(mosaic.row(obs.id));
            cols.insert(mosaic.col(obs.id));
        }
        rows.len() >= 2 && cols.len() >= 2
    }

    /// 3D/2D correspondences for this frame: tag center plus the four
    /// corners, in detection order. The 3D side lives on the mosaic plane.
    pub fn correspondences(&self, mosaic: &TagMosaic) -> Vec<(Pt3, Vec2)> {
        let mut out = Vec::with_capacity(self.observations.len() * 5);
        for obs in &self.observations {
            out.push((mosaic.center(obs.id), obs.center.coords));
            for (pw, px) in mosaic.corners(obs.id).iter().zip(obs.corners.iter()) {
                out.push((*pw, px.coords));
            }
        }
        out
    }

    /// Planar (Z dropped) correspondences, as consumed by homography
    /// estimation.
    pub fn planar_correspondences(&self, mosaic: &TagMosaic) -> (Vec<Pt2>, Vec<Pt2>) {
        let pairs = self.correspondences(mosaic);
        let world = pairs.iter().map(|(pw, _)| Pt2::new(pw.x, pw.y)).collect();
        let image = pairs.iter().map(|(_, px)| Pt2::new(px.x, px.y)).collect();
        (world, image)
    }
}

/// One synchronized capture: camera index → that camera's frame.
///
/// Cameras absent from a capture simply have no entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageSet {
    pub frames: BTreeMap<usize, CameraFrame>,
}

impl ImageSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, camera: usize, frame: CameraFrame) {
        self.frames.insert(camera, frame);
    }

    pub fn frame(&self, camera: usize) -> Option<&CameraFrame> {
        self.frames.get(&camera)
    }

    pub fn cameras(&self) -> impl Iterator<Item = usize> + '_ {
        self.frames.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(id: u32) -> TagObservation {
        let c = Pt2::new(id as f64 * 10.0, id as f64 * 5.0);
        TagObservation {
            id,
            center: c,
            corners: [
                Pt2::new(c.x - 1.0, c.y - 1.0),
                Pt2::new(c.x + 1.0, c.y - 1.0),
                Pt2::new(c.x + 1.0, c.y + 1.0),
                Pt2::new(c.x - 1.0, c.y + 1.0),
            ],
        }
    }

    #[test]
    fn spans_mosaic_requires_count_and_spread() {
        let mosaic = TagMosaic::new(6, 0.1, 0.08);

        // ids 0..7 cover rows 0-1 and cols 0-5
        let spread = CameraFrame::new(640, 480, (0..8).map(obs).collect()).unwrap();
        assert!(spread.spans_mosaic(&mosaic, 8));

        // too few detections
        let few = CameraFrame::new(640, 480, (0..3).map(obs).collect()).unwrap();
        assert!(!few.spans_mosaic(&mosaic, 8));

        // 8 tags but all in row 0 (ids 0..6 wrap at width 12)
        let wide = TagMosaic::new(12, 0.1, 0.08);
        let single_row = CameraFrame::new(640, 480, (0..8).map(obs).collect()).unwrap();
        assert!(!single_row.spans_mosaic(&wide, 8));
    }

    #[test]
    fn correspondences_are_five_per_tag() {
        let mosaic = TagMosaic::new(6, 0.1, 0.08);
        let frame = CameraFrame::new(640, 480, vec![obs(0), obs(7)]).unwrap();
        let pairs = frame.correspondences(&mosaic);
        assert_eq!(pairs.len(), 10);
        // first pair of each tag is the center
        assert_eq!(pairs[0].0, mosaic.center(0));
        assert_eq!(pairs[5].0, mosaic.center(7));
    }

    #[test]
    fn image_set_lookup() {
        let mut set = ImageSet::new();
        set.insert(2, CameraFrame::new(640, 480, vec![obs(0)]).unwrap());
        assert!(set.frame(2).is_some());
        assert!(set.frame(0).is_none());
        assert_eq!(set.cameras().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn serde_round_trip() {
        let mut set = ImageSet::new();
        set.insert(0, CameraFrame::new(640, 480, vec![obs(3)]).unwrap());
        let json = serde_json::to_string(&set).unwrap();
        let restored: ImageSet = serde_json::from_str(&json).unwrap();
        assert_eq!(set, restored);
    }
}
