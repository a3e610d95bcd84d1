//! Residual edges.

use nalgebra::DVector;
use tagcal_core::{Iso3, Pt3, Real, Vec2};

use crate::node::Node;

/// A residual block connecting one or more graph nodes.
pub trait GraphEdge {
    /// Indices of the nodes this edge constrains, in Jacobian-block order.
    fn node_indices(&self) -> &[usize];

    /// Residual dimension of this edge.
    fn dimension(&self) -> usize;

    /// Evaluate the residual at the given node states.
    fn residual(&self, nodes: &[Node]) -> DVector<Real>;

    /// Scalar weight applied (as `sqrt(w)`) to every row of this edge.
    fn weight(&self) -> Real {
        1.0
    }

    /// Re-point every reference to node `from` at node `to`.
    ///
    /// Used when two subsystems merge and duplicate pose recordings collapse
    /// onto one live node; the graph stays append-only, only the reference
    /// is rewritten.
    fn remap_node(&mut self, from: usize, to: usize) {
        let _ = (from, to);
    }
}

/// Tag-reprojection residual for one camera frame of one mosaic placement.
///
/// Connects one intrinsics node, optionally one camera extrinsics node, and
/// one mosaic extrinsics node. When the camera extrinsics index is absent the
/// camera *is* the root frame of its subsystem; that convention also pins the
/// gauge of each subsystem. Residual is `observed − predicted` per pixel
/// coordinate, 2 rows per correspondence.
#[derive(Debug, Clone)]
pub struct ReprojectionEdge {
    intrinsics: usize,
    camera_extrinsics: Option<usize>,
    mosaic_extrinsics: usize,
    correspondences: Vec<(Pt3, Vec2)>,
    indices: Vec<usize>,
    weight: Real,
}

impl ReprojectionEdge {
    /// # Panics
    ///
    /// Panics if `correspondences` is empty; an edge with no observations
    /// cannot constrain anything and indicates a builder bug.
    pub fn new(
        intrinsics: usize,
        camera_extrinsics: Option<usize>,
        mosaic_extrinsics: usize,
        correspondences: Vec<(Pt3, Vec2)>,
    ) -> Self {
        assert!(
            !correspondences.is_empty(),
            "reprojection edge needs at least one correspondence"
        );
        let mut indices = vec![intrinsics];
        if let Some(cam) = camera_extrinsics {
            indices.push(cam);
        }
        indices.push(mosaic_extrinsics);

        Self {
            intrinsics,
            camera_extrinsics,
            mosaic_extrinsics,
            correspondences,
            indices,
            weight: 1.0,
        }
    }

    pub fn with_weight(mut self, weight: Real) -> Self {
        assert!(weight >= 0.0, "edge weight must be non-negative");
        self.weight = weight;
        self
    }

    pub fn correspondence_count(&self) -> usize {
        self.correspondences.len()
    }

    /// Mosaic-frame → camera-frame transform at the given node states.
    fn camera_from_mosaic(&self, nodes: &[Node]) -> Iso3 {
        let mosaic_to_root = nodes[self.mosaic_extrinsics]
            .as_extrinsics()
            .expect("mosaic index must reference an extrinsics node")
            .to_iso3();
        match self.camera_extrinsics {
            Some(cam) => {
                let cam_to_root = nodes[cam]
                    .as_extrinsics()
                    .expect("camera index must reference an extrinsics node")
                    .to_iso3();
                cam_to_root.inverse() * mosaic_to_root
            }
            None => mosaic_to_root,
        }
    }
}

impl GraphEdge for ReprojectionEdge {
    fn node_indices(&self) -> &[usize] {
        &self.indices
    }

    fn dimension(&self) -> usize {
        2 * self.correspondences.len()
    }

    fn residual(&self, nodes: &[Node]) -> DVector<Real> {
        let model = nodes[self.intrinsics]
            .as_intrinsics()
            .expect("intrinsics index must reference an intrinsics node");
        let cam_from_mosaic = self.camera_from_mosaic(nodes);

        let mut r = DVector::zeros(self.dimension());
        for (i, (pw, uv)) in self.correspondences.iter().enumerate() {
            let pc = cam_from_mosaic.transform_point(pw);
            let predicted = model.project(&pc);
            r[2 * i] = uv.x - predicted.x;
            r[2 * i + 1] = uv.y - predicted.y;
        }
        r
    }

    fn weight(&self) -> Real {
        self.weight
    }

    fn remap_node(&mut self, from: usize, to: usize) {
        if self.intrinsics == from {
            self.intrinsics = to;
        }
        if self.camera_extrinsics == Some(from) {
            self.camera_extrinsics = Some(to);
        }
        if self.mosaic_extrinsics == from {
            self.mosaic_extrinsics = to;
        }
        self.indices = {
            let mut indices = vec![self.intrinsics];
            if let Some(cam) = self.camera_extrinsics {
                indices.push(cam);
            }
            indices.push(self.mosaic_extrinsics);
            indices
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagcal_core::{CameraIntrinsics, CameraModel, DistortionModel, PoseXyzRpy};

    fn make_nodes(pose: PoseXyzRpy) -> Vec<Node> {
        let model = CameraModel::new(
            CameraIntrinsics::new(800.0, 800.0, 320.0, 240.0),
            DistortionModel::NoDistortion,
            640,
            480,
        );
        vec![Node::intrinsics(model), Node::extrinsics(pose)]
    }

    #[test]
    fn residual_vanishes_at_ground_truth() {
        let pose = PoseXyzRpy::new(0.05, -0.02, 1.0, 0.1, -0.05, 0.02);
        let nodes = make_nodes(pose);
        let model = nodes[0].as_intrinsics().unwrap().clone();

        let points = [
            Pt3::new(0.0, 0.0, 0.0),
            Pt3::new(0.1, 0.0, 0.0),
            Pt3::new(0.1, 0.1, 0.0),
            Pt3::new(0.0, 0.1, 0.0),
        ];
        let iso = pose.to_iso3();
        let correspondences: Vec<(Pt3, Vec2)> = points
            .iter()
            .map(|pw| (*pw, model.project(&iso.transform_point(pw))))
            .collect();

        let edge = ReprojectionEdge::new(0, None, 1, correspondences);
        assert_eq!(edge.dimension(), 8);
        let r = edge.residual(&nodes);
        assert!(r.norm() < 1e-10, "residual at ground truth: {}", r.norm());
    }

    #[test]
    fn residual_grows_with_pose_error() {
        let pose = PoseXyzRpy::new(0.0, 0.0, 1.0, 0.0, 0.0, 0.0);
        let nodes = make_nodes(pose);
        let model = nodes[0].as_intrinsics().unwrap().clone();

        let pw = Pt3::new(0.05, 0.05, 0.0);
        let uv = model.project(&pose.to_iso3().transform_point(&pw));
        let edge = ReprojectionEdge::new(0, None, 1, vec![(pw, uv)]);

        let mut off_nodes = make_nodes(PoseXyzRpy::new(0.01, 0.0, 1.0, 0.0, 0.0, 0.0));
        let r = edge.residual(&off_nodes);
        assert!(r.norm() > 1.0, "expected a visible residual, got {}", r.norm());
        // and fixing the pose brings it back to zero
        off_nodes[1].set_params(&pose.to_dvec());
        assert!(edge.residual(&off_nodes).norm() < 1e-10);
    }

    #[test]
    fn camera_extrinsics_chain_is_applied() {
        // camera shifted +0.2 in x relative to root; mosaic at root origin
        let cam_pose = PoseXyzRpy::new(0.2, 0.0, 0.0, 0.0, 0.0, 0.0);
        let mosaic_pose = PoseXyzRpy::new(0.0, 0.0, 1.0, 0.0, 0.0, 0.0);

        let model = CameraModel::new(
            CameraIntrinsics::new(800.0, 800.0, 320.0, 240.0),
            DistortionModel::NoDistortion,
            640,
            480,
        );
        let nodes = vec![
            Node::intrinsics(model.clone()),
            Node::extrinsics(cam_pose),
            Node::extrinsics(mosaic_pose),
        ];

        let pw = Pt3::new(0.0, 0.0, 0.0);
        let expected_pc = cam_pose.to_iso3().inverse() * mosaic_pose.to_iso3().transform_point(&pw);
        let uv = model.project(&expected_pc);

        let edge = ReprojectionEdge::new(0, Some(1), 2, vec![(pw, uv)]);
        assert!(edge.residual(&nodes).norm() < 1e-10);
    }
}
