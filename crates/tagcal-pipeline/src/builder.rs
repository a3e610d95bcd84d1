//! Calibration graph builder.
//!
//! Thin bookkeeping layer between the bootstrap logic and the factor graph:
//! it owns the [`Graph`] plus the index maps from cameras and (image set,
//! root) pairs to their node indices, and assembles reprojection edges from
//! detector frames.

use std::collections::BTreeMap;

use tagcal_core::{CameraFrame, CameraModel, PoseXyzRpy, TagMosaic};
use tagcal_graph::{Graph, Node, ReprojectionEdge};

/// Owns the factor graph and its node registries.
pub struct GraphBuilder {
    graph: Graph,
    mosaic: TagMosaic,
    intrinsics_nodes: BTreeMap<usize, usize>,
    camera_extrinsics_nodes: BTreeMap<usize, usize>,
    mosaic_extrinsics_nodes: BTreeMap<(usize, usize), usize>,
}

impl GraphBuilder {
    pub fn new(mosaic: TagMosaic) -> Self {
        Self {
            graph: Graph::new(),
            mosaic,
            intrinsics_nodes: BTreeMap::new(),
            camera_extrinsics_nodes: BTreeMap::new(),
            mosaic_extrinsics_nodes: BTreeMap::new(),
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn mosaic(&self) -> &TagMosaic {
        &self.mosaic
    }

    /// Create the intrinsics node for a camera.
    ///
    /// # Panics
    ///
    /// Panics if the camera already has an intrinsics node; intrinsics are
    /// initialized once and afterwards only re-seeded in place.
    pub fn add_camera_intrinsics(&mut self, camera: usize, model: CameraModel) -> usize {
        assert!(
            !self.intrinsics_nodes.contains_key(&camera),
            "camera {} already has an intrinsics node",
            camera
        );
        let idx = self.graph.add_node(Node::intrinsics(model));
        self.intrinsics_nodes.insert(camera, idx);
        idx
    }

    pub fn intrinsics_node(&self, camera: usize) -> Option<usize> {
        self.intrinsics_nodes.get(&camera).copied()
    }

    /// Current camera model of an initialized camera.
    pub fn camera_model(&self, camera: usize) -> Option<&CameraModel> {
        self.intrinsics_node(camera)
            .and_then(|idx| self.graph.node(idx).as_intrinsics())
    }

    /// Re-seed a camera's intrinsics state in place.
    pub fn set_camera_model(&mut self, camera: usize, model: &CameraModel) {
        let idx = self.intrinsics_nodes[&camera];
        self.graph.node_mut(idx).set_params(&model.param_vector());
    }

    /// Create the camera-to-root extrinsics node for a camera.
    pub fn add_camera_extrinsics(&mut self, camera: usize, pose: PoseXyzRpy) -> usize {
        assert!(
            !self.camera_extrinsics_nodes.contains_key(&camera),
            "camera {} already has an extrinsics node",
            camera
        );
        let idx = self.graph.add_node(Node::extrinsics(pose));
        self.camera_extrinsics_nodes.insert(camera, idx);
        idx
    }

    pub fn camera_extrinsics_node(&self, camera: usize) -> Option<usize> {
        self.camera_extrinsics_nodes.get(&camera).copied()
    }

    /// Current camera-to-root transform of an initialized camera.
    pub fn camera_to_root(&self, camera: usize) -> Option<PoseXyzRpy> {
        self.camera_extrinsics_node(camera)
            .and_then(|idx| self.graph.node(idx).as_extrinsics().copied())
    }

    /// Re-seed a camera's extrinsics state in place.
    pub fn set_camera_to_root(&mut self, camera: usize, pose: &PoseXyzRpy) {
        let idx = self.camera_extrinsics_nodes[&camera];
        self.graph.node_mut(idx).set_params(&pose.to_dvec());
    }

    /// Create a mosaic-to-root extrinsics node for one image set under one
    /// root frame.
    pub fn add_mosaic_extrinsics(&mut self, set: usize, root: usize, pose: PoseXyzRpy) -> usize {
        assert!(
            !self.mosaic_extrinsics_nodes.contains_key(&(set, root)),
            "image set {} already has a mosaic node under root {}",
            set,
            root
        );
        let idx = self.graph.add_node(Node::extrinsics(pose));
        self.mosaic_extrinsics_nodes.insert((set, root), idx);
        idx
    }

    pub fn mosaic_extrinsics_node(&self, set: usize, root: usize) -> Option<usize> {
        self.mosaic_extrinsics_nodes.get(&(set, root)).copied()
    }

    /// Current mosaic-to-root transform of a node.
    pub fn node_pose(&self, node: usize) -> PoseXyzRpy {
        *self
            .graph
            .node(node)
            .as_extrinsics()
            .expect("node must be an extrinsics node")
    }

    /// Re-seed any extrinsics node in place.
    pub fn set_node_pose(&mut self, node: usize, pose: &PoseXyzRpy) {
        self.graph.node_mut(node).set_params(&pose.to_dvec());
    }

    /// Add the reprojection edge tying one camera frame to a mosaic node.
    pub fn add_reprojection_edge(
        &mut self,
        intrinsics_node: usize,
        camera_extrinsics_node: Option<usize>,
        mosaic_node: usize,
        frame: &CameraFrame,
    ) {
        let correspondences = frame.correspondences(&self.mosaic);
        let edge = ReprojectionEdge::new(
            intrinsics_node,
            camera_extrinsics_node,
            mosaic_node,
            correspondences,
        );
        self.graph.add_edge(Box::new(edge));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagcal_core::{CameraIntrinsics, DistortionModel};

    fn test_model() -> CameraModel {
        CameraModel::new(
            CameraIntrinsics::new(800.0, 800.0, 320.0, 240.0),
            DistortionModel::NoDistortion,
            640,
            480,
        )
    }

    #[test]
    fn registers_nodes_by_camera_and_set() {
        let mut builder = GraphBuilder::new(TagMosaic::new(6, 0.1, 0.08));
        let intr = builder.add_camera_intrinsics(0, test_model());
        let extr = builder.add_camera_extrinsics(0, PoseXyzRpy::identity());
        let mosaic = builder.add_mosaic_extrinsics(0, 0, PoseXyzRpy::new(0.0, 0.0, 1.0, 0.0, 0.0, 0.0));

        assert_eq!(builder.intrinsics_node(0), Some(intr));
        assert_eq!(builder.camera_extrinsics_node(0), Some(extr));
        assert_eq!(builder.mosaic_extrinsics_node(0, 0), Some(mosaic));
        assert_eq!(builder.mosaic_extrinsics_node(0, 1), None);
        assert_eq!(builder.graph().num_nodes(), 3);
    }

    #[test]
    #[should_panic(expected = "already has an intrinsics node")]
    fn duplicate_camera_intrinsics_panics() {
        let mut builder = GraphBuilder::new(TagMosaic::new(6, 0.1, 0.08));
        builder.add_camera_intrinsics(0, test_model());
        builder.add_camera_intrinsics(0, test_model());
    }

    #[test]
    fn reseed_updates_node_state() {
        let mut builder = GraphBuilder::new(TagMosaic::new(6, 0.1, 0.08));
        builder.add_camera_intrinsics(0, test_model());
        builder.add_camera_extrinsics(0, PoseXyzRpy::identity());

        let new_pose = PoseXyzRpy::new(0.1, 0.0, 0.0, 0.0, 0.0, 0.2);
        builder.set_camera_to_root(0, &new_pose);
        assert_eq!(builder.camera_to_root(0), Some(new_pose));
    }
}
