//! The calibration graph container.

use std::collections::BTreeSet;

use tagcal_core::Real;

use crate::edge::GraphEdge;
use crate::node::Node;

/// Append-only container of nodes and residual edges.
///
/// Nodes and edges are never removed once added; the bootstrap layer may
/// re-seed node states, but indices stay valid for the life of the graph.
/// Individual nodes can be held fixed (e.g. the root camera of a subsystem,
/// which pins the gauge); fixed nodes keep their state during solves.
#[derive(Default)]
pub struct Graph {
    pub(crate) nodes: Vec<Node>,
    pub(crate) edges: Vec<Box<dyn GraphEdge>>,
    pub(crate) fixed: BTreeSet<usize>,
    pub(crate) structure_version: u64,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node and return its index.
    pub fn add_node(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.structure_version += 1;
        self.nodes.len() - 1
    }

    /// Add an edge.
    ///
    /// # Panics
    ///
    /// Panics if the edge references a node index that has not been added
    /// yet; edges may only connect already-existing nodes.
    pub fn add_edge(&mut self, edge: Box<dyn GraphEdge>) {
        for &idx in edge.node_indices() {
            assert!(
                idx < self.nodes.len(),
                "edge references node {} but only {} nodes exist",
                idx,
                self.nodes.len()
            );
        }
        self.edges.push(edge);
        self.structure_version += 1;
    }

    pub fn node(&self, idx: usize) -> &Node {
        &self.nodes[idx]
    }

    pub fn node_mut(&mut self, idx: usize) -> &mut Node {
        &mut self.nodes[idx]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Hold a node's state constant during solves.
    ///
    /// # Panics
    ///
    /// Panics if the index does not refer to an existing node.
    pub fn fix_node(&mut self, idx: usize) {
        assert!(idx < self.nodes.len(), "no node at index {}", idx);
        if self.fixed.insert(idx) {
            self.structure_version += 1;
        }
    }

    /// Release a previously fixed node back into the optimization.
    pub fn unfix_node(&mut self, idx: usize) {
        if self.fixed.remove(&idx) {
            self.structure_version += 1;
        }
    }

    pub fn is_fixed(&self, idx: usize) -> bool {
        self.fixed.contains(&idx)
    }

    /// Re-point every edge reference from node `from` to node `to`.
    ///
    /// Both nodes stay in the graph; only edge references move. Used by the
    /// bootstrap when a subsystem merge collapses duplicate mosaic pose
    /// recordings onto one live node.
    ///
    /// # Panics
    ///
    /// Panics if `to` does not refer to an existing node.
    pub fn remap_edges(&mut self, from: usize, to: usize) {
        assert!(to < self.nodes.len(), "no node at index {}", to);
        for edge in &mut self.edges {
            edge.remap_node(from, to);
        }
        self.structure_version += 1;
    }

    /// Total optimizable dimensions across all nodes, fixed ones included.
    pub fn total_dof(&self) -> usize {
        self.nodes.iter().map(Node::dof).sum()
    }

    /// Optimizable dimensions excluding fixed nodes.
    pub fn free_dof(&self) -> usize {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(idx, _)| !self.fixed.contains(idx))
            .map(|(_, node)| node.dof())
            .sum()
    }

    /// Total residual dimension across all edges.
    pub fn residual_dimension(&self) -> usize {
        self.edges.iter().map(|e| e.dimension()).sum()
    }

    /// Per-correspondence Euclidean reprojection errors (pixels) over every
    /// edge, at the current node states.
    pub fn reprojection_errors(&self) -> Vec<Real> {
        let mut errors = Vec::new();
        for edge in &self.edges {
            let r = edge.residual(&self.nodes);
            for pair in r.as_slice().chunks_exact(2) {
                errors.push((pair[0] * pair[0] + pair[1] * pair[1]).sqrt());
            }
        }
        errors
    }

    /// Mean and max reprojection error, or `None` for an edgeless graph.
    pub fn error_stats(&self) -> Option<(Real, Real)> {
        let errors = self.reprojection_errors();
        if errors.is_empty() {
            return None;
        }
        let mean = errors.iter().sum::<Real>() / errors.len() as Real;
        let max = errors.iter().cloned().fold(0.0, Real::max);
        Some((mean, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::ReprojectionEdge;
    use tagcal_core::{CameraIntrinsics, CameraModel, DistortionModel, PoseXyzRpy, Pt3, Vec2};

    fn test_model() -> CameraModel {
        CameraModel::new(
            CameraIntrinsics::new(800.0, 800.0, 320.0, 240.0),
            DistortionModel::NoDistortion,
            640,
            480,
        )
    }

    #[test]
    fn indices_are_append_order() {
        let mut graph = Graph::new();
        assert_eq!(graph.add_node(Node::intrinsics(test_model())), 0);
        assert_eq!(graph.add_node(Node::extrinsics(PoseXyzRpy::identity())), 1);
        assert_eq!(graph.num_nodes(), 2);
        assert_eq!(graph.total_dof(), 4 + 6);
    }

    #[test]
    #[should_panic(expected = "edge references node")]
    fn edge_to_missing_node_panics() {
        let mut graph = Graph::new();
        graph.add_node(Node::intrinsics(test_model()));
        let edge = ReprojectionEdge::new(
            0,
            None,
            7,
            vec![(Pt3::new(0.0, 0.0, 0.0), Vec2::new(320.0, 240.0))],
        );
        graph.add_edge(Box::new(edge));
    }

    #[test]
    fn error_stats_on_empty_graph_is_none() {
        let graph = Graph::new();
        assert!(graph.error_stats().is_none());
    }

    #[test]
    fn fixing_a_node_removes_its_free_dof() {
        let mut graph = Graph::new();
        graph.add_node(Node::intrinsics(test_model()));
        let pose = graph.add_node(Node::extrinsics(PoseXyzRpy::identity()));
        assert_eq!(graph.free_dof(), 10);

        graph.fix_node(pose);
        assert!(graph.is_fixed(pose));
        assert_eq!(graph.free_dof(), 4);
        assert_eq!(graph.total_dof(), 10);

        graph.unfix_node(pose);
        assert_eq!(graph.free_dof(), 10);
    }

    #[test]
    fn remap_edges_repoints_node_references() {
        let mut graph = Graph::new();
        let cam = graph.add_node(Node::intrinsics(test_model()));
        let a = graph.add_node(Node::extrinsics(PoseXyzRpy::identity()));
        let b = graph.add_node(Node::extrinsics(PoseXyzRpy::identity()));
        graph.add_edge(Box::new(ReprojectionEdge::new(
            cam,
            None,
            a,
            vec![(Pt3::new(0.0, 0.0, 0.0), Vec2::new(320.0, 240.0))],
        )));

        graph.remap_edges(a, b);
        assert_eq!(graph.edges[0].node_indices(), &[cam, b]);
    }
}
