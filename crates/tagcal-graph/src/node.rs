//! Optimizable graph nodes.

use nalgebra::DVector;
use tagcal_core::{CameraModel, PoseXyzRpy, Real};

/// Central-difference step for intrinsics parameters (focal lengths,
/// principal point, distortion coefficients).
///
/// Together with [`EXTRINSICS_STEP`] this is the tunable step-size table of
/// the numeric differentiation: intrinsics live on pixel-ish scales while
/// positions/angles live on meter/radian scales, so they get different
/// perturbations.
pub const INTRINSICS_STEP: Real = 0.01;

/// Central-difference step for extrinsics parameters (position, attitude).
pub const EXTRINSICS_STEP: Real = 0.1;

/// Camera intrinsics as optimizer state.
///
/// Wraps a [`CameraModel`]; the model is replaced wholesale on every state
/// update, so the wrapped instance is always internally consistent.
#[derive(Debug, Clone)]
pub struct IntrinsicsNode {
    model: CameraModel,
}

impl IntrinsicsNode {
    pub fn new(model: CameraModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &CameraModel {
        &self.model
    }
}

/// A rigid local-to-root transform as optimizer state.
#[derive(Debug, Clone)]
pub struct ExtrinsicsNode {
    pose: PoseXyzRpy,
}

impl ExtrinsicsNode {
    pub fn new(pose: PoseXyzRpy) -> Self {
        Self { pose }
    }

    pub fn pose(&self) -> &PoseXyzRpy {
        &self.pose
    }
}

/// A node of the calibration graph.
///
/// A closed set of node kinds; edges match on the variant they expect and
/// treat a mismatch as a caller bug.
#[derive(Debug, Clone)]
pub enum Node {
    Intrinsics(IntrinsicsNode),
    Extrinsics(ExtrinsicsNode),
}

impl Node {
    pub fn intrinsics(model: CameraModel) -> Self {
        Node::Intrinsics(IntrinsicsNode::new(model))
    }

    pub fn extrinsics(pose: PoseXyzRpy) -> Self {
        Node::Extrinsics(ExtrinsicsNode::new(pose))
    }

    /// Number of optimizable dimensions of this node.
    pub fn dof(&self) -> usize {
        match self {
            Node::Intrinsics(n) => n.model.kind().param_count(),
            Node::Extrinsics(_) => 6,
        }
    }

    /// Current state as a flat parameter vector.
    pub fn params(&self) -> DVector<Real> {
        match self {
            Node::Intrinsics(n) => n.model.param_vector(),
            Node::Extrinsics(n) => n.pose.to_dvec(),
        }
    }

    /// Replace the state from a flat parameter vector.
    ///
    /// # Panics
    ///
    /// Panics on a wrong-length vector; the solver always produces correctly
    /// sized updates.
    pub fn set_params(&mut self, params: &DVector<Real>) {
        match self {
            Node::Intrinsics(n) => {
                n.model = CameraModel::from_params(
                    n.model.kind(),
                    params,
                    n.model.width(),
                    n.model.height(),
                );
            }
            Node::Extrinsics(n) => {
                n.pose = PoseXyzRpy::from_dvec(params);
            }
        }
    }

    /// Central-difference perturbation step for this node's parameters.
    pub fn perturbation_step(&self) -> Real {
        match self {
            Node::Intrinsics(_) => INTRINSICS_STEP,
            Node::Extrinsics(_) => EXTRINSICS_STEP,
        }
    }

    /// The wrapped camera model, if this is an intrinsics node.
    pub fn as_intrinsics(&self) -> Option<&CameraModel> {
        match self {
            Node::Intrinsics(n) => Some(&n.model),
            _ => None,
        }
    }

    /// The wrapped pose, if this is an extrinsics node.
    pub fn as_extrinsics(&self) -> Option<&PoseXyzRpy> {
        match self {
            Node::Extrinsics(n) => Some(&n.pose),
            _ => None,
        }
    }
}
