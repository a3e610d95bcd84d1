//! Sparse nonlinear least-squares factor graph for camera calibration.
//!
//! The graph holds optimizable nodes (camera intrinsics, rigid extrinsics)
//! and residual edges (tag reprojection). Solving is plain Gauss-Newton on
//! the information-form normal equations: edges are linearized with central
//! finite differences, the sparse system is Cholesky-factored through `faer`
//! (whose symbolic analysis applies a fill-reducing minimum-degree ordering),
//! and the update is applied to every node. Robust reweighting (IRLS) hooks
//! in per correspondence.
//!
//! The graph is append-only: nodes and edges are never removed, only
//! re-seeded by the bootstrap layer. All of this is synchronous, single
//! threaded batch computation; callers needing concurrency serialize access
//! themselves.

mod edge;
mod graph;
mod node;
mod robust;
mod solver;

pub use edge::{GraphEdge, ReprojectionEdge};
pub use graph::Graph;
pub use node::{ExtrinsicsNode, IntrinsicsNode, Node, EXTRINSICS_STEP, INTRINSICS_STEP};
pub use robust::RobustKernel;
pub use solver::{GaussNewton, IterationReport, SolveError, SolveOptions, SolveReport};
