//! Closed-form initialization algorithms for `tagcal`.
//!
//! Everything here runs before (and feeds) the nonlinear refinement:
//! homography estimation and decomposition, linear triangulation, rigid
//! point-set alignment, and vanishing-point intrinsics bootstrapping.

mod alignment;
mod homography;
mod planar_pose;
mod triangulation;
mod vanishing;

pub use alignment::*;
pub use homography::*;
pub use planar_pose::*;
pub use triangulation::*;
pub use vanishing::*;
