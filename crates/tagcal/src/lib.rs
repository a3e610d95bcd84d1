//! High-level entry crate for the `tagcal` multi-camera calibration toolbox.
//!
//! `tagcal` calibrates camera intrinsics and extrinsics from images of a
//! planar tag mosaic. Tag detections come from an external detector; the
//! toolbox never touches raw pixels.
//!
//! ## Workflow
//!
//! ```no_run
//! use tagcal::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // a 6-tags-wide mosaic, 80 mm spacing, 60 mm tags
//! let mosaic = TagMosaic::new(6, 0.08, 0.06);
//! let mut system = CameraCalibrationSystem::new(mosaic, BootstrapConfig::default());
//!
//! loop {
//!     let set: ImageSet = /* detections of one synchronized capture */
//!     # ImageSet::new();
//!     system.process_image_set(set);
//!
//!     // cameras appear as soon as enough evidence exists; once something
//!     // is initialized, refine the joint estimate
//!     if system.error_stats().is_some() {
//!         let report = system.refine()?;
//!         if report.converged && report.mean_error < 0.2 {
//!             break;
//!         }
//!     }
//! }
//!
//! println!("{}", tagcal::pipeline::export::calibration_block(&system));
//! # Ok(())
//! # }
//! ```
//!
//! ## Module organization
//!
//! - **[`core`]**: math types, camera models, mosaic grid, observations
//! - **[`linear`]**: closed-form initialization (homography, vanishing points)
//! - **[`graph`]**: sparse nonlinear least-squares factor graph
//! - **[`pipeline`]**: topological bootstrap and calibration export
//! - **[`prelude`]**: convenient re-exports for common use cases

/// Math types, camera models, mosaic grid and observation types.
pub mod core {
    pub use tagcal_core::*;
}

/// Closed-form initialization algorithms.
pub mod linear {
    pub use tagcal_linear::*;
}

/// Nonlinear least-squares factor graph.
pub mod graph {
    pub use tagcal_graph::*;
}

/// Topological bootstrap, graph builder and export.
pub mod pipeline {
    pub use tagcal_pipeline::*;
}

/// Convenient re-exports for common use cases.
pub mod prelude {
    pub use crate::core::{
        CameraFrame, CameraIntrinsics, CameraModel, DistortionModel, ImageSet, Iso3, ModelKind,
        PoseXyzRpy, Pt2, Pt3, TagMosaic, TagObservation, Vec2, Vec3,
    };
    pub use crate::graph::{RobustKernel, SolveOptions, SolveReport};
    pub use crate::pipeline::{BootstrapConfig, CameraCalibrationSystem, GraphBuilder};
}
