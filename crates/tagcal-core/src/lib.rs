//! Core math and data types for the `tagcal` calibration toolkit.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec2`, `Pt3`, ...),
//! - the xyz + roll/pitch/yaw rigid-transform parameterization used by the
//!   optimizer ([`PoseXyzRpy`]),
//! - camera models with radial/tangential distortion ([`CameraModel`]),
//! - the tag-mosaic grid convention ([`TagMosaic`]) and detector observation
//!   types ([`TagObservation`], [`CameraFrame`], [`ImageSet`]),
//! - synthetic observation generators for tests and examples.
//!
//! Camera pipeline:
//! `pixel = K ∘ distortion ∘ perspective(p_camera)`

/// Linear algebra type aliases and rigid-transform helpers.
pub mod math;
/// Camera models and distortion utilities.
pub mod models;
/// Tag-mosaic grid geometry.
pub mod mosaic;
/// Detector observation types.
pub mod observation;
/// Synthetic observation generators.
pub mod synthetic;

pub use math::*;
pub use models::*;
pub use mosaic::*;
pub use observation::*;
