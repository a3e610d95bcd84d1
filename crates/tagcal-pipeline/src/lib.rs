//! Topological bootstrap and calibration-graph pipeline.
//!
//! This crate wires the pieces together: as image sets arrive, the
//! [`CameraCalibrationSystem`] decides which cameras can get an intrinsics
//! estimate, which mosaic placements can be posed against which root frames,
//! and when two previously disconnected camera subsystems can be merged
//! through a shared mosaic observation. The [`GraphBuilder`] maintains the
//! underlying factor graph, and [`export`] renders the final calibration.

mod builder;
pub mod export;
mod system;

pub use builder::GraphBuilder;
pub use system::{CameraCalibrationSystem, CameraWrapper, MosaicWrapper};

use serde::{Deserialize, Serialize};
use tagcal_core::{ModelKind, Real, DEFAULT_RECTIFY_ITERATIONS};
use tagcal_graph::{RobustKernel, SolveOptions};

/// Robust kernel selection as configuration.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RobustKernelConfig {
    #[default]
    None,
    Huber {
        delta: Real,
    },
    Cauchy {
        c: Real,
    },
}

impl RobustKernelConfig {
    pub fn to_kernel(self) -> RobustKernel {
        match self {
            RobustKernelConfig::None => RobustKernel::None,
            RobustKernelConfig::Huber { delta } => RobustKernel::Huber { delta },
            RobustKernelConfig::Cauchy { c } => RobustKernel::Cauchy { c },
        }
    }
}

/// Tunables of the topological bootstrap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Camera model variant calibrated for every camera.
    pub model_kind: ModelKind,
    /// Minimum tag detections per frame before a frame counts as usable.
    /// Detections must additionally span two mosaic rows and two columns.
    pub min_tags_per_frame: usize,
    /// Fixed-point iteration count for distortion inversion.
    pub rectify_iterations: u32,
    /// Upper bound on Gauss-Newton iterations per refine call.
    pub max_iterations: usize,
    /// Convergence threshold on the mean reprojection error change (pixels).
    pub tol: Real,
    /// Robust reweighting kernel.
    pub robust: RobustKernelConfig,
    /// Mean reprojection error (pixels) above which a converged solve is
    /// considered a poor fit and a fresh linear re-seed is attempted.
    pub reinit_threshold_px: Real,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            model_kind: ModelKind::SimpleRadial,
            min_tags_per_frame: 8,
            rectify_iterations: DEFAULT_RECTIFY_ITERATIONS,
            max_iterations: 50,
            tol: 1e-6,
            robust: RobustKernelConfig::None,
            reinit_threshold_px: 1.0,
        }
    }
}

impl BootstrapConfig {
    pub fn solve_options(&self) -> SolveOptions {
        SolveOptions {
            max_iterations: self.max_iterations,
            tol: self.tol,
            robust: self.robust.to_kernel(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = BootstrapConfig::default();
        assert_eq!(config.min_tags_per_frame, 8);
        assert_eq!(config.rectify_iterations, 5);
        assert!(matches!(config.robust, RobustKernelConfig::None));
    }

    #[test]
    fn config_json_round_trip() {
        let config = BootstrapConfig {
            model_kind: ModelKind::RadialTangential,
            robust: RobustKernelConfig::Huber { delta: 1.5 },
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let restored: BootstrapConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.model_kind, ModelKind::RadialTangential);
        assert!(matches!(
            restored.robust,
            RobustKernelConfig::Huber { delta } if (delta - 1.5).abs() < 1e-12
        ));
    }
}
