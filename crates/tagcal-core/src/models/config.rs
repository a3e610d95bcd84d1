//! Serializable camera-model configuration.
//!
//! [`CameraModel`] itself carries derived state (the distortion validity
//! bound) and is therefore built through this config rather than deserialized
//! directly. The variant set is closed: adding a model means adding an enum
//! arm here, not registering a class name.

use serde::{Deserialize, Serialize};

use super::{CameraIntrinsics, CameraModel, DistortionModel, DEFAULT_RECTIFY_ITERATIONS};
use crate::Real;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DistortionConfig {
    NoDistortion,
    SimpleRadial {
        k1: Real,
        k2: Real,
    },
    RadialTangential {
        k1: Real,
        k2: Real,
        p1: Real,
        p2: Real,
        k3: Real,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub intrinsics: CameraIntrinsics,
    pub distortion: DistortionConfig,
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rectify_iterations: Option<u32>,
}

impl CameraConfig {
    /// Build the runtime camera model.
    pub fn build(&self) -> CameraModel {
        let distortion = match self.distortion {
            DistortionConfig::NoDistortion => DistortionModel::NoDistortion,
            DistortionConfig::SimpleRadial { k1, k2 } => DistortionModel::SimpleRadial { k1, k2 },
            DistortionConfig::RadialTangential { k1, k2, p1, p2, k3 } => {
                DistortionModel::RadialTangential { k1, k2, p1, p2, k3 }
            }
        };
        CameraModel::new(self.intrinsics, distortion, self.width, self.height)
            .with_rectify_iterations(self.rectify_iterations.unwrap_or(DEFAULT_RECTIFY_ITERATIONS))
    }

    /// Capture a runtime model as a serializable config.
    pub fn from_model(model: &CameraModel) -> Self {
        let distortion = match *model.distortion() {
            DistortionModel::NoDistortion => DistortionConfig::NoDistortion,
            DistortionModel::SimpleRadial { k1, k2 } => DistortionConfig::SimpleRadial { k1, k2 },
            DistortionModel::RadialTangential { k1, k2, p1, p2, k3 } => {
                DistortionConfig::RadialTangential { k1, k2, p1, p2, k3 }
            }
        };
        Self {
            intrinsics: *model.intrinsics(),
            distortion,
            width: model.width(),
            height: model.height(),
            rectify_iterations: None,
        }
    }
}
