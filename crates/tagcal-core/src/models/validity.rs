//! Empirical validity bound for polynomial distortion models.
//!
//! The radial polynomial `r ↦ r · (1 + k1 r² + k2 r⁴ + k3 r⁶)` is unbounded
//! and, for negative coefficients, stops being monotone at some radius. Past
//! that point the forward map folds back on itself and the fixed-point
//! inversion no longer has a unique answer. Rather than hard-failing, the
//! model clamps normalized coordinates to the largest radius at which the
//! profile is still strictly increasing.

use crate::{Real, Vec2};

use super::DistortionModel;

/// Scan step used when probing the radial profile.
const PROBE_STEP: Real = 1e-3;
/// Largest normalized radius the probe explores. Normalized coordinates of
/// real sensors stay well below this for any plausible field of view.
const PROBE_LIMIT: Real = 4.0;

/// Largest normalized radius at which a distortion model remains monotone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistortionValidity {
    pub max_radius: Real,
}

impl DistortionValidity {
    /// Probe the distortion profile and find its monotone range.
    ///
    /// Walks the distorted radius `|distort(r, 0)|` outward in fixed steps and
    /// stops at the first decrease. Distortion-free models are monotone
    /// everywhere and report an unbounded radius.
    pub fn probe(distortion: &DistortionModel) -> Self {
        if matches!(distortion, DistortionModel::NoDistortion) {
            return Self {
                max_radius: Real::INFINITY,
            };
        }

        let mut prev_out = 0.0;
        let mut r = PROBE_STEP;
        while r <= PROBE_LIMIT {
            let out = distortion.distort_normalized(&Vec2::new(r, 0.0)).norm();
            if out <= prev_out {
                return Self {
                    max_radius: r - PROBE_STEP,
                };
            }
            prev_out = out;
            r += PROBE_STEP;
        }

        Self {
            max_radius: PROBE_LIMIT,
        }
    }
}
