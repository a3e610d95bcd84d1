//! Camera models: pinhole intrinsics plus radial/tangential distortion.
//!
//! A [`CameraModel`] maps between three coordinate spaces:
//! - **camera frame** 3D points,
//! - **rectified** pixel coordinates (ideal pinhole projection),
//! - **distorted** pixel coordinates (what the sensor actually measures).
//!
//! Forward distortion is closed form; the inverse ([`CameraModel::rectify`])
//! uses a fixed-count fixed-point iteration, see [`CameraModel::rectify`].

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::{Mat3, Pt3, Real, Vec2, Vec3};

mod config;
mod validity;

pub use config::{CameraConfig, DistortionConfig};
pub use validity::DistortionValidity;

/// Default number of fixed-point iterations used by [`CameraModel::rectify`].
pub const DEFAULT_RECTIFY_ITERATIONS: u32 = 5;

/// Pinhole camera intrinsics.
///
/// The corresponding calibration matrix `K` has the form:
///
/// ```text
/// [ fx  skew  cx ]
/// [  0   fy   cy ]
/// [  0    0    1 ]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: Real,
    pub fy: Real,
    pub cx: Real,
    pub cy: Real,
    pub skew: Real,
}

impl CameraIntrinsics {
    /// Zero-skew intrinsics.
    pub fn new(fx: Real, fy: Real, cx: Real, cy: Real) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            skew: 0.0,
        }
    }

    /// Build the 3×3 calibration matrix `K`.
    pub fn k_matrix(&self) -> Mat3 {
        Mat3::new(
            self.fx, self.skew, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0,
        )
    }

    /// Attempt to construct intrinsics from a 3×3 calibration matrix `K`.
    ///
    /// The matrix is first normalised so that `K[2, 2] == 1`, then checked
    /// against the standard upper-triangular form. Returns `None` if the
    /// structure does not match within a small tolerance.
    pub fn try_from_k_matrix(k: &Mat3) -> Option<Self> {
        let mut k_norm = *k;
        let eps = 1e-9;

        let k33 = k_norm[(2, 2)];
        if k33.abs() < eps {
            return None;
        }
        k_norm /= k33;

        if k_norm[(1, 0)].abs() > eps
            || k_norm[(2, 0)].abs() > eps
            || k_norm[(2, 1)].abs() > eps
        {
            return None;
        }

        Some(Self {
            fx: k_norm[(0, 0)],
            skew: k_norm[(0, 1)],
            cx: k_norm[(0, 2)],
            fy: k_norm[(1, 1)],
            cy: k_norm[(1, 2)],
        })
    }

    /// Map normalized camera-plane coordinates to pixel coordinates.
    #[inline]
    pub fn to_pixel(&self, n: &Vec2) -> Vec2 {
        Vec2::new(
            self.fx * n.x + self.skew * n.y + self.cx,
            self.fy * n.y + self.cy,
        )
    }

    /// Map pixel coordinates to normalized camera-plane coordinates.
    #[inline]
    pub fn from_pixel(&self, px: &Vec2) -> Vec2 {
        let y = (px.y - self.cy) / self.fy;
        let x = (px.x - self.cx - self.skew * y) / self.fx;
        Vec2::new(x, y)
    }
}

/// Distortion families supported by [`CameraModel`].
///
/// A closed set of variants; model selection happens by matching on the tag,
/// never by name-based reflection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DistortionModel {
    /// Ideal pinhole, no distortion.
    NoDistortion,
    /// Two-coefficient radial polynomial.
    SimpleRadial { k1: Real, k2: Real },
    /// Full radial (k1, k2, k3) + tangential (p1, p2) model.
    RadialTangential {
        k1: Real,
        k2: Real,
        p1: Real,
        p2: Real,
        k3: Real,
    },
}

impl DistortionModel {
    /// Apply forward distortion to normalized coordinates.
    pub fn distort_normalized(&self, n: &Vec2) -> Vec2 {
        let (x, y) = (n.x, n.y);
        match *self {
            DistortionModel::NoDistortion => *n,
            DistortionModel::SimpleRadial { k1, k2 } => {
                let r2 = x * x + y * y;
                let radial = 1.0 + k1 * r2 + k2 * r2 * r2;
                Vec2::new(x * radial, y * radial)
            }
            DistortionModel::RadialTangential { k1, k2, p1, p2, k3 } => {
                let r2 = x * x + y * y;
                let r4 = r2 * r2;
                let r6 = r4 * r2;
                let radial = 1.0 + k1 * r2 + k2 * r4 + k3 * r6;
                let x_t = 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
                let y_t = p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
                Vec2::new(x * radial + x_t, y * radial + y_t)
            }
        }
    }

    /// Tangential shift at the given normalized coordinates.
    fn tangential(&self, x: Real, y: Real) -> (Real, Real) {
        match *self {
            DistortionModel::RadialTangential { p1, p2, .. } => {
                let r2 = x * x + y * y;
                let x_t = 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
                let y_t = p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
                (x_t, y_t)
            }
            _ => (0.0, 0.0),
        }
    }

    /// Radial multiplier `1 + k1 r² + k2 r⁴ (+ k3 r⁶)` at a squared radius.
    fn radial_multiplier(&self, r2: Real) -> Real {
        match *self {
            DistortionModel::NoDistortion => 1.0,
            DistortionModel::SimpleRadial { k1, k2 } => 1.0 + k1 * r2 + k2 * r2 * r2,
            DistortionModel::RadialTangential { k1, k2, k3, .. } => {
                1.0 + k1 * r2 + k2 * r2 * r2 + k3 * r2 * r2 * r2
            }
        }
    }

    /// Invert the forward distortion by fixed-point iteration.
    ///
    /// Starts from the distorted coordinates and runs exactly `iterations`
    /// pull-back passes with no convergence test. The iteration count is
    /// intentionally fixed; see [`CameraModel::rectify`].
    pub fn rectify_normalized(&self, d: &Vec2, iterations: u32) -> Vec2 {
        if matches!(self, DistortionModel::NoDistortion) {
            return *d;
        }

        let mut x = d.x;
        let mut y = d.y;
        let mut first_residual = None;

        for iter in 0..iterations {
            let r2 = x * x + y * y;
            let radial = self.radial_multiplier(r2);
            let (x_t, y_t) = self.tangential(x, y);
            x = (d.x - x_t) / radial;
            y = (d.y - y_t) / radial;

            if iter == 0 {
                let fwd = self.distort_normalized(&Vec2::new(x, y));
                first_residual = Some((fwd - d).norm());
            }
        }

        if let Some(first) = first_residual {
            let last = (self.distort_normalized(&Vec2::new(x, y)) - d).norm();
            if last > first + 1e-12 {
                log::debug!(
                    "distortion fixed-point iteration diverged: residual {:.3e} -> {:.3e}",
                    first,
                    last
                );
            }
        }

        Vec2::new(x, y)
    }
}

/// Identifies a [`DistortionModel`] variant; used by the parameter-vector
/// factory and the calibration export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    NoDistortion,
    SimpleRadial,
    RadialTangential,
}

impl ModelKind {
    /// Length of the flat parameter vector for this variant.
    pub fn param_count(self) -> usize {
        match self {
            ModelKind::NoDistortion => 4,
            ModelKind::SimpleRadial => 6,
            ModelKind::RadialTangential => 10,
        }
    }

    /// Stable name used in cache strings and the calibration export.
    pub fn name(self) -> &'static str {
        match self {
            ModelKind::NoDistortion => "NoDistortion",
            ModelKind::SimpleRadial => "SimpleRadial",
            ModelKind::RadialTangential => "RadialTangential",
        }
    }
}

/// A complete camera model: intrinsics, distortion and sensor size.
///
/// Instances are immutable; the optimizer replaces a model wholesale via
/// [`CameraModel::from_params`] on every parameter update.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraModel {
    intrinsics: CameraIntrinsics,
    distortion: DistortionModel,
    width: u32,
    height: u32,
    rectify_iterations: u32,
    max_valid_radius: Real,
}

impl CameraModel {
    /// Construct a model from explicit parameters.
    ///
    /// # Panics
    ///
    /// Panics if `fx` or `fy` is zero (the calibration matrix must be
    /// invertible) or if the image size is zero.
    pub fn new(
        intrinsics: CameraIntrinsics,
        distortion: DistortionModel,
        width: u32,
        height: u32,
    ) -> Self {
        assert!(
            intrinsics.fx != 0.0 && intrinsics.fy != 0.0,
            "camera intrinsics must be invertible (fx={}, fy={})",
            intrinsics.fx,
            intrinsics.fy
        );
        assert!(width > 0 && height > 0, "image size must be non-zero");

        let max_valid_radius = DistortionValidity::probe(&distortion).max_radius;
        Self {
            intrinsics,
            distortion,
            width,
            height,
            rectify_iterations: DEFAULT_RECTIFY_ITERATIONS,
            max_valid_radius,
        }
    }

    /// Override the fixed-point iteration count used by [`rectify`](Self::rectify).
    pub fn with_rectify_iterations(mut self, iterations: u32) -> Self {
        self.rectify_iterations = iterations;
        self
    }

    /// Construct a model from a flat parameter vector.
    ///
    /// Packing order matches [`param_vector`](Self::param_vector):
    /// - `NoDistortion`: `[fx, fy, cx, cy]`
    /// - `SimpleRadial`: `[fx, fy, cx, cy, k1, k2]`
    /// - `RadialTangential`: `[fx, fy, cx, cy, skew, k1, k2, p1, p2, k3]`
    ///
    /// # Panics
    ///
    /// Panics if `params` does not have exactly `kind.param_count()` elements.
    /// The calibration graph always produces correctly sized vectors, so a
    /// mismatch is a caller bug, not a data error.
    pub fn from_params(kind: ModelKind, params: &DVector<Real>, width: u32, height: u32) -> Self {
        assert_eq!(
            params.len(),
            kind.param_count(),
            "{} model expects {} parameters, got {}",
            kind.name(),
            kind.param_count(),
            params.len()
        );

        let (intrinsics, distortion) = match kind {
            ModelKind::NoDistortion => (
                CameraIntrinsics::new(params[0], params[1], params[2], params[3]),
                DistortionModel::NoDistortion,
            ),
            ModelKind::SimpleRadial => (
                CameraIntrinsics::new(params[0], params[1], params[2], params[3]),
                DistortionModel::SimpleRadial {
                    k1: params[4],
                    k2: params[5],
                },
            ),
            ModelKind::RadialTangential => (
                CameraIntrinsics {
                    fx: params[0],
                    fy: params[1],
                    cx: params[2],
                    cy: params[3],
                    skew: params[4],
                },
                DistortionModel::RadialTangential {
                    k1: params[5],
                    k2: params[6],
                    p1: params[7],
                    p2: params[8],
                    k3: params[9],
                },
            ),
        };

        Self::new(intrinsics, distortion, width, height)
    }

    /// Serialize the model state as a flat parameter vector.
    ///
    /// See [`from_params`](Self::from_params) for the packing order.
    pub fn param_vector(&self) -> DVector<Real> {
        let k = &self.intrinsics;
        match self.distortion {
            DistortionModel::NoDistortion => DVector::from_row_slice(&[k.fx, k.fy, k.cx, k.cy]),
            DistortionModel::SimpleRadial { k1, k2 } => {
                DVector::from_row_slice(&[k.fx, k.fy, k.cx, k.cy, k1, k2])
            }
            DistortionModel::RadialTangential { k1, k2, p1, p2, k3 } => {
                DVector::from_row_slice(&[k.fx, k.fy, k.cx, k.cy, k.skew, k1, k2, p1, p2, k3])
            }
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self.distortion {
            DistortionModel::NoDistortion => ModelKind::NoDistortion,
            DistortionModel::SimpleRadial { .. } => ModelKind::SimpleRadial,
            DistortionModel::RadialTangential { .. } => ModelKind::RadialTangential,
        }
    }

    pub fn intrinsics(&self) -> &CameraIntrinsics {
        &self.intrinsics
    }

    pub fn distortion(&self) -> &DistortionModel {
        &self.distortion
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Largest normalized radius at which the distortion profile is still
    /// monotone (and therefore invertible). Coordinates beyond it are clamped.
    pub fn max_valid_radius(&self) -> Real {
        self.max_valid_radius
    }

    /// Project a 3D point in camera coordinates to distorted pixel coordinates.
    ///
    /// The input point must have a non-zero `z` component; behaviour is
    /// undefined (NaN/inf propagate) for points on the camera plane. Callers
    /// are responsible for filtering points at or behind the camera.
    pub fn project(&self, p_c: &Pt3) -> Vec2 {
        let n = Vec2::new(p_c.x / p_c.z, p_c.y / p_c.z);
        let d = self.distortion.distort_normalized(&self.clamp_radius(&n));
        self.intrinsics.to_pixel(&d)
    }

    /// Map a rectified pixel coordinate to the distorted pixel the sensor
    /// would actually measure. Closed form.
    pub fn distort(&self, rectified: &Vec2) -> Vec2 {
        let n = self.intrinsics.from_pixel(rectified);
        let d = self.distortion.distort_normalized(&self.clamp_radius(&n));
        self.intrinsics.to_pixel(&d)
    }

    /// Map a distorted pixel coordinate to its rectified (ideal pinhole)
    /// position.
    ///
    /// The forward distortion polynomial has no closed-form inverse, so this
    /// runs a fixed-point iteration for exactly `rectify_iterations` passes
    /// (default [`DEFAULT_RECTIFY_ITERATIONS`]) with no convergence check. A
    /// growing residual is reported through `log::debug!` rather than an
    /// error; the iteration count is configurable via
    /// [`with_rectify_iterations`](Self::with_rectify_iterations).
    pub fn rectify(&self, distorted: &Vec2) -> Vec2 {
        let d = self.intrinsics.from_pixel(distorted);
        let n = self
            .distortion
            .rectify_normalized(&self.clamp_radius(&d), self.rectify_iterations);
        self.intrinsics.to_pixel(&n)
    }

    /// Back-project a distorted pixel into a unit-depth camera-frame point.
    pub fn unproject(&self, distorted: &Vec2) -> Vec3 {
        let rectified = self.rectify(distorted);
        let n = self.intrinsics.from_pixel(&rectified);
        Vec3::new(n.x, n.y, 1.0)
    }

    /// Deterministic full-precision identity string for this configuration.
    ///
    /// Equal models always produce byte-identical strings (fixed 12-decimal
    /// formatting), making the result usable as a memoization key for derived
    /// artifacts such as rectification lookup tables.
    pub fn cache_string(&self) -> String {
        let mut s = format!("{} {}x{}", self.kind().name(), self.width, self.height);
        for p in self.param_vector().iter() {
            s.push_str(&format!(" {:.12}", p));
        }
        s.push_str(&format!(" iters={}", self.rectify_iterations));
        s
    }

    fn clamp_radius(&self, n: &Vec2) -> Vec2 {
        let r = n.norm();
        if r > self.max_valid_radius {
            n * (self.max_valid_radius / r)
        } else {
            *n
        }
    }
}
