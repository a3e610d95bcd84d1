//! Position + roll/pitch/yaw rigid-transform parameterization.
//!
//! Extrinsics are optimized as a 6-vector `[x, y, z, roll, pitch, yaw]`
//! (angles in radians). The rotation is composed as `Rz(yaw) · Ry(pitch) ·
//! Rx(roll)`, i.e. roll about X first, then pitch about Y, then yaw about Z.
//! Both conversion directions must stay consistent; the round trip is covered
//! by tests below.

use nalgebra::{DVector, Rotation3, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};

use crate::{Iso3, Mat4, Pt3, Real};

/// A 6-DOF rigid transform: translation plus roll/pitch/yaw in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseXyzRpy {
    pub x: Real,
    pub y: Real,
    pub z: Real,
    pub roll: Real,
    pub pitch: Real,
    pub yaw: Real,
}

impl PoseXyzRpy {
    pub fn new(x: Real, y: Real, z: Real, roll: Real, pitch: Real, yaw: Real) -> Self {
        Self {
            x,
            y,
            z,
            roll,
            pitch,
            yaw,
        }
    }

    /// The identity transform.
    pub fn identity() -> Self {
        Self::default()
    }

    /// Convert to an SE(3) isometry.
    pub fn to_iso3(&self) -> Iso3 {
        let rot = UnitQuaternion::from_euler_angles(self.roll, self.pitch, self.yaw);
        Iso3::from_parts(Translation3::new(self.x, self.y, self.z), rot)
    }

    /// Recover the parameterization from an SE(3) isometry.
    pub fn from_iso3(iso: &Iso3) -> Self {
        let (roll, pitch, yaw) = iso.rotation.euler_angles();
        let t = iso.translation.vector;
        Self::new(t.x, t.y, t.z, roll, pitch, yaw)
    }

    /// Convert to a 4×4 homogeneous transform matrix.
    pub fn to_matrix(&self) -> Mat4 {
        self.to_iso3().to_homogeneous()
    }

    /// Recover the parameterization from a 4×4 homogeneous transform.
    ///
    /// The upper-left 3×3 block must be a rotation matrix; this is not
    /// re-orthonormalized here.
    pub fn from_matrix(m: &Mat4) -> Self {
        let rot = Rotation3::from_matrix_unchecked(m.fixed_view::<3, 3>(0, 0).into_owned());
        let (roll, pitch, yaw) = rot.euler_angles();
        Self::new(m[(0, 3)], m[(1, 3)], m[(2, 3)], roll, pitch, yaw)
    }

    /// Pack as the optimizer state vector `[x, y, z, roll, pitch, yaw]`.
    pub fn to_dvec(&self) -> DVector<Real> {
        DVector::from_row_slice(&[self.x, self.y, self.z, self.roll, self.pitch, self.yaw])
    }

    /// Unpack from an optimizer state vector.
    ///
    /// # Panics
    ///
    /// Panics if `v` does not have exactly 6 elements; the graph always
    /// produces correctly sized vectors, so this is a caller bug.
    pub fn from_dvec(v: &DVector<Real>) -> Self {
        assert_eq!(v.len(), 6, "pose state vector must have 6 elements");
        Self::new(v[0], v[1], v[2], v[3], v[4], v[5])
    }

    /// Transform a point from the local frame into the parent frame.
    pub fn transform_point(&self, p: &Pt3) -> Pt3 {
        self.to_iso3().transform_point(p)
    }

    /// Compose with another transform: `self ∘ other`.
    pub fn compose(&self, other: &PoseXyzRpy) -> PoseXyzRpy {
        PoseXyzRpy::from_iso3(&(self.to_iso3() * other.to_iso3()))
    }

    /// The inverse transform.
    pub fn inverse(&self) -> PoseXyzRpy {
        PoseXyzRpy::from_iso3(&self.to_iso3().inverse())
    }
}
