//! Linear triangulation of 3D points from rectified pixel observations.
//!
//! Uses a DLT formulation on the camera projection matrices and image points.
//! Lens distortion must already be removed from the observations by the
//! caller.

use anyhow::Result;
use nalgebra::{DMatrix, Matrix3x4};
use tagcal_core::{Pt2, Pt3, Real};

/// A 3×4 camera projection matrix.
pub type Mat34 = Matrix3x4<Real>;

/// Triangulate one point from two views.
///
/// Convenience wrapper over [`triangulate_point_multi`] for the stereo case.
pub fn triangulate_point(
    p_left: &Mat34,
    p_right: &Mat34,
    px_left: &Pt2,
    px_right: &Pt2,
) -> Result<Pt3> {
    triangulate_point_multi(&[*p_left, *p_right], &[*px_left, *px_right])
}

/// Linear triangulation from two or more views using DLT.
///
/// `cameras` are projection matrices `P_i` and `points` their corresponding
/// rectified pixel coordinates. The returned 3D point is in the same world
/// frame as the camera matrices.
pub fn triangulate_point_multi(cameras: &[Mat34], points: &[Pt2]) -> Result<Pt3> {
    if cameras.len() < 2 {
        anyhow::bail!("need at least 2 views, got {}", cameras.len());
    }
    if cameras.len() != points.len() {
        anyhow::bail!(
            "mismatched number of cameras ({}) and points ({})",
            cameras.len(),
            points.len()
        );
    }

    let mut a = DMatrix::<Real>::zeros(2 * cameras.len(), 4);
    for (i, (p, cam)) in points.iter().zip(cameras.iter()).enumerate() {
        let u = p.x;
        let v = p.y;

        let row0 = cam.row(0);
        let row1 = cam.row(1);
        let row2 = cam.row(2);

        a.row_mut(2 * i).copy_from(&(u * row2 - row0));
        a.row_mut(2 * i + 1).copy_from(&(v * row2 - row1));
    }

    let svd = a.svd(false, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| anyhow::anyhow!("svd failed during triangulation"))?;
    let x_h = v_t.row(v_t.nrows() - 1);

    let w = x_h[3];
    if w.abs() <= Real::EPSILON {
        anyhow::bail!("triangulation produced a point at infinity");
    }

    Ok(Pt3::new(x_h[0] / w, x_h[1] / w, x_h[2] / w))
}
