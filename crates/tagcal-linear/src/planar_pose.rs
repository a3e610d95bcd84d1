use nalgebra::{Matrix3, Rotation3, Translation3, UnitQuaternion, Vector3};
use tagcal_core::{Iso3, Mat3, Pt2, Pt3, Real};

/// Decompose a plane-induced homography into a rigid pose.
///
/// For a target on its own `Z = 0` plane, `H = K [r1 r2 t]` up to scale and
/// sign. The scale is fixed by the rotation-column norms; the sign ambiguity
/// is resolved by requiring that `reference` (a point on the target plane)
/// ends up **in front of** the camera.
///
/// Returns an [`Iso3`] mapping target coordinates into camera coordinates.
///
/// # Panics
///
/// Panics if `k` is singular; intrinsics are validated at model construction,
/// so a singular `K` here is a caller bug.
pub fn pose_from_homography(k: &Mat3, h: &Mat3, reference: &Pt2) -> Iso3 {
    let k_inv = k
        .try_inverse()
        .expect("K must be invertible in pose_from_homography");

    let k_inv_h1: Vector3<Real> = k_inv * h.column(0);
    let k_inv_h2: Vector3<Real> = k_inv * h.column(1);
    let k_inv_h3: Vector3<Real> = k_inv * h.column(2);

    // Scale factor λ: normalize first two columns (average for robustness)
    let norm1 = k_inv_h1.norm();
    let norm2 = k_inv_h2.norm();
    let lambda = 1.0 / ((norm1 + norm2) * 0.5);

    let pose = build_pose(lambda, &k_inv_h1, &k_inv_h2, &k_inv_h3);

    // H is only determined up to sign; pick the solution that puts the
    // reference target point at positive depth.
    let p_ref = Pt3::new(reference.x, reference.y, 0.0);
    if pose.transform_point(&p_ref).z < 0.0 {
        build_pose(-lambda, &k_inv_h1, &k_inv_h2, &k_inv_h3)
    } else {
        pose
    }
}

fn build_pose(
    lambda: Real,
    k_inv_h1: &Vector3<Real>,
    k_inv_h2: &Vector3<Real>,
    k_inv_h3: &Vector3<Real>,
) -> Iso3 {
    let r1 = lambda * k_inv_h1;
    let r2 = lambda * k_inv_h2;
    let r3 = r1.cross(&r2);

    let mut r_mat = Matrix3::<Real>::zeros();
    r_mat.set_column(0, &r1);
    r_mat.set_column(1, &r2);
    r_mat.set_column(2, &r3);

    // Project onto SO(3) (polar decomposition via SVD)
    let svd = r_mat.svd(true, true);
    let u = svd.u.expect("U from SVD");
    let v_t = svd.v_t.expect("V^T from SVD");
    let mut r_orth = u * v_t;

    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    let t_vec = lambda * k_inv_h3;
    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r_orth));
    Iso3::from_parts(Translation3::from(t_vec), rot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagcal_core::CameraIntrinsics;
    use nalgebra::Rotation3;

    fn make_kmtx() -> Mat3 {
        CameraIntrinsics::new(800.0, 780.0, 640.0, 360.0).k_matrix()
    }

    fn homography_for(kmtx: &Mat3, iso: &Iso3) -> Mat3 {
        let r_binding = iso.rotation.to_rotation_matrix();
        let r_mat = r_binding.matrix();
        let t = iso.translation.vector;

        let mut hmtx = Mat3::zeros();
        hmtx.set_column(0, &(kmtx * r_mat.column(0)));
        hmtx.set_column(1, &(kmtx * r_mat.column(1)));
        hmtx.set_column(2, &(kmtx * t));
        hmtx
    }

    fn pose_error(a: &Iso3, b: &Iso3) -> (Real, Real) {
        let dt = (a.translation.vector - b.translation.vector).norm();
        let ang = a.rotation.angle_to(&b.rotation);
        (dt, ang)
    }

    #[test]
    fn recovers_pose_from_exact_homography() {
        let kmtx = make_kmtx();
        let rot = Rotation3::from_euler_angles(0.1, -0.05, 0.2);
        let t = Vector3::new(0.1, -0.05, 1.0);
        let iso_gt = Iso3::from_parts(Translation3::from(t), rot.into());

        let hmtx = homography_for(&kmtx, &iso_gt);
        let iso_est = pose_from_homography(&kmtx, &hmtx, &Pt2::new(0.0, 0.0));

        let (dt, ang) = pose_error(&iso_est, &iso_gt);
        assert!(dt < 1e-3, "translation error too large: {}", dt);
        assert!(ang < 1e-3, "rotation error too large: {}", ang);
    }

    #[test]
    fn sign_flip_resolved_by_reference_depth() {
        let kmtx = make_kmtx();
        let rot = Rotation3::from_euler_angles(-0.15, 0.1, 0.05);
        let t = Vector3::new(0.05, 0.1, 1.4);
        let iso_gt = Iso3::from_parts(Translation3::from(t), rot.into());

        // Negating H must not change the recovered pose.
        let hmtx = homography_for(&kmtx, &iso_gt);
        let reference = Pt2::new(0.1, 0.1);
        let from_pos = pose_from_homography(&kmtx, &hmtx, &reference);
        let from_neg = pose_from_homography(&kmtx, &(-hmtx), &reference);

        let (dt, ang) = pose_error(&from_pos, &from_neg);
        assert!(dt < 1e-9 && ang < 1e-9, "sign ambiguity not resolved");
        assert!(from_pos.transform_point(&Pt3::new(0.1, 0.1, 0.0)).z > 0.0);
    }
}
