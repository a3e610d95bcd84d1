//! Rigid point-set alignment (Procrustes, no scaling).

use anyhow::Result;
use nalgebra::{Matrix3, Rotation3, Translation3, UnitQuaternion, Vector3};
use tagcal_core::{Iso3, Pt3, Real};

/// Find the rigid transform that best maps `model` points onto `observed`
/// points in the least-squares sense (no scale change).
///
/// Standard Procrustes: center both sets, form the cross-covariance matrix,
/// take its SVD and correct a possible reflection through the sign of
/// `det(U Vᵀ)`. Used to seed a mosaic pose from noisy projections of the tag
/// positions.
///
/// Returns an error if fewer than 3 point pairs are given or the counts
/// mismatch.
pub fn align_point_sets(model: &[Pt3], observed: &[Pt3]) -> Result<Iso3> {
    let n = model.len();
    if n < 3 {
        anyhow::bail!("need at least 3 point pairs for alignment, got {}", n);
    }
    if observed.len() != n {
        anyhow::bail!(
            "mismatched point counts: {} model vs {} observed",
            n,
            observed.len()
        );
    }

    let inv_n = 1.0 / n as Real;
    let c_model: Vector3<Real> = model.iter().map(|p| p.coords).sum::<Vector3<Real>>() * inv_n;
    let c_obs: Vector3<Real> = observed.iter().map(|p| p.coords).sum::<Vector3<Real>>() * inv_n;

    let mut cov = Matrix3::<Real>::zeros();
    for (pm, po) in model.iter().zip(observed.iter()) {
        cov += (po.coords - c_obs) * (pm.coords - c_model).transpose();
    }

    let svd = cov.svd(true, true);
    let u = svd.u.ok_or_else(|| anyhow::anyhow!("svd failed"))?;
    let v_t = svd.v_t.ok_or_else(|| anyhow::anyhow!("svd failed"))?;

    let mut d = Matrix3::<Real>::identity();
    if (u * v_t).determinant() < 0.0 {
        d[(2, 2)] = -1.0;
    }
    let r = u * d * v_t;

    let t = c_obs - r * c_model;
    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r));
    Ok(Iso3::from_parts(Translation3::from(t), rot))
}
