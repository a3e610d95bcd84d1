//! Vanishing-point based intrinsics bootstrapping.
//!
//! Before any 3D structure exists, the orthogonal row/column directions of
//! the tag mosaic provide vanishing points, and each image's pair of
//! vanishing points constrains the image of the absolute conic
//! `ω = K⁻ᵀ K⁻¹` through `v₁ᵀ ω v₂ = 0`. This module extracts vanishing
//! points from detections and solves those constraints for an initial `K`.
//!
//! All outcomes here are `Option`s: an image with no usable vanishing points
//! is an expected, recoverable condition; the bootstrap simply retries when
//! more data arrives.

use nalgebra::{DMatrix, DVector, Matrix2, SymmetricEigen, Vector2};
use tagcal_core::{
    to_homogeneous, CameraFrame, CameraIntrinsics, Pt2, Real, TagMosaic, TagObservation, Vec3,
};

/// A pair of vanishing points of orthogonal mosaic directions, in homogeneous
/// image coordinates (unit-normalized).
pub type VanishingPair = (Vec3, Vec3);

/// Homogeneous line through two points.
fn line_through(a: &Pt2, b: &Pt2) -> Vec3 {
    to_homogeneous(a).cross(&to_homogeneous(b))
}

/// Homogeneous intersection of two lines.
fn intersect_lines(l1: &Vec3, l2: &Vec3) -> Vec3 {
    l1.cross(l2)
}

/// Least-squares line fit through two or more points.
///
/// Centroid plus principal direction of the 2×2 scatter matrix; returns the
/// homogeneous line, or `None` for fewer than two points or coincident
/// points.
pub fn fit_line(points: &[Pt2]) -> Option<Vec3> {
    if points.len() < 2 {
        return None;
    }

    let inv_n = 1.0 / points.len() as Real;
    let cx = points.iter().map(|p| p.x).sum::<Real>() * inv_n;
    let cy = points.iter().map(|p| p.y).sum::<Real>() * inv_n;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut syy = 0.0;
    for p in points {
        let dx = p.x - cx;
        let dy = p.y - cy;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }
    if sxx + syy <= Real::EPSILON {
        return None;
    }

    let eig = SymmetricEigen::new(Matrix2::new(sxx, sxy, sxy, syy));
    // normal of the line = eigenvector of the smaller eigenvalue
    let min_idx = if eig.eigenvalues[0] <= eig.eigenvalues[1] {
        0
    } else {
        1
    };
    let n: Vector2<Real> = eig.eigenvectors.column(min_idx).into_owned();
    Some(Vec3::new(n.x, n.y, -(n.x * cx + n.y * cy)))
}

/// Vanishing points from a single tag's corner quad.
///
/// Opposite quad edges are parallel on the tag plane, so each opposite pair
/// meets at a vanishing point.
pub fn tag_vanishing_points(obs: &TagObservation) -> VanishingPair {
    let c = &obs.corners;
    // corner order (-,-), (+,-), (+,+), (-,+): bottom/top edges run along
    // the mosaic x direction, left/right edges along y.
    let vp_x = intersect_lines(&line_through(&c[0], &c[1]), &line_through(&c[3], &c[2]));
    let vp_y = intersect_lines(&line_through(&c[0], &c[3]), &line_through(&c[1], &c[2]));
    (vp_x.normalize(), vp_y.normalize())
}

/// Vanishing points from a multi-tag mosaic view.
///
/// Detections are grouped into mosaic rows and columns, a least-squares line
/// is fitted per group, and the two extreme row lines (resp. column lines)
/// are intersected. Returns `None` unless at least two rows and two columns
/// each carry two or more detections.
pub fn mosaic_vanishing_points(frame: &CameraFrame, mosaic: &TagMosaic) -> Option<VanishingPair> {
    use std::collections::BTreeMap;

    let mut rows: BTreeMap<u32, Vec<Pt2>> = BTreeMap::new();
    let mut cols: BTreeMap<u32, Vec<Pt2>> = BTreeMap::new();
    for obs in &frame.observations {
        rows.entry(mosaic.row(obs.id)).or_default().push(obs.center);
        cols.entry(mosaic.col(obs.id)).or_default().push(obs.center);
    }

    let row_lines: BTreeMap<u32, Vec3> = rows
        .into_iter()
        .filter_map(|(idx, pts)| fit_line(&pts).map(|l| (idx, l)))
        .collect();
    let col_lines: BTreeMap<u32, Vec3> = cols
        .into_iter()
        .filter_map(|(idx, pts)| fit_line(&pts).map(|l| (idx, l)))
        .collect();
    if row_lines.len() < 2 || col_lines.len() < 2 {
        return None;
    }

    let first_row = row_lines.values().next().unwrap();
    let last_row = row_lines.values().next_back().unwrap();
    let first_col = col_lines.values().next().unwrap();
    let last_col = col_lines.values().next_back().unwrap();

    // Row lines run along the mosaic x direction, column lines along y.
    let vp_x = intersect_lines(first_row, last_row);
    let vp_y = intersect_lines(first_col, last_col);
    Some((vp_x.normalize(), vp_y.normalize()))
}

/// Extract a vanishing-point pair from one frame.
///
/// Multi-tag frames use row/column line fits; single-tag frames fall back to
/// the tag's own corner quad.
pub fn frame_vanishing_points(frame: &CameraFrame, mosaic: &TagMosaic) -> Option<VanishingPair> {
    match frame.observations.len() {
        0 => None,
        1 => Some(tag_vanishing_points(&frame.observations[0])),
        _ => mosaic_vanishing_points(frame, mosaic),
    }
}

/// Solve for intrinsics from vanishing-point pairs.
///
/// - With ≥ 4 pairs the zero-skew absolute-conic system is solved for the
///   full `(fx, fy, cx, cy)`.
/// - With exactly 3 pairs the system is only well posed under an equal-focal
///   assumption (`fx = fy`); the principal point is still recovered.
/// - With 1–2 pairs (or when the richer solves are degenerate), `(cx, cy)`
///   is held at `fallback_cc` and only the focal lengths are estimated.
///
/// Returns `None` when no usable estimate exists; the caller retries once
/// more data is available.
pub fn estimate_intrinsics(
    pairs: &[VanishingPair],
    fallback_cc: &Pt2,
) -> Option<CameraIntrinsics> {
    if pairs.is_empty() {
        return None;
    }

    if pairs.len() >= 4 {
        if let Some(k) = solve_full(pairs) {
            return Some(k);
        }
    }
    if pairs.len() == 3 {
        if let Some(k) = solve_equal_focal(pairs) {
            return Some(k);
        }
    }
    solve_fixed_center(pairs, fallback_cc)
}

/// Full zero-skew solve: ω parameterized by `(b11, b22, b13, b23, b33)`.
fn solve_full(pairs: &[VanishingPair]) -> Option<CameraIntrinsics> {
    let mut a = DMatrix::<Real>::zeros(pairs.len(), 5);
    for (i, (v1, v2)) in pairs.iter().enumerate() {
        a[(i, 0)] = v1.x * v2.x;
        a[(i, 1)] = v1.y * v2.y;
        a[(i, 2)] = v1.x * v2.z + v1.z * v2.x;
        a[(i, 3)] = v1.y * v2.z + v1.z * v2.y;
        a[(i, 4)] = v1.z * v2.z;
    }

    let b = smallest_singular_vector(&a)?;
    let (b11, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4]);

    // Fix the arbitrary nullspace sign so that b11 > 0, then require a
    // consistent positive-definite ω.
    let sign = if b11 < 0.0 { -1.0 } else { 1.0 };
    let (b11, b22, b13, b23, b33) = (sign * b11, sign * b22, sign * b13, sign * b23, sign * b33);
    if b11 <= Real::EPSILON || b22 <= Real::EPSILON {
        return None;
    }

    let cx = -b13 / b11;
    let cy = -b23 / b22;
    let s = b33 - (b13 * b13 / b11 + b23 * b23 / b22);
    if s <= 0.0 {
        return None;
    }

    let fx = (s / b11).sqrt();
    let fy = (s / b22).sqrt();
    if !fx.is_finite() || !fy.is_finite() {
        return None;
    }
    Some(CameraIntrinsics::new(fx, fy, cx, cy))
}

/// Equal-focal solve: ω parameterized by `(w1, w2, w4, w5)` with `fx = fy`.
fn solve_equal_focal(pairs: &[VanishingPair]) -> Option<CameraIntrinsics> {
    let mut a = DMatrix::<Real>::zeros(pairs.len(), 4);
    for (i, (v1, v2)) in pairs.iter().enumerate() {
        a[(i, 0)] = v1.x * v2.x + v1.y * v2.y;
        a[(i, 1)] = v1.x * v2.z + v1.z * v2.x;
        a[(i, 2)] = v1.y * v2.z + v1.z * v2.y;
        a[(i, 3)] = v1.z * v2.z;
    }

    let w = smallest_singular_vector(&a)?;
    let sign = if w[0] < 0.0 { -1.0 } else { 1.0 };
    let (w1, w2, w4, w5) = (sign * w[0], sign * w[1], sign * w[2], sign * w[3]);
    if w1 <= Real::EPSILON {
        return None;
    }

    let cx = -w2 / w1;
    let cy = -w4 / w1;
    let s = w5 - (w2 * w2 + w4 * w4) / w1;
    if s <= 0.0 {
        return None;
    }

    let f = (s / w1).sqrt();
    if !f.is_finite() {
        return None;
    }
    Some(CameraIntrinsics::new(f, f, cx, cy))
}

/// Fixed-principal-point solve: only `(fx, fy)` (or a single shared focal
/// length for one pair) from finite vanishing points.
fn solve_fixed_center(pairs: &[VanishingPair], cc: &Pt2) -> Option<CameraIntrinsics> {
    // centered finite vanishing points: (x/z - cx, y/z - cy)
    let mut centered = Vec::new();
    for (v1, v2) in pairs {
        if v1.z.abs() < 1e-9 || v2.z.abs() < 1e-9 {
            continue; // vanishing point at infinity constrains only aspect
        }
        let u = (v1.x / v1.z - cc.x) * (v2.x / v2.z - cc.x);
        let v = (v1.y / v1.z - cc.y) * (v2.y / v2.z - cc.y);
        centered.push((u, v));
    }
    if centered.is_empty() {
        return None;
    }

    if centered.len() >= 2 {
        // u / fx² + v / fy² = -1, linear in (1/fx², 1/fy²)
        let mut a = DMatrix::<Real>::zeros(centered.len(), 2);
        let mut rhs = DVector::<Real>::zeros(centered.len());
        for (i, (u, v)) in centered.iter().enumerate() {
            a[(i, 0)] = *u;
            a[(i, 1)] = *v;
            rhs[i] = -1.0;
        }
        if let Ok(sol) = a.svd(true, true).solve(&rhs, 1e-12) {
            if sol[0] > 0.0 && sol[1] > 0.0 {
                let fx = 1.0 / sol[0].sqrt();
                let fy = 1.0 / sol[1].sqrt();
                return Some(CameraIntrinsics::new(fx, fy, cc.x, cc.y));
            }
        }
    }

    // single shared focal: (u + v) / f² = -1 in least squares
    let num: Real = centered.iter().map(|(u, v)| -(u + v)).sum();
    let den: Real = centered.iter().map(|(u, v)| (u + v) * (u + v)).sum();
    if den <= Real::EPSILON {
        return None;
    }
    let inv_f2 = num / den;
    if inv_f2 <= 0.0 {
        return None;
    }
    let f = 1.0 / inv_f2.sqrt();
    Some(CameraIntrinsics::new(f, f, cc.x, cc.y))
}

fn smallest_singular_vector(a: &DMatrix<Real>) -> Option<DVector<Real>> {
    let svd = a.clone().svd(false, true);
    let v_t = svd.v_t?;
    Some(v_t.row(v_t.nrows() - 1).transpose())
}

/// Estimate intrinsics from every usable frame of one camera.
///
/// The fallback principal point is the image center of the first frame.
pub fn estimate_intrinsics_from_frames(
    frames: &[&CameraFrame],
    mosaic: &TagMosaic,
) -> Option<CameraIntrinsics> {
    let first = frames.first()?;
    let cc = Pt2::new(first.width as Real * 0.5, first.height as Real * 0.5);

    let pairs: Vec<VanishingPair> = frames
        .iter()
        .filter_map(|frame| frame_vanishing_points(frame, mosaic))
        .collect();
    if pairs.is_empty() {
        log::debug!("no usable vanishing points in {} frame(s)", frames.len());
        return None;
    }

    estimate_intrinsics(&pairs, &cc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Rotation3, Translation3};
    use tagcal_core::{
        synthetic::{block_ids, observe_mosaic},
        CameraModel, DistortionModel, Iso3,
    };

    fn make_model(fx: Real, fy: Real) -> CameraModel {
        CameraModel::new(
            CameraIntrinsics::new(fx, fy, 320.0, 240.0),
            DistortionModel::NoDistortion,
            640,
            480,
        )
    }

    fn tilted_pose(roll: Real, pitch: Real, yaw: Real) -> Iso3 {
        let rot = Rotation3::from_euler_angles(roll, pitch, yaw);
        // keep the 6x4 mosaic block roughly centered and in frame
        Iso3::from_parts(Translation3::new(-0.2, -0.12, 1.3), rot.into())
    }

    fn frames_for(model: &CameraModel, poses: &[Iso3], mosaic: &TagMosaic) -> Vec<CameraFrame> {
        let ids = block_ids(mosaic, 4);
        poses
            .iter()
            .map(|pose| observe_mosaic(model, pose, mosaic, &ids))
            .collect()
    }

    #[test]
    fn line_fit_through_collinear_points() {
        let pts = vec![
            Pt2::new(0.0, 1.0),
            Pt2::new(1.0, 2.0),
            Pt2::new(2.0, 3.0),
            Pt2::new(3.0, 4.0),
        ];
        let l = fit_line(&pts).unwrap();
        for p in &pts {
            let d = l.dot(&to_homogeneous(p)) / (l.x * l.x + l.y * l.y).sqrt();
            assert!(d.abs() < 1e-10, "point off fitted line by {}", d);
        }
    }

    #[test]
    fn full_solve_recovers_distinct_focals() {
        let model = make_model(820.0, 780.0);
        let mosaic = TagMosaic::new(6, 0.08, 0.06);
        let poses = [
            tilted_pose(0.25, 0.1, 0.0),
            tilted_pose(-0.2, 0.22, 0.1),
            tilted_pose(0.15, -0.25, -0.05),
            tilted_pose(-0.28, -0.15, 0.15),
            tilted_pose(0.1, 0.3, -0.12),
        ];
        let frames = frames_for(&model, &poses, &mosaic);
        let refs: Vec<&CameraFrame> = frames.iter().collect();

        let k = estimate_intrinsics_from_frames(&refs, &mosaic).expect("estimate");
        assert!((k.fx - 820.0).abs() < 1.0, "fx = {}", k.fx);
        assert!((k.fy - 780.0).abs() < 1.0, "fy = {}", k.fy);
        assert!((k.cx - 320.0).abs() < 1.0, "cx = {}", k.cx);
        assert!((k.cy - 240.0).abs() < 1.0, "cy = {}", k.cy);
    }

    #[test]
    fn three_pairs_recover_equal_focal_model() {
        let model = make_model(800.0, 800.0);
        let mosaic = TagMosaic::new(6, 0.08, 0.06);
        let poses = [
            tilted_pose(0.25, 0.1, 0.0),
            tilted_pose(-0.2, 0.22, 0.1),
            tilted_pose(0.15, -0.25, -0.05),
        ];
        let frames = frames_for(&model, &poses, &mosaic);
        let refs: Vec<&CameraFrame> = frames.iter().collect();

        let k = estimate_intrinsics_from_frames(&refs, &mosaic).expect("estimate");
        assert!((k.fx - 800.0).abs() < 1.0, "fx = {}", k.fx);
        assert!((k.fy - 800.0).abs() < 1.0, "fy = {}", k.fy);
        assert!((k.cx - 320.0).abs() < 1.0, "cx = {}", k.cx);
        assert!((k.cy - 240.0).abs() < 1.0, "cy = {}", k.cy);
    }

    #[test]
    fn two_pairs_use_fallback_principal_point() {
        let model = make_model(820.0, 780.0);
        let mosaic = TagMosaic::new(6, 0.08, 0.06);
        let poses = [tilted_pose(0.25, 0.1, 0.0), tilted_pose(-0.2, 0.22, 0.1)];
        let frames = frames_for(&model, &poses, &mosaic);
        let refs: Vec<&CameraFrame> = frames.iter().collect();

        let k = estimate_intrinsics_from_frames(&refs, &mosaic).expect("estimate");
        // principal point is pinned at the true image center here, so the
        // focal lengths come out exact as well
        assert_eq!(k.cx, 320.0);
        assert_eq!(k.cy, 240.0);
        assert!((k.fx - 820.0).abs() < 1.0, "fx = {}", k.fx);
        assert!((k.fy - 780.0).abs() < 1.0, "fy = {}", k.fy);
    }

    #[test]
    fn single_tag_frame_contributes_a_pair() {
        let model = make_model(800.0, 800.0);
        let mosaic = TagMosaic::new(6, 0.08, 0.06);
        let pose = tilted_pose(0.3, 0.2, 0.0);
        let full = observe_mosaic(&model, &pose, &mosaic, &block_ids(&mosaic, 4));
        let single = CameraFrame {
            width: full.width,
            height: full.height,
            observations: vec![full.observations[0]],
        };
        let (v1, v2) = frame_vanishing_points(&single, &mosaic).expect("vanishing pair");
        // both vanishing points must agree with the mosaic-level ones
        let (m1, m2) = frame_vanishing_points(&full, &mosaic).unwrap();
        assert!(v1.cross(&m1).norm() < 1e-6, "vp_x differs");
        assert!(v2.cross(&m2).norm() < 1e-6, "vp_y differs");
    }

    #[test]
    fn no_detections_yields_none() {
        let mosaic = TagMosaic::new(6, 0.08, 0.06);
        let empty = CameraFrame {
            width: 640,
            height: 480,
            observations: vec![],
        };
        assert!(frame_vanishing_points(&empty, &mosaic).is_none());
        assert!(estimate_intrinsics(&[], &Pt2::new(320.0, 240.0)).is_none());
    }
}
