//! Synthetic observation generators.
//!
//! Mirrors real detector output for tests and examples: a ground-truth
//! [`CameraModel`] and pose project a [`TagMosaic`] into pixel-space
//! [`TagObservation`]s. Tags behind the camera or outside the image are
//! dropped, like a real detector would.

use nalgebra::{Translation3, UnitQuaternion, Vector3};

use crate::{CameraFrame, CameraModel, ImageSet, Iso3, Pt2, Pt3, Real, TagMosaic, TagObservation};

/// All tag ids of a `rows × mosaic.width` block starting at id 0.
pub fn block_ids(mosaic: &TagMosaic, rows: u32) -> Vec<u32> {
    (0..rows * mosaic.width).collect()
}

/// Generate `n_views` poses with a yaw ramp around +Y and a Z translation
/// ramp; a convenient default that keeps a planar target in front of the
/// camera while varying viewpoint.
pub fn poses_yaw_y_z(
    n_views: usize,
    yaw_start_rad: Real,
    yaw_step_rad: Real,
    z_start: Real,
    z_step: Real,
) -> Vec<Iso3> {
    (0..n_views)
        .map(|view_idx| {
            let yaw = yaw_start_rad + yaw_step_rad * view_idx as Real;
            let rotation = UnitQuaternion::from_scaled_axis(Vector3::new(0.0, 1.0, 0.0) * yaw);
            let translation = Vector3::new(0.0, 0.0, z_start + z_step * view_idx as Real);
            Iso3::from_parts(Translation3::from(translation), rotation)
        })
        .collect()
}

/// Project the given tags through a camera, producing a detector-like frame.
///
/// `cam_from_mosaic` maps mosaic-frame points into the camera frame. A tag is
/// kept only if its center and all four corners project in front of the
/// camera and inside the image bounds.
pub fn observe_mosaic(
    model: &CameraModel,
    cam_from_mosaic: &Iso3,
    mosaic: &TagMosaic,
    ids: &[u32],
) -> CameraFrame {
    let mut observations = Vec::with_capacity(ids.len());

    'tags: for &id in ids {
        let mut points = Vec::with_capacity(5);
        points.push(mosaic.center(id));
        points.extend_from_slice(&mosaic.corners(id));

        let mut pixels = Vec::with_capacity(5);
        for pw in &points {
            let pc: Pt3 = cam_from_mosaic.transform_point(pw);
            if pc.z <= 1e-6 {
                continue 'tags;
            }
            let uv = model.project(&pc);
            if uv.x < 0.0
                || uv.y < 0.0
                || uv.x >= model.width() as Real
                || uv.y >= model.height() as Real
            {
                continue 'tags;
            }
            pixels.push(Pt2::new(uv.x, uv.y));
        }

        observations.push(TagObservation {
            id,
            center: pixels[0],
            corners: [pixels[1], pixels[2], pixels[3], pixels[4]],
        });
    }

    CameraFrame {
        width: model.width(),
        height: model.height(),
        observations,
    }
}

/// Build an [`ImageSet`] from per-camera (model, camera-from-mosaic pose)
/// pairs observing the same mosaic placement.
pub fn observe_mosaic_multi(
    cameras: &[(usize, &CameraModel, Iso3)],
    mosaic: &TagMosaic,
    ids: &[u32],
) -> ImageSet {
    let mut set = ImageSet::new();
    for (camera, model, cam_from_mosaic) in cameras {
        set.insert(*camera, observe_mosaic(model, cam_from_mosaic, mosaic, ids));
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CameraIntrinsics, DistortionModel};

    fn test_model() -> CameraModel {
        CameraModel::new(
            CameraIntrinsics::new(800.0, 800.0, 320.0, 240.0),
            DistortionModel::NoDistortion,
            640,
            480,
        )
    }

    #[test]
    fn observes_centered_mosaic() {
        let model = test_model();
        let mosaic = TagMosaic::new(4, 0.1, 0.08);
        let ids = block_ids(&mosaic, 3);
        // center the 4x3 block in front of the camera
        let pose = Iso3::translation(-0.15, -0.1, 1.0);
        let frame = observe_mosaic(&model, &pose, &mosaic, &ids);
        assert_eq!(frame.len(), ids.len());
        assert_eq!(frame.width, 640);
    }

    #[test]
    fn drops_tags_behind_camera() {
        let model = test_model();
        let mosaic = TagMosaic::new(4, 0.1, 0.08);
        let ids = block_ids(&mosaic, 2);
        let pose = Iso3::translation(0.0, 0.0, -1.0);
        let frame = observe_mosaic(&model, &pose, &mosaic, &ids);
        assert!(frame.is_empty());
    }
}
