//! Calibration export.
//!
//! Renders the calibrated cameras as a human-readable named text block. The
//! exported extrinsics are the **global-to-camera** transform, the inverse
//! of the optimizer's camera-to-root state. Downstream consumers assume this
//! direction; exporting the un-inverted pose silently flips every projection
//! they compute.

use tagcal_core::{CameraModel, PoseXyzRpy};

use crate::system::CameraCalibrationSystem;

/// Deterministic full-precision cache key for a camera model plus transform.
///
/// Equal configurations always produce byte-identical strings; use as a
/// memoization key for derived artifacts (e.g. rectification lookup tables).
pub fn view_cache_string(model: &CameraModel, cam_to_root: &PoseXyzRpy) -> String {
    format!(
        "{} pose {:.12} {:.12} {:.12} {:.12} {:.12} {:.12}",
        model.cache_string(),
        cam_to_root.x,
        cam_to_root.y,
        cam_to_root.z,
        cam_to_root.roll,
        cam_to_root.pitch,
        cam_to_root.yaw
    )
}

/// Render every initialized camera as a named calibration block.
///
/// Cameras appear in index order; floats use fixed 12-decimal formatting so
/// equal calibrations produce byte-identical blocks.
pub fn calibration_block(system: &CameraCalibrationSystem) -> String {
    let mut out = String::from("calibration {\n");

    for wrapper in system.cameras() {
        let Some(model) = system.camera_model(wrapper.index) else {
            continue;
        };
        let cam_to_root = system
            .camera_to_root(wrapper.index)
            .unwrap_or_else(PoseXyzRpy::identity);
        // load-bearing inversion: export direction is global -> camera
        let global_to_camera = cam_to_root.inverse();

        out.push_str(&format!("  camera{} {{\n", wrapper.index));
        out.push_str(&format!("    model = {};\n", model.kind().name()));
        out.push_str(&format!("    width = {};\n", model.width()));
        out.push_str(&format!("    height = {};\n", model.height()));

        out.push_str("    params = [");
        for (i, p) in model.param_vector().iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&format!(" {:.12}", p));
        }
        out.push_str(" ];\n");

        out.push_str(&format!(
            "    position = [ {:.12}, {:.12}, {:.12} ];\n",
            global_to_camera.x, global_to_camera.y, global_to_camera.z
        ));
        out.push_str(&format!(
            "    rollpitchyaw_degrees = [ {:.12}, {:.12}, {:.12} ];\n",
            global_to_camera.roll.to_degrees(),
            global_to_camera.pitch.to_degrees(),
            global_to_camera.yaw.to_degrees()
        ));
        out.push_str(&format!("    root = {};\n", wrapper.root));
        out.push_str("  }\n");
    }

    out.push_str("}\n");
    out
}

/// Format a single pose as `position` + `roll/pitch/yaw degrees` lines, the
/// same convention the calibration block uses.
pub fn format_pose_degrees(pose: &PoseXyzRpy) -> String {
    format!(
        "position = [ {:.12}, {:.12}, {:.12} ]; rollpitchyaw_degrees = [ {:.12}, {:.12}, {:.12} ];",
        pose.x,
        pose.y,
        pose.z,
        pose.roll.to_degrees(),
        pose.pitch.to_degrees(),
        pose.yaw.to_degrees()
    )
}
