//! Synthetic two-camera calibration, end to end.
//!
//! Simulates a rig of two cameras observing a tag mosaic: each camera first
//! sees the target alone, then both see the same placement, which merges the
//! two subsystems into one root frame. Run with `RUST_LOG=info` to watch the
//! bootstrap decisions.

use anyhow::Result;
use nalgebra::{Rotation3, Translation3};
use tagcal::core::synthetic::{block_ids, observe_mosaic};
use tagcal::pipeline::export;
use tagcal::prelude::*;

fn view_pose(roll: f64, pitch: f64, yaw: f64) -> Iso3 {
    let rot = Rotation3::from_euler_angles(roll, pitch, yaw);
    Iso3::from_parts(Translation3::new(-0.2, -0.12, 1.3), rot.into())
}

fn main() -> Result<()> {
    env_logger::init();

    let mosaic = TagMosaic::new(6, 0.08, 0.06);
    let ids = block_ids(&mosaic, 4);

    let camera = CameraModel::new(
        CameraIntrinsics::new(800.0, 800.0, 320.0, 240.0),
        DistortionModel::NoDistortion,
        640,
        480,
    );
    // camera 1 sits 0.25 m to the right of camera 0
    let cam1_to_cam0 = Iso3::translation(0.25, 0.0, 0.0);

    let mut system = CameraCalibrationSystem::new(
        mosaic,
        BootstrapConfig {
            model_kind: ModelKind::NoDistortion,
            ..Default::default()
        },
    );

    // each camera alone
    let mut set = ImageSet::new();
    set.insert(0, observe_mosaic(&camera, &view_pose(0.2, 0.1, 0.0), &mosaic, &ids));
    system.process_image_set(set);

    let mut set = ImageSet::new();
    set.insert(1, observe_mosaic(&camera, &view_pose(-0.15, 0.2, 0.05), &mosaic, &ids));
    system.process_image_set(set);

    // a placement both cameras see: links the two subsystems
    let cam0_from_shared = view_pose(0.15, -0.2, 0.05);
    let cam1_from_shared = cam1_to_cam0.inverse() * cam0_from_shared;
    let mut set = ImageSet::new();
    set.insert(0, observe_mosaic(&camera, &cam0_from_shared, &mosaic, &ids));
    set.insert(1, observe_mosaic(&camera, &cam1_from_shared, &mosaic, &ids));
    system.process_image_set(set);

    let report = system.refine()?;
    println!(
        "refined in {} iteration(s): mean {:.4} px, max {:.4} px",
        report.iterations, report.mean_error, report.max_error
    );

    print!("{}", export::calibration_block(&system));
    Ok(())
}
