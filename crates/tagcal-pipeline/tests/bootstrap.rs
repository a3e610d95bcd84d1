//! End-to-end bootstrap scenarios on synthetic detections.

use approx::assert_relative_eq;
use nalgebra::{Rotation3, Translation3};
use tagcal_core::{
    synthetic::{block_ids, observe_mosaic},
    CameraIntrinsics, CameraModel, DistortionModel, ImageSet, Iso3, ModelKind, PoseXyzRpy,
    TagMosaic,
};
use tagcal_pipeline::{export, BootstrapConfig, CameraCalibrationSystem};

fn gt_model() -> CameraModel {
    CameraModel::new(
        CameraIntrinsics::new(800.0, 800.0, 320.0, 240.0),
        DistortionModel::NoDistortion,
        640,
        480,
    )
}

fn mosaic() -> TagMosaic {
    TagMosaic::new(6, 0.08, 0.06)
}

fn no_distortion_config() -> BootstrapConfig {
    BootstrapConfig {
        model_kind: ModelKind::NoDistortion,
        ..Default::default()
    }
}

/// Camera-from-mosaic pose keeping the full 6x4 block in frame.
fn view_pose(roll: f64, pitch: f64, yaw: f64) -> Iso3 {
    let rot = Rotation3::from_euler_angles(roll, pitch, yaw);
    Iso3::from_parts(Translation3::new(-0.2, -0.12, 1.3), rot.into())
}

fn single_camera_set(model: &CameraModel, cam_from_mosaic: &Iso3) -> ImageSet {
    let mosaic = mosaic();
    let ids = block_ids(&mosaic, 4);
    let mut set = ImageSet::new();
    set.insert(0, observe_mosaic(model, cam_from_mosaic, &mosaic, &ids));
    set
}

fn pose_close(a: &Iso3, b: &Iso3, tol: f64) -> bool {
    (a.translation.vector - b.translation.vector).norm() < tol
        && a.rotation.angle_to(&b.rotation) < tol
}

#[test]
fn single_camera_bootstrap_initializes_and_converges() {
    let model = gt_model();
    let mut system = CameraCalibrationSystem::new(mosaic(), no_distortion_config());

    system.process_image_set(single_camera_set(&model, &view_pose(0.25, 0.1, 0.0)));

    // intrinsics promoted after the first qualifying image set
    let cam = system.camera(0).expect("camera registered");
    assert!(cam.has_intrinsics(), "intrinsics not initialized");
    assert_eq!(cam.root, 0);
    assert!(
        system.mosaic_wrapper(0).unwrap().nodes_by_root.contains_key(&0),
        "first mosaic placement not posed"
    );

    system.process_image_set(single_camera_set(&model, &view_pose(-0.2, 0.22, 0.1)));
    system.process_image_set(single_camera_set(&model, &view_pose(0.15, -0.25, -0.05)));

    let report = system.refine().expect("refine");
    assert!(report.converged, "solver did not converge: {:?}", report);
    assert!(
        report.mean_error < 0.1,
        "mean reprojection error too high: {}",
        report.mean_error
    );

    // the root camera pins the gauge at identity
    let cam_to_root = system.camera_to_root(0).unwrap();
    assert!(pose_close(
        &cam_to_root.to_iso3(),
        &Iso3::identity(),
        1e-12
    ));

    let fx = system.camera_model(0).unwrap().intrinsics().fx;
    assert_relative_eq!(fx, 800.0, epsilon = 0.5);
}

#[test]
fn shared_mosaic_observation_merges_subsystems() {
    let model = gt_model();
    let grid = mosaic();
    let ids = block_ids(&grid, 4);

    // camera 1 sits 0.25 m to the +x of camera 0
    let cam1_to_cam0 = Iso3::translation(0.25, 0.0, 0.0);

    // set 0: only camera 0 sees a mosaic placement
    let mut set0 = ImageSet::new();
    set0.insert(0, observe_mosaic(&model, &view_pose(0.2, 0.1, 0.0), &grid, &ids));

    // set 1: only camera 1 sees a different placement
    let mut set1 = ImageSet::new();
    set1.insert(1, observe_mosaic(&model, &view_pose(-0.15, 0.2, 0.05), &grid, &ids));

    // set 2: both cameras observe the same placement
    let cam0_from_shared = view_pose(0.15, -0.2, 0.05);
    let cam1_from_shared = cam1_to_cam0.inverse() * cam0_from_shared;
    let mut set2 = ImageSet::new();
    set2.insert(0, observe_mosaic(&model, &cam0_from_shared, &grid, &ids));
    set2.insert(1, observe_mosaic(&model, &cam1_from_shared, &grid, &ids));

    let mut system = CameraCalibrationSystem::new(grid, no_distortion_config());
    system.process_image_set(set0);
    system.process_image_set(set1);

    // two independent subsystems so far
    assert_eq!(system.camera(0).unwrap().root, 0);
    assert_eq!(system.camera(1).unwrap().root, 1);

    system.process_image_set(set2);

    // the shared placement merged camera 1 into root 0
    assert_eq!(system.camera(0).unwrap().root, 0);
    assert_eq!(system.camera(1).unwrap().root, 0);

    // camera 1's camera-to-root transform is exactly the composition
    // predicted by the two recorded mosaic poses
    let cam1_to_root = system.camera_to_root(1).unwrap().to_iso3();
    assert!(
        pose_close(&cam1_to_root, &cam1_to_cam0, 1e-6),
        "merged transform wrong: {:?}",
        cam1_to_root
    );

    // every placement is now expressed in root 0 only
    for set_idx in 0..system.num_image_sets() {
        let wrapper = system.mosaic_wrapper(set_idx).unwrap();
        let roots: Vec<usize> = wrapper.nodes_by_root.keys().copied().collect();
        assert_eq!(roots, vec![0], "set {} roots: {:?}", set_idx, roots);
    }

    // and the merged graph still refines cleanly
    let report = system.refine().expect("refine");
    assert!(
        report.mean_error < 0.1,
        "mean reprojection error too high: {}",
        report.mean_error
    );
}

#[test]
fn insufficient_detections_change_nothing() {
    let model = gt_model();
    let grid = mosaic();

    // 3 tags in a single row: below the count threshold and without the
    // 2-row/2-column spread
    let mut set = ImageSet::new();
    set.insert(0, observe_mosaic(&model, &view_pose(0.2, 0.1, 0.0), &grid, &[0, 1, 2]));

    let mut system = CameraCalibrationSystem::new(grid, no_distortion_config());
    system.process_image_set(set);

    let cam = system.camera(0).expect("camera registered");
    assert!(!cam.has_intrinsics());
    assert!(system.mosaic_wrapper(0).unwrap().nodes_by_root.is_empty());
    assert_eq!(system.builder().graph().num_nodes(), 0);
    assert_eq!(system.builder().graph().num_edges(), 0);
    assert!(system.error_stats().is_none());
}

#[test]
fn export_uses_global_to_camera_direction() {
    let model = gt_model();
    let grid = mosaic();
    let ids = block_ids(&grid, 4);

    let cam1_to_cam0 = Iso3::translation(0.25, 0.0, 0.0);
    let cam0_from_shared = view_pose(0.15, -0.2, 0.05);
    let cam1_from_shared = cam1_to_cam0.inverse() * cam0_from_shared;

    let mut set0 = ImageSet::new();
    set0.insert(0, observe_mosaic(&model, &view_pose(0.2, 0.1, 0.0), &grid, &ids));
    let mut set1 = ImageSet::new();
    set1.insert(1, observe_mosaic(&model, &view_pose(-0.15, 0.2, 0.05), &grid, &ids));
    let mut set2 = ImageSet::new();
    set2.insert(0, observe_mosaic(&model, &cam0_from_shared, &grid, &ids));
    set2.insert(1, observe_mosaic(&model, &cam1_from_shared, &grid, &ids));

    let mut system = CameraCalibrationSystem::new(grid, no_distortion_config());
    system.process_image_set(set0);
    system.process_image_set(set1);
    system.process_image_set(set2);

    let block = export::calibration_block(&system);
    assert!(block.contains("camera0 {"), "block:\n{}", block);
    assert!(block.contains("camera1 {"), "block:\n{}", block);
    assert!(block.contains("model = NoDistortion;"));

    // camera 1 sits at +0.25 x in the root frame, so the exported
    // global-to-camera position must carry the inverted (negative) offset
    let exported = system.camera_to_root(1).unwrap().inverse();
    assert!(
        (exported.x - (-0.25)).abs() < 1e-6,
        "inversion missing: exported x = {}",
        exported.x
    );
    assert!(
        block.contains("position = [ -0.2"),
        "inverted position not in block:\n{}",
        block
    );

    // byte-identical on repeated export
    assert_eq!(block, export::calibration_block(&system));
}
