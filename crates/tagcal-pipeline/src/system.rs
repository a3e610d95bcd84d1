//! Topological bootstrap over cameras and mosaic placements.
//!
//! Every camera starts as the root of its own single-camera subsystem. As
//! image sets arrive, three passes run to a fixed point per batch:
//!
//! 1. **Intrinsics**: cameras with enough usable detections get a
//!    vanishing-point intrinsics estimate and enter the graph.
//! 2. **Mosaic extrinsics**: each (mosaic placement, camera) pair with known
//!    intrinsics gets a homography-decomposed mosaic pose, recorded against
//!    the camera's current root. A placement may be recorded against several
//!    disconnected roots at once.
//! 3. **Merge**: a placement recorded against two roots is the evidence
//!    that those subsystems share geometry: the numerically lowest root id
//!    survives and everything in the losing root is remapped through the
//!    placement's two recorded poses.
//!
//! Each step's output is exactly the next step's precondition, so no pass
//! iterates internally. Insufficient data at any point is a skip, never an
//! error; the same camera is retried on every subsequent batch.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use tagcal_core::{
    CameraFrame, CameraIntrinsics, CameraModel, DistortionModel, ImageSet, Iso3, ModelKind,
    PoseXyzRpy, Pt2, Real, TagMosaic,
};
use tagcal_graph::{GaussNewton, SolveReport};
use tagcal_linear::{dlt_homography, estimate_intrinsics_from_frames, pose_from_homography};

use crate::builder::GraphBuilder;
use crate::BootstrapConfig;

/// Per-camera bootstrap state. Created on first sighting; never destroyed.
#[derive(Debug, Clone)]
pub struct CameraWrapper {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    /// Root camera id of the subsystem this camera belongs to.
    pub root: usize,
    pub intrinsics_node: Option<usize>,
    pub extrinsics_node: Option<usize>,
}

impl CameraWrapper {
    fn new(index: usize, width: u32, height: u32) -> Self {
        Self {
            index,
            width,
            height,
            root: index,
            intrinsics_node: None,
            extrinsics_node: None,
        }
    }

    pub fn has_intrinsics(&self) -> bool {
        self.intrinsics_node.is_some()
    }
}

/// Per-image-set bootstrap state: the mosaic placement's live pose nodes,
/// keyed by the root frame each pose is expressed in.
#[derive(Debug, Clone, Default)]
pub struct MosaicWrapper {
    pub nodes_by_root: BTreeMap<usize, usize>,
}

/// The calibration system: wrappers, graph and solver.
pub struct CameraCalibrationSystem {
    config: BootstrapConfig,
    builder: GraphBuilder,
    solver: GaussNewton,
    image_sets: Vec<ImageSet>,
    cameras: BTreeMap<usize, CameraWrapper>,
    mosaics: Vec<MosaicWrapper>,
    edges_created: BTreeSet<(usize, usize)>,
}

impl CameraCalibrationSystem {
    pub fn new(mosaic: TagMosaic, config: BootstrapConfig) -> Self {
        Self {
            config,
            builder: GraphBuilder::new(mosaic),
            solver: GaussNewton::new(),
            image_sets: Vec::new(),
            cameras: BTreeMap::new(),
            mosaics: Vec::new(),
            edges_created: BTreeSet::new(),
        }
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    pub fn builder(&self) -> &GraphBuilder {
        &self.builder
    }

    pub fn camera(&self, index: usize) -> Option<&CameraWrapper> {
        self.cameras.get(&index)
    }

    pub fn cameras(&self) -> impl Iterator<Item = &CameraWrapper> {
        self.cameras.values()
    }

    pub fn mosaic_wrapper(&self, set: usize) -> Option<&MosaicWrapper> {
        self.mosaics.get(set)
    }

    pub fn num_image_sets(&self) -> usize {
        self.image_sets.len()
    }

    /// Current camera model of an initialized camera.
    pub fn camera_model(&self, index: usize) -> Option<&CameraModel> {
        self.builder.camera_model(index)
    }

    /// Current camera-to-root transform of an initialized camera.
    pub fn camera_to_root(&self, index: usize) -> Option<PoseXyzRpy> {
        self.builder.camera_to_root(index)
    }

    /// Mean and max reprojection error over the whole graph.
    pub fn error_stats(&self) -> Option<(Real, Real)> {
        self.builder.graph().error_stats()
    }

    /// Ingest one image set and advance the bootstrap.
    pub fn process_image_set(&mut self, set: ImageSet) {
        for (&camera, frame) in &set.frames {
            self.cameras
                .entry(camera)
                .or_insert_with(|| CameraWrapper::new(camera, frame.width, frame.height));
        }
        self.mosaics.push(MosaicWrapper::default());
        self.image_sets.push(set);

        self.intrinsics_step();
        self.mosaic_extrinsics_step();
        self.merge_step();
    }

    /// Refine the graph and, on a poor fit, retry from fresh linear seeds
    /// keeping whichever solution has the smaller mean reprojection error.
    pub fn refine(&mut self) -> Result<SolveReport> {
        let opts = self.config.solve_options();
        let report = self
            .solver
            .iterate_until_convergence(self.builder.graph_mut(), &opts)?;

        if report.mean_error <= self.config.reinit_threshold_px {
            return Ok(report);
        }

        log::info!(
            "refine plateaued at {:.3} px mean error, retrying from fresh linear seeds",
            report.mean_error
        );
        let snapshot = self.snapshot();
        self.reseed_from_linear();
        match self
            .solver
            .iterate_until_convergence(self.builder.graph_mut(), &opts)
        {
            Ok(fresh) if fresh.mean_error < report.mean_error => {
                log::info!(
                    "re-seeded solve improved mean error: {:.3} -> {:.3} px",
                    report.mean_error,
                    fresh.mean_error
                );
                Ok(fresh)
            }
            _ => {
                self.restore(snapshot);
                Ok(report)
            }
        }
    }

    // ── pass 1: intrinsics ──────────────────────────────────────────────

    fn intrinsics_step(&mut self) {
        let pending: Vec<usize> = self
            .cameras
            .values()
            .filter(|c| !c.has_intrinsics())
            .map(|c| c.index)
            .collect();

        for camera in pending {
            let mosaic = *self.builder.mosaic();
            let usable: Vec<&CameraFrame> = self
                .image_sets
                .iter()
                .filter_map(|set| set.frame(camera))
                .filter(|frame| frame.spans_mosaic(&mosaic, self.config.min_tags_per_frame))
                .collect();
            if usable.is_empty() {
                continue;
            }

            let Some(k) = estimate_intrinsics_from_frames(&usable, &mosaic) else {
                log::debug!(
                    "camera {}: no usable vanishing points in {} frame(s) yet",
                    camera,
                    usable.len()
                );
                continue;
            };

            let wrapper = &self.cameras[&camera];
            let model = seed_model(self.config.model_kind, k, wrapper.width, wrapper.height)
                .with_rectify_iterations(self.config.rectify_iterations);
            let intr = self.builder.add_camera_intrinsics(camera, model);
            // every camera starts as its own root; the identity extrinsics
            // node is held fixed to pin the subsystem's gauge
            let extr = self.builder.add_camera_extrinsics(camera, PoseXyzRpy::identity());
            self.builder.graph_mut().fix_node(extr);

            let wrapper = self.cameras.get_mut(&camera).unwrap();
            wrapper.intrinsics_node = Some(intr);
            wrapper.extrinsics_node = Some(extr);
            log::info!(
                "camera {}: intrinsics initialized (fx={:.1}, fy={:.1}) from {} frame(s)",
                camera,
                k.fx,
                k.fy,
                usable.len()
            );
        }
    }

    // ── pass 2: mosaic extrinsics + edges ───────────────────────────────

    fn mosaic_extrinsics_step(&mut self) {
        for set_idx in 0..self.image_sets.len() {
            let cameras: Vec<usize> = self.image_sets[set_idx].cameras().collect();
            for camera in cameras {
                let wrapper = &self.cameras[&camera];
                let (Some(intr_node), Some(extr_node)) =
                    (wrapper.intrinsics_node, wrapper.extrinsics_node)
                else {
                    continue;
                };
                let root = wrapper.root;

                let frame = self.image_sets[set_idx].frame(camera).unwrap();
                let mosaic = *self.builder.mosaic();
                if !frame.spans_mosaic(&mosaic, self.config.min_tags_per_frame) {
                    continue;
                }

                if !self.mosaics[set_idx].nodes_by_root.contains_key(&root) {
                    if let Some(pose) = self.estimate_mosaic_pose(camera, intr_node, set_idx) {
                        let node = self.builder.add_mosaic_extrinsics(set_idx, root, pose);
                        self.mosaics[set_idx].nodes_by_root.insert(root, node);
                        log::debug!(
                            "image set {}: mosaic posed against root {} via camera {}",
                            set_idx,
                            root,
                            camera
                        );
                    }
                }

                if !self.edges_created.contains(&(camera, set_idx)) {
                    if let Some(&mosaic_node) = self.mosaics[set_idx].nodes_by_root.get(&root) {
                        let frame = self.image_sets[set_idx].frame(camera).unwrap().clone();
                        self.builder.add_reprojection_edge(
                            intr_node,
                            Some(extr_node),
                            mosaic_node,
                            &frame,
                        );
                        self.edges_created.insert((camera, set_idx));
                    }
                }
            }
        }
    }

    /// Mosaic-to-root pose of one image set as seen by one camera:
    /// homography on rectified pixels, decomposed and composed with the
    /// camera's current camera-to-root transform.
    fn estimate_mosaic_pose(
        &self,
        camera: usize,
        intr_node: usize,
        set_idx: usize,
    ) -> Option<PoseXyzRpy> {
        let mosaic = *self.builder.mosaic();
        let frame = self.image_sets[set_idx].frame(camera)?;
        let model = self.builder.graph().node(intr_node).as_intrinsics()?;

        let (world, image) = frame.planar_correspondences(&mosaic);
        let rectified: Vec<Pt2> = image
            .iter()
            .map(|px| {
                let r = model.rectify(&px.coords);
                Pt2::new(r.x, r.y)
            })
            .collect();

        let h = match dlt_homography(&world, &rectified) {
            Ok(h) => h,
            Err(err) => {
                log::debug!("image set {}: homography failed: {}", set_idx, err);
                return None;
            }
        };

        // disambiguate the decomposition sign with the observed tag centroid
        let inv_n = 1.0 / world.len() as Real;
        let centroid = Pt2::new(
            world.iter().map(|p| p.x).sum::<Real>() * inv_n,
            world.iter().map(|p| p.y).sum::<Real>() * inv_n,
        );
        let mosaic_to_cam =
            pose_from_homography(&model.intrinsics().k_matrix(), &h, &centroid);

        let cam_to_root = self
            .builder
            .camera_to_root(camera)
            .map(|p| p.to_iso3())
            .unwrap_or_else(Iso3::identity);
        Some(PoseXyzRpy::from_iso3(&(cam_to_root * mosaic_to_cam)))
    }

    // ── pass 3: subsystem merge ─────────────────────────────────────────

    fn merge_step(&mut self) {
        for set_idx in 0..self.mosaics.len() {
            while self.mosaics[set_idx].nodes_by_root.len() >= 2 {
                let mut roots = self.mosaics[set_idx].nodes_by_root.keys().copied();
                // lowest root id survives (kept for compatibility; an
                // error-weighted choice would be a possible refinement)
                let surviving = roots.next().unwrap();
                let losing = roots.next().unwrap();
                drop(roots);

                let pose_surv = self
                    .builder
                    .node_pose(self.mosaics[set_idx].nodes_by_root[&surviving])
                    .to_iso3();
                let pose_lose = self
                    .builder
                    .node_pose(self.mosaics[set_idx].nodes_by_root[&losing])
                    .to_iso3();
                let losing_to_surviving = pose_surv * pose_lose.inverse();

                log::info!(
                    "image set {} links roots {} and {}; merging {} into {}",
                    set_idx,
                    surviving,
                    losing,
                    losing,
                    surviving
                );
                self.apply_merge(losing, surviving, &losing_to_surviving);
            }
        }
    }

    /// Remap everything expressed in `losing` into `surviving` via the
    /// shared-mosaic transform, and re-root the losing subsystem's cameras.
    fn apply_merge(&mut self, losing: usize, surviving: usize, losing_to_surviving: &Iso3) {
        // (a) every mosaic pose recorded in the losing root
        for wrapper in &mut self.mosaics {
            let Some(node) = wrapper.nodes_by_root.remove(&losing) else {
                continue;
            };
            let remapped =
                PoseXyzRpy::from_iso3(&(losing_to_surviving * self.builder.node_pose(node).to_iso3()));
            self.builder.set_node_pose(node, &remapped);

            match wrapper.nodes_by_root.get(&surviving) {
                None => {
                    wrapper.nodes_by_root.insert(surviving, node);
                }
                Some(&existing) => {
                    // both recordings now share a root: collapse onto one
                    // live node, re-point the stale node's edges at it and
                    // park the stale node (it stays in the graph, fixed)
                    let live = existing.min(node);
                    let stale = existing.max(node);
                    self.builder.graph_mut().remap_edges(stale, live);
                    self.builder.graph_mut().fix_node(stale);
                    wrapper.nodes_by_root.insert(surviving, live);
                }
            }
        }

        // (b) every camera rooted at the losing root
        for camera in self.cameras.values_mut() {
            if camera.root != losing {
                continue;
            }
            camera.root = surviving;
            if let Some(node) = camera.extrinsics_node {
                if self.builder.graph().is_fixed(node) {
                    // this camera was the losing subsystem's root; it now
                    // becomes an ordinary optimizable camera
                    self.builder.graph_mut().unfix_node(node);
                }
                let remapped = PoseXyzRpy::from_iso3(
                    &(losing_to_surviving * self.builder.node_pose(node).to_iso3()),
                );
                self.builder.set_node_pose(node, &remapped);
            }
        }
    }

    // ── reinitialization heuristic ──────────────────────────────────────

    fn snapshot(&self) -> Vec<nalgebra::DVector<Real>> {
        (0..self.builder.graph().num_nodes())
            .map(|idx| self.builder.graph().node(idx).params())
            .collect()
    }

    fn restore(&mut self, snapshot: Vec<nalgebra::DVector<Real>>) {
        for (idx, params) in snapshot.into_iter().enumerate() {
            self.builder.graph_mut().node_mut(idx).set_params(&params);
        }
    }

    /// Overwrite node states with fresh closed-form estimates: intrinsics
    /// from vanishing points, mosaic poses from homography decomposition.
    /// Camera-to-root transforms are left as they are (they encode merge
    /// history that has no cheap linear re-estimate).
    fn reseed_from_linear(&mut self) {
        let mosaic = *self.builder.mosaic();
        let camera_ids: Vec<usize> = self.cameras.keys().copied().collect();

        for camera in camera_ids {
            let wrapper = &self.cameras[&camera];
            if !wrapper.has_intrinsics() {
                continue;
            }
            let usable: Vec<&CameraFrame> = self
                .image_sets
                .iter()
                .filter_map(|set| set.frame(camera))
                .filter(|frame| frame.spans_mosaic(&mosaic, self.config.min_tags_per_frame))
                .collect();
            if let Some(k) = estimate_intrinsics_from_frames(&usable, &mosaic) {
                let model = seed_model(self.config.model_kind, k, wrapper.width, wrapper.height)
                    .with_rectify_iterations(self.config.rectify_iterations);
                self.builder.set_camera_model(camera, &model);
            }
        }

        for set_idx in 0..self.mosaics.len() {
            let entries: Vec<(usize, usize)> = self.mosaics[set_idx]
                .nodes_by_root
                .iter()
                .map(|(&root, &node)| (root, node))
                .collect();
            for (root, node) in entries {
                // re-estimate through any initialized camera of this root
                // that usably observes the set
                let candidate = self.cameras.values().find(|c| {
                    c.root == root
                        && c.has_intrinsics()
                        && self.image_sets[set_idx]
                            .frame(c.index)
                            .is_some_and(|f| f.spans_mosaic(&mosaic, self.config.min_tags_per_frame))
                });
                let Some(candidate) = candidate else { continue };
                let (camera, intr_node) = (candidate.index, candidate.intrinsics_node.unwrap());
                if let Some(pose) = self.estimate_mosaic_pose(camera, intr_node, set_idx) {
                    self.builder.set_node_pose(node, &pose);
                }
            }
        }
    }
}

/// Build the bootstrap seed model: estimated pinhole intrinsics with all
/// distortion coefficients starting at zero.
fn seed_model(kind: ModelKind, k: CameraIntrinsics, width: u32, height: u32) -> CameraModel {
    let distortion = match kind {
        ModelKind::NoDistortion => DistortionModel::NoDistortion,
        ModelKind::SimpleRadial => DistortionModel::SimpleRadial { k1: 0.0, k2: 0.0 },
        ModelKind::RadialTangential => DistortionModel::RadialTangential {
            k1: 0.0,
            k2: 0.0,
            p1: 0.0,
            p2: 0.0,
            k3: 0.0,
        },
    };
    CameraModel::new(k, distortion, width, height)
}
