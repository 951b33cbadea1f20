// Spray processor
// Owns every derived collection and runs the pipeline stages in order.
// Rerunning a stage clears its own output and everything downstream.

use crate::config::{sanitize_density, sanitize_min_length, SprayConfig};
use crate::extraction::PathExtractor;
use crate::geometry::{BoundingBox, Vector3D};
use crate::kernel::{bounds_of, PatchRef, Shape};
use crate::path::{ConnectionPath, IntegratedTrajectory, SprayPath};
use crate::path_visibility::{PathVisibilityAnalyzer, PathVisibilityInfo, SurfaceLayer};
use crate::planes::{CuttingPlane, SlicePlanner};
use crate::surface_visibility::{PatchVisibility, SurfaceVisibilityAnalyzer};
use crate::trajectory::TrajectoryIntegrator;
use crate::units::{PathLengthStats, UnitReport};
use crate::{Error, Result};
use std::collections::BTreeMap;

/// Summary of a complete pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub patches: usize,
    pub visible_patches: usize,
    pub cutting_planes: usize,
    pub paths: usize,
    pub layers: usize,
    pub trajectories: usize,
}

pub struct SprayProcessor {
    config: SprayConfig,
    shape: Option<Shape>,
    patches: Vec<PatchRef>,

    patch_visibility: Vec<PatchVisibility>,
    visible_patches: Vec<PatchRef>,
    cutting_planes: Vec<CuttingPlane>,
    paths: Vec<SprayPath>,
    connections: Vec<ConnectionPath>,
    trajectories: Vec<IntegratedTrajectory>,
    path_visibility: BTreeMap<usize, PathVisibilityInfo>,
    layers: Vec<SurfaceLayer>,
    unit_report: Option<UnitReport>,
    /// Minimum path length after any unit adjustment
    min_path_length: f64,
}

impl SprayProcessor {
    pub fn new(config: SprayConfig) -> Result<Self> {
        let config = config.validated()?;
        Ok(Self {
            min_path_length: config.min_path_length,
            config,
            shape: None,
            patches: Vec::new(),
            patch_visibility: Vec::new(),
            visible_patches: Vec::new(),
            cutting_planes: Vec::new(),
            paths: Vec::new(),
            connections: Vec::new(),
            trajectories: Vec::new(),
            path_visibility: BTreeMap::new(),
            layers: Vec::new(),
            unit_report: None,
        })
    }

    /// Replace the input model. Every derived collection is cleared.
    pub fn set_shape(&mut self, shape: Shape) {
        self.patches = shape.patches();
        self.shape = Some(shape);
        log::info!("Model set: {} surface patches", self.patches.len());
        self.clear_surface();
    }

    /// Replace the configuration. Every derived collection is cleared.
    pub fn set_config(&mut self, config: SprayConfig) -> Result<()> {
        self.config = config.validated()?;
        self.min_path_length = self.config.min_path_length;
        self.clear_surface();
        Ok(())
    }

    /// Update the slicing parameters. A non-positive density is replaced by
    /// the default with a warning.
    pub fn set_cutting_parameters(
        &mut self,
        direction: Vector3D,
        spacing: f64,
        offset: f64,
        density: f64,
    ) -> Result<()> {
        let config = SprayConfig {
            spray_direction: direction,
            plane_spacing: spacing,
            offset_distance: offset,
            point_density: sanitize_density(density),
            ..self.config.clone()
        };
        self.set_config(config)
    }

    /// Takes effect on the next path generation. Negative values are clamped to 0.
    pub fn set_min_path_length(&mut self, min_length: f64) {
        let min_length = sanitize_min_length(min_length);
        self.config.min_path_length = min_length;
        self.min_path_length = min_length;
    }

    pub fn analyze_surface_visibility(&mut self) -> Result<()> {
        self.clear_surface();
        if self.shape.as_ref().map_or(true, Shape::is_empty) {
            log::error!("No model loaded or model has no surface patches");
            return Err(Error::EmptyModel);
        }

        let result = SurfaceVisibilityAnalyzer::new(&self.config).analyze(&self.patches)?;
        self.patch_visibility = result.records;
        self.visible_patches = result.visible_patches;
        Ok(())
    }

    pub fn generate_cutting_planes(&mut self) -> Result<()> {
        self.clear_planes();
        if self.visible_patches.is_empty() {
            return Err(Error::StageOrder(
                "no visible patches; analyze surface visibility first".to_string(),
            ));
        }

        self.cutting_planes = SlicePlanner::new(&self.config).plan(&self.visible_patches)?;
        Ok(())
    }

    /// Extract spray paths. Cutting planes are generated first if missing.
    pub fn generate_paths(&mut self) -> Result<()> {
        if self.visible_patches.is_empty() {
            self.clear_paths();
            return Err(Error::StageOrder(
                "no visible patches; analyze surface visibility first".to_string(),
            ));
        }
        if self.cutting_planes.is_empty() {
            self.generate_cutting_planes()?;
        }
        self.clear_paths();
        self.min_path_length = self.config.min_path_length;

        let extraction = PathExtractor::new(&self.config).extract(&self.visible_patches, &self.cutting_planes)?;
        self.paths = extraction.paths;
        self.unit_report = extraction.unit_report;
        self.min_path_length = extraction.min_path_length;
        Ok(())
    }

    pub fn integrate_trajectories(&mut self) -> Result<()> {
        self.clear_trajectories();
        if self.paths.is_empty() {
            return Err(Error::StageOrder("no paths; generate paths first".to_string()));
        }

        let integration = TrajectoryIntegrator::new(&self.config).integrate(&mut self.paths)?;
        self.trajectories = integration.trajectories;
        self.connections = integration.connections;
        Ok(())
    }

    /// Refine paths by mutual occlusion and rebuild trajectories from the
    /// nearest surface layer.
    pub fn analyze_path_visibility(&mut self) -> Result<()> {
        if self.paths.is_empty() {
            return Err(Error::StageOrder("no paths; generate paths first".to_string()));
        }
        self.path_visibility.clear();
        self.layers.clear();

        let analyzer = PathVisibilityAnalyzer::new(&self.config, self.min_path_length);
        let result = analyzer.analyze(&self.paths)?;

        self.paths = result.paths;
        self.path_visibility = result.visibility;
        self.layers = result.layers;
        self.trajectories = result.integration.trajectories;
        self.connections = result.integration.connections;
        Ok(())
    }

    /// Run all five stages in order.
    pub fn run(&mut self) -> Result<RunSummary> {
        self.analyze_surface_visibility()?;
        self.generate_cutting_planes()?;
        self.generate_paths()?;
        self.integrate_trajectories()?;
        self.analyze_path_visibility()?;

        let summary = RunSummary {
            patches: self.patches.len(),
            visible_patches: self.visible_patches.len(),
            cutting_planes: self.cutting_planes.len(),
            paths: self.paths.len(),
            layers: self.layers.len(),
            trajectories: self.trajectories.len(),
        };
        log::info!("Pipeline complete: {:?}", summary);
        Ok(summary)
    }

    /// Drop paths and everything derived from them.
    pub fn clear_paths(&mut self) {
        self.paths.clear();
        self.unit_report = None;
        self.clear_trajectories();
    }

    fn clear_trajectories(&mut self) {
        self.trajectories.clear();
        self.connections.clear();
        self.path_visibility.clear();
        self.layers.clear();
    }

    fn clear_planes(&mut self) {
        self.cutting_planes.clear();
        self.clear_paths();
    }

    fn clear_surface(&mut self) {
        self.patch_visibility.clear();
        self.visible_patches.clear();
        self.clear_planes();
    }

    pub fn config(&self) -> &SprayConfig {
        &self.config
    }

    pub fn shape(&self) -> Option<&Shape> {
        self.shape.as_ref()
    }

    pub fn patches(&self) -> &[PatchRef] {
        &self.patches
    }

    pub fn patch_visibility(&self) -> &[PatchVisibility] {
        &self.patch_visibility
    }

    pub fn visible_patches(&self) -> &[PatchRef] {
        &self.visible_patches
    }

    /// Bounds of the working patch set; void before surface analysis.
    pub fn working_bounds(&self) -> BoundingBox {
        bounds_of(&self.visible_patches)
    }

    pub fn cutting_planes(&self) -> &[CuttingPlane] {
        &self.cutting_planes
    }

    pub fn paths(&self) -> &[SprayPath] {
        &self.paths
    }

    pub fn connections(&self) -> &[ConnectionPath] {
        &self.connections
    }

    pub fn trajectories(&self) -> &[IntegratedTrajectory] {
        &self.trajectories
    }

    pub fn path_visibility(&self) -> &BTreeMap<usize, PathVisibilityInfo> {
        &self.path_visibility
    }

    pub fn surface_layers(&self) -> &[SurfaceLayer] {
        &self.layers
    }

    pub fn unit_report(&self) -> Option<&UnitReport> {
        self.unit_report.as_ref()
    }

    pub fn min_path_length(&self) -> f64 {
        self.min_path_length
    }

    pub fn path_length_stats(&self) -> Option<PathLengthStats> {
        PathLengthStats::from_paths(&self.paths, self.min_path_length)
    }
}
