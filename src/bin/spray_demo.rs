// Spray planning demo
// Plans paths over a base plate with a raised pad and optionally writes the
// render scene as JSON.
//
// Usage: spray_demo [scene.json] [config.json]

use spray_planner::render::RenderScene;
use spray_planner::{MeshPatch, Point3D, Result, Shape, SprayConfig, SprayProcessor, Vector3D};
use std::env;
use std::fs;

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args: Vec<String> = env::args().collect();
    let scene_path = args.get(1);

    let config = match args.get(2) {
        Some(path) => {
            log::info!("Loading configuration from {}", path);
            SprayConfig::from_json(&fs::read_to_string(path)?)?
        }
        None => SprayConfig {
            plane_spacing: 10.0,
            offset_distance: 5.0,
            point_density: 1.0,
            min_path_length: 20.0,
            ..Default::default()
        },
    };

    log::info!("Step 1: Building demo model...");
    let shape = demo_shape()?;
    log::info!("  Model has {} surface patches", shape.patches().len());

    log::info!("Step 2: Planning spray paths...");
    let mut processor = SprayProcessor::new(config)?;
    processor.set_shape(shape);
    let summary = processor.run()?;

    log::info!("Step 3: Results");
    log::info!("  Visible patches: {}/{}", summary.visible_patches, summary.patches);
    log::info!("  Cutting planes: {}", summary.cutting_planes);
    log::info!("  Paths: {}", summary.paths);
    log::info!("  Surface layers: {}", summary.layers);
    for layer in processor.surface_layers() {
        log::info!(
            "    Layer {}: {} paths at average depth {:.2}",
            layer.layer_index,
            layer.path_ids.len(),
            layer.average_depth
        );
    }
    log::info!("  Trajectories: {}", summary.trajectories);
    for trajectory in processor.trajectories() {
        log::info!(
            "    Trajectory {} on plane {}: {} points ({} spray), length {:.1}",
            trajectory.trajectory_index,
            trajectory.plane_index,
            trajectory.points.len(),
            trajectory.spray_point_count(),
            trajectory.total_length
        );
    }

    if let Some(stats) = processor.path_length_stats() {
        stats.log_summary();
    }
    if let Some(report) = processor.unit_report() {
        log::info!(
            "  Kernel unit: {}, model scale: {} (suggested minimum length {}, applied: {})",
            report.kernel_unit,
            report.scale,
            report.suggested_min_path_length,
            report.applied
        );
    }

    if let Some(path) = scene_path {
        let mut scene = RenderScene::new();
        scene.add_paths(processor.paths(), true);
        scene.add_trajectories(processor.trajectories());
        scene.add_cutting_planes(processor.cutting_planes(), &processor.working_bounds());
        fs::write(path, scene.to_json()?)?;
        log::info!("Wrote render scene to {}", path);
    }

    log::info!("Done.");
    Ok(())
}

/// 100 x 60 base plate with a 40 x 20 pad raised 8 above it
fn demo_shape() -> Result<Shape> {
    let base = MeshPatch::rectangle(
        Point3D::origin(),
        Vector3D::new(100.0, 0.0, 0.0),
        Vector3D::new(0.0, 60.0, 0.0),
    )?;
    let mut pad = MeshPatch::rectangle(
        Point3D::origin(),
        Vector3D::new(40.0, 0.0, 0.0),
        Vector3D::new(0.0, 20.0, 0.0),
    )?;
    pad.translate(Vector3D::new(30.0, 20.0, 8.0));
    Ok(Shape::compound(vec![Shape::patch(base), Shape::patch(pad)]))
}
