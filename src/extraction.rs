// Path extraction
// Sections the visible patches with each cutting plane, samples the curves
// and offsets them along the spray direction.

use crate::config::SprayConfig;
use crate::geometry::Vector3D;
use crate::kernel::{section_patches, PatchRef, SectionCurve};
use crate::path::{PathPoint, SprayPath};
use crate::planes::CuttingPlane;
use crate::units::{PathLengthStats, UnitReport};
use crate::{Error, Result};
use rayon::prelude::*;

/// Minimum number of sampling intervals per curve
pub const MIN_SAMPLES: usize = 10;

/// Only the first few candidate paths of a run are logged in detail
const DEBUG_SAMPLE_LIMIT: usize = 10;

/// Output of an extraction run
#[derive(Debug, Clone)]
pub struct Extraction {
    pub paths: Vec<SprayPath>,
    /// Present when path lengths looked implausible for millimeters
    pub unit_report: Option<UnitReport>,
    /// Minimum path length in effect after any unit adjustment
    pub min_path_length: f64,
}

pub struct PathExtractor {
    spray_direction: Vector3D,
    plane_spacing: f64,
    offset_distance: f64,
    point_density: f64,
    min_path_length: f64,
    auto_adjust_min_length: bool,
}

impl PathExtractor {
    pub fn new(config: &SprayConfig) -> Self {
        Self {
            spray_direction: config.spray_direction,
            plane_spacing: config.plane_spacing,
            offset_distance: config.offset_distance,
            point_density: config.point_density,
            min_path_length: config.min_path_length,
            auto_adjust_min_length: config.auto_adjust_min_length,
        }
    }

    pub fn extract(&self, patches: &[PatchRef], planes: &[CuttingPlane]) -> Result<Extraction> {
        if patches.is_empty() {
            return Err(Error::NoVisiblePatches);
        }
        if planes.is_empty() {
            return Err(Error::NoCuttingPlanes);
        }

        log::info!(
            "Generating paths for {} visible patches across {} planes...",
            patches.len(),
            planes.len()
        );

        // Planes are independent until paths are numbered
        let mut sampled: Vec<(usize, Vec<Vec<PathPoint>>)> = planes
            .par_iter()
            .map(|cutting| {
                let curves = section_patches(patches, &cutting.plane);
                let candidates = curves.iter().map(|c| self.sample_curve(c)).collect();
                (cutting.index, candidates)
            })
            .collect();

        // Ensure deterministic path numbering
        sampled.sort_by_key(|(plane_index, _)| *plane_index);

        let mut paths = Vec::new();
        let mut logged = 0;
        for (plane_index, candidates) in sampled {
            for points in candidates {
                let path = SprayPath::new(points, self.plane_spacing, paths.len(), plane_index);
                let length = path.length();
                let keep = length >= self.min_path_length;

                if logged < DEBUG_SAMPLE_LIMIT {
                    log::debug!(
                        "Path candidate on plane {}: points={}, length={:.2}, threshold={} -> {}",
                        plane_index,
                        path.points.len(),
                        length,
                        self.min_path_length,
                        if keep { "kept" } else { "filtered" }
                    );
                    logged += 1;
                }

                if keep {
                    paths.push(path);
                }
            }
        }

        log::info!(
            "Generated {} paths (filtered paths shorter than {})",
            paths.len(),
            self.min_path_length
        );

        if paths.is_empty() {
            return Err(Error::NoPaths);
        }

        let mut min_path_length = self.min_path_length;
        let mut unit_report = None;

        if let Some(stats) = PathLengthStats::from_paths(&paths, self.min_path_length) {
            log::info!(
                "Path lengths: total={:.1}, average={:.1}, min={:.1}, max={:.1}",
                stats.total,
                stats.mean,
                stats.min,
                stats.max
            );

            if stats.is_implausible() {
                log::warn!("Path lengths look implausible for millimeters, running unit detection");
                let mut report = UnitReport::new(stats);
                report.stats.log_summary();
                log::info!(
                    "Kernel unit: {}, model scale from median length {:.6}: {}",
                    report.kernel_unit,
                    report.stats.median,
                    report.scale
                );

                if let Some(suggested) = report.adjustment_for(min_path_length) {
                    if self.auto_adjust_min_length {
                        log::info!("Adjusting minimum path length {} -> {}", min_path_length, suggested);
                        min_path_length = suggested;
                        report.applied = true;
                    } else {
                        log::info!("Suggested minimum path length: {}", suggested);
                    }
                }
                unit_report = Some(report);
            }
        }

        Ok(Extraction {
            paths,
            unit_report,
            min_path_length,
        })
    }

    /// Sample `max(10, floor(length * density))` intervals, both ends included,
    /// offsetting each point along the spray direction.
    pub fn sample_curve(&self, curve: &SectionCurve) -> Vec<PathPoint> {
        let first = curve.first_parameter();
        let last = curve.last_parameter();
        let intervals = sample_count(curve.length(), self.point_density);
        let offset = self.spray_direction * self.offset_distance;

        (0..=intervals)
            .map(|j| {
                let t = first + (last - first) * j as f64 / intervals as f64;
                PathPoint::spray(curve.point_at(t) + offset, self.spray_direction)
            })
            .collect()
    }
}

pub fn sample_count(curve_length: f64, density: f64) -> usize {
    let n = (curve_length * density).floor();
    if n.is_finite() && n > MIN_SAMPLES as f64 {
        n as usize
    } else {
        MIN_SAMPLES
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point3D;
    use crate::patch::MeshPatch;
    use crate::planes::SlicePlanner;
    use crate::units::LengthScale;
    use std::sync::Arc;

    fn config(min_path_length: f64) -> SprayConfig {
        SprayConfig {
            plane_spacing: 5.0,
            offset_distance: 1.0,
            point_density: 1.0,
            min_path_length,
            ..Default::default()
        }
    }

    fn rectangle(width: f64, height: f64) -> PatchRef {
        Arc::new(
            MeshPatch::rectangle(
                Point3D::origin(),
                Vector3D::new(width, 0.0, 0.0),
                Vector3D::new(0.0, height, 0.0),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_sample_count() {
        assert_eq!(sample_count(3.0, 1.0), 10);
        assert_eq!(sample_count(25.7, 1.0), 25);
        assert_eq!(sample_count(10.0, 2.5), 25);
    }

    #[test]
    fn test_sampled_points_are_offset() {
        let extractor = PathExtractor::new(&config(0.0));
        let curve = SectionCurve::new(vec![Point3D::new(0.0, 0.0, 0.0), Point3D::new(0.0, 10.0, 0.0)]).unwrap();
        let points = extractor.sample_curve(&curve);

        assert_eq!(points.len(), 11);
        assert!(points.iter().all(|p| (p.position.z - 1.0).abs() < 1e-12));
        assert!(points.iter().all(|p| p.normal == Vector3D::z() && p.is_spray_point()));
        assert!((points[10].position.y - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_square_yields_one_path_per_plane() {
        let cfg = config(0.0);
        let patches = vec![rectangle(10.0, 10.0)];
        let planes = SlicePlanner::new(&cfg).plan(&patches).unwrap();
        let extraction = PathExtractor::new(&cfg).extract(&patches, &planes).unwrap();

        assert_eq!(extraction.paths.len(), 3);
        for (i, path) in extraction.paths.iter().enumerate() {
            assert_eq!(path.path_index, i);
            assert_eq!(path.plane_index, i);
            assert_eq!(path.width, 5.0);
            assert!((path.length() - 10.0).abs() < 1e-9);
        }
        assert!(extraction.unit_report.is_none());
    }

    #[test]
    fn test_short_paths_are_filtered() {
        // Sections run across the shorter side, 15 long here
        let patches = vec![rectangle(20.0, 15.0)];
        let cfg = config(20.0);
        let planes = SlicePlanner::new(&cfg).plan(&patches).unwrap();
        let result = PathExtractor::new(&cfg).extract(&patches, &planes);
        assert!(matches!(result, Err(Error::NoPaths)));

        let patches = vec![rectangle(30.0, 25.0)];
        let planes = SlicePlanner::new(&cfg).plan(&patches).unwrap();
        let extraction = PathExtractor::new(&cfg).extract(&patches, &planes).unwrap();
        assert_eq!(extraction.paths.len(), 7);
        assert!(extraction.paths.iter().all(|p| (p.length() - 25.0).abs() < 1e-9));
    }

    #[test]
    fn test_unit_report_for_tiny_model() {
        // Sections run across the 0.3 side, well below plausible millimeter lengths
        let mut cfg = config(0.0);
        cfg.plane_spacing = 0.05;
        cfg.auto_adjust_min_length = true;
        let patches = vec![rectangle(0.3, 0.5)];
        let planes = SlicePlanner::new(&cfg).plan(&patches).unwrap();
        let extraction = PathExtractor::new(&cfg).extract(&patches, &planes).unwrap();

        let report = extraction.unit_report.unwrap();
        assert!((report.stats.median - 0.3).abs() < 1e-9);
        assert_eq!(report.scale, LengthScale::Decimeter);
        assert!(report.applied);
        assert_eq!(extraction.min_path_length, 0.2);
        assert!(extraction.paths.iter().all(|p| p.length() >= extraction.min_path_length));
    }

    #[test]
    fn test_unit_suggestion_only_logged_without_auto_adjust() {
        let mut cfg = config(0.0);
        cfg.plane_spacing = 0.05;
        let patches = vec![rectangle(0.3, 0.5)];
        let planes = SlicePlanner::new(&cfg).plan(&patches).unwrap();
        let extraction = PathExtractor::new(&cfg).extract(&patches, &planes).unwrap();

        let report = extraction.unit_report.unwrap();
        assert!(!report.applied);
        assert_eq!(report.suggested_min_path_length, 0.2);
        assert_eq!(extraction.min_path_length, 0.0);
    }

    #[test]
    fn test_no_planes_fails() {
        let extractor = PathExtractor::new(&config(0.0));
        assert!(matches!(
            extractor.extract(&[rectangle(10.0, 10.0)], &[]),
            Err(Error::NoCuttingPlanes)
        ));
    }
}
