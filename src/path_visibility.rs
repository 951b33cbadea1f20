// Path-level visibility refinement
//
// Re-examines generated paths for mutual occlusion along the spray
// direction, splits partially occluded paths into their visible runs,
// groups the survivors into depth layers and rebuilds the trajectories from
// the nearest layer only.

use crate::config::SprayConfig;
use crate::geometry::{SprayFrame, TransverseBox};
use crate::path::SprayPath;
use crate::trajectory::{Integration, TrajectoryIntegrator};
use crate::{Error, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Occluding paths must be closer to the source by more than this fraction of the spacing
pub const PATH_DEPTH_FACTOR: f64 = 0.1;

/// A path whose box is covered beyond this ratio is reported as occluded
pub const PATH_OCCLUSION_THRESHOLD: f64 = 0.2;

/// A point is hidden only by points higher than it by this fraction of the spacing
pub const POINT_HEIGHT_FACTOR: f64 = 0.05;

/// Tolerance added around an occluder's transverse box, as a fraction of the spacing
pub const POINT_BOX_FACTOR: f64 = 0.1;

/// A run starting at most this many indices after the previous run's end is merged into it
pub const MAX_BRIDGED_GAP: usize = 2;

/// Paths deeper than the layer's reference by more than this fraction of the spacing start a new layer
pub const LAYER_DEPTH_FACTOR: f64 = 0.8;

/// Visibility record for one path, keyed by its id in the rebuilt path list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathVisibilityInfo {
    pub path_id: usize,
    /// Id the path (or the path it was split from) had when analysis started
    pub source_path: usize,
    pub plane_index: usize,
    /// Mean height of the points along the spray direction
    pub depth: f64,
    /// True while at least one point is visible
    pub is_visible: bool,
    /// Verdict of the whole-path bounding-box test
    pub path_occluded: bool,
    /// Entry id of the strongest occluder found by the whole-path test
    pub occluding_path: Option<usize>,
    /// Largest box coverage ratio found by the whole-path test
    pub occlusion_ratio: f64,
    pub point_visibility: Vec<bool>,
    /// Inclusive `[start, end]` runs of visible points
    pub visible_segments: Vec<(usize, usize)>,
}

impl PathVisibilityInfo {
    pub fn visible_point_count(&self) -> usize {
        self.point_visibility.iter().filter(|v| **v).count()
    }
}

/// Depth-clustered group of paths; layer 0 is nearest the spray source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceLayer {
    pub layer_index: usize,
    pub path_ids: Vec<usize>,
    pub average_depth: f64,
}

/// Everything produced by a path visibility run
#[derive(Debug, Clone, Default)]
pub struct PathVisibilityResult {
    /// Surviving paths, reindexed `0..N`
    pub paths: Vec<SprayPath>,
    pub visibility: BTreeMap<usize, PathVisibilityInfo>,
    pub layers: Vec<SurfaceLayer>,
    /// Trajectories rebuilt from layer 0
    pub integration: Integration,
}

/// Immutable per-path data shared by the occlusion tests
#[derive(Debug, Clone)]
struct PathSnapshot {
    id: usize,
    plane_index: usize,
    depth: f64,
    max_height: f64,
    bounds: Option<TransverseBox>,
}

/// Whole-path test outcome
#[derive(Debug, Clone, Copy, Default)]
struct PathOcclusion {
    occluded: bool,
    occluder: Option<usize>,
    ratio: f64,
}

pub struct PathVisibilityAnalyzer {
    frame: SprayFrame,
    plane_spacing: f64,
    min_path_length: f64,
    integrator: TrajectoryIntegrator,
}

impl PathVisibilityAnalyzer {
    /// `min_path_length` is the threshold in effect after extraction, which
    /// may differ from the configured one after unit adjustment.
    pub fn new(config: &SprayConfig, min_path_length: f64) -> Self {
        Self {
            frame: SprayFrame::new(config.spray_direction),
            plane_spacing: config.plane_spacing,
            min_path_length,
            integrator: TrajectoryIntegrator::new(config),
        }
    }

    pub fn analyze(&self, paths: &[SprayPath]) -> Result<PathVisibilityResult> {
        if paths.is_empty() {
            log::error!("No paths available for visibility analysis");
            return Err(Error::NoPaths);
        }

        log::info!("Analyzing visibility of {} paths...", paths.len());

        let snapshots: Vec<PathSnapshot> = paths.iter().map(|p| self.snapshot(p)).collect();

        let path_level: Vec<PathOcclusion> = (0..paths.len())
            .map(|i| self.path_occlusion(i, &snapshots))
            .collect();
        let fully_occluded = path_level.iter().filter(|o| o.occluded).count();
        log::info!("  Whole-path test: {} of {} paths occluded", fully_occluded, paths.len());

        // Every point is tested against the same snapshot; splitting happens afterwards
        let point_flags: Vec<Vec<bool>> = paths
            .par_iter()
            .enumerate()
            .map(|(i, path)| self.point_visibility(i, path, &snapshots))
            .collect();

        let records: Vec<PathVisibilityInfo> = paths
            .iter()
            .zip(&snapshots)
            .zip(path_level.iter().zip(point_flags))
            .map(|((path, snap), (occlusion, flags))| {
                let visible_segments = find_visible_segments(&flags);
                PathVisibilityInfo {
                    path_id: snap.id,
                    source_path: snap.id,
                    plane_index: path.plane_index,
                    depth: snap.depth,
                    is_visible: !visible_segments.is_empty(),
                    path_occluded: occlusion.occluded,
                    occluding_path: occlusion.occluder,
                    occlusion_ratio: occlusion.ratio,
                    point_visibility: flags,
                    visible_segments,
                }
            })
            .collect();

        let (mut split_paths, split_records) = self.split_paths(paths, &records);
        log::info!("  Splitting kept {} visible path segments", split_paths.len());

        let visibility: BTreeMap<usize, PathVisibilityInfo> = split_records
            .into_iter()
            .map(|record| (record.path_id, record))
            .collect();

        let layers = self.classify_layers(&visibility);
        log::info!("  Classified into {} surface layers", layers.len());
        for layer in &layers {
            log::debug!(
                "  Layer {}: {} paths, average depth {:.3}",
                layer.layer_index,
                layer.path_ids.len(),
                layer.average_depth
            );
        }

        let integration = match layers.first() {
            Some(top) => {
                for path in &mut split_paths {
                    if !top.path_ids.contains(&path.path_index) {
                        path.mark_non_spray();
                    }
                }
                self.integrator.integrate_subset(&mut split_paths, &top.path_ids)
            }
            None => {
                log::warn!("No surface layers, no trajectories rebuilt");
                Integration::default()
            }
        };

        log::info!(
            "Visibility analysis complete: {} layers, {} top-layer trajectories",
            layers.len(),
            integration.trajectories.len()
        );

        Ok(PathVisibilityResult {
            paths: split_paths,
            visibility,
            layers,
            integration,
        })
    }

    fn snapshot(&self, path: &SprayPath) -> PathSnapshot {
        let heights: Vec<f64> = path.points.iter().map(|p| self.frame.depth(&p.position)).collect();
        let depth = if heights.is_empty() {
            0.0
        } else {
            heights.iter().sum::<f64>() / heights.len() as f64
        };

        PathSnapshot {
            id: path.path_index,
            plane_index: path.plane_index,
            depth,
            max_height: heights.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            bounds: TransverseBox::from_points(&self.frame, path.points.iter().map(|p| &p.position)),
        }
    }

    /// Largest box coverage of path `i` by any closer path on another plane.
    fn path_occlusion(&self, i: usize, snapshots: &[PathSnapshot]) -> PathOcclusion {
        let target = &snapshots[i];
        let Some(target_box) = target.bounds else {
            return PathOcclusion::default();
        };
        let target_area = target_box.area();
        let margin = self.plane_spacing * PATH_DEPTH_FACTOR;

        let mut best = PathOcclusion::default();
        for (j, other) in snapshots.iter().enumerate() {
            if i == j || other.plane_index == target.plane_index {
                continue;
            }
            if other.depth <= target.depth + margin {
                continue;
            }
            let Some(other_box) = other.bounds else {
                continue;
            };
            if !target_box.overlaps(&other_box) {
                continue;
            }

            let ratio = if target_area > 0.0 {
                target_box.intersection_area(&other_box) / target_area
            } else {
                0.0
            };
            if ratio > best.ratio {
                best.ratio = ratio;
                best.occluder = Some(other.id);
            }
        }

        best.occluded = best.ratio > PATH_OCCLUSION_THRESHOLD;
        if best.occluded {
            log::debug!(
                "Path {} occluded by path {:?} (ratio {:.3})",
                target.id,
                best.occluder,
                best.ratio
            );
        }
        best
    }

    /// Per-point flags: a point is hidden when some closer path on another
    /// plane reaches higher than it and its widened box covers the point.
    fn point_visibility(&self, i: usize, path: &SprayPath, snapshots: &[PathSnapshot]) -> Vec<bool> {
        let height_margin = self.plane_spacing * POINT_HEIGHT_FACTOR;
        let box_margin = self.plane_spacing * POINT_BOX_FACTOR;
        let depth_margin = self.plane_spacing * PATH_DEPTH_FACTOR;
        let target = &snapshots[i];

        let occluders: Vec<(f64, TransverseBox)> = snapshots
            .iter()
            .enumerate()
            .filter(|(j, s)| *j != i && s.plane_index != target.plane_index)
            .filter(|(_, s)| s.depth > target.depth + depth_margin)
            .filter_map(|(_, s)| s.bounds.map(|b| (s.max_height, b.expanded(box_margin))))
            .collect();

        path.points
            .iter()
            .map(|point| {
                let height = self.frame.depth(&point.position);
                let (u, v) = self.frame.transverse(&point.position);
                !occluders
                    .iter()
                    .any(|(max_height, bounds)| *max_height > height + height_margin && bounds.contains(u, v))
            })
            .collect()
    }

    /// Drop invisible paths, split partially visible ones and renumber.
    fn split_paths(
        &self,
        paths: &[SprayPath],
        records: &[PathVisibilityInfo],
    ) -> (Vec<SprayPath>, Vec<PathVisibilityInfo>) {
        let mut kept_paths: Vec<SprayPath> = Vec::new();
        let mut kept_records: Vec<PathVisibilityInfo> = Vec::new();

        for (path, record) in paths.iter().zip(records) {
            if record.visible_segments.is_empty() {
                log::debug!("Path {} fully occluded, dropped", path.path_index);
                continue;
            }

            let whole = record.visible_segments.len() == 1
                && record.visible_segments[0] == (0, path.points.len() - 1);
            if whole {
                let mut kept = path.clone();
                kept.is_connected = false;
                kept_paths.push(kept);
                kept_records.push(record.clone());
                continue;
            }

            for &(start, end) in &record.visible_segments {
                if end <= start {
                    continue;
                }
                let mut fragment = SprayPath::new(
                    path.points[start..=end].to_vec(),
                    path.width,
                    0,
                    path.plane_index,
                );
                if fragment.length() < self.min_path_length {
                    continue;
                }

                let flags = record.point_visibility[start..=end].to_vec();
                let snap = self.snapshot(&fragment);
                fragment.is_connected = false;

                kept_records.push(PathVisibilityInfo {
                    depth: snap.depth,
                    visible_segments: vec![(0, flags.len() - 1)],
                    point_visibility: flags,
                    is_visible: true,
                    ..record.clone()
                });
                kept_paths.push(fragment);
            }
        }

        for (new_id, (path, record)) in kept_paths.iter_mut().zip(kept_records.iter_mut()).enumerate() {
            path.path_index = new_id;
            record.path_id = new_id;
        }

        (kept_paths, kept_records)
    }

    /// Cluster visible paths by depth, nearest first.
    fn classify_layers(&self, visibility: &BTreeMap<usize, PathVisibilityInfo>) -> Vec<SurfaceLayer> {
        let mut ordered: Vec<(usize, f64)> = visibility
            .values()
            .filter(|r| r.is_visible)
            .map(|r| (r.path_id, r.depth))
            .collect();
        ordered.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let threshold = self.plane_spacing * LAYER_DEPTH_FACTOR;
        let mut layers: Vec<SurfaceLayer> = Vec::new();
        let mut current: Vec<(usize, f64)> = Vec::new();
        let mut reference = f64::NAN;

        for (id, depth) in ordered {
            if !current.is_empty() && (depth - reference).abs() > threshold {
                layers.push(make_layer(layers.len(), &current));
                current.clear();
            }
            if current.is_empty() {
                reference = depth;
            }
            current.push((id, depth));
        }
        if !current.is_empty() {
            layers.push(make_layer(layers.len(), &current));
        }
        layers
    }
}

fn make_layer(layer_index: usize, members: &[(usize, f64)]) -> SurfaceLayer {
    let average_depth = members.iter().map(|(_, d)| d).sum::<f64>() / members.len() as f64;
    SurfaceLayer {
        layer_index,
        path_ids: members.iter().map(|(id, _)| *id).collect(),
        average_depth,
    }
}

/// Maximal runs of visible points, with short occluded gaps bridged.
pub fn find_visible_segments(flags: &[bool]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut start: Option<usize> = None;

    for (i, &visible) in flags.iter().enumerate() {
        match (visible, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push((s, i - 1));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push((s, flags.len() - 1));
    }

    merge_close_segments(&runs)
}

/// Merge consecutive runs whose index distance is at most `MAX_BRIDGED_GAP`,
/// so a single hidden point is bridged and two are not.
pub fn merge_close_segments(segments: &[(usize, usize)]) -> Vec<(usize, usize)> {
    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(segments.len());
    for &(start, end) in segments {
        match merged.last_mut() {
            Some(last) if start.saturating_sub(last.1) <= MAX_BRIDGED_GAP => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Point3D, Vector3D};
    use crate::path::{PathPoint, PointKind};

    fn line(id: usize, plane: usize, from: (f64, f64, f64), to: (f64, f64, f64), n: usize) -> SprayPath {
        let a = Point3D::new(from.0, from.1, from.2);
        let b = Point3D::new(to.0, to.1, to.2);
        let points = (0..=n)
            .map(|i| PathPoint::spray(a + (b - a) * (i as f64 / n as f64), Vector3D::z()))
            .collect();
        SprayPath::new(points, 5.0, id, plane)
    }

    fn analyzer(min_path_length: f64) -> PathVisibilityAnalyzer {
        let config = SprayConfig {
            plane_spacing: 5.0,
            min_path_length,
            ..Default::default()
        };
        PathVisibilityAnalyzer::new(&config, min_path_length)
    }

    #[test]
    fn test_segment_extraction() {
        let flags = [true, true, false, false, false, true, true, false, true];
        // Gap of three hidden points stays, gap of one is bridged
        assert_eq!(find_visible_segments(&flags), vec![(0, 1), (5, 8)]);
        assert!(find_visible_segments(&[false, false]).is_empty());
        assert!(find_visible_segments(&[]).is_empty());
        assert_eq!(find_visible_segments(&[true; 4]), vec![(0, 3)]);
    }

    #[test]
    fn test_single_hidden_point_is_bridged() {
        assert_eq!(find_visible_segments(&[true, false, true]), vec![(0, 2)]);
        assert_eq!(find_visible_segments(&[false, true, true, false, true, false]), vec![(1, 4)]);
    }

    #[test]
    fn test_two_hidden_points_split_the_path() {
        let flags = [true, false, false, true];
        assert_eq!(find_visible_segments(&flags), vec![(0, 0), (3, 3)]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let segments = vec![(0, 3), (5, 6), (12, 20), (24, 30)];
        let once = merge_close_segments(&segments);
        assert_eq!(once, vec![(0, 6), (12, 20), (24, 30)]);
        assert_eq!(merge_close_segments(&once), once);
    }

    #[test]
    fn test_empty_input_fails() {
        assert!(matches!(analyzer(0.0).analyze(&[]), Err(Error::NoPaths)));
    }

    #[test]
    fn test_fully_covered_path_is_removed() {
        let paths = vec![
            line(0, 0, (2.0, 3.0, 0.0), (8.0, 3.0, 0.0), 10),
            line(1, 1, (0.0, 0.0, 5.0), (10.0, 10.0, 5.0), 10),
        ];
        let result = analyzer(0.0).analyze(&paths).unwrap();

        assert_eq!(result.paths.len(), 1);
        assert_eq!(result.paths[0].path_index, 0);
        assert!((result.paths[0].points[0].position.z - 5.0).abs() < 1e-12);
        assert_eq!(result.visibility[&0].source_path, 1);

        assert_eq!(result.layers.len(), 1);
        assert_eq!(result.layers[0].path_ids, vec![0]);
        assert_eq!(result.integration.trajectories.len(), 1);
    }

    #[test]
    fn test_partially_covered_path_is_split() {
        // Lower path along x = 0..20; a raised path on another plane covers x in [8, 12]
        let paths = vec![
            line(0, 0, (0.0, 0.0, 0.0), (20.0, 0.0, 0.0), 20),
            line(1, 1, (8.0, -1.0, 5.0), (12.0, 1.0, 5.0), 4),
        ];
        let result = analyzer(2.0).analyze(&paths).unwrap();

        // Box widened by 0.5 hides x = 8..12 on the lower path
        let lower: Vec<&SprayPath> = result.paths.iter().filter(|p| p.plane_index == 0).collect();
        assert_eq!(lower.len(), 2);
        assert!((lower[0].length() - 7.0).abs() < 1e-9);
        assert!((lower[1].length() - 7.0).abs() < 1e-9);

        let ids: Vec<usize> = result.paths.iter().map(|p| p.path_index).collect();
        assert_eq!(ids, (0..result.paths.len()).collect::<Vec<_>>());
        assert_eq!(result.visibility.len(), result.paths.len());
    }

    #[test]
    fn test_tilted_path_at_same_mean_depth_does_not_hide_points() {
        // The tilted path rises above the flat one but its mean depth is only 0.1 higher
        let paths = vec![
            line(0, 0, (0.0, 0.0, 0.0), (20.0, 0.0, 0.0), 20),
            line(1, 1, (8.0, -1.0, -5.0), (12.0, 1.0, 5.2), 4),
        ];
        let result = analyzer(0.0).analyze(&paths).unwrap();

        assert_eq!(result.paths.len(), 2);
        assert!(result.visibility.values().all(|r| r.visible_point_count() == r.point_visibility.len()));
        assert!((result.paths[0].length() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_short_fragments_are_dropped() {
        let paths = vec![
            line(0, 0, (0.0, 0.0, 0.0), (20.0, 0.0, 0.0), 20),
            line(1, 1, (8.0, -1.0, 5.0), (12.0, 1.0, 5.0), 4),
        ];
        let result = analyzer(7.5).analyze(&paths).unwrap();
        assert!(result.paths.iter().all(|p| p.plane_index != 0));
    }

    #[test]
    fn test_same_plane_paths_never_occlude() {
        let paths = vec![
            line(0, 0, (0.0, 0.0, 0.0), (10.0, 0.0, 0.0), 10),
            line(1, 0, (0.0, -1.0, 5.0), (10.0, 1.0, 5.0), 10),
        ];
        let result = analyzer(0.0).analyze(&paths).unwrap();
        assert_eq!(result.paths.len(), 2);
        assert!(result.visibility.values().all(|r| r.visible_point_count() == r.point_visibility.len()));
    }

    #[test]
    fn test_whole_path_box_test() {
        // Upper box covers the lower path's box entirely
        let paths = vec![
            line(0, 0, (2.0, 2.0, 0.0), (8.0, 8.0, 0.0), 10),
            line(1, 1, (0.0, 0.0, 5.0), (10.0, 10.0, 5.0), 10),
        ];
        let analyzer = analyzer(0.0);
        let snapshots: Vec<PathSnapshot> = paths.iter().map(|p| analyzer.snapshot(p)).collect();

        let lower = analyzer.path_occlusion(0, &snapshots);
        assert!(lower.occluded);
        assert_eq!(lower.occluder, Some(1));
        assert!((lower.ratio - 1.0).abs() < 1e-12);

        let upper = analyzer.path_occlusion(1, &snapshots);
        assert!(!upper.occluded);
        assert_eq!(upper.ratio, 0.0);
    }

    #[test]
    fn test_layers_ordered_by_depth() {
        // Three stacked paths far apart transversally, so nothing is occluded
        let paths = vec![
            line(0, 0, (0.0, 0.0, 0.0), (10.0, 0.0, 0.0), 10),
            line(1, 1, (0.0, 50.0, 10.0), (10.0, 50.0, 10.0), 10),
            line(2, 2, (0.0, 100.0, 11.0), (10.0, 100.0, 11.0), 10),
        ];
        let result = analyzer(0.0).analyze(&paths).unwrap();

        assert_eq!(result.layers.len(), 2);
        assert_eq!(result.layers[0].path_ids, vec![2, 1]);
        assert!((result.layers[0].average_depth - 10.5).abs() < 1e-12);
        assert_eq!(result.layers[1].path_ids, vec![0]);
        for pair in result.layers.windows(2) {
            assert!(pair[0].average_depth >= pair[1].average_depth);
        }

        // Only layer 0 is rebuilt; deeper paths stop spraying
        assert_eq!(result.integration.trajectories.len(), 2);
        assert!(result.paths[0].points.iter().all(|p| p.kind == PointKind::Transition));
        assert!(result.paths[1].points.iter().all(|p| p.is_spray_point()));
    }
}
