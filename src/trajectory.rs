// Trajectory integration
// Groups paths by cutting plane, orders each group greedily and stitches it
// into one continuous trajectory with straight non-spray connectors.

use crate::config::SprayConfig;
use crate::geometry::Point3D;
use crate::path::{path_length, ConnectionPath, IntegratedTrajectory, PathPoint, SprayPath};
use crate::{Error, Result};
use std::collections::{BTreeMap, HashMap};

/// Gaps up to this fraction of the plane spacing are bridged without a connector
pub const CONNECT_GAP_FACTOR: f64 = 0.1;

/// Connector points are spaced roughly this fraction of the plane spacing apart
pub const CONNECT_STEP_FACTOR: f64 = 0.5;

/// Trajectories and connectors produced by one integration run
#[derive(Debug, Clone, Default)]
pub struct Integration {
    pub trajectories: Vec<IntegratedTrajectory>,
    pub connections: Vec<ConnectionPath>,
}

pub struct TrajectoryIntegrator {
    plane_spacing: f64,
}

impl TrajectoryIntegrator {
    pub fn new(config: &SprayConfig) -> Self {
        Self {
            plane_spacing: config.plane_spacing,
        }
    }

    /// Integrate every path. Paths may be reversed in place.
    pub fn integrate(&self, paths: &mut [SprayPath]) -> Result<Integration> {
        if paths.is_empty() {
            log::error!("No paths available for integration");
            return Err(Error::NoPaths);
        }

        log::info!("Integrating {} paths...", paths.len());
        let ids: Vec<usize> = paths.iter().map(|p| p.path_index).collect();
        let integration = self.integrate_subset(paths, &ids);
        log::info!(
            "Integration complete: {} trajectories, {} connectors",
            integration.trajectories.len(),
            integration.connections.len()
        );
        Ok(integration)
    }

    /// Integrate only the paths whose ids are listed, preserving the listed
    /// order within each plane. Unknown ids are ignored.
    pub fn integrate_subset(&self, paths: &mut [SprayPath], ids: &[usize]) -> Integration {
        let position_of: HashMap<usize, usize> = paths
            .iter()
            .enumerate()
            .map(|(pos, p)| (p.path_index, pos))
            .collect();

        let mut by_plane: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for id in ids {
            let Some(&pos) = position_of.get(id) else {
                log::warn!("Path id {} not found, skipping", id);
                continue;
            };
            if paths[pos].is_empty() {
                log::warn!("Path {} has no points, skipping", id);
                continue;
            }
            by_plane.entry(paths[pos].plane_index).or_default().push(pos);
        }

        let mut integration = Integration::default();
        for (plane_index, group) in by_plane {
            let order = order_nearest_neighbor(paths, &group);
            let trajectory = self.connect(
                paths,
                &order,
                integration.trajectories.len(),
                plane_index,
                &mut integration.connections,
            );
            if !trajectory.points.is_empty() {
                integration.trajectories.push(trajectory);
            }
        }
        integration
    }

    fn connect(
        &self,
        paths: &mut [SprayPath],
        order: &[usize],
        trajectory_index: usize,
        plane_index: usize,
        connections: &mut Vec<ConnectionPath>,
    ) -> IntegratedTrajectory {
        let mut points: Vec<PathPoint> = Vec::new();
        let mut path_segments = Vec::with_capacity(order.len());
        let mut path_ids = Vec::with_capacity(order.len());

        for (i, &pos) in order.iter().enumerate() {
            if i > 0 {
                let prev = order[i - 1];
                if should_reverse(&paths[prev], &paths[pos]) {
                    paths[pos].reverse();
                }
                if let Some(connection) = self.connection_between(&paths[prev], &paths[pos]) {
                    points.extend(connection.points.iter().copied());
                    connections.push(connection);
                }
            }

            let path = &mut paths[pos];
            path_segments.push(points.len());
            path_ids.push(path.path_index);
            points.extend(path.points.iter().copied());
            path.is_connected = true;
        }

        let total_length = path_length(&points);
        log::debug!(
            "Trajectory {} on plane {}: {} paths, {} points, length {:.2}",
            trajectory_index,
            plane_index,
            path_ids.len(),
            points.len(),
            total_length
        );

        IntegratedTrajectory {
            trajectory_index,
            plane_index,
            points,
            path_segments,
            path_ids,
            total_length,
        }
    }

    /// Straight non-spray transition from the tail of `from` to the head of
    /// `to`, or `None` when the gap is small enough to cross directly.
    pub fn connection_between(&self, from: &SprayPath, to: &SprayPath) -> Option<ConnectionPath> {
        let start = from.tail()?;
        let end = to.head()?;

        let distance = (end.position - start.position).norm();
        if distance <= self.plane_spacing * CONNECT_GAP_FACTOR {
            return None;
        }

        let steps = ((distance / (self.plane_spacing * CONNECT_STEP_FACTOR)).floor() as usize).max(2);
        let points = (0..=steps)
            .map(|i| {
                let t = i as f64 / steps as f64;
                let position = start.position + (end.position - start.position) * t;
                let blended = start.normal * (1.0 - t) + end.normal * t;
                let normal = blended.try_normalize(1e-12).unwrap_or(start.normal);
                PathPoint::transition(position, normal)
            })
            .collect();

        Some(ConnectionPath {
            points,
            from_path: from.path_index,
            to_path: to.path_index,
        })
    }
}

/// Smallest distance between any endpoint of `a` and any endpoint of `b`.
pub fn endpoint_distance(a: &SprayPath, b: &SprayPath) -> f64 {
    let (Some(a0), Some(a1), Some(b0), Some(b1)) = (a.head(), a.tail(), b.head(), b.tail()) else {
        return f64::INFINITY;
    };
    let d = |p: &Point3D, q: &Point3D| (p - q).norm();
    d(&a0.position, &b0.position)
        .min(d(&a0.position, &b1.position))
        .min(d(&a1.position, &b0.position))
        .min(d(&a1.position, &b1.position))
}

/// Whether `next` should be traversed backwards after `current`.
pub fn should_reverse(current: &SprayPath, next: &SprayPath) -> bool {
    let (Some(end), Some(head), Some(tail)) = (current.tail(), next.head(), next.tail()) else {
        return false;
    };
    let to_head = (head.position - end.position).norm();
    let to_tail = (tail.position - end.position).norm();
    to_tail < to_head
}

/// Greedy nearest-neighbor order over `group` (positions into `paths`),
/// starting from the first entry.
fn order_nearest_neighbor(paths: &[SprayPath], group: &[usize]) -> Vec<usize> {
    if group.len() <= 1 {
        return group.to_vec();
    }

    let mut visited = vec![false; group.len()];
    let mut order = Vec::with_capacity(group.len());
    visited[0] = true;
    order.push(group[0]);

    for _ in 1..group.len() {
        let current = &paths[order[order.len() - 1]];
        let mut nearest: Option<(usize, f64)> = None;

        for (k, &pos) in group.iter().enumerate() {
            if visited[k] {
                continue;
            }
            let distance = endpoint_distance(current, &paths[pos]);
            if nearest.map_or(true, |(_, best)| distance < best) {
                nearest = Some((k, distance));
            }
        }

        if let Some((k, _)) = nearest {
            visited[k] = true;
            order.push(group[k]);
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Vector3D;
    use crate::path::PointKind;

    fn line(id: usize, plane: usize, from: (f64, f64), to: (f64, f64)) -> SprayPath {
        let n = Vector3D::z();
        let a = Point3D::new(from.0, from.1, 0.0);
        let b = Point3D::new(to.0, to.1, 0.0);
        let points = (0..=10)
            .map(|i| PathPoint::spray(a + (b - a) * (i as f64 / 10.0), n))
            .collect();
        SprayPath::new(points, 5.0, id, plane)
    }

    fn integrator() -> TrajectoryIntegrator {
        TrajectoryIntegrator::new(&SprayConfig {
            plane_spacing: 5.0,
            ..Default::default()
        })
    }

    #[test]
    fn test_empty_input_fails() {
        assert!(matches!(integrator().integrate(&mut []), Err(Error::NoPaths)));
    }

    #[test]
    fn test_one_trajectory_per_plane() {
        let mut paths = vec![
            line(0, 0, (0.0, 0.0), (0.0, 10.0)),
            line(1, 1, (5.0, 0.0), (5.0, 10.0)),
            line(2, 2, (10.0, 0.0), (10.0, 10.0)),
        ];
        let result = integrator().integrate(&mut paths).unwrap();

        assert_eq!(result.trajectories.len(), 3);
        assert!(result.connections.is_empty());
        for (i, t) in result.trajectories.iter().enumerate() {
            assert_eq!(t.trajectory_index, i);
            assert_eq!(t.plane_index, i);
            assert_eq!(t.path_segments, vec![0]);
            assert!((t.total_length - 10.0).abs() < 1e-9);
        }
        assert!(paths.iter().all(|p| p.is_connected));
    }

    #[test]
    fn test_nearest_neighbor_order_and_reversal() {
        // Three collinear pieces on one plane, listed out of order
        let mut paths = vec![
            line(0, 0, (0.0, 0.0), (0.0, 10.0)),
            line(1, 0, (0.0, 40.0), (0.0, 30.0)),
            line(2, 0, (0.0, 15.0), (0.0, 25.0)),
        ];
        let result = integrator().integrate(&mut paths).unwrap();
        let t = &result.trajectories[0];

        assert_eq!(t.path_ids, vec![0, 2, 1]);
        // Path 1 is reversed to start next to the tail of path 2
        assert_eq!(paths[1].head().unwrap().position.y, 30.0);

        // Gaps of 5 with spacing 5: k = max(2, floor(5 / 2.5)) = 2, so 3 points each
        assert_eq!(result.connections.len(), 2);
        assert!(result.connections.iter().all(|c| c.points.len() == 3));
        assert!(result.connections[0].points.iter().all(|p| p.kind == PointKind::Transition));

        // Offsets point at the first point of each path, after its connector
        assert_eq!(t.path_segments, vec![0, 14, 28]);
        assert_eq!(t.points.len(), 39);
        assert_eq!(t.points[14].position.y, 15.0);
        assert!(t.points[14].is_spray_point());
        assert_eq!(t.points[28].position.y, 30.0);
        assert!((t.total_length - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_small_gap_needs_no_connector() {
        let from = line(0, 0, (0.0, 0.0), (0.0, 10.0));
        let to = line(1, 0, (0.0, 10.4), (0.0, 20.0));
        assert!(integrator().connection_between(&from, &to).is_none());

        let to = line(1, 0, (0.0, 22.0), (0.0, 30.0));
        let connection = integrator().connection_between(&from, &to).unwrap();
        // floor(12 / 2.5) = 4 intervals
        assert_eq!(connection.points.len(), 5);
        assert_eq!(connection.from_path, 0);
        assert_eq!(connection.to_path, 1);
    }

    #[test]
    fn test_trajectory_points_stay_on_their_plane() {
        let mut paths = vec![
            line(0, 0, (0.0, 0.0), (0.0, 10.0)),
            line(1, 1, (5.0, 0.0), (5.0, 10.0)),
            line(2, 0, (0.0, 20.0), (0.0, 30.0)),
        ];
        let result = integrator().integrate(&mut paths).unwrap();

        for t in &result.trajectories {
            for id in &t.path_ids {
                assert_eq!(paths[*id].plane_index, t.plane_index);
            }
            let spray_x: Vec<f64> = t
                .points
                .iter()
                .filter(|p| p.is_spray_point())
                .map(|p| p.position.x)
                .collect();
            assert!(spray_x.iter().all(|x| (*x - spray_x[0]).abs() < 1e-12));
        }
    }

    #[test]
    fn test_subset_skips_unlisted_paths() {
        let mut paths = vec![
            line(0, 0, (0.0, 0.0), (0.0, 10.0)),
            line(1, 1, (5.0, 0.0), (5.0, 10.0)),
        ];
        let result = integrator().integrate_subset(&mut paths, &[1, 7]);
        assert_eq!(result.trajectories.len(), 1);
        assert_eq!(result.trajectories[0].plane_index, 1);
        assert!(!paths[0].is_connected);
    }
}
