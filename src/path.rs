use crate::geometry::{Point3D, Vector3D};
use serde::{Deserialize, Serialize};

/// Whether the tool sprays while passing a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointKind {
    Spray,
    Transition,
}

/// A point on a tool path with its approach direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PathPoint {
    pub position: Point3D,
    /// Unit spray approach vector at this point
    pub normal: Vector3D,
    pub kind: PointKind,
}

impl PathPoint {
    pub fn spray(position: Point3D, normal: Vector3D) -> Self {
        Self {
            position,
            normal,
            kind: PointKind::Spray,
        }
    }

    pub fn transition(position: Point3D, normal: Vector3D) -> Self {
        Self {
            position,
            normal,
            kind: PointKind::Transition,
        }
    }

    pub fn is_spray_point(&self) -> bool {
        self.kind == PointKind::Spray
    }
}

/// One pass of the tool, derived from a single plane/surface section curve
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SprayPath {
    pub points: Vec<PathPoint>,
    /// Pass width, equal to the plane spacing
    pub width: f64,
    /// Unique id, reassigned whenever the path list is rebuilt
    pub path_index: usize,
    /// Index of the cutting plane the path came from
    pub plane_index: usize,
    /// Set once the path has been folded into a trajectory
    pub is_connected: bool,
}

impl SprayPath {
    pub fn new(points: Vec<PathPoint>, width: f64, path_index: usize, plane_index: usize) -> Self {
        Self {
            points,
            width,
            path_index,
            plane_index,
            is_connected: false,
        }
    }

    pub fn length(&self) -> f64 {
        path_length(&self.points)
    }

    pub fn head(&self) -> Option<&PathPoint> {
        self.points.first()
    }

    pub fn tail(&self) -> Option<&PathPoint> {
        self.points.last()
    }

    /// Reverse the travel direction.
    pub fn reverse(&mut self) {
        self.points.reverse();
    }

    /// Turn every point into a transition point; the tool passes without spraying.
    pub fn mark_non_spray(&mut self) {
        for point in &mut self.points {
            point.kind = PointKind::Transition;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Non-spray transition between the tail of one path and the head of the next
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionPath {
    pub points: Vec<PathPoint>,
    pub from_path: usize,
    pub to_path: usize,
}

/// Continuous tool path for one cutting plane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegratedTrajectory {
    pub trajectory_index: usize,
    pub plane_index: usize,
    pub points: Vec<PathPoint>,
    /// Offset into `points` where each constituent spray path begins
    pub path_segments: Vec<usize>,
    /// Ids of the constituent spray paths, in travel order
    pub path_ids: Vec<usize>,
    pub total_length: f64,
}

impl IntegratedTrajectory {
    pub fn spray_point_count(&self) -> usize {
        self.points.iter().filter(|p| p.is_spray_point()).count()
    }
}

/// Sum of distances between consecutive points.
pub fn path_length(points: &[PathPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| (w[1].position - w[0].position).norm())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_point_path(a: Point3D, b: Point3D) -> SprayPath {
        let n = Vector3D::z();
        SprayPath::new(vec![PathPoint::spray(a, n), PathPoint::spray(b, n)], 1.0, 0, 0)
    }

    #[test]
    fn test_length_metric() {
        let p = two_point_path(Point3D::new(0.0, 0.0, 0.0), Point3D::new(10.0, 0.0, 0.0));
        assert!((p.length() - 10.0).abs() < 1e-12);

        let p = two_point_path(Point3D::new(0.0, 0.0, 0.0), Point3D::new(3.0, 4.0, 0.0));
        assert!((p.length() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_short_paths_have_zero_length() {
        assert_eq!(path_length(&[]), 0.0);
        let single = [PathPoint::spray(Point3D::origin(), Vector3D::z())];
        assert_eq!(path_length(&single), 0.0);
    }

    #[test]
    fn test_reverse_and_mark_non_spray() {
        let mut p = two_point_path(Point3D::new(0.0, 0.0, 0.0), Point3D::new(10.0, 0.0, 0.0));
        p.reverse();
        assert_eq!(p.head().unwrap().position.x, 10.0);
        assert!(p.points.iter().all(|pt| pt.is_spray_point()));

        p.mark_non_spray();
        assert!(p.points.iter().all(|pt| pt.kind == PointKind::Transition));
    }
}
