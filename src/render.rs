// Drawing primitives for a viewer
// Paths and trajectories become colored polylines, cutting planes become quads.

use crate::geometry::{transverse_basis, BoundingBox, Point3D};
use crate::path::{IntegratedTrajectory, PathPoint, SprayPath};
use crate::planes::CuttingPlane;
use crate::Result;
use serde::{Deserialize, Serialize};

pub const SPRAY_COLOR: [u8; 3] = [0, 255, 0];
pub const TRANSITION_COLOR: [u8; 3] = [255, 165, 0];

/// Plane quads are enlarged slightly so they do not coincide with the model bounds
const PLANE_QUAD_SCALE: f64 = 1.05;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderVertex {
    pub position: [f64; 3],
    pub normal: [f64; 3],
    pub color: [u8; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Polyline {
    /// Path index or trajectory index, depending on the source
    pub source_index: usize,
    pub plane_index: usize,
    pub vertices: Vec<RenderVertex>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaneQuad {
    pub plane_index: usize,
    pub corners: [[f64; 3]; 4],
    pub color: [u8; 3],
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderScene {
    pub polylines: Vec<Polyline>,
    pub quads: Vec<PlaneQuad>,
}

impl RenderScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add spray paths. With `spray_only`, transition points are left out and
    /// paths without spray points are skipped.
    pub fn add_paths(&mut self, paths: &[SprayPath], spray_only: bool) {
        for path in paths {
            let vertices: Vec<RenderVertex> = path
                .points
                .iter()
                .filter(|p| !spray_only || p.is_spray_point())
                .map(vertex)
                .collect();
            if vertices.len() < 2 {
                continue;
            }
            self.polylines.push(Polyline {
                source_index: path.path_index,
                plane_index: path.plane_index,
                vertices,
            });
        }
    }

    pub fn add_trajectories(&mut self, trajectories: &[IntegratedTrajectory]) {
        for trajectory in trajectories {
            if trajectory.points.len() < 2 {
                continue;
            }
            self.polylines.push(Polyline {
                source_index: trajectory.trajectory_index,
                plane_index: trajectory.plane_index,
                vertices: trajectory.points.iter().map(vertex).collect(),
            });
        }
    }

    /// Add one quad per cutting plane, covering the projection of `bounds`.
    pub fn add_cutting_planes(&mut self, planes: &[CuttingPlane], bounds: &BoundingBox) {
        if bounds.is_void() || planes.is_empty() {
            return;
        }
        let corners = box_corners(bounds);

        for cutting in planes {
            let origin = cutting.plane.point;
            let (x_dir, y_dir) = transverse_basis(&cutting.plane.normal);

            let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
            let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
            for corner in &corners {
                let offset = *corner - origin;
                let (px, py) = (offset.dot(&x_dir), offset.dot(&y_dir));
                min_x = min_x.min(px);
                max_x = max_x.max(px);
                min_y = min_y.min(py);
                max_y = max_y.max(py);
            }
            let (min_x, max_x) = (min_x * PLANE_QUAD_SCALE, max_x * PLANE_QUAD_SCALE);
            let (min_y, max_y) = (min_y * PLANE_QUAD_SCALE, max_y * PLANE_QUAD_SCALE);

            let at = |x: f64, y: f64| {
                let p = origin + x_dir * x + y_dir * y;
                [p.x, p.y, p.z]
            };

            self.quads.push(PlaneQuad {
                plane_index: cutting.index,
                corners: [at(min_x, min_y), at(max_x, min_y), at(max_x, max_y), at(min_x, max_y)],
                color: plane_color(cutting.index, planes.len()),
            });
        }
    }

    pub fn spray_vertex_count(&self) -> usize {
        self.polylines
            .iter()
            .flat_map(|p| &p.vertices)
            .filter(|v| v.color == SPRAY_COLOR)
            .count()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn vertex(point: &PathPoint) -> RenderVertex {
    RenderVertex {
        position: [point.position.x, point.position.y, point.position.z],
        normal: [point.normal.x, point.normal.y, point.normal.z],
        color: if point.is_spray_point() {
            SPRAY_COLOR
        } else {
            TRANSITION_COLOR
        },
    }
}

fn box_corners(bounds: &BoundingBox) -> [Point3D; 8] {
    let (a, b) = (bounds.min, bounds.max);
    [
        Point3D::new(a.x, a.y, a.z),
        Point3D::new(b.x, a.y, a.z),
        Point3D::new(a.x, b.y, a.z),
        Point3D::new(b.x, b.y, a.z),
        Point3D::new(a.x, a.y, b.z),
        Point3D::new(b.x, a.y, b.z),
        Point3D::new(a.x, b.y, b.z),
        Point3D::new(b.x, b.y, b.z),
    ]
}

/// Hue sweep from blue to red across the plane sequence
fn plane_color(index: usize, count: usize) -> [u8; 3] {
    let t = if count > 1 {
        index as f64 / (count - 1) as f64
    } else {
        0.0
    };
    let (r, g, b) = hsl_to_rgb(240.0 * (1.0 - t), 0.8, 0.5);
    [(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8]
}

fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (f64, f64, f64) {
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = l - c / 2.0;

    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    (r + m, g + m, b + m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Plane, Vector3D};

    fn path_with_transition() -> SprayPath {
        let n = Vector3D::z();
        SprayPath::new(
            vec![
                PathPoint::spray(Point3D::new(0.0, 0.0, 0.0), n),
                PathPoint::spray(Point3D::new(1.0, 0.0, 0.0), n),
                PathPoint::transition(Point3D::new(2.0, 0.0, 0.0), n),
            ],
            5.0,
            3,
            1,
        )
    }

    #[test]
    fn test_point_colors() {
        let mut scene = RenderScene::new();
        scene.add_paths(&[path_with_transition()], false);

        let colors: Vec<[u8; 3]> = scene.polylines[0].vertices.iter().map(|v| v.color).collect();
        assert_eq!(colors, vec![SPRAY_COLOR, SPRAY_COLOR, TRANSITION_COLOR]);
        assert_eq!(scene.polylines[0].source_index, 3);
        assert_eq!(scene.spray_vertex_count(), 2);
    }

    #[test]
    fn test_spray_only_filter() {
        let mut scene = RenderScene::new();
        let mut hidden = path_with_transition();
        hidden.mark_non_spray();
        scene.add_paths(&[path_with_transition(), hidden], true);

        assert_eq!(scene.polylines.len(), 1);
        assert_eq!(scene.polylines[0].vertices.len(), 2);
    }

    #[test]
    fn test_plane_quads_cover_bounds() {
        let bounds = BoundingBox::from_points([Point3D::new(0.0, 0.0, 0.0), Point3D::new(10.0, 10.0, 2.0)].iter());
        let planes = vec![
            CuttingPlane {
                index: 0,
                plane: Plane::new(Point3D::new(5.0, 5.0, 1.0), -Vector3D::x()),
            },
            CuttingPlane {
                index: 1,
                plane: Plane::new(Point3D::new(0.0, 5.0, 1.0), -Vector3D::x()),
            },
        ];

        let mut scene = RenderScene::new();
        scene.add_cutting_planes(&planes, &bounds);
        assert_eq!(scene.quads.len(), 2);
        assert_ne!(scene.quads[0].color, scene.quads[1].color);

        for corner in &scene.quads[0].corners {
            assert!((corner[0] - 5.0).abs() < 1e-9);
        }
        let ys: Vec<f64> = scene.quads[0].corners.iter().map(|c| c[1]).collect();
        let span = ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max) - ys.iter().cloned().fold(f64::INFINITY, f64::min);
        assert!((span - 10.5).abs() < 1e-9);
    }

    #[test]
    fn test_scene_json() {
        let mut scene = RenderScene::new();
        scene.add_paths(&[path_with_transition()], false);
        let json = scene.to_json().unwrap();
        let back: RenderScene = serde_json::from_str(&json).unwrap();
        assert_eq!(back.polylines[0].vertices.len(), 3);
    }
}
