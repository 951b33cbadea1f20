use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// 3D point type
pub type Point3D = Point3<f64>;

/// 3D vector type
pub type Vector3D = Vector3<f64>;

/// Distance below which a point is treated as lying on a plane.
pub const PLANE_EPSILON: f64 = 1e-9;

/// Triangle defined by three vertices
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Triangle {
    pub v0: Point3D,
    pub v1: Point3D,
    pub v2: Point3D,
}

impl Triangle {
    pub fn new(v0: Point3D, v1: Point3D, v2: Point3D) -> Self {
        Self { v0, v1, v2 }
    }

    /// Unnormalized normal; its length is twice the triangle area.
    pub fn area_vector(&self) -> Vector3D {
        (self.v1 - self.v0).cross(&(self.v2 - self.v0))
    }

    /// Unit normal following the vertex winding, or `None` for degenerate triangles.
    pub fn normal(&self) -> Option<Vector3D> {
        let cross = self.area_vector();
        let norm = cross.norm();
        if norm < 1e-12 || !norm.is_finite() {
            return None;
        }
        Some(cross / norm)
    }

    pub fn area(&self) -> f64 {
        self.area_vector().norm() / 2.0
    }

    pub fn centroid(&self) -> Point3D {
        Point3D::from((self.v0.coords + self.v1.coords + self.v2.coords) / 3.0)
    }

    pub fn vertices(&self) -> [Point3D; 3] {
        [self.v0, self.v1, self.v2]
    }

    /// Intersect the triangle with an arbitrary plane.
    ///
    /// Returns the chord where the plane crosses the triangle, or `None` when
    /// the plane misses it, only touches a vertex, or contains the whole
    /// triangle.
    pub fn intersect_plane(&self, plane: &Plane) -> Option<LineSegment> {
        let verts = self.vertices();
        let dists = verts.map(|v| plane.signed_distance(&v));

        if dists.iter().all(|d| *d > PLANE_EPSILON) || dists.iter().all(|d| *d < -PLANE_EPSILON) {
            return None;
        }
        if dists.iter().all(|d| d.abs() <= PLANE_EPSILON) {
            // Coplanar triangle
            return None;
        }

        let mut intersections: Vec<Point3D> = Vec::with_capacity(3);
        for (i, j) in [(0, 1), (1, 2), (2, 0)] {
            if let Some(point) = intersect_edge_with_plane(verts[i], verts[j], dists[i], dists[j]) {
                let duplicate = intersections
                    .iter()
                    .any(|p| (p.coords - point.coords).norm() < 1e-10);
                if !duplicate {
                    intersections.push(point);
                }
            }
        }

        if intersections.len() == 2 {
            Some(LineSegment::new(intersections[0], intersections[1]))
        } else {
            None
        }
    }
}

/// Line segment in 3D space
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LineSegment {
    pub start: Point3D,
    pub end: Point3D,
}

impl LineSegment {
    pub fn new(start: Point3D, end: Point3D) -> Self {
        Self { start, end }
    }

    pub fn length(&self) -> f64 {
        (self.end - self.start).norm()
    }
}

/// Plane defined by a point and normal vector
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Plane {
    pub point: Point3D,
    pub normal: Vector3D,
}

impl Plane {
    pub fn new(point: Point3D, normal: Vector3D) -> Self {
        Self {
            point,
            normal: normal.normalize(),
        }
    }

    /// Distance from point to plane (signed)
    pub fn signed_distance(&self, point: &Point3D) -> f64 {
        self.normal.dot(&(point - self.point))
    }
}

/// Intersect an edge with a plane given the signed distances of its endpoints.
fn intersect_edge_with_plane(p1: Point3D, p2: Point3D, d1: f64, d2: f64) -> Option<Point3D> {
    if d1.abs() <= PLANE_EPSILON {
        return Some(p1);
    }
    if d2.abs() <= PLANE_EPSILON {
        return Some(p2);
    }

    // Both points on the same side
    if (d1 < 0.0 && d2 < 0.0) || (d1 > 0.0 && d2 > 0.0) {
        return None;
    }

    let t = d1 / (d1 - d2);
    Some(p1 + t * (p2 - p1))
}

/// Axis-aligned bounding box. A freshly created box is void until a point is added.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Point3D,
    pub max: Point3D,
}

impl BoundingBox {
    pub fn empty() -> Self {
        Self {
            min: Point3D::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3D::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3D>) -> Self {
        let mut bounds = Self::empty();
        for p in points {
            bounds.add_point(p);
        }
        bounds
    }

    pub fn is_void(&self) -> bool {
        !(self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z)
    }

    pub fn add_point(&mut self, p: &Point3D) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);

        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }

    pub fn merge(&mut self, other: &BoundingBox) {
        if other.is_void() {
            return;
        }
        self.add_point(&other.min);
        self.add_point(&other.max);
    }

    pub fn center(&self) -> Point3D {
        Point3D::from((self.min.coords + self.max.coords) / 2.0)
    }

    pub fn diagonal(&self) -> Vector3D {
        self.max - self.min
    }

    /// Unit axis (X, Y or Z) along the longest box edge. Ties favor X, then Y.
    pub fn longest_axis(&self) -> Vector3D {
        let d = self.diagonal();
        if d.x >= d.y && d.x >= d.z {
            Vector3D::x()
        } else if d.y >= d.z {
            Vector3D::y()
        } else {
            Vector3D::z()
        }
    }
}

/// Orthonormal pair spanning the plane perpendicular to `direction`.
///
/// For `direction = +Z` this is exactly `(X, Y)`, so transverse coordinates
/// coincide with plan-view coordinates.
pub fn transverse_basis(direction: &Vector3D) -> (Vector3D, Vector3D) {
    let dir = direction.normalize();
    let helper = if dir.x.abs() < 0.9 {
        Vector3D::x()
    } else {
        Vector3D::y()
    };
    let u = (helper - dir * dir.dot(&helper)).normalize();
    let v = dir.cross(&u);
    (u, v)
}

/// Projects points onto the spray direction (depth) and its transverse plane.
#[derive(Debug, Clone, Copy)]
pub struct SprayFrame {
    pub direction: Vector3D,
    pub u: Vector3D,
    pub v: Vector3D,
}

impl SprayFrame {
    pub fn new(direction: Vector3D) -> Self {
        let direction = direction.normalize();
        let (u, v) = transverse_basis(&direction);
        Self { direction, u, v }
    }

    /// Height along the spray direction; larger values are closer to the source.
    pub fn depth(&self, p: &Point3D) -> f64 {
        p.coords.dot(&self.direction)
    }

    pub fn transverse(&self, p: &Point3D) -> (f64, f64) {
        (p.coords.dot(&self.u), p.coords.dot(&self.v))
    }

    pub fn transverse_distance(&self, a: &Point3D, b: &Point3D) -> f64 {
        let (au, av) = self.transverse(a);
        let (bu, bv) = self.transverse(b);
        ((au - bu).powi(2) + (av - bv).powi(2)).sqrt()
    }
}

/// 2D box in transverse coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransverseBox {
    pub min_u: f64,
    pub max_u: f64,
    pub min_v: f64,
    pub max_v: f64,
}

impl TransverseBox {
    pub fn from_points<'a>(frame: &SprayFrame, points: impl IntoIterator<Item = &'a Point3D>) -> Option<Self> {
        let mut bounds: Option<Self> = None;
        for p in points {
            let (u, v) = frame.transverse(p);
            bounds = Some(match bounds {
                None => Self { min_u: u, max_u: u, min_v: v, max_v: v },
                Some(b) => Self {
                    min_u: b.min_u.min(u),
                    max_u: b.max_u.max(u),
                    min_v: b.min_v.min(v),
                    max_v: b.max_v.max(v),
                },
            });
        }
        bounds
    }

    pub fn area(&self) -> f64 {
        (self.max_u - self.min_u) * (self.max_v - self.min_v)
    }

    pub fn expanded(&self, margin: f64) -> Self {
        Self {
            min_u: self.min_u - margin,
            max_u: self.max_u + margin,
            min_v: self.min_v - margin,
            max_v: self.max_v + margin,
        }
    }

    /// Strict overlap: boxes that merely touch do not overlap.
    pub fn overlaps(&self, other: &TransverseBox) -> bool {
        self.min_u < other.max_u
            && self.max_u > other.min_u
            && self.min_v < other.max_v
            && self.max_v > other.min_v
    }

    pub fn intersection_area(&self, other: &TransverseBox) -> f64 {
        let min_u = self.min_u.max(other.min_u);
        let max_u = self.max_u.min(other.max_u);
        let min_v = self.min_v.max(other.min_v);
        let max_v = self.max_v.min(other.max_v);
        if min_u >= max_u || min_v >= max_v {
            return 0.0;
        }
        (max_u - min_u) * (max_v - min_v)
    }

    pub fn contains(&self, u: f64, v: f64) -> bool {
        u >= self.min_u && u <= self.max_u && v >= self.min_v && v <= self.max_v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triangle_plane_intersection() {
        let tri = Triangle::new(
            Point3D::new(0.0, 0.0, 0.0),
            Point3D::new(1.0, 0.0, 0.0),
            Point3D::new(0.0, 1.0, 1.0),
        );

        let plane = Plane::new(Point3D::new(0.0, 0.0, 0.5), Vector3D::z());
        let segment = tri.intersect_plane(&plane).unwrap();
        assert!((segment.start.z - 0.5).abs() < 1e-10);
        assert!((segment.end.z - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_triangle_edge_in_plane() {
        let tri = Triangle::new(
            Point3D::new(0.0, 0.0, 0.0),
            Point3D::new(10.0, 10.0, 0.0),
            Point3D::new(0.0, 10.0, 0.0),
        );
        let plane = Plane::new(Point3D::new(0.0, 0.0, 0.0), Vector3D::x());
        let segment = tri.intersect_plane(&plane).unwrap();
        assert!((segment.length() - 10.0).abs() < 1e-10);
    }

    #[test]
    fn test_vertex_touch_is_not_a_chord() {
        let tri = Triangle::new(
            Point3D::new(0.0, 0.0, 0.0),
            Point3D::new(10.0, 0.0, 0.0),
            Point3D::new(10.0, 10.0, 0.0),
        );
        let plane = Plane::new(Point3D::new(0.0, 0.0, 0.0), Vector3D::x());
        assert!(tri.intersect_plane(&plane).is_none());
    }

    #[test]
    fn test_plane_distance() {
        let plane = Plane::new(Point3D::new(0.0, 0.0, 5.0), Vector3D::z());
        let point = Point3D::new(1.0, 2.0, 8.0);

        assert!((plane.signed_distance(&point) - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_bounding_box_void_and_longest_axis() {
        let empty = BoundingBox::empty();
        assert!(empty.is_void());

        let pts = [Point3D::new(0.0, 0.0, 0.0), Point3D::new(2.0, 7.0, 1.0)];
        let bounds = BoundingBox::from_points(pts.iter());
        assert!(!bounds.is_void());
        assert_eq!(bounds.longest_axis(), Vector3D::y());
        assert_eq!(bounds.center(), Point3D::new(1.0, 3.5, 0.5));
    }

    #[test]
    fn test_transverse_basis_for_z_is_xy() {
        let (u, v) = transverse_basis(&Vector3D::z());
        assert!((u - Vector3D::x()).norm() < 1e-12);
        assert!((v - Vector3D::y()).norm() < 1e-12);
    }

    #[test]
    fn test_transverse_box_overlap() {
        let a = TransverseBox { min_u: 0.0, max_u: 10.0, min_v: 0.0, max_v: 10.0 };
        let b = TransverseBox { min_u: 5.0, max_u: 15.0, min_v: 5.0, max_v: 15.0 };
        let c = TransverseBox { min_u: 10.0, max_u: 12.0, min_v: 0.0, max_v: 10.0 };

        assert!(a.overlaps(&b));
        assert!((a.intersection_area(&b) - 25.0).abs() < 1e-12);
        assert!(!a.overlaps(&c));
        assert!(a.expanded(1.0).contains(-0.5, 10.5));
    }
}
