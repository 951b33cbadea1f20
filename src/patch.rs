use crate::geometry::{BoundingBox, Plane, Point3D, Triangle, Vector3D};
use crate::kernel::{SectionCurve, SurfacePatch};
use crate::section::{section_triangles, CHAIN_TOLERANCE};

#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("Empty patch")]
    EmptyPatch,

    #[error("Degenerate patch: {0}")]
    Degenerate(String),
}

/// Surface patch tessellated into triangles.
///
/// The triangle winding defines the outward side. This is the reference
/// implementation of [`SurfacePatch`] used by the demo binary and the tests;
/// a B-rep kernel binding would provide its own.
#[derive(Debug, Clone)]
pub struct MeshPatch {
    pub triangles: Vec<Triangle>,
    pub bounds_min: Point3D,
    pub bounds_max: Point3D,
}

impl MeshPatch {
    /// Create a new patch from triangles
    pub fn new(triangles: Vec<Triangle>) -> Result<Self, PatchError> {
        if triangles.is_empty() {
            return Err(PatchError::EmptyPatch);
        }

        let (bounds_min, bounds_max) = Self::compute_bounds(&triangles);

        Ok(Self {
            triangles,
            bounds_min,
            bounds_max,
        })
    }

    /// Parallelogram `origin + s*edge_u + t*edge_v`, `s, t ∈ [0, 1]`,
    /// facing `edge_u × edge_v`.
    pub fn rectangle(origin: Point3D, edge_u: Vector3D, edge_v: Vector3D) -> Result<Self, PatchError> {
        if edge_u.cross(&edge_v).norm() < 1e-12 {
            return Err(PatchError::Degenerate(
                "rectangle edges are parallel or zero".to_string(),
            ));
        }
        let a = origin;
        let b = origin + edge_u;
        let c = origin + edge_u + edge_v;
        let d = origin + edge_v;
        Self::new(vec![Triangle::new(a, b, c), Triangle::new(a, c, d)])
    }

    /// Compute bounding box of triangles
    fn compute_bounds(triangles: &[Triangle]) -> (Point3D, Point3D) {
        let mut bounds = BoundingBox::empty();
        for tri in triangles {
            for vertex in tri.vertices() {
                bounds.add_point(&vertex);
            }
        }
        (bounds.min, bounds.max)
    }

    /// Translate patch by vector
    pub fn translate(&mut self, offset: Vector3D) {
        for tri in &mut self.triangles {
            tri.v0 += offset;
            tri.v1 += offset;
            tri.v2 += offset;
        }
        self.bounds_min += offset;
        self.bounds_max += offset;
    }
}

impl SurfacePatch for MeshPatch {
    /// Area-weighted centroid; falls back to the vertex average for zero area.
    fn centroid(&self) -> Point3D {
        let total = self.area();
        if total <= f64::EPSILON {
            let n = (self.triangles.len() * 3) as f64;
            let sum: Vector3D = self
                .triangles
                .iter()
                .flat_map(|t| t.vertices())
                .map(|v| v.coords)
                .sum();
            return Point3D::from(sum / n);
        }
        let weighted: Vector3D = self
            .triangles
            .iter()
            .map(|t| t.centroid().coords * t.area())
            .sum();
        Point3D::from(weighted / total)
    }

    fn normal(&self) -> Option<Vector3D> {
        let sum: Vector3D = self.triangles.iter().map(|t| t.area_vector()).sum();
        let norm = sum.norm();
        if norm < 1e-12 || !norm.is_finite() {
            return None;
        }
        Some(sum / norm)
    }

    fn area(&self) -> f64 {
        self.triangles.iter().map(|t| t.area()).sum()
    }

    fn bounds(&self) -> BoundingBox {
        BoundingBox {
            min: self.bounds_min,
            max: self.bounds_max,
        }
    }

    fn section(&self, plane: &Plane) -> Vec<SectionCurve> {
        // Reject early when every box corner is on one side
        let corners = self.box_corners();
        if corners.iter().all(|c| plane.signed_distance(c) > 0.0)
            || corners.iter().all(|c| plane.signed_distance(c) < 0.0)
        {
            return Vec::new();
        }
        section_triangles(&self.triangles, plane, CHAIN_TOLERANCE)
    }
}

impl MeshPatch {
    fn box_corners(&self) -> [Point3D; 8] {
        let (a, b) = (self.bounds_min, self.bounds_max);
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
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> MeshPatch {
        MeshPatch::rectangle(
            Point3D::new(0.0, 0.0, 0.0),
            Vector3D::new(10.0, 0.0, 0.0),
            Vector3D::new(0.0, 10.0, 0.0),
        )
        .unwrap()
    }

    #[test]
    fn test_patch_creation() {
        assert!(matches!(MeshPatch::new(Vec::new()), Err(PatchError::EmptyPatch)));
        assert!(MeshPatch::rectangle(Point3D::origin(), Vector3D::x(), Vector3D::x() * 2.0).is_err());
        assert_eq!(square().triangles.len(), 2);
    }

    #[test]
    fn test_square_properties() {
        let sq = square();
        assert!((sq.area() - 100.0).abs() < 1e-9);
        assert!((sq.centroid() - Point3D::new(5.0, 5.0, 0.0)).norm() < 1e-9);
        assert!((sq.normal().unwrap() - Vector3D::z()).norm() < 1e-12);
    }

    #[test]
    fn test_patch_translate() {
        let mut sq = square();
        sq.translate(Vector3D::new(0.0, 0.0, 5.0));
        assert_eq!(sq.bounds().min.z, 5.0);
        assert!((sq.centroid().z - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_section_misses_and_hits() {
        let sq = square();
        let miss = Plane::new(Point3D::new(20.0, 0.0, 0.0), Vector3D::x());
        assert!(sq.section(&miss).is_empty());

        let hit = Plane::new(Point3D::new(2.5, 0.0, 0.0), Vector3D::x());
        let curves = sq.section(&hit);
        assert_eq!(curves.len(), 1);
        assert!((curves[0].length() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_section_on_boundary_edge() {
        let sq = square();
        let edge = Plane::new(Point3D::new(0.0, 0.0, 0.0), Vector3D::x());
        let curves = sq.section(&edge);
        assert_eq!(curves.len(), 1);
        assert!((curves[0].length() - 10.0).abs() < 1e-9);
    }
}
