//! Geometry-kernel boundary.
//!
//! Everything the planner needs from a boundary-representation model is
//! expressed through [`SurfacePatch`]: centroid, outward normal, area,
//! bounds and planar sections. The planner never mutates a patch.

use crate::geometry::{BoundingBox, Plane, Point3D, Vector3D};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

/// An oriented piece of a model's boundary.
pub trait SurfacePatch: Debug + Send + Sync {
    fn centroid(&self) -> Point3D;

    /// Unit outward normal, or `None` when the patch is degenerate.
    fn normal(&self) -> Option<Vector3D>;

    fn area(&self) -> f64;

    fn bounds(&self) -> BoundingBox;

    /// Curves where `plane` cuts this patch. Empty when the plane misses it.
    fn section(&self, plane: &Plane) -> Vec<SectionCurve>;
}

/// Shared handle to a patch owned by the kernel.
pub type PatchRef = Arc<dyn SurfacePatch>;

/// Polyline curve parametrized by arc length over `[0, length]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionCurve {
    points: Vec<Point3D>,
    /// Cumulative arc length at each vertex
    stations: Vec<f64>,
}

impl SectionCurve {
    /// Build a curve from its vertices. Returns `None` for fewer than two
    /// points or a zero-length polyline.
    pub fn new(points: Vec<Point3D>) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }
        let mut stations = Vec::with_capacity(points.len());
        let mut acc = 0.0;
        stations.push(acc);
        for pair in points.windows(2) {
            acc += (pair[1] - pair[0]).norm();
            stations.push(acc);
        }
        if acc <= f64::EPSILON {
            return None;
        }
        Some(Self { points, stations })
    }

    pub fn points(&self) -> &[Point3D] {
        &self.points
    }

    pub fn first_parameter(&self) -> f64 {
        0.0
    }

    pub fn last_parameter(&self) -> f64 {
        self.stations.last().copied().unwrap_or(0.0)
    }

    pub fn length(&self) -> f64 {
        self.last_parameter() - self.first_parameter()
    }

    /// Point at arc-length parameter `t`, clamped to the curve's range.
    pub fn point_at(&self, t: f64) -> Point3D {
        let t = t.clamp(self.first_parameter(), self.last_parameter());
        // First station strictly beyond t
        let idx = self.stations.partition_point(|s| *s <= t);
        if idx == 0 {
            return self.points[0];
        }
        if idx >= self.points.len() {
            return self.points[self.points.len() - 1];
        }
        let (s0, s1) = (self.stations[idx - 1], self.stations[idx]);
        let span = s1 - s0;
        if span <= f64::EPSILON {
            return self.points[idx];
        }
        let f = (t - s0) / span;
        self.points[idx - 1] + f * (self.points[idx] - self.points[idx - 1])
    }
}

/// Sub-shape hierarchy handed over by the kernel.
#[derive(Debug, Clone)]
pub enum Shape {
    Patch(PatchRef),
    Compound(Vec<Shape>),
}

impl Shape {
    pub fn patch(patch: impl SurfacePatch + 'static) -> Self {
        Shape::Patch(Arc::new(patch))
    }

    pub fn compound(children: Vec<Shape>) -> Self {
        Shape::Compound(children)
    }

    /// All patches in depth-first, left-to-right order.
    ///
    /// Walks the hierarchy with an explicit stack so arbitrarily deep
    /// compounds cannot exhaust the call stack.
    pub fn patches(&self) -> Vec<PatchRef> {
        let mut out = Vec::new();
        let mut stack: Vec<&Shape> = vec![self];
        while let Some(shape) = stack.pop() {
            match shape {
                Shape::Patch(p) => out.push(Arc::clone(p)),
                Shape::Compound(children) => stack.extend(children.iter().rev()),
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        let mut stack: Vec<&Shape> = vec![self];
        while let Some(shape) = stack.pop() {
            match shape {
                Shape::Patch(_) => return false,
                Shape::Compound(children) => stack.extend(children.iter()),
            }
        }
        true
    }
}

/// Combined bounds of a patch set.
pub fn bounds_of(patches: &[PatchRef]) -> BoundingBox {
    let mut bounds = BoundingBox::empty();
    for patch in patches {
        bounds.merge(&patch.bounds());
    }
    bounds
}

/// Section every patch with `plane`, in patch order.
pub fn section_patches(patches: &[PatchRef], plane: &Plane) -> Vec<SectionCurve> {
    patches.iter().flat_map(|p| p.section(plane)).collect()
}
