use crate::config::SprayConfig;
use crate::geometry::{BoundingBox, Plane, Vector3D};
use crate::kernel::{bounds_of, PatchRef};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Largest |spray · axis| for which the longest box edge is used as the in-plane axis
pub const MAX_IN_PLANE_DOT: f64 = 0.1;

/// A slicing plane; `index` becomes the plane index of every path cut by it
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CuttingPlane {
    pub index: usize,
    pub plane: Plane,
}

/// Orthonormal triad used for slicing
#[derive(Debug, Clone, Copy)]
pub struct SliceAxes {
    pub spray: Vector3D,
    pub secondary: Vector3D,
    /// Normal shared by every cutting plane
    pub slice_axis: Vector3D,
}

impl SliceAxes {
    /// Derive the triad from the spray direction and the working bounds.
    pub fn from_bounds(spray: Vector3D, bounds: &BoundingBox) -> Self {
        let spray = spray.normalize();
        let longest = bounds.longest_axis();

        let candidate = if spray.dot(&longest).abs() > MAX_IN_PLANE_DOT {
            // Longest edge runs too close to the spray direction
            let helper = if spray.dot(&Vector3D::x()).abs() > 0.9 {
                Vector3D::y()
            } else {
                Vector3D::x()
            };
            spray.cross(&helper).normalize()
        } else {
            longest
        };

        let secondary = spray.cross(&candidate).normalize();
        let slice_axis = spray.cross(&secondary).normalize();

        Self {
            spray,
            secondary,
            slice_axis,
        }
    }
}

/// Generates the parallel cutting planes spanning the working patch set
pub struct SlicePlanner {
    spray_direction: Vector3D,
    spacing: f64,
}

impl SlicePlanner {
    pub fn new(config: &SprayConfig) -> Self {
        Self {
            spray_direction: config.spray_direction,
            spacing: config.plane_spacing,
        }
    }

    pub fn plan(&self, patches: &[PatchRef]) -> Result<Vec<CuttingPlane>> {
        if patches.is_empty() {
            return Err(Error::NoVisiblePatches);
        }

        let bounds = bounds_of(patches);
        if bounds.is_void() {
            log::error!("Cannot compute bounding box of the working patch set");
            return Err(Error::VoidBoundingBox);
        }

        let planes = self.planes_for_bounds(&bounds);
        log::info!("Generated {} cutting planes for {} patches", planes.len(), patches.len());

        if planes.is_empty() {
            return Err(Error::NoCuttingPlanes);
        }
        Ok(planes)
    }

    /// Planes from `-extent/2` to `+extent/2` around the box center, inclusive.
    ///
    /// Offsets are computed from the plane index rather than accumulated, so
    /// the final plane is not lost to rounding.
    pub fn planes_for_bounds(&self, bounds: &BoundingBox) -> Vec<CuttingPlane> {
        if bounds.is_void() || !(self.spacing > 0.0) {
            return Vec::new();
        }

        let axes = SliceAxes::from_bounds(self.spray_direction, bounds);
        let center = bounds.center();
        let extent = bounds.diagonal().dot(&axes.slice_axis).abs();
        let start = -extent / 2.0;
        let count = (extent / self.spacing + 1e-9).floor() as usize + 1;

        log::debug!(
            "Slice axis {:?}, extent {:.3}, spacing {}",
            axes.slice_axis,
            extent,
            self.spacing
        );

        (0..count)
            .map(|index| {
                let offset = start + index as f64 * self.spacing;
                CuttingPlane {
                    index,
                    plane: Plane::new(center + axes.slice_axis * offset, axes.slice_axis),
                }
            })
            .collect()
    }
}
