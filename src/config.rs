use crate::geometry::Vector3D;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Planner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SprayConfig {
    /// Approach direction of the spray tool; the source sits at +infinity along it
    #[serde(default = "default_spray_direction")]
    pub spray_direction: Vector3D,

    /// Distance between adjacent cutting planes, also the width of each pass
    #[serde(default = "default_plane_spacing")]
    pub plane_spacing: f64,

    /// Stand-off of the tool from the surface along the spray direction
    #[serde(default = "default_offset_distance")]
    pub offset_distance: f64,

    /// Sampled points per unit of curve length
    #[serde(default = "default_point_density")]
    pub point_density: f64,

    /// Paths shorter than this are dropped
    #[serde(default = "default_min_path_length")]
    pub min_path_length: f64,

    /// Maximum angle (degrees) between a patch normal and the spray direction.
    /// Patches facing further away are treated as occluded. `None` disables the check.
    #[serde(default)]
    pub facing_angle_limit: Option<f64>,

    /// Apply the unit-detection threshold suggestion instead of only logging it
    #[serde(default)]
    pub auto_adjust_min_length: bool,
}

fn default_spray_direction() -> Vector3D {
    Vector3D::new(0.0, 0.0, 1.0)
}
fn default_plane_spacing() -> f64 {
    10.0
}
fn default_offset_distance() -> f64 {
    5.0
}
fn default_point_density() -> f64 {
    1.0
}
fn default_min_path_length() -> f64 {
    20.0
}

impl Default for SprayConfig {
    fn default() -> Self {
        Self {
            spray_direction: default_spray_direction(),
            plane_spacing: default_plane_spacing(),
            offset_distance: default_offset_distance(),
            point_density: default_point_density(),
            min_path_length: default_min_path_length(),
            facing_angle_limit: None,
            auto_adjust_min_length: false,
        }
    }
}

impl SprayConfig {
    /// Load a configuration profile from JSON. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SprayConfig = serde_json::from_str(json)?;
        config.validated()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check and normalize the configuration.
    ///
    /// A zero spray direction or a non-positive spacing is rejected. A
    /// non-positive density falls back to 1.0 and a negative minimum length
    /// is clamped to 0.0, both with a warning.
    pub fn validated(mut self) -> Result<Self> {
        let norm = self.spray_direction.norm();
        if !norm.is_finite() || norm < 1e-12 {
            return Err(Error::InvalidConfig(format!(
                "spray direction must be a non-zero vector, got {:?}",
                self.spray_direction
            )));
        }
        self.spray_direction /= norm;

        if !self.plane_spacing.is_finite() || self.plane_spacing <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "plane spacing must be positive, got {}",
                self.plane_spacing
            )));
        }

        if !self.offset_distance.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "offset distance must be finite, got {}",
                self.offset_distance
            )));
        }

        self.point_density = sanitize_density(self.point_density);
        self.min_path_length = sanitize_min_length(self.min_path_length);

        if let Some(limit) = self.facing_angle_limit {
            if !limit.is_finite() || limit < 0.0 {
                log::warn!("Facing angle limit {} is invalid, disabling the facing check", limit);
                self.facing_angle_limit = None;
            }
        }

        Ok(self)
    }
}

pub(crate) fn sanitize_density(density: f64) -> f64 {
    if density.is_finite() && density > 0.0 {
        density
    } else {
        log::warn!("Point density must be positive (got {}), using default 1.0", density);
        default_point_density()
    }
}

pub(crate) fn sanitize_min_length(min_length: f64) -> f64 {
    if min_length.is_nan() {
        log::warn!("Minimum path length is NaN, using 0.0");
        0.0
    } else if min_length < 0.0 {
        log::warn!("Minimum path length cannot be negative (got {}), using 0.0", min_length);
        0.0
    } else {
        min_length
    }
}
