// Heuristic length-unit detection
// The geometry kernel does not report its length unit, so it is inferred by
// measuring a nominal 10-unit path and from the spread of path lengths.

use crate::geometry::{Point3D, Vector3D};
use crate::path::{path_length, PathPoint, SprayPath};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Path lengths outside this range trigger unit detection
pub const PLAUSIBLE_MIN_LENGTH: f64 = 1.0;
pub const PLAUSIBLE_MAX_LENGTH: f64 = 10_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LengthUnit {
    Millimeter,
    Centimeter,
    Inch,
    Meter,
    Unknown,
}

impl LengthUnit {
    /// Match a measured nominal-10 length against known scale factors.
    pub fn from_test_length(length: f64) -> Self {
        if length > 9.99 && length < 10.01 {
            LengthUnit::Millimeter
        } else if length > 0.0099 && length < 0.0101 {
            LengthUnit::Meter
        } else if length > 0.99 && length < 1.01 {
            LengthUnit::Centimeter
        } else if length > 0.39 && length < 0.40 {
            LengthUnit::Inch
        } else {
            LengthUnit::Unknown
        }
    }
}

impl fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LengthUnit::Millimeter => "millimeters",
            LengthUnit::Centimeter => "centimeters",
            LengthUnit::Inch => "inches",
            LengthUnit::Meter => "meters",
            LengthUnit::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Model scale inferred from the median path length, assuming parts a few
/// centimeters to decimeters across
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LengthScale {
    Millimeter,
    Centimeter,
    Decimeter,
    Meter,
    Kilometer,
}

impl LengthScale {
    pub fn from_median(median: f64) -> Self {
        if median > 1000.0 {
            LengthScale::Millimeter
        } else if median > 10.0 {
            LengthScale::Centimeter
        } else if median > 0.1 {
            LengthScale::Decimeter
        } else if median > 0.001 {
            LengthScale::Meter
        } else {
            LengthScale::Kilometer
        }
    }

    /// Minimum path length equivalent to 20 mm at this scale.
    pub fn suggested_min_path_length(&self) -> f64 {
        match self {
            LengthScale::Millimeter => 20.0,
            LengthScale::Centimeter => 2.0,
            LengthScale::Decimeter => 0.2,
            LengthScale::Meter => 0.02,
            LengthScale::Kilometer => 0.00002,
        }
    }
}

impl fmt::Display for LengthScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LengthScale::Millimeter => "millimeters",
            LengthScale::Centimeter => "centimeters",
            LengthScale::Decimeter => "decimeters or inches",
            LengthScale::Meter => "meters",
            LengthScale::Kilometer => "kilometers or larger",
        };
        f.write_str(name)
    }
}

/// Measure a synthetic two-point path of nominal length 10 with the same
/// routine used for real paths and map the result to a unit.
pub fn detect_units() -> LengthUnit {
    let normal = Vector3D::z();
    let probe = [
        PathPoint::spray(Point3D::new(0.0, 0.0, 0.0), normal),
        PathPoint::spray(Point3D::new(10.0, 0.0, 0.0), normal),
    ];
    let measured = path_length(&probe);
    log::debug!("Unit detection: 10-unit test path length = {}", measured);
    LengthUnit::from_test_length(measured)
}

/// Summary of path lengths relative to a threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathLengthStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub mean: f64,
    pub total: f64,
    /// Paths that would be filtered by `threshold`
    pub below_threshold: usize,
    pub threshold: f64,
}

impl PathLengthStats {
    pub fn from_lengths(lengths: &[f64], threshold: f64) -> Option<Self> {
        if lengths.is_empty() {
            return None;
        }

        let mut sorted = lengths.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let total: f64 = sorted.iter().sum();
        Some(Self {
            count: sorted.len(),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            median: sorted[sorted.len() / 2],
            mean: total / sorted.len() as f64,
            total,
            below_threshold: sorted.iter().filter(|l| **l < threshold).count(),
            threshold,
        })
    }

    pub fn from_paths(paths: &[SprayPath], threshold: f64) -> Option<Self> {
        let lengths: Vec<f64> = paths.iter().map(|p| p.length()).collect();
        Self::from_lengths(&lengths, threshold)
    }

    /// True when lengths fall outside the plausible millimeter range.
    pub fn is_implausible(&self) -> bool {
        self.min < PLAUSIBLE_MIN_LENGTH || self.max > PLAUSIBLE_MAX_LENGTH
    }

    pub fn log_summary(&self) {
        log::info!("Path length statistics:");
        log::info!("  Total paths: {}", self.count);
        log::info!("  Min: {:.6}  Max: {:.6}  Median: {:.6}", self.min, self.max, self.median);
        log::info!("  Average: {:.6}  Total: {:.6}", self.mean, self.total);
        log::info!(
            "  Below threshold {}: {} ({:.1}%)",
            self.threshold,
            self.below_threshold,
            100.0 * self.below_threshold as f64 / self.count as f64
        );
    }
}

/// Outcome of a unit-detection run over generated paths
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitReport {
    pub stats: PathLengthStats,
    /// Unit reported by measuring a nominal 10-unit path
    pub kernel_unit: LengthUnit,
    /// Scale inferred from the median path length
    pub scale: LengthScale,
    /// 20 mm equivalent at the inferred scale
    pub suggested_min_path_length: f64,
    /// Whether the suggestion replaced the configured minimum path length
    pub applied: bool,
}

impl UnitReport {
    pub fn new(stats: PathLengthStats) -> Self {
        let scale = LengthScale::from_median(stats.median);
        Self {
            kernel_unit: detect_units(),
            scale,
            suggested_min_path_length: scale.suggested_min_path_length(),
            stats,
            applied: false,
        }
    }

    /// Suggested threshold when it differs from `current` by more than 10%.
    pub fn adjustment_for(&self, current: f64) -> Option<f64> {
        let suggested = self.suggested_min_path_length;
        if (current - suggested).abs() > suggested * 0.1 {
            Some(suggested)
        } else {
            None
        }
    }
}
