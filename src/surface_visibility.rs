// Patch-level visibility along the spray direction
// Disk-overlap model with multiplicative attenuation over all closer patches

use crate::config::SprayConfig;
use crate::geometry::{Point3D, SprayFrame, Vector3D};
use crate::kernel::PatchRef;
use crate::{Error, Result};
use std::collections::BTreeSet;
use std::f64::consts::PI;
use std::sync::Arc;

/// Below this ratio a patch is treated as occluded
pub const OCCLUDED_BELOW: f64 = 0.1;

/// At or above this ratio a patch is fully visible
pub const FULLY_VISIBLE_FROM: f64 = 0.8;

/// Occluders must be closer to the source by more than this fraction of the plane spacing
pub const OCCLUDER_DEPTH_FACTOR: f64 = 0.1;

/// Per-patch visibility record
#[derive(Debug, Clone)]
pub struct PatchVisibility {
    /// Position of the patch in the model's patch list
    pub patch_index: usize,
    pub patch: PatchRef,
    pub centroid: Point3D,
    pub normal: Option<Vector3D>,
    pub area: f64,
    /// Centroid projected onto the spray direction
    pub depth: f64,
    pub is_visible: bool,
    pub is_partially_visible: bool,
    /// Estimated unoccluded fraction in [0, 1]
    pub visibility_ratio: f64,
    pub occluding_patches: BTreeSet<usize>,
}

impl PatchVisibility {
    pub fn is_fully_visible(&self) -> bool {
        self.is_visible && !self.is_partially_visible
    }
}

/// Output of a surface visibility run
#[derive(Debug, Clone, Default)]
pub struct SurfaceVisibility {
    pub records: Vec<PatchVisibility>,
    /// Fully and partially visible patches, in model order
    pub visible_patches: Vec<PatchRef>,
}

impl SurfaceVisibility {
    pub fn fully_visible_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_fully_visible()).count()
    }

    pub fn partially_visible_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.is_visible && r.is_partially_visible)
            .count()
    }
}

/// Classifies model patches as visible, partially visible or occluded
pub struct SurfaceVisibilityAnalyzer {
    frame: SprayFrame,
    depth_margin: f64,
    /// Cosine of the facing angle limit, when the facing check is enabled
    min_facing_cos: Option<f64>,
}

impl SurfaceVisibilityAnalyzer {
    pub fn new(config: &SprayConfig) -> Self {
        Self {
            frame: SprayFrame::new(config.spray_direction),
            depth_margin: config.plane_spacing * OCCLUDER_DEPTH_FACTOR,
            min_facing_cos: config.facing_angle_limit.map(|deg| deg.to_radians().cos()),
        }
    }

    /// Classify every patch and collect the working set for slicing.
    pub fn analyze(&self, patches: &[PatchRef]) -> Result<SurfaceVisibility> {
        if patches.is_empty() {
            return Err(Error::EmptyModel);
        }

        log::info!("Analyzing visibility of {} surface patches", patches.len());

        let mut records: Vec<PatchVisibility> = patches
            .iter()
            .enumerate()
            .map(|(index, patch)| self.initial_record(index, patch))
            .collect();

        // Skipped patches neither receive a verdict nor occlude others
        let skipped: Vec<bool> = records.iter().map(|r| !r.is_visible).collect();

        let facing_rejected = self.apply_facing_filter(&mut records, &skipped);
        if facing_rejected > 0 {
            log::info!("  {} patches face away from the spray source", facing_rejected);
        }

        let snapshot: Vec<(Point3D, f64, f64)> = records
            .iter()
            .map(|r| (r.centroid, r.area, r.depth))
            .collect();

        for i in 0..records.len() {
            if !records[i].is_visible {
                continue;
            }

            let (centroid_i, area_i, depth_i) = snapshot[i];
            let mut visibility = 1.0;
            let mut occluders = BTreeSet::new();

            for (j, &(centroid_j, area_j, depth_j)) in snapshot.iter().enumerate() {
                if i == j || skipped[j] {
                    continue;
                }
                if depth_j <= depth_i + self.depth_margin {
                    continue;
                }

                let distance = self.frame.transverse_distance(&centroid_i, &centroid_j);
                let overlap = disk_overlap_ratio(distance, area_i, area_j);
                if overlap > 0.0 {
                    visibility *= 1.0 - overlap;
                    occluders.insert(j);
                }
            }

            let record = &mut records[i];
            record.visibility_ratio = visibility;
            record.occluding_patches = occluders;
            classify(record);
        }

        let visible_patches: Vec<PatchRef> = records
            .iter()
            .filter(|r| r.is_visible)
            .map(|r| Arc::clone(&r.patch))
            .collect();

        let result = SurfaceVisibility {
            records,
            visible_patches,
        };

        let full = result.fully_visible_count();
        let partial = result.partially_visible_count();
        log::info!("Surface visibility analysis complete:");
        log::info!("  Total patches: {}", result.records.len());
        log::info!("  Fully visible: {}", full);
        log::info!("  Partially visible: {}", partial);
        log::info!("  Occluded: {}", result.records.len() - full - partial);

        if result.visible_patches.is_empty() {
            return Err(Error::NoVisiblePatches);
        }

        Ok(result)
    }

    fn initial_record(&self, patch_index: usize, patch: &PatchRef) -> PatchVisibility {
        let centroid = patch.centroid();
        let normal = patch.normal();
        let area = patch.area();

        let degenerate = !area.is_finite()
            || area <= 0.0
            || (self.min_facing_cos.is_some() && normal.is_none());
        if degenerate {
            log::warn!("Skipping degenerate patch {} (area {}, normal {:?})", patch_index, area, normal);
        }

        PatchVisibility {
            patch_index,
            patch: Arc::clone(patch),
            centroid,
            normal,
            area,
            depth: self.frame.depth(&centroid),
            is_visible: !degenerate,
            is_partially_visible: false,
            visibility_ratio: if degenerate { 0.0 } else { 1.0 },
            occluding_patches: BTreeSet::new(),
        }
    }

    /// Mark patches facing away from the source as occluded. Returns how many were rejected.
    fn apply_facing_filter(&self, records: &mut [PatchVisibility], skipped: &[bool]) -> usize {
        let Some(min_cos) = self.min_facing_cos else {
            return 0;
        };

        let mut rejected = 0;
        for (record, &skip) in records.iter_mut().zip(skipped) {
            if skip {
                continue;
            }
            let Some(normal) = record.normal else {
                continue;
            };
            if normal.dot(&self.frame.direction) < min_cos {
                record.is_visible = false;
                record.visibility_ratio = 0.0;
                rejected += 1;
            }
        }
        rejected
    }
}

fn classify(record: &mut PatchVisibility) {
    let ratio = record.visibility_ratio;
    if ratio < OCCLUDED_BELOW {
        log::debug!("Patch {} occluded (visibility {:.3})", record.patch_index, ratio);
        record.is_visible = false;
        record.is_partially_visible = false;
    } else if ratio < FULLY_VISIBLE_FROM {
        log::debug!("Patch {} partially visible (visibility {:.3})", record.patch_index, ratio);
        record.is_visible = true;
        record.is_partially_visible = true;
    } else {
        record.is_visible = true;
        record.is_partially_visible = false;
    }
}

/// Fraction of patch `i` covered by patch `j`, both approximated by disks
/// of equal area whose centers are `distance` apart in the transverse plane.
pub fn disk_overlap_ratio(distance: f64, area_i: f64, area_j: f64) -> f64 {
    if area_i <= 0.0 || area_j <= 0.0 {
        return 0.0;
    }
    let r_i = (area_i / PI).sqrt();
    let r_j = (area_j / PI).sqrt();

    if distance >= r_i + r_j {
        return 0.0;
    }
    if distance + r_i <= r_j {
        return 1.0;
    }
    if distance + r_j <= r_i {
        return (r_j / r_i).powi(2);
    }

    let overlap = (1.0 - distance / (r_i + r_j)).clamp(0.0, 1.0);
    let area_ratio = (area_j / area_i).min(1.0);
    (overlap * area_ratio).clamp(0.0, 1.0)
}
