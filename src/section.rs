use crate::geometry::{LineSegment, Plane, Point3D, Triangle};
use crate::kernel::SectionCurve;
use std::collections::{HashMap, HashSet};

/// Default tolerance for matching segment endpoints
pub const CHAIN_TOLERANCE: f64 = 1e-6;

/// Section a triangle soup with a plane and chain the chords into curves.
pub fn section_triangles(triangles: &[Triangle], plane: &Plane, tolerance: f64) -> Vec<SectionCurve> {
    let segments: Vec<LineSegment> = triangles
        .iter()
        .filter_map(|tri| tri.intersect_plane(plane))
        .collect();

    chain_segments(&segments, tolerance)
        .into_iter()
        .filter_map(SectionCurve::new)
        .collect()
}

/// Chain loose segments into polylines by matching endpoints through a hash
/// table keyed on quantized coordinates. O(m) in the number of segments.
///
/// Chords that appear twice (an edge shared by two triangles lying in the
/// plane) are collapsed first. Open chains are grown in both directions from
/// their seed segment, so the result does not depend on which segment of a
/// chain happens to be visited first.
pub fn chain_segments(segments: &[LineSegment], tolerance: f64) -> Vec<Vec<Point3D>> {
    if segments.is_empty() {
        return Vec::new();
    }

    let segments = dedup_segments(segments, tolerance);

    let mut endpoint_map: HashMap<PointKey, Vec<usize>> = HashMap::new();
    for (i, segment) in segments.iter().enumerate() {
        endpoint_map
            .entry(PointKey::from_point(&segment.start, tolerance))
            .or_default()
            .push(i);
        endpoint_map
            .entry(PointKey::from_point(&segment.end, tolerance))
            .or_default()
            .push(i);
    }

    let mut used = vec![false; segments.len()];
    let mut chains = Vec::new();

    for start_idx in 0..segments.len() {
        if used[start_idx] {
            continue;
        }
        used[start_idx] = true;

        let seed = segments[start_idx];
        let forward = walk(seed.end, &segments, &endpoint_map, &mut used, tolerance);

        let closed = forward
            .last()
            .map(|p| PointKey::from_point(p, tolerance) == PointKey::from_point(&seed.start, tolerance))
            .unwrap_or(false);

        let mut chain: Vec<Point3D> = Vec::new();
        if !closed {
            let mut backward = walk(seed.start, &segments, &endpoint_map, &mut used, tolerance);
            backward.reverse();
            chain.extend(backward);
        }
        chain.push(seed.start);
        chain.push(seed.end);
        chain.extend(forward);

        chains.push(chain);
    }

    chains
}

/// Follow unused segments from `from`, returning the points reached in order.
fn walk(
    from: Point3D,
    segments: &[LineSegment],
    endpoint_map: &HashMap<PointKey, Vec<usize>>,
    used: &mut [bool],
    tolerance: f64,
) -> Vec<Point3D> {
    let mut points = Vec::new();
    let mut current = from;

    loop {
        let key = PointKey::from_point(&current, tolerance);
        let next_idx = endpoint_map
            .get(&key)
            .and_then(|indices| indices.iter().find(|&&idx| !used[idx]).copied());

        let Some(idx) = next_idx else {
            return points;
        };
        used[idx] = true;

        let segment = &segments[idx];
        let next = if PointKey::from_point(&segment.start, tolerance) == key {
            segment.end
        } else {
            segment.start
        };
        points.push(next);
        current = next;
    }
}

fn dedup_segments(segments: &[LineSegment], tolerance: f64) -> Vec<LineSegment> {
    let mut seen: HashSet<(PointKey, PointKey)> = HashSet::new();
    let mut out = Vec::with_capacity(segments.len());
    for segment in segments {
        let a = PointKey::from_point(&segment.start, tolerance);
        let b = PointKey::from_point(&segment.end, tolerance);
        if a == b {
            continue;
        }
        let key = if a <= b { (a, b) } else { (b, a) };
        if seen.insert(key) {
            out.push(*segment);
        }
    }
    out
}

/// Discretized point key for hash map (handles floating point comparison)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct PointKey {
    x: i64,
    y: i64,
    z: i64,
}

impl PointKey {
    fn from_point(point: &Point3D, tolerance: f64) -> Self {
        let scale = 1.0 / tolerance;
        Self {
            x: (point.x * scale).round() as i64,
            y: (point.y * scale).round() as i64,
            z: (point.z * scale).round() as i64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Vector3D;

    fn seg(a: (f64, f64), b: (f64, f64)) -> LineSegment {
        LineSegment::new(Point3D::new(a.0, a.1, 0.0), Point3D::new(b.0, b.1, 0.0))
    }

    #[test]
    fn test_closed_loop() {
        let segments = vec![
            seg((0.0, 0.0), (1.0, 0.0)),
            seg((1.0, 0.0), (1.0, 1.0)),
            seg((1.0, 1.0), (0.0, 1.0)),
            seg((0.0, 1.0), (0.0, 0.0)),
        ];

        let chains = chain_segments(&segments, CHAIN_TOLERANCE);
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].len(), 5); // 4 corners + closing point
    }

    #[test]
    fn test_open_chain_seeded_in_the_middle() {
        // Seed segment is the middle one; both ends must still be collected.
        let segments = vec![
            seg((1.0, 0.0), (2.0, 0.0)),
            seg((0.0, 0.0), (1.0, 0.0)),
            seg((3.0, 0.0), (2.0, 0.0)),
        ];

        let chains = chain_segments(&segments, CHAIN_TOLERANCE);
        assert_eq!(chains.len(), 1);
        let xs: Vec<f64> = chains[0].iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_duplicate_chords_collapse() {
        let segments = vec![seg((0.0, 0.0), (0.0, 10.0)), seg((0.0, 10.0), (0.0, 0.0))];
        let chains = chain_segments(&segments, CHAIN_TOLERANCE);
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].len(), 2);
    }

    #[test]
    fn test_section_two_triangle_square() {
        let triangles = vec![
            Triangle::new(
                Point3D::new(0.0, 0.0, 0.0),
                Point3D::new(10.0, 0.0, 0.0),
                Point3D::new(10.0, 10.0, 0.0),
            ),
            Triangle::new(
                Point3D::new(0.0, 0.0, 0.0),
                Point3D::new(10.0, 10.0, 0.0),
                Point3D::new(0.0, 10.0, 0.0),
            ),
        ];
        let plane = Plane::new(Point3D::new(5.0, 0.0, 0.0), Vector3D::x());

        let curves = section_triangles(&triangles, &plane, CHAIN_TOLERANCE);
        assert_eq!(curves.len(), 1);
        assert!((curves[0].length() - 10.0).abs() < 1e-9);
    }
}
