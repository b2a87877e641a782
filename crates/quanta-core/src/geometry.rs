//! Planar helpers for segment, polygon and reflection tests.
//!
//! Every division is guarded by [`EPSILON`] so degenerate geometry (zero-length
//! segments, parallel lines) yields "no effect" instead of NaN.

use crate::{Position, Velocity};

/// Denominator guard for degenerate geometry.
pub const EPSILON: f32 = 1e-6;

/// Intersection of the path `p0 → p1` with segment `q0 → q1`.
///
/// Returns the parameter `t ∈ [0, 1]` along the path, or `None` when the segments
/// do not cross or are (nearly) parallel.
#[must_use]
pub fn segment_intersection(p0: Position, p1: Position, q0: Position, q1: Position) -> Option<f32> {
    let rx = p1.x - p0.x;
    let ry = p1.y - p0.y;
    let sx = q1.x - q0.x;
    let sy = q1.y - q0.y;
    let denom = rx * sy - ry * sx;
    // Sine of the crossing angle, so short paths are not mistaken for parallel ones.
    if denom.abs() <= EPSILON * rx.hypot(ry) * sx.hypot(sy) {
        return None;
    }
    let qpx = q0.x - p0.x;
    let qpy = q0.y - p0.y;
    let t = (qpx * sy - qpy * sx) / denom;
    let u = (qpx * ry - qpy * rx) / denom;
    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some(t)
    } else {
        None
    }
}

/// Point at parameter `t` along `a → b`.
#[must_use]
pub fn lerp(a: Position, b: Position, t: f32) -> Position {
    Position::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t)
}

/// Closest point to `p` on segment `a → b` and its parameter along the segment.
#[must_use]
pub fn closest_point_on_segment(p: Position, a: Position, b: Position) -> (Position, f32) {
    let abx = b.x - a.x;
    let aby = b.y - a.y;
    let len_sq = abx * abx + aby * aby;
    let t = (((p.x - a.x) * abx + (p.y - a.y) * aby) / (len_sq + EPSILON)).clamp(0.0, 1.0);
    (lerp(a, b, t), t)
}

/// Unit normal of `a → b` (rotated counter-clockwise). Zero-length segments give `(0, 1)`.
#[must_use]
pub fn segment_normal(a: Position, b: Position) -> (f32, f32) {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len = (dx * dx + dy * dy).sqrt();
    if len < EPSILON {
        return (0.0, 1.0);
    }
    (-dy / len, dx / len)
}

/// Signed side of `p` relative to `a → b` (positive on the normal side).
#[must_use]
pub fn side_of(p: Position, a: Position, b: Position) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Reflect `v` about the unit normal `n`.
#[must_use]
pub fn reflect(v: Velocity, n: (f32, f32)) -> Velocity {
    let dot = v.vx * n.0 + v.vy * n.1;
    Velocity::new(v.vx - 2.0 * dot * n.0, v.vy - 2.0 * dot * n.1)
}

/// Unit vector from `from` toward `to` and the distance between them.
#[must_use]
pub fn direction(from: Position, to: Position) -> ((f32, f32), f32) {
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    let dist = (dx * dx + dy * dy).sqrt();
    if dist < EPSILON {
        return ((0.0, 0.0), dist);
    }
    ((dx / dist, dy / dist), dist)
}

/// Ray-casting point-in-polygon test; fewer than three vertices never contain anything.
#[must_use]
pub fn point_in_polygon(p: Position, polygon: &[Position]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let a = polygon[i];
        let b = polygon[j];
        if (a.y > p.y) != (b.y > p.y) {
            let dy = b.y - a.y;
            let denom = if dy.abs() < EPSILON { EPSILON.copysign(dy) } else { dy };
            let cross_x = a.x + (p.y - a.y) * (b.x - a.x) / denom;
            if p.x < cross_x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Vertex average of a polygon.
#[must_use]
pub fn polygon_centroid(polygon: &[Position]) -> Position {
    if polygon.is_empty() {
        return Position::default();
    }
    let (sx, sy) = polygon
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    let n = polygon.len() as f32;
    Position::new(sx / n, sy / n)
}

/// Axis-aligned bounds `(min, max)` of a polygon.
#[must_use]
pub fn polygon_bounds(polygon: &[Position]) -> (Position, Position) {
    let mut min = Position::new(f32::INFINITY, f32::INFINITY);
    let mut max = Position::new(f32::NEG_INFINITY, f32::NEG_INFINITY);
    for p in polygon {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
    }
    (min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crossing_segments_report_path_parameter() {
        let t = segment_intersection(
            Position::new(-1.0, 0.0),
            Position::new(1.0, 0.0),
            Position::new(0.0, -1.0),
            Position::new(0.0, 1.0),
        )
        .expect("crossing");
        assert!((t - 0.5).abs() < 1e-6);
    }

    #[test]
    fn tiny_steps_still_cross() {
        let q0 = Position::new(0.0, -0.05);
        let q1 = Position::new(0.0, 0.05);
        let t = segment_intersection(Position::new(-4e-6, 0.0), Position::new(4e-6, 0.0), q0, q1)
            .expect("slow crossing");
        assert!((t - 0.5).abs() < 1e-4);
        assert!(segment_intersection(Position::new(1e-6, 0.0), Position::new(4e-6, 0.0), q0, q1).is_none());
    }

    #[test]
    fn parallel_and_degenerate_segments_never_cross() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(1.0, 0.0);
        assert!(segment_intersection(a, b, Position::new(0.0, 0.1), Position::new(1.0, 0.1)).is_none());
        assert!(segment_intersection(a, b, Position::new(0.5, 0.0), Position::new(0.5, 0.0)).is_none());
    }

    #[test]
    fn closest_point_handles_zero_length_segment() {
        let p = Position::new(0.3, 0.4);
        let a = Position::new(0.1, 0.1);
        let (closest, t) = closest_point_on_segment(p, a, a);
        assert_eq!(closest, a);
        assert_eq!(t, 0.0);
        assert_eq!(segment_normal(a, a), (0.0, 1.0));
    }

    #[test]
    fn reflection_flips_normal_component() {
        let v = reflect(Velocity::new(1.0, -2.0), (0.0, 1.0));
        assert_eq!(v, Velocity::new(1.0, 2.0));
    }

    #[test]
    fn polygon_containment() {
        let square = [
            Position::new(-0.5, -0.5),
            Position::new(0.5, -0.5),
            Position::new(0.5, 0.5),
            Position::new(-0.5, 0.5),
        ];
        assert!(point_in_polygon(Position::new(0.0, 0.0), &square));
        assert!(!point_in_polygon(Position::new(0.7, 0.0), &square));
        assert!(!point_in_polygon(Position::new(0.0, 0.0), &square[..2]));
        assert_eq!(polygon_centroid(&square), Position::new(0.0, 0.0));
    }
}
