use geo::Coord;
use serde::{Deserialize, Serialize};

/// Squared lengths below this are treated as zero-length segments
const DEGENERATE_LENGTH_SQ: f64 = 1e-24;

/// A position with altitude. Planar math only looks at `x` and `y`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn planar(&self) -> Coord<f64> {
        Coord {
            x: self.x,
            y: self.y,
        }
    }

    /// Planar distance, altitude ignored
    pub fn distance(&self, other: &Point3) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn midpoint(&self, other: &Point3) -> Point3 {
        Segment::new(*self, *other).point_at(0.5)
    }
}

/// Part of a track segment that lies inside the tube around an edge.
///
/// `track_from`/`track_to` are offsets along the track segment, `edge_from`/`edge_to`
/// the projections of those two points onto the edge. All four lie in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TubeCrossing {
    pub track_from: f64,
    pub track_to: f64,
    pub edge_from: f64,
    pub edge_to: f64,
}

/// Straight line between two points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: Point3,
    pub end: Point3,
}

impl Segment {
    pub fn new(start: Point3, end: Point3) -> Self {
        Self { start, end }
    }

    /// Linear interpolation, `t = 0` is `start` and `t = 1` is `end`
    pub fn point_at(&self, t: f64) -> Point3 {
        if t <= 0.0 {
            return self.start;
        }
        if t >= 1.0 {
            return self.end;
        }
        Point3 {
            x: self.start.x + (self.end.x - self.start.x) * t,
            y: self.start.y + (self.end.y - self.start.y) * t,
            z: self.start.z + (self.end.z - self.start.z) * t,
        }
    }

    pub fn average_altitude(&self) -> f64 {
        (self.start.z + self.end.z) / 2.0
    }

    pub fn length(&self) -> f64 {
        self.start.distance(&self.end)
    }

    fn direction(&self) -> Coord<f64> {
        self.end.planar() - self.start.planar()
    }

    /// Offset of the orthogonal projection of `point` onto this segment, clamped to `[0, 1]`
    pub fn project(&self, point: Point3) -> f64 {
        let d = self.direction();
        let len_sq = dot(d, d);
        if len_sq <= DEGENERATE_LENGTH_SQ {
            return 0.0;
        }
        (dot(point.planar() - self.start.planar(), d) / len_sq).clamp(0.0, 1.0)
    }

    /// Computes the portion of this segment within planar distance `eps` of `edge`.
    ///
    /// The region within `eps` of a segment is a capsule (two discs joined by a
    /// rectangle). It is convex, so its intersection with this segment is a single
    /// parameter interval: the hull of the intervals cut by the two discs and the
    /// rectangle.
    pub fn tube_intersection(&self, edge: &Segment, eps: f64) -> Option<TubeCrossing> {
        let origin = self.start.planar();
        let dir = self.direction();

        let pieces = [
            disc_interval(origin, dir, edge.start.planar(), eps),
            disc_interval(origin, dir, edge.end.planar(), eps),
            strip_interval(origin, dir, edge, eps),
        ];

        let (lo, hi) = pieces
            .iter()
            .flatten()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(a, b)| {
                (lo.min(a), hi.max(b))
            });

        let track_from = lo.max(0.0);
        let track_to = hi.min(1.0);
        if track_from > track_to {
            return None;
        }

        Some(TubeCrossing {
            track_from,
            track_to,
            edge_from: edge.project(self.point_at(track_from)),
            edge_to: edge.project(self.point_at(track_to)),
        })
    }
}

fn dot(a: Coord<f64>, b: Coord<f64>) -> f64 {
    a.x * b.x + a.y * b.y
}

/// Parameters `t` for which `origin + t * dir` lies inside the disc of radius `eps` around `centre`
fn disc_interval(
    origin: Coord<f64>,
    dir: Coord<f64>,
    centre: Coord<f64>,
    eps: f64,
) -> Option<(f64, f64)> {
    let offset = origin - centre;
    let a = dot(dir, dir);
    let c = dot(offset, offset) - eps * eps;

    if a <= DEGENERATE_LENGTH_SQ {
        return (c <= 0.0).then_some((f64::NEG_INFINITY, f64::INFINITY));
    }

    let b = dot(offset, dir);
    let discriminant = b * b - a * c;
    if discriminant < 0.0 {
        return None;
    }
    let root = discriminant.sqrt();
    Some(((-b - root) / a, (-b + root) / a))
}

/// Parameters `t` for which `origin + t * dir` lies inside the rectangle of half-width
/// `eps` spanning `edge`
fn strip_interval(
    origin: Coord<f64>,
    dir: Coord<f64>,
    edge: &Segment,
    eps: f64,
) -> Option<(f64, f64)> {
    let axis = edge.direction();
    let len = dot(axis, axis).sqrt();
    if len * len <= DEGENERATE_LENGTH_SQ {
        return None;
    }

    let along = axis / len;
    let normal = Coord {
        x: -along.y,
        y: along.x,
    };
    let offset = origin - edge.start.planar();

    let (lo_a, hi_a) = slab(dot(offset, along), dot(dir, along), 0.0, len)?;
    let (lo_n, hi_n) = slab(dot(offset, normal), dot(dir, normal), -eps, eps)?;

    let lo = lo_a.max(lo_n);
    let hi = hi_a.min(hi_n);
    (lo <= hi).then_some((lo, hi))
}

/// Parameters `t` with `value + t * rate` inside `[min, max]`
fn slab(value: f64, rate: f64, min: f64, max: f64) -> Option<(f64, f64)> {
    if rate == 0.0 {
        return (min <= value && value <= max).then_some((f64::NEG_INFINITY, f64::INFINITY));
    }
    let t1 = (min - value) / rate;
    let t2 = (max - value) / rate;
    Some((t1.min(t2), t1.max(t2)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(x1: f64, y1: f64, x2: f64, y2: f64) -> Segment {
        Segment::new(Point3::new(x1, y1, 0.0), Point3::new(x2, y2, 0.0))
    }

    #[test]
    fn test_point_at_endpoints_are_exact() {
        let s = Segment::new(Point3::new(0.1, 0.2, 3.0), Point3::new(7.3, -1.9, 5.0));
        assert_eq!(s.point_at(0.0), s.start);
        assert_eq!(s.point_at(1.0), s.end);
        assert_eq!(s.point_at(0.5).z, 4.0);
    }

    #[test]
    fn test_identical_segments_fully_match() {
        let edge = flat(0.0, 0.0, 10.0, 0.0);
        let crossing = edge.tube_intersection(&edge, 0.5).unwrap();
        assert_eq!(crossing.track_from, 0.0);
        assert_eq!(crossing.track_to, 1.0);
        assert_eq!(crossing.edge_from, 0.0);
        assert_eq!(crossing.edge_to, 1.0);
    }

    #[test]
    fn test_perpendicular_crossing() {
        let edge = flat(0.0, 0.0, 10.0, 0.0);
        let track = flat(5.0, -10.0, 5.0, 10.0);
        let crossing = track.tube_intersection(&edge, 1.0).unwrap();
        assert!((crossing.track_from - 0.45).abs() < 1e-12);
        assert!((crossing.track_to - 0.55).abs() < 1e-12);
        assert_eq!(crossing.edge_from, 0.5);
        assert_eq!(crossing.edge_to, 0.5);
    }

    #[test]
    fn test_far_segment_does_not_match() {
        let edge = flat(0.0, 0.0, 10.0, 0.0);
        let track = flat(0.0, 5.0, 10.0, 5.0);
        assert!(track.tube_intersection(&edge, 1.0).is_none());
    }

    #[test]
    fn test_round_cap_beyond_edge_end() {
        let edge = flat(0.0, 0.0, 10.0, 0.0);
        // Runs past the end of the edge; only the cap around (10, 0) is within reach
        let track = flat(10.5, -5.0, 10.5, 5.0);
        let crossing = track.tube_intersection(&edge, 1.0).unwrap();
        assert!(crossing.track_from > 0.4 && crossing.track_to < 0.6);
        assert_eq!(crossing.edge_from, 1.0);
        assert_eq!(crossing.edge_to, 1.0);
    }

    #[test]
    fn test_reversed_track_reports_reversed_edge_offsets() {
        let edge = flat(0.0, 0.0, 10.0, 0.0);
        let track = flat(8.0, 0.2, 2.0, 0.2);
        let crossing = track.tube_intersection(&edge, 1.0).unwrap();
        assert_eq!((crossing.track_from, crossing.track_to), (0.0, 1.0));
        assert!((crossing.edge_from - 0.8).abs() < 1e-12);
        assert!((crossing.edge_to - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_track_segment() {
        let edge = flat(0.0, 0.0, 10.0, 0.0);
        let inside = flat(3.0, 0.5, 3.0, 0.5);
        let outside = flat(3.0, 5.0, 3.0, 5.0);
        assert!(inside.tube_intersection(&edge, 1.0).is_some());
        assert!(outside.tube_intersection(&edge, 1.0).is_none());
    }

    #[test]
    fn test_project_clamps() {
        let edge = flat(0.0, 0.0, 10.0, 0.0);
        assert_eq!(edge.project(Point3::new(-4.0, 1.0, 0.0)), 0.0);
        assert_eq!(edge.project(Point3::new(14.0, 1.0, 0.0)), 1.0);
        assert_eq!(edge.project(Point3::new(2.5, 9.0, 0.0)), 0.25);
    }
}
