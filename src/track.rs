use geo::Rect;

use crate::error::{MergeError, Result};
use crate::geometry::{Point3, Segment};
use crate::graph::Entries;

/// One input trajectory.
///
/// Positions along a track are `f64`: the integer part is a point index and the
/// fraction the offset toward the following point. Segment `i` (for `i` in
/// `1..len`) runs from point `i - 1` to point `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub name: String,
    points: Vec<Point3>,
    entries: Vec<Entries>,
}

impl Track {
    pub fn new(name: impl Into<String>, points: Vec<Point3>) -> Self {
        let entries = vec![Entries::default(); points.len()];
        Self {
            name: name.into(),
            points,
            entries,
        }
    }

    /// Builds a track from raw samples, replacing any point closer than
    /// `min_separation` to its predecessor by the midpoint of the two.
    pub fn from_samples(
        name: impl Into<String>,
        samples: impl IntoIterator<Item = Point3>,
        min_separation: f64,
    ) -> Self {
        let mut points: Vec<Point3> = Vec::new();
        for sample in samples {
            let point = match points.last() {
                Some(last) if sample.distance(last) < min_separation => {
                    let merged = last.midpoint(&sample);
                    points.pop();
                    merged
                }
                _ => sample,
            };
            points.push(point);
        }
        Self::new(name, points)
    }

    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Index of the final point, i.e. the position at which the track ends
    pub fn last_index(&self) -> usize {
        self.points.len().saturating_sub(1)
    }

    pub fn ensure_usable(&self) -> Result<()> {
        if self.points.len() < 2 {
            return Err(MergeError::DegenerateTrack {
                name: self.name.clone(),
                points: self.points.len(),
            });
        }
        Ok(())
    }

    /// Segment `i`, from point `i - 1` to point `i`
    pub fn segment(&self, i: usize) -> Segment {
        Segment::new(self.points[i - 1], self.points[i])
    }

    pub fn point_at(&self, position: f64) -> Point3 {
        let last = self.last_index();
        let index = (position.max(0.0).floor() as usize).min(last);
        if index == last {
            return self.points[last];
        }
        Segment::new(self.points[index], self.points[index + 1]).point_at(position - index as f64)
    }

    /// Planar length of the whole track
    pub fn length(&self) -> f64 {
        self.points.windows(2).map(|w| w[0].distance(&w[1])).sum()
    }

    /// Extent of the track padded by `margin` on every side
    pub fn bounding_box(&self, margin: f64) -> Option<Rect<f64>> {
        let first = self.points.first()?;
        let (min, max) = self.points.iter().fold(
            (first.planar(), first.planar()),
            |(min, max), p| {
                (
                    geo::Coord {
                        x: min.x.min(p.x),
                        y: min.y.min(p.y),
                    },
                    geo::Coord {
                        x: max.x.max(p.x),
                        y: max.y.max(p.y),
                    },
                )
            },
        );
        Some(Rect::new(
            geo::Coord {
                x: min.x - margin,
                y: min.y - margin,
            },
            geo::Coord {
                x: max.x + margin,
                y: max.y + margin,
            },
        ))
    }

    pub fn entries(&self, index: usize) -> Option<&Entries> {
        self.entries.get(index)
    }

    pub fn add_entry(&mut self, index: usize, point: Point3) {
        if let Some(e) = self.entries.get_mut(index) {
            e.push(point);
        }
    }

    pub fn total_entries(&self) -> usize {
        self.entries.iter().map(Entries::len).sum()
    }

    /// Running average altitude of point `index` from its recorded entries
    pub fn running_average_z(&self, index: usize) -> f64 {
        let fallback = self.points.get(index).map_or(0.0, |p| p.z);
        self.entries
            .get(index)
            .map_or(fallback, |e| e.average_z(fallback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64) -> Point3 {
        Point3::new(x, y, 0.0)
    }

    #[test]
    fn test_near_duplicates_collapse_to_midpoint() {
        let track = Track::from_samples(
            "t",
            vec![p(0.0, 0.0), p(1.0, 0.0), p(1.0004, 0.0), p(2.0, 0.0)],
            0.001,
        );
        assert_eq!(track.len(), 3);
        assert!((track.points()[1].x - 1.0002).abs() < 1e-12);
    }

    #[test]
    fn test_point_at_fractional_positions() {
        let track = Track::new("t", vec![p(0.0, 0.0), p(2.0, 0.0), p(2.0, 4.0)]);
        assert_eq!(track.point_at(0.5), p(1.0, 0.0));
        assert_eq!(track.point_at(1.25), p(2.0, 1.0));
        assert_eq!(track.point_at(2.0), p(2.0, 4.0));
        assert_eq!(track.point_at(9.0), p(2.0, 4.0));
    }

    #[test]
    fn test_bounding_box_is_padded() {
        let track = Track::new("t", vec![p(1.0, 5.0), p(3.0, 2.0)]);
        let bbox = track.bounding_box(0.1).unwrap();
        assert!((bbox.min().x - 0.9).abs() < 1e-12);
        assert!((bbox.min().y - 1.9).abs() < 1e-12);
        assert!((bbox.max().x - 3.1).abs() < 1e-12);
        assert!((bbox.max().y - 5.1).abs() < 1e-12);
    }

    #[test]
    fn test_single_point_track_is_rejected() {
        let track = Track::new("lonely", vec![p(0.0, 0.0)]);
        assert!(matches!(
            track.ensure_usable(),
            Err(MergeError::DegenerateTrack { points: 1, .. })
        ));
    }
}
