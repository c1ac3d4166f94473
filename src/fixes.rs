//! Cutting a dataset of raw GPS fixes into tracks.
//!
//! Fixes arrive ordered by object and time. A new track starts when the object
//! changes, after a long pause, after a long jump, or when the object comes back
//! inside the area its current track already covers. The last case keeps loops out
//! of a single track: the new track starts with the fix the old one ended on.

use chrono::{DateTime, Utc};
use geo::{Coord, Rect};
use log::debug;
use serde::Serialize;

use crate::config::SplitConfig;
use crate::geometry::Point3;

/// One GPS fix of a tracked object
#[derive(Debug, Clone, PartialEq)]
pub struct Fix {
    pub object_id: String,
    /// Longitude
    pub x: f64,
    /// Latitude
    pub y: f64,
    pub time: DateTime<Utc>,
    pub online: bool,
}

impl Fix {
    pub fn position(&self) -> Point3 {
        Point3::new(self.x, self.y, 0.0)
    }
}

/// Consecutive fixes of one object
#[derive(Debug, Clone, PartialEq)]
pub struct FixTrack {
    pub object_id: String,
    /// Started because the object returned inside its own extent. The first fix
    /// then repeats the last fix of the previous track.
    pub split: bool,
    pub fixes: Vec<Fix>,
}

impl FixTrack {
    /// Fixes that belong to this track alone
    pub fn own_fixes(&self) -> usize {
        self.fixes.len() - usize::from(self.split)
    }
}

/// How many fixes ended up in usable tracks (two fixes or more) and how many did not
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PointCounts {
    pub tracked: usize,
    pub untracked: usize,
}

impl PointCounts {
    pub fn total(&self) -> usize {
        self.tracked + self.untracked
    }
}

fn extend(extent: Option<Rect<f64>>, fix: &Fix) -> Rect<f64> {
    let c = Coord { x: fix.x, y: fix.y };
    match extent {
        Some(r) => Rect::new(
            Coord {
                x: r.min().x.min(c.x),
                y: r.min().y.min(c.y),
            },
            Coord {
                x: r.max().x.max(c.x),
                y: r.max().y.max(c.y),
            },
        ),
        None => Rect::new(c, c),
    }
}

fn within(extent: &Rect<f64>, fix: &Fix) -> bool {
    extent.min().x <= fix.x
        && fix.x <= extent.max().x
        && extent.min().y <= fix.y
        && fix.y <= extent.max().y
}

/// Splits an ordered stream of fixes into tracks
pub fn split_fixes(fixes: impl IntoIterator<Item = Fix>, config: &SplitConfig) -> Vec<FixTrack> {
    let mut tracks = Vec::new();
    let mut current: Option<FixTrack> = None;
    let mut last: Option<Fix> = None;
    let mut extent: Option<Rect<f64>> = None;

    for fix in fixes {
        let starts_new = match (&current, &last) {
            (Some(track), Some(prev)) => {
                let pause = (fix.time - prev.time).num_milliseconds() as f64 / 1000.0;
                track.object_id != fix.object_id
                    || pause > config.max_time_gap
                    || fix.position().distance(&prev.position()) > config.max_jump
            }
            _ => true,
        };
        let returned = extent.as_ref().is_some_and(|r| within(r, &fix));

        if starts_new || returned {
            tracks.extend(current.take());
            let split = returned && !starts_new;
            let mut members = Vec::new();
            extent = None;
            if split {
                if let Some(prev) = &last {
                    members.push(prev.clone());
                    extent = Some(extend(None, prev));
                }
            }
            members.push(fix.clone());
            current = Some(FixTrack {
                object_id: fix.object_id.clone(),
                split,
                fixes: members,
            });
        } else if let Some(track) = current.as_mut() {
            track.fixes.push(fix.clone());
        }

        extent = Some(extend(extent, &fix));
        last = Some(fix);
    }
    tracks.extend(current);

    debug!("Split fixes into {} tracks", tracks.len());
    tracks
}

/// Counts fixes per usable and unusable track. The repeated first fix of a split
/// track is not counted twice.
pub fn count_points(tracks: &[FixTrack]) -> PointCounts {
    tracks.iter().fold(PointCounts::default(), |mut counts, t| {
        if t.fixes.len() < 2 {
            counts.untracked += t.own_fixes();
        } else {
            counts.tracked += t.own_fixes();
        }
        counts
    })
}

/// Outcome of splitting a dataset
#[derive(Debug, Clone, Serialize)]
pub struct SplitReport {
    pub config: SplitConfig,
    pub fixes: usize,
    pub tracks: usize,
    pub exported: usize,
    pub points: PointCounts,
}
