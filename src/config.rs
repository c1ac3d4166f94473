use serde::{Deserialize, Serialize};

/// Configuration for building and matching against a street graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Maximum planar distance between a track and a street for them to match
    pub eps: f64,
    /// Maximum difference in average altitude between a track segment and a street
    pub alt_eps: f64,
    /// Whether track files carry a third (altitude) column
    pub has_altitude: bool,
    /// Padding added on every side of a track's extent when selecting candidate streets
    pub bbox_margin: f64,
    /// Consecutive track points closer than this are merged into their midpoint
    pub min_point_separation: f64,
    /// Draw a progress bar during batch merges
    pub show_progress: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            eps: 0.0001,
            alt_eps: 4.0,
            has_altitude: false,
            bbox_margin: 0.1,
            min_point_separation: 0.001,
            show_progress: false,
        }
    }
}

impl MergeConfig {
    pub fn tolerance(&self) -> Tolerance {
        Tolerance {
            eps: self.eps,
            alt_eps: self.alt_eps,
        }
    }
}

/// Matching tolerance handed to the interval scanner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    pub eps: f64,
    pub alt_eps: f64,
}

/// Rules for cutting a stream of GPS fixes into tracks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// A longer pause between consecutive fixes, in seconds, starts a new track
    pub max_time_gap: f64,
    /// A longer jump between consecutive fixes, in coordinate units, starts a new track
    pub max_jump: f64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            max_time_gap: 600.0,
            max_jump: 0.2,
        }
    }
}
