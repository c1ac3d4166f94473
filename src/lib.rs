//! # trackmerge
//!
//! Incremental street-network construction from GPS tracks.
//!
//! Each track is swept against the edges of the graph built so far. Stretches of
//! the track that stay within `eps` of an existing edge (white intervals) reinforce
//! that edge; the rest (black intervals) is inserted as new edges, and existing
//! edges are split where the track joins or leaves them.
//!
//! ```rust
//! use trackmerge::{MapBuilder, MergeConfig, PassContext, Point3, Track};
//!
//! let config = MergeConfig { eps: 0.5, ..Default::default() };
//! let mut builder = MapBuilder::new(config);
//!
//! let street = Track::new("a", vec![Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 0.0, 0.0)]);
//! builder.merge_track(&PassContext::new(0, "a"), &street).unwrap();
//!
//! // Driving the same street again adds nothing new
//! let again = Track::new("b", vec![Point3::new(0.0, 0.05, 0.0), Point3::new(10.0, 0.05, 0.0)]);
//! let report = builder.merge_track(&PassContext::new(1, "b"), &again).unwrap();
//! assert_eq!(report.new_edges, 0);
//! ```

pub mod builder;
pub mod candidate;
pub mod config;
pub mod error;
pub mod fixes;
pub mod geometry;
pub mod graph;
pub mod io;
pub mod pseudo_tracks;
pub mod scanner;
pub mod sweep;
pub mod track;

pub use builder::{BatchReport, MapBuilder, TrackReport, VertexIndex, isolate_track};
pub use candidate::{CandidateEdge, SplitPoint};
pub use config::{MergeConfig, SplitConfig, Tolerance};
pub use error::MergeError;
pub use fixes::{Fix, FixTrack, PointCounts, SplitReport, count_points, split_fixes};
pub use geometry::{Point3, Segment, TubeCrossing};
pub use graph::{Entries, LinkOutcome, StreetGraph, Vertex, VertexKey};
pub use pseudo_tracks::pseudo_tracks;
pub use scanner::next_white_interval;
pub use sweep::{
    Gap, IsolationStrategy, MergeStrategy, PassContext, SweepStrategy, SweepSummary, sweep,
};
pub use track::Track;
