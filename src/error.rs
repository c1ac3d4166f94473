//! Error types for the merge core

/// Result type alias
pub type Result<T> = std::result::Result<T, MergeError>;

/// Inconsistencies detected while merging a track into the street graph.
///
/// Any of these leaves the graph in a state that would break adjacency
/// symmetry or introduce self-loops if merging continued, so the current
/// track is abandoned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MergeError {
    /// A point expected to be registered in the key map was not found
    #[error("no vertex registered for point ({x}, {y}, {z})")]
    UnresolvedVertex { x: f64, y: f64, z: f64 },

    /// Committing splits found the original edge missing from an endpoint
    #[error(
        "inconsistent split of edge {from}-{to}: {splits} split vertices, \
         adjacency {from_neighbors:?} / {to_neighbors:?}"
    )]
    InconsistentSplit {
        from: usize,
        to: usize,
        splits: usize,
        from_neighbors: Vec<usize>,
        to_neighbors: Vec<usize>,
    },

    /// The core only accepts tracks with at least two points
    #[error("track {name:?} has {points} points, need at least 2")]
    DegenerateTrack { name: String, points: usize },

    /// An earlier track failed part way and left its gap edges in the graph
    #[error("graph is incomplete after track {track:?} failed to merge")]
    Poisoned { track: String },
}
