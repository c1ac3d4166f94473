use std::cmp::Ordering;

use ordered_float::OrderedFloat;

use crate::geometry::{Point3, Segment};

/// Pending split of a pre-existing edge, committed after the track pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitPoint {
    /// Offset along the edge, measured from `from`
    pub offset: f64,
    /// Graph vertex the edge is split at
    pub vertex: usize,
}

/// An existing graph edge under test against one track.
///
/// Interval markers follow the track-position convention: the integer part is a
/// point index on the track, the fraction the offset toward the next point.
/// `edge_start`/`edge_end` are offsets along the edge from `from` to `to`.
#[derive(Debug, Clone)]
pub struct CandidateEdge {
    pub from: usize,
    pub to: usize,
    pub segment: Segment,
    pub track_start: f64,
    pub track_end: f64,
    pub track_start_index: usize,
    pub track_end_index: usize,
    pub edge_start: f64,
    pub edge_end: f64,
    pub done: bool,
    pub splits: Vec<SplitPoint>,
}

impl CandidateEdge {
    pub fn new(from: usize, to: usize, segment: Segment) -> Self {
        Self {
            from,
            to,
            segment,
            track_start: 0.0,
            track_end: 0.0,
            track_start_index: 0,
            track_end_index: 0,
            edge_start: 0.0,
            edge_end: 0.0,
            done: false,
            splits: Vec::new(),
        }
    }

    pub fn point_at(&self, offset: f64) -> Point3 {
        self.segment.point_at(offset)
    }

    /// Graph vertex nearer to the given edge offset
    pub fn nearer_endpoint(&self, offset: f64) -> usize {
        if offset > 0.5 { self.to } else { self.from }
    }

    pub fn queue_key(&self, id: usize) -> QueueKey {
        QueueKey {
            track_end: OrderedFloat(self.track_end),
            id,
        }
    }
}

/// Heap entry for a candidate: the smallest `track_end` pops first, ties go to the
/// lower candidate id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueKey {
    pub track_end: OrderedFloat<f64>,
    pub id: usize,
}

impl Ord for QueueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap
        other
            .track_end
            .cmp(&self.track_end)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    #[test]
    fn test_heap_pops_smallest_track_end_first() {
        let mut heap = BinaryHeap::new();
        for (id, end) in [(0, 3.5), (1, 1.25), (2, 7.0), (3, 1.25)] {
            heap.push(QueueKey {
                track_end: OrderedFloat(end),
                id,
            });
        }
        let order: Vec<usize> = std::iter::from_fn(|| heap.pop().map(|k| k.id)).collect();
        assert_eq!(order, vec![1, 3, 0, 2]);
    }
}
