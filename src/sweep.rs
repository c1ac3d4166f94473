//! Priority-queue sweep over one track.
//!
//! Candidate edges are ordered by where their current white interval ends on the
//! track. The sweep consumes intervals in that order, keeps track of how far the
//! track is covered, and reports uncovered stretches ("gaps") and consumed
//! intervals to a [`SweepStrategy`]. Graph construction and track isolation are two
//! strategies over the same sweep.

use std::collections::BinaryHeap;

use log::{debug, trace};

use crate::candidate::CandidateEdge;
use crate::config::Tolerance;
use crate::error::Result;
use crate::geometry::Point3;
use crate::graph::{StreetGraph, VertexKey};
use crate::scanner::next_white_interval;
use crate::track::Track;

/// Identifies the track being processed, for diagnostics only
#[derive(Debug, Clone)]
pub struct PassContext {
    pub track_index: usize,
    pub track_name: String,
}

impl PassContext {
    pub fn new(track_index: usize, track_name: impl Into<String>) -> Self {
        Self {
            track_index,
            track_name: track_name.into(),
        }
    }
}

/// A fixed location on both the track and a candidate edge.
///
/// Copied out of the candidate when taken, so rescanning that candidate later does
/// not move it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub candidate: usize,
    pub track_position: f64,
    pub edge_offset: f64,
}

impl Anchor {
    fn start_of(id: usize, c: &CandidateEdge) -> Self {
        Self {
            candidate: id,
            track_position: c.track_start,
            edge_offset: c.edge_start,
        }
    }

    fn end_of(id: usize, c: &CandidateEdge) -> Self {
        Self {
            candidate: id,
            track_position: c.track_end,
            edge_offset: c.edge_end,
        }
    }
}

/// Part of the track not covered by any candidate edge
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gap {
    /// Nothing on the track matched
    Whole,
    /// From the start of the track up to the first interval
    Leading { to: Anchor },
    /// Between the furthest coverage so far and the next interval
    Between { from: Anchor, to: Anchor },
    /// From the furthest coverage to the end of the track
    Trailing { from: Anchor },
}

/// Behaviour plugged into [`sweep`]
pub trait SweepStrategy {
    fn on_gap(&mut self, track: &Track, gap: Gap, candidates: &mut [CandidateEdge]) -> Result<()>;

    /// Called once per consumed interval. `with_start` is false only for the very
    /// first interval when it does not begin at the start of the track, since the
    /// leading gap already attached that point.
    fn on_match(
        &mut self,
        track: &Track,
        candidate: &CandidateEdge,
        with_start: bool,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepSummary {
    /// Intervals consumed from the queue
    pub intervals: usize,
    /// Gaps handed to the strategy
    pub gaps: usize,
    /// Covered track position after each consumed interval
    pub coverage: Vec<f64>,
}

/// Runs the sweep of `track` against `candidates`.
///
/// Candidates are only ever mutated while popped from the queue; the queue holds
/// `(track_end, id)` keys into the candidate slice.
pub fn sweep<S: SweepStrategy>(
    ctx: &PassContext,
    track: &Track,
    candidates: &mut [CandidateEdge],
    tolerance: Tolerance,
    strategy: &mut S,
) -> Result<SweepSummary> {
    track.ensure_usable()?;
    let last = track.last_index() as f64;
    let mut summary = SweepSummary::default();
    let mut queue = BinaryHeap::with_capacity(candidates.len());

    for (id, candidate) in candidates.iter_mut().enumerate() {
        next_white_interval(candidate, track, 1, tolerance);
        if !candidate.done {
            queue.push(candidate.queue_key(id));
        }
    }
    debug!(
        "track {} ({}): {} of {} candidates have a white interval",
        ctx.track_index,
        ctx.track_name,
        queue.len(),
        candidates.len()
    );

    let Some(first) = queue.pop() else {
        summary.gaps += 1;
        strategy.on_gap(track, Gap::Whole, candidates)?;
        return Ok(summary);
    };

    let mut current = first.id;
    if candidates[current].track_start > 0.0 {
        summary.gaps += 1;
        let to = Anchor::start_of(current, &candidates[current]);
        strategy.on_gap(track, Gap::Leading { to }, candidates)?;
    }

    let mut reach = Anchor::end_of(current, &candidates[current]);
    let mut first_interval = true;

    loop {
        let candidate = &candidates[current];
        trace!(
            "track {}: white interval {:.4}..{:.4} on {}-{}, covered to {:.4}",
            ctx.track_index,
            candidate.track_start,
            candidate.track_end,
            candidate.from,
            candidate.to,
            reach.track_position
        );
        if candidate.track_end > reach.track_position {
            reach = Anchor::end_of(current, candidate);
        }
        summary.intervals += 1;
        summary.coverage.push(reach.track_position);

        let with_start = !first_interval || candidate.track_start == 0.0;
        strategy.on_match(track, candidate, with_start)?;

        if candidate.track_end >= last {
            break;
        }
        first_interval = false;

        let resume = candidate.track_end_index + 1;
        next_white_interval(&mut candidates[current], track, resume, tolerance);
        if !candidates[current].done {
            queue.push(candidates[current].queue_key(current));
        }

        let Some(next) = queue.pop() else {
            if reach.track_position < last {
                summary.gaps += 1;
                strategy.on_gap(track, Gap::Trailing { from: reach }, candidates)?;
            }
            break;
        };

        current = next.id;
        if candidates[current].track_start > reach.track_position {
            summary.gaps += 1;
            let to = Anchor::start_of(current, &candidates[current]);
            strategy.on_gap(track, Gap::Between { from: reach, to }, candidates)?;
        }
    }

    debug!(
        "track {} ({}): {} intervals, {} gaps",
        ctx.track_index, ctx.track_name, summary.intervals, summary.gaps
    );
    Ok(summary)
}

/// Graph-building strategy: gaps become new edges, matches feed vertex entries
pub struct MergeStrategy<'a> {
    graph: &'a mut StreetGraph,
}

impl<'a> MergeStrategy<'a> {
    pub fn new(graph: &'a mut StreetGraph) -> Self {
        Self { graph }
    }

    /// Connects track position `position` to `anchor`'s point on its edge and marks
    /// that edge for a split there.
    fn attach(
        &mut self,
        position: Point3,
        anchor: &Anchor,
        candidates: &mut [CandidateEdge],
    ) -> Result<()> {
        let candidate = &mut candidates[anchor.candidate];
        let on_edge = candidate.point_at(anchor.edge_offset);
        self.graph.link(position, on_edge)?;
        self.graph.request_split(candidate, anchor.edge_offset)
    }

    /// Adds the track between two positions as new edges, passing through every
    /// original track point in between.
    fn add_track_between(&mut self, track: &Track, from: f64, to: f64) -> Result<()> {
        let first = from.floor() as usize + 1;
        let last = (to.floor() as usize).min(track.last_index());

        let mut path = vec![track.point_at(from)];
        if first <= last {
            path.extend_from_slice(&track.points()[first..=last]);
        }
        path.push(track.point_at(to));
        // integral positions repeat the neighbouring track point
        path.dedup_by_key(|p| VertexKey::from(*p));
        self.graph.link_chain(&path)
    }
}

impl SweepStrategy for MergeStrategy<'_> {
    fn on_gap(&mut self, track: &Track, gap: Gap, candidates: &mut [CandidateEdge]) -> Result<()> {
        match gap {
            Gap::Whole => self.graph.link_chain(track.points()),
            Gap::Leading { to } => {
                self.add_track_between(track, 0.0, to.track_position)?;
                self.attach(track.point_at(to.track_position), &to, candidates)
            }
            Gap::Between { from, to } => {
                self.attach(track.point_at(from.track_position), &from, candidates)?;
                self.add_track_between(track, from.track_position, to.track_position)?;
                self.attach(track.point_at(to.track_position), &to, candidates)
            }
            Gap::Trailing { from } => {
                self.attach(track.point_at(from.track_position), &from, candidates)?;
                self.add_track_between(track, from.track_position, track.last_index() as f64)
            }
        }
    }

    fn on_match(
        &mut self,
        track: &Track,
        candidate: &CandidateEdge,
        with_start: bool,
    ) -> Result<()> {
        if with_start {
            let vertex = candidate.nearer_endpoint(candidate.edge_start);
            self.graph.add_entry(vertex, track.point_at(candidate.track_start));
        }
        let vertex = candidate.nearer_endpoint(candidate.edge_end);
        self.graph.add_entry(vertex, track.point_at(candidate.track_end));
        Ok(())
    }
}

/// Read-only strategy: matched edge points are recorded on the track's own points
#[derive(Debug, Default)]
pub struct IsolationStrategy {
    entries: Vec<(usize, Point3)>,
}

impl IsolationStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the collected entries onto `track`
    pub fn apply(self, track: &mut Track) {
        for (index, point) in self.entries {
            track.add_entry(index, point);
        }
    }
}

impl SweepStrategy for IsolationStrategy {
    fn on_gap(
        &mut self,
        _track: &Track,
        _gap: Gap,
        _candidates: &mut [CandidateEdge],
    ) -> Result<()> {
        Ok(())
    }

    fn on_match(
        &mut self,
        track: &Track,
        candidate: &CandidateEdge,
        with_start: bool,
    ) -> Result<()> {
        let last = track.last_index();
        if with_start {
            let index = (candidate.track_start.floor() as usize).min(last);
            self.entries.push((index, candidate.point_at(candidate.edge_start)));
        }
        let index = (candidate.track_end.ceil() as usize).min(last);
        self.entries.push((index, candidate.point_at(candidate.edge_end)));
        Ok(())
    }
}
