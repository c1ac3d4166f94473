//! Interval scanning: finds, for one candidate edge, the next stretch of a track
//! that stays within tolerance of the edge (a "white interval").

use crate::candidate::CandidateEdge;
use crate::config::Tolerance;
use crate::geometry::TubeCrossing;
use crate::track::Track;

/// Interval opened on an earlier segment and still being extended
#[derive(Debug, Clone, Copy)]
struct OpenInterval {
    start_index: usize,
    track_start: f64,
    edge_start: f64,
    edge_end: f64,
}

/// Tests segment `i` of `track` against the candidate's tube and altitude gate
pub fn match_segment(
    candidate: &CandidateEdge,
    track: &Track,
    i: usize,
    tolerance: Tolerance,
) -> Option<TubeCrossing> {
    let segment = track.segment(i);
    let climb = (segment.average_altitude() - candidate.segment.average_altitude()).abs();
    if climb > tolerance.alt_eps {
        return None;
    }
    segment.tube_intersection(&candidate.segment, tolerance.eps)
}

/// Scans `track` from segment `start_segment` onward and stores the next white
/// interval of `candidate` in its interval markers.
///
/// An interval may open and close inside a single segment. When nothing matches
/// before the end of the track the candidate is marked done. The next call for the
/// same candidate should start at `track_end_index + 1`.
pub fn next_white_interval(
    candidate: &mut CandidateEdge,
    track: &Track,
    start_segment: usize,
    tolerance: Tolerance,
) {
    let len = track.len();
    if start_segment >= len {
        candidate.track_end_index = len;
        candidate.done = true;
        return;
    }

    let mut open: Option<OpenInterval> = None;

    for i in start_segment.max(1)..len {
        let Some(crossing) = match_segment(candidate, track, i, tolerance) else {
            if let Some(interval) = open {
                // closes at 1.0 of the previous segment
                finalize(candidate, &interval, (i - 1) as f64, i);
                return;
            }
            continue;
        };

        let interval = match open.take() {
            Some(mut interval) => {
                interval.edge_end = crossing.edge_to;
                interval
            }
            None => OpenInterval {
                start_index: i - 1,
                track_start: (i - 1) as f64 + crossing.track_from,
                edge_start: crossing.edge_from,
                edge_end: crossing.edge_to,
            },
        };

        if crossing.track_to < 1.0 {
            finalize(candidate, &interval, (i - 1) as f64 + crossing.track_to, i);
            return;
        }
        open = Some(interval);
    }

    match open {
        Some(interval) => finalize(candidate, &interval, track.last_index() as f64, len - 1),
        None => {
            candidate.track_end_index = len;
            candidate.done = true;
        }
    }
}

fn finalize(
    candidate: &mut CandidateEdge,
    interval: &OpenInterval,
    track_end: f64,
    end_index: usize,
) {
    candidate.track_start_index = interval.start_index;
    candidate.track_start = interval.track_start;
    candidate.edge_start = interval.edge_start;
    candidate.track_end = track_end;
    candidate.track_end_index = end_index;
    candidate.edge_end = interval.edge_end;
}
