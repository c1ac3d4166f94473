use std::collections::BTreeSet;
use std::time::Instant;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use rstar::primitives::GeomWithData;
use rstar::{AABB, RTree};
use serde::Serialize;

use crate::candidate::CandidateEdge;
use crate::config::MergeConfig;
use crate::error::MergeError;
use crate::geometry::Segment;
use crate::graph::StreetGraph;
use crate::sweep::{IsolationStrategy, MergeStrategy, PassContext, SweepSummary, sweep};
use crate::track::Track;

type IndexedVertex = GeomWithData<[f64; 2], usize>;

/// Spatial index over the planar positions of a graph's vertices
pub struct VertexIndex {
    tree: RTree<IndexedVertex>,
    indexed: usize,
}

impl VertexIndex {
    pub fn build(graph: &StreetGraph) -> Self {
        let points = graph
            .vertices()
            .iter()
            .enumerate()
            .map(|(i, v)| IndexedVertex::new([v.position.x, v.position.y], i))
            .collect();
        Self {
            tree: RTree::bulk_load(points),
            indexed: graph.vertex_count(),
        }
    }

    /// Number of graph vertices covered by the index
    pub fn len(&self) -> usize {
        self.indexed
    }

    pub fn is_empty(&self) -> bool {
        self.indexed == 0
    }

    /// Adds the vertices appended to `graph` since the last build or sync. Vertices
    /// never move or disappear, so earlier entries stay valid.
    pub fn sync(&mut self, graph: &StreetGraph) {
        for (i, v) in graph.vertices().iter().enumerate().skip(self.indexed) {
            self.tree.insert(IndexedVertex::new([v.position.x, v.position.y], i));
        }
        self.indexed = graph.vertex_count();
    }

    /// Edges of `graph` with at least one endpoint inside the track's padded
    /// bounding box, each edge once, oriented from the lower vertex index.
    pub fn candidates_for(
        &self,
        graph: &StreetGraph,
        track: &Track,
        margin: f64,
    ) -> Vec<CandidateEdge> {
        let Some(bbox) = track.bounding_box(margin) else {
            return Vec::new();
        };
        let envelope =
            AABB::from_corners([bbox.min().x, bbox.min().y], [bbox.max().x, bbox.max().y]);

        let mut edges = BTreeSet::new();
        for inside in self.tree.locate_in_envelope(&envelope) {
            let v = inside.data;
            for &w in &graph.vertices()[v].neighbors {
                if v != w {
                    edges.insert((v.min(w), v.max(w)));
                }
            }
        }

        edges
            .into_iter()
            .map(|(a, b)| {
                let segment =
                    Segment::new(graph.vertices()[a].position, graph.vertices()[b].position);
                CandidateEdge::new(a, b, segment)
            })
            .collect()
    }
}

/// Outcome of merging one track
#[derive(Debug, Clone, Serialize)]
pub struct TrackReport {
    pub name: String,
    pub points: usize,
    pub candidates: usize,
    pub intervals: usize,
    pub gaps: usize,
    pub split_edges: usize,
    pub new_vertices: usize,
    pub new_edges: isize,
}

/// Outcome of a batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub config: MergeConfig,
    pub tracks_merged: usize,
    pub tracks_skipped: usize,
    pub total_length: f64,
    pub vertices: usize,
    pub edges: usize,
    pub elapsed_ms: u128,
    pub tracks: Vec<TrackReport>,
}

/// Builds a street graph by merging tracks one after another.
///
/// A [`MergeError`] leaves the gap edges of the failing track in the graph, so the
/// builder refuses further merges after one and reports [`MergeError::Poisoned`].
pub struct MapBuilder {
    config: MergeConfig,
    graph: StreetGraph,
    index: VertexIndex,
    failed_track: Option<String>,
}

impl MapBuilder {
    pub fn new(config: MergeConfig) -> Self {
        Self::with_graph(config, StreetGraph::new())
    }

    /// Starts from a previously built graph
    pub fn with_graph(config: MergeConfig, graph: StreetGraph) -> Self {
        let index = VertexIndex::build(&graph);
        Self {
            config,
            graph,
            index,
            failed_track: None,
        }
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    pub fn graph(&self) -> &StreetGraph {
        &self.graph
    }

    pub fn index(&self) -> &VertexIndex {
        &self.index
    }

    pub fn into_graph(self) -> StreetGraph {
        self.graph
    }

    /// Whether an earlier merge failed and left a partial track in the graph
    pub fn is_poisoned(&self) -> bool {
        self.failed_track.is_some()
    }

    pub fn select_candidates(&self, track: &Track) -> Vec<CandidateEdge> {
        self.index.candidates_for(&self.graph, track, self.config.bbox_margin)
    }

    /// Merges one track into the graph and commits the resulting edge splits.
    pub fn merge_track(
        &mut self,
        ctx: &PassContext,
        track: &Track,
    ) -> std::result::Result<TrackReport, MergeError> {
        if let Some(failed) = &self.failed_track {
            return Err(MergeError::Poisoned {
                track: failed.clone(),
            });
        }

        let vertices_before = self.graph.vertex_count();
        let edges_before = self.graph.edge_count();

        let mut candidates = self.select_candidates(track);
        let outcome = self.sweep_and_commit(ctx, track, &mut candidates);
        self.index.sync(&self.graph);
        let (summary, split_edges) = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    "track {} ({}) failed part way, builder is poisoned: {}",
                    ctx.track_index, ctx.track_name, e
                );
                self.failed_track = Some(track.name.clone());
                return Err(e);
            }
        };

        let report = TrackReport {
            name: track.name.clone(),
            points: track.len(),
            candidates: candidates.len(),
            intervals: summary.intervals,
            gaps: summary.gaps,
            split_edges,
            new_vertices: self.graph.vertex_count() - vertices_before,
            new_edges: self.graph.edge_count() as isize - edges_before as isize,
        };
        debug!(
            "track {} ({}): {} candidates, {} intervals, {} new vertices, {} edges split",
            ctx.track_index,
            ctx.track_name,
            report.candidates,
            report.intervals,
            report.new_vertices,
            split_edges
        );
        Ok(report)
    }

    fn sweep_and_commit(
        &mut self,
        ctx: &PassContext,
        track: &Track,
        candidates: &mut [CandidateEdge],
    ) -> std::result::Result<(SweepSummary, usize), MergeError> {
        let summary = {
            let mut strategy = MergeStrategy::new(&mut self.graph);
            sweep(ctx, track, candidates, self.config.tolerance(), &mut strategy)?
        };
        let split_edges = self.graph.commit_splits(candidates)?;
        Ok((summary, split_edges))
    }

    /// Merges `tracks` in order. Each track is matched against the graph left by the
    /// ones before it, so the result depends on the order. Tracks with fewer than two
    /// points are skipped; a merge inconsistency stops the run.
    pub fn merge_tracks(&mut self, tracks: &[Track]) -> Result<BatchReport> {
        let start_time = Instant::now();
        info!(
            "Merging {} tracks into a graph of {} vertices",
            tracks.len(),
            self.graph.vertex_count()
        );

        let pb = if self.config.show_progress {
            ProgressBar::new(tracks.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({eta}) - Merging tracks",
                )?
                .progress_chars("##-"),
        );

        let mut reports = Vec::with_capacity(tracks.len());
        let mut skipped = 0;
        let mut total_length = 0.0;

        for (k, track) in tracks.iter().enumerate() {
            pb.inc(1);
            total_length += track.length();
            if track.len() < 2 {
                debug!("Skipping track {} with {} points", track.name, track.len());
                skipped += 1;
                continue;
            }

            let ctx = PassContext::new(k, track.name.clone());
            let report = self
                .merge_track(&ctx, track)
                .with_context(|| format!("merging track {} ({})", k, track.name))?;
            reports.push(report);
        }
        pb.finish_with_message("Tracks merged");

        let report = BatchReport {
            config: self.config.clone(),
            tracks_merged: reports.len(),
            tracks_skipped: skipped,
            total_length,
            vertices: self.graph.vertex_count(),
            edges: self.graph.edge_count(),
            elapsed_ms: start_time.elapsed().as_millis(),
            tracks: reports,
        };
        info!(
            "Merged {} tracks ({} skipped) in {:?}: {} vertices, {} edges",
            report.tracks_merged,
            report.tracks_skipped,
            start_time.elapsed(),
            report.vertices,
            report.edges
        );
        Ok(report)
    }
}

/// Matches `track` against `graph` without changing the graph. Matched edge points
/// are recorded as entries on the track's own points.
pub fn isolate_track(
    graph: &StreetGraph,
    track: &mut Track,
    config: &MergeConfig,
) -> std::result::Result<SweepSummary, MergeError> {
    let mut candidates =
        VertexIndex::build(graph).candidates_for(graph, track, config.bbox_margin);
    let ctx = PassContext::new(0, track.name.clone());

    let mut strategy = IsolationStrategy::new();
    let summary = sweep(&ctx, track, &mut candidates, config.tolerance(), &mut strategy)?;
    strategy.apply(track);

    info!(
        "Isolated track {}: {} intervals against {} candidate edges, {} entries",
        track.name,
        summary.intervals,
        candidates.len(),
        track.total_entries()
    );
    Ok(summary)
}
