use std::collections::{BTreeSet, HashMap};

use log::{debug, trace, warn};
use petgraph::graph::{NodeIndex, UnGraph};

use crate::candidate::{CandidateEdge, SplitPoint};
use crate::error::{MergeError, Result};
use crate::geometry::Point3;

/// Coordinates are quantized to this many steps per unit before keying vertices
pub const KEY_SCALE: f64 = 1e6;

/// Identity of a vertex location: coordinates rounded to 6 decimal digits.
///
/// Two points with the same key are the same graph vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexKey(i64, i64, i64);

impl From<Point3> for VertexKey {
    fn from(p: Point3) -> Self {
        VertexKey(quantize(p.x), quantize(p.y), quantize(p.z))
    }
}

fn quantize(value: f64) -> i64 {
    (value * KEY_SCALE).round() as i64
}

/// Observed alignment points accumulated on a vertex or track point
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entries {
    points: Vec<Point3>,
}

impl Entries {
    pub fn push(&mut self, point: Point3) {
        self.points.push(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Point3> {
        self.points.iter()
    }

    /// Mean altitude of the entries, or `fallback` when there are none
    pub fn average_z(&self, fallback: f64) -> f64 {
        if self.points.is_empty() {
            return fallback;
        }
        self.points.iter().map(|p| p.z).sum::<f64>() / self.points.len() as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    pub position: Point3,
    pub neighbors: Vec<usize>,
    pub entries: Entries,
}

impl Vertex {
    pub fn new(position: Point3) -> Self {
        Self {
            position,
            neighbors: Vec::new(),
            entries: Entries::default(),
        }
    }

    pub fn degree(&self) -> usize {
        self.neighbors.len()
    }

    pub fn add_neighbor(&mut self, index: usize) {
        if !self.neighbors.contains(&index) {
            self.neighbors.push(index);
        }
    }

    pub fn is_adjacent(&self, index: usize) -> bool {
        self.neighbors.contains(&index)
    }

    pub fn running_average_z(&self) -> f64 {
        self.entries.average_z(self.position.z)
    }
}

/// Result of linking two points into the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked { from: usize, to: usize },
    /// Both points resolved to the same vertex; nothing was added
    SelfLoop { vertex: usize },
}

/// Undirected street graph with one vertex per distinct [`VertexKey`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreetGraph {
    vertices: Vec<Vertex>,
    index: HashMap<VertexKey, usize>,
}

impl StreetGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn vertex(&self, index: usize) -> Option<&Vertex> {
        self.vertices.get(index)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges().count()
    }

    pub fn lookup(&self, point: Point3) -> Option<usize> {
        self.index.get(&VertexKey::from(point)).copied()
    }

    /// Appends a vertex as-is, e.g. when loading a stored map. A key collision keeps
    /// the earlier vertex as the key's owner.
    pub fn push_vertex(&mut self, vertex: Vertex) -> usize {
        let index = self.vertices.len();
        let key = VertexKey::from(vertex.position);
        if let Some(existing) = self.index.get(&key) {
            warn!(
                "vertex {} shares key with vertex {}, keeping the earlier one for lookups",
                index, existing
            );
        } else {
            self.index.insert(key, index);
        }
        self.vertices.push(vertex);
        index
    }

    /// Adds an undirected adjacency between two existing vertices
    pub fn connect(&mut self, a: usize, b: usize) -> bool {
        if a == b || a >= self.vertices.len() || b >= self.vertices.len() {
            return false;
        }
        self.vertices[a].add_neighbor(b);
        self.vertices[b].add_neighbor(a);
        true
    }

    pub fn add_entry(&mut self, vertex: usize, point: Point3) {
        if let Some(v) = self.vertices.get_mut(vertex) {
            v.entries.push(point);
        }
    }

    /// Each undirected edge once, as `(lower, higher)` vertex indices
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.vertices.iter().enumerate().flat_map(|(i, v)| {
            v.neighbors
                .iter()
                .copied()
                .filter(move |&j| j > i)
                .map(move |j| (i, j))
        })
    }

    /// Finds the vertex for `point`, creating it if the key is new, otherwise
    /// recording `point` as an entry on the existing vertex.
    fn resolve(&mut self, point: Point3) -> usize {
        let key = VertexKey::from(point);
        match self.index.get(&key) {
            Some(&existing) => {
                self.vertices[existing].entries.push(point);
                existing
            }
            None => {
                let index = self.vertices.len();
                self.vertices.push(Vertex::new(point));
                self.index.insert(key, index);
                index
            }
        }
    }

    /// Adds the edge `a`–`b`, deduplicating both endpoints by key.
    pub fn link(&mut self, a: Point3, b: Point3) -> Result<LinkOutcome> {
        let from = self.resolve(a);
        let to = self.resolve(b);

        if from == to {
            // attaching a track point that already lies on the street ends here
            trace!("dropping self-loop at vertex {}", from);
            return Ok(LinkOutcome::SelfLoop { vertex: from });
        }

        if !self.connect(from, to) {
            // resolve() just produced both indices
            return Err(MergeError::UnresolvedVertex {
                x: b.x,
                y: b.y,
                z: b.z,
            });
        }
        trace!("linked {} - {}", from, to);
        Ok(LinkOutcome::Linked { from, to })
    }

    /// Links consecutive points of `points` into a chain of edges. Consecutive
    /// points sharing a key are skipped with a warning.
    pub fn link_chain(&mut self, points: &[Point3]) -> Result<()> {
        for pair in points.windows(2) {
            if let LinkOutcome::SelfLoop { vertex } = self.link(pair[0], pair[1])? {
                warn!(
                    "consecutive points ({}, {}) collapse onto vertex {}, no edge added",
                    pair[1].x, pair[1].y, vertex
                );
            }
        }
        Ok(())
    }

    /// Records that `candidate` must be split at `offset`. The vertex at that offset
    /// has to exist already; splitting at one of the edge's own endpoints is a no-op.
    pub fn request_split(&self, candidate: &mut CandidateEdge, offset: f64) -> Result<()> {
        let point = candidate.point_at(offset);
        let vertex = self.lookup(point).ok_or(MergeError::UnresolvedVertex {
            x: point.x,
            y: point.y,
            z: point.z,
        })?;

        if vertex == candidate.from || vertex == candidate.to {
            return Ok(());
        }

        trace!(
            "split of {}-{} requested at {:.4} (vertex {})",
            candidate.from, candidate.to, offset, vertex
        );
        candidate.splits.push(SplitPoint { offset, vertex });
        Ok(())
    }

    /// Replaces every edge with pending splits by the path through its split
    /// vertices, ordered along the edge. Pending splits are consumed.
    pub fn commit_splits(&mut self, candidates: &mut [CandidateEdge]) -> Result<usize> {
        let mut committed = 0;

        for candidate in candidates.iter_mut() {
            if candidate.splits.is_empty() {
                continue;
            }
            let mut splits = std::mem::take(&mut candidate.splits);
            splits.sort_by(|a, b| a.offset.total_cmp(&b.offset).then(a.vertex.cmp(&b.vertex)));

            // the same crossing can be requested from both sides of a gap
            let mut seen = BTreeSet::new();
            let chain: Vec<usize> = splits
                .iter()
                .map(|s| s.vertex)
                .filter(|v| seen.insert(*v))
                .collect();

            self.rewire(candidate.from, candidate.to, &chain)?;
            committed += 1;
        }

        Ok(committed)
    }

    fn rewire(&mut self, from: usize, to: usize, chain: &[usize]) -> Result<()> {
        let (Some(&first), Some(&last)) = (chain.first(), chain.last()) else {
            return Ok(());
        };

        let intact = self.vertices.get(from).is_some_and(|v| v.is_adjacent(to))
            && self.vertices.get(to).is_some_and(|v| v.is_adjacent(from))
            && chain.iter().all(|&v| v < self.vertices.len());
        if !intact {
            return Err(MergeError::InconsistentSplit {
                from,
                to,
                splits: chain.len(),
                from_neighbors: self.neighbors_of(from),
                to_neighbors: self.neighbors_of(to),
            });
        }

        self.vertices[from].neighbors.retain(|&n| n != to);
        self.vertices[to].neighbors.retain(|&n| n != from);
        self.connect(from, first);
        self.connect(last, to);
        for pair in chain.windows(2) {
            self.connect(pair[0], pair[1]);
        }

        debug!("split edge {}-{} at {} vertices", from, to, chain.len());
        Ok(())
    }

    fn neighbors_of(&self, index: usize) -> Vec<usize> {
        self.vertices
            .get(index)
            .map(|v| v.neighbors.clone())
            .unwrap_or_default()
    }

    /// Adjacency as a petgraph graph, weighted by vertex key
    pub fn to_petgraph(&self) -> UnGraph<VertexKey, ()> {
        let mut graph = UnGraph::with_capacity(self.vertices.len(), self.vertices.len());
        let nodes: Vec<NodeIndex> = self
            .vertices
            .iter()
            .map(|v| graph.add_node(VertexKey::from(v.position)))
            .collect();
        for (a, b) in self.edges() {
            graph.add_edge(nodes[a], nodes[b], ());
        }
        graph
    }

    /// Checks adjacency symmetry and the absence of self-loops
    pub fn is_consistent(&self) -> bool {
        self.vertices.iter().enumerate().all(|(i, v)| {
            v.neighbors.iter().all(|&j| {
                j != i && self.vertices.get(j).is_some_and(|w| w.is_adjacent(i))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Segment;

    fn p(x: f64, y: f64) -> Point3 {
        Point3::new(x, y, 0.0)
    }

    #[test]
    fn test_vertex_key_is_quantized() {
        assert_eq!(VertexKey::from(p(1.0, 2.0)), VertexKey::from(p(1.0000000001, 2.0)));
        assert_ne!(VertexKey::from(p(1.0, 2.0)), VertexKey::from(p(1.00001, 2.0)));
    }

    #[test]
    fn test_link_creates_and_deduplicates() {
        let mut graph = StreetGraph::new();
        graph.link(p(0.0, 0.0), p(1.0, 0.0)).unwrap();
        graph.link(p(1.0, 0.0), p(2.0, 0.0)).unwrap();
        assert_eq!(graph.vertex_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        // the shared vertex gained an entry when resolved the second time
        assert_eq!(graph.vertices()[1].entries.len(), 1);
        assert!(graph.is_consistent());
    }

    #[test]
    fn test_link_rejects_self_loop() {
        let mut graph = StreetGraph::new();
        let outcome = graph.link(p(3.0, 3.0), p(3.0, 3.0)).unwrap();
        assert_eq!(outcome, LinkOutcome::SelfLoop { vertex: 0 });
        assert_eq!(graph.vertex_count(), 1);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_chain_skips_collapsed_points() {
        let mut graph = StreetGraph::new();
        graph
            .link_chain(&[p(0.0, 0.0), p(1.0, 0.0), p(1.0000000001, 0.0), p(2.0, 0.0)])
            .unwrap();
        assert_eq!(graph.vertex_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert!(graph.is_consistent());
    }

    #[test]
    fn test_repeated_link_is_idempotent() {
        let mut graph = StreetGraph::new();
        graph.link(p(0.0, 0.0), p(1.0, 0.0)).unwrap();
        graph.link(p(1.0, 0.0), p(0.0, 0.0)).unwrap();
        assert_eq!(graph.vertices()[0].degree(), 1);
        assert_eq!(graph.vertices()[1].degree(), 1);
    }

    #[test]
    fn test_split_requires_registered_vertex() {
        let mut graph = StreetGraph::new();
        graph.link(p(0.0, 0.0), p(10.0, 0.0)).unwrap();
        let mut candidate = CandidateEdge::new(0, 1, Segment::new(p(0.0, 0.0), p(10.0, 0.0)));
        let err = graph.request_split(&mut candidate, 0.5).unwrap_err();
        assert!(matches!(err, MergeError::UnresolvedVertex { .. }));
    }

    #[test]
    fn test_split_at_endpoint_is_noop() {
        let mut graph = StreetGraph::new();
        graph.link(p(0.0, 0.0), p(10.0, 0.0)).unwrap();
        let mut candidate = CandidateEdge::new(0, 1, Segment::new(p(0.0, 0.0), p(10.0, 0.0)));
        graph.request_split(&mut candidate, 0.0).unwrap();
        graph.request_split(&mut candidate, 1.0).unwrap();
        assert!(candidate.splits.is_empty());
    }

    #[test]
    fn test_commit_orders_and_deduplicates_splits() {
        let mut graph = StreetGraph::new();
        graph.link(p(0.0, 0.0), p(10.0, 0.0)).unwrap();
        graph.link(p(7.0, 0.0), p(7.0, 1.0)).unwrap();
        graph.link(p(3.0, 0.0), p(3.0, 1.0)).unwrap();
        let mut candidates = vec![CandidateEdge::new(
            0,
            1,
            Segment::new(p(0.0, 0.0), p(10.0, 0.0)),
        )];
        graph.request_split(&mut candidates[0], 0.7).unwrap();
        graph.request_split(&mut candidates[0], 0.3).unwrap();
        graph.request_split(&mut candidates[0], 0.7).unwrap();

        assert_eq!(graph.commit_splits(&mut candidates).unwrap(), 1);
        let at = |x: f64| graph.lookup(p(x, 0.0)).unwrap();
        assert!(!graph.vertices()[at(0.0)].is_adjacent(at(10.0)));
        assert_eq!(graph.vertices()[at(0.0)].neighbors, vec![at(3.0)]);
        assert_eq!(graph.vertices()[at(10.0)].neighbors, vec![at(7.0)]);
        assert!(graph.vertices()[at(3.0)].is_adjacent(at(7.0)));
        assert!(candidates[0].splits.is_empty());
        assert!(graph.is_consistent());
    }

    #[test]
    fn test_commit_on_missing_edge_is_an_error() {
        let mut graph = StreetGraph::new();
        graph.link(p(0.0, 0.0), p(5.0, 5.0)).unwrap();
        graph.link(p(10.0, 0.0), p(5.0, 0.0)).unwrap();
        let mut candidates = vec![CandidateEdge::new(
            0,
            2,
            Segment::new(p(0.0, 0.0), p(10.0, 0.0)),
        )];
        graph.request_split(&mut candidates[0], 0.5).unwrap();
        let err = graph.commit_splits(&mut candidates).unwrap_err();
        assert!(matches!(err, MergeError::InconsistentSplit { from: 0, to: 2, .. }));
    }

    #[test]
    fn test_running_average_falls_back_to_altitude() {
        let mut vertex = Vertex::new(Point3::new(0.0, 0.0, 12.0));
        assert_eq!(vertex.running_average_z(), 12.0);
        vertex.entries.push(Point3::new(0.0, 0.0, 10.0));
        vertex.entries.push(Point3::new(0.0, 0.0, 20.0));
        assert_eq!(vertex.running_average_z(), 15.0);
    }
}
