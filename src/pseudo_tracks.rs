//! Turns a stored graph back into tracks so it can be merged into another graph.

use log::debug;

use crate::geometry::Point3;
use crate::graph::StreetGraph;
use crate::track::Track;

/// Running planar extent of a walk
#[derive(Debug, Clone, Copy)]
struct Extent {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
}

impl Extent {
    fn new(p: Point3) -> Self {
        Self {
            min_x: p.x,
            min_y: p.y,
            max_x: p.x,
            max_y: p.y,
        }
    }

    fn contains(&self, p: Point3) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }

    fn extend(&mut self, p: Point3) {
        self.min_x = self.min_x.min(p.x);
        self.min_y = self.min_y.min(p.y);
        self.max_x = self.max_x.max(p.x);
        self.max_y = self.max_y.max(p.y);
    }
}

/// Decomposes `graph` into walks that together visit every vertex once.
///
/// A walk extends to the first unvisited neighbour lying outside the extent it has
/// covered so far. Every other unvisited neighbour at that point starts a later walk
/// from the branching vertex. Walks are driven from an explicit stack, so long chains
/// and high-degree vertices do not grow the call stack. Walks of a single vertex are
/// dropped.
pub fn pseudo_tracks(graph: &StreetGraph, name: &str) -> Vec<Track> {
    let vertices = graph.vertices();
    let mut visited = vec![false; vertices.len()];
    let mut branches: Vec<usize> = Vec::new();
    let mut tracks = Vec::new();
    let mut next_root = 0;

    loop {
        let start = match branches.pop() {
            Some(branch) => branch,
            None => {
                while next_root < vertices.len() && visited[next_root] {
                    next_root += 1;
                }
                if next_root == vertices.len() {
                    break;
                }
                next_root
            }
        };

        visited[start] = true;
        let mut points = vec![vertices[start].position];
        let mut extent = Extent::new(vertices[start].position);
        let mut current = start;

        loop {
            let mut next = None;
            for &adj in &vertices[current].neighbors {
                if visited[adj] {
                    continue;
                }
                let position = vertices[adj].position;
                // the first step of a walk always advances
                if next.is_none() && (points.len() == 1 || !extent.contains(position)) {
                    visited[adj] = true;
                    points.push(position);
                    extent.extend(position);
                    next = Some(adj);
                } else {
                    branches.push(current);
                }
            }
            match next {
                Some(n) => current = n,
                None => break,
            }
        }

        if points.len() >= 2 {
            let walk_name = format!("{}#{}", name, tracks.len());
            tracks.push(Track::new(walk_name, points));
        }
    }

    debug!(
        "Decomposed {} ({} vertices) into {} pseudo-tracks",
        name,
        vertices.len(),
        tracks.len()
    );
    tracks
}
