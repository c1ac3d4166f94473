use std::collections::HashSet;

use petgraph::algo::is_isomorphic_matching;

use trackmerge::{MapBuilder, MergeConfig, Point3, StreetGraph, VertexKey, pseudo_tracks};

fn p(x: f64, y: f64) -> Point3 {
    Point3::new(x, y, 0.0)
}

fn covered(tracks: &[trackmerge::Track]) -> HashSet<VertexKey> {
    tracks
        .iter()
        .flat_map(|t| t.points().iter().map(|&q| VertexKey::from(q)))
        .collect()
}

fn keys(graph: &StreetGraph) -> HashSet<VertexKey> {
    graph
        .vertices()
        .iter()
        .map(|v| VertexKey::from(v.position))
        .collect()
}

#[test]
fn test_chain_becomes_single_track() {
    let mut graph = StreetGraph::new();
    graph
        .link_chain(&[p(0.0, 0.0), p(1.0, 0.0), p(2.0, 1.0), p(3.0, 1.0), p(4.0, 2.0)])
        .unwrap();

    let tracks = pseudo_tracks(&graph, "map");
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].name, "map#0");
    let positions: Vec<Point3> = graph.vertices().iter().map(|v| v.position).collect();
    assert_eq!(tracks[0].points(), &positions[..]);
}

#[test]
fn test_junction_branches_into_separate_tracks() {
    let mut graph = StreetGraph::new();
    let centre = p(0.0, 0.0);
    graph.link(centre, p(5.0, 0.0)).unwrap();
    graph.link(centre, p(-5.0, 0.0)).unwrap();
    graph.link(centre, p(0.0, 5.0)).unwrap();

    let tracks = pseudo_tracks(&graph, "star");
    assert_eq!(tracks.len(), 3);
    assert!(tracks.iter().all(|t| t.len() == 2 && t.points()[0] == centre));

    assert_eq!(covered(&tracks), keys(&graph));
}

#[test]
fn test_disconnected_components_are_all_visited() {
    let mut graph = StreetGraph::new();
    graph.link_chain(&[p(0.0, 0.0), p(1.0, 0.0), p(2.0, 0.0)]).unwrap();
    graph.link_chain(&[p(10.0, 10.0), p(11.0, 11.0)]).unwrap();
    graph.link(p(5.0, 5.0), p(5.0, 5.0)).unwrap();

    let tracks = pseudo_tracks(&graph, "parts");
    assert_eq!(tracks.len(), 2);

    let mut expected = keys(&graph);
    // the isolated vertex only forms a one-point walk, which is dropped
    expected.remove(&VertexKey::from(p(5.0, 5.0)));
    assert_eq!(covered(&tracks), expected);
}

#[test]
fn test_long_chain_does_not_recurse() {
    let points: Vec<Point3> = (0..50_000).map(|i| p(i as f64, 0.0)).collect();
    let mut graph = StreetGraph::new();
    graph.link_chain(&points).unwrap();

    let tracks = pseudo_tracks(&graph, "long");
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].len(), 50_000);
}

#[test]
fn test_pseudo_tracks_rebuild_map_in_empty_graph() {
    let mut graph = StreetGraph::new();
    graph
        .link_chain(&[p(0.0, 0.0), p(10.0, 0.0), p(20.0, 5.0), p(30.0, 5.0)])
        .unwrap();

    let tracks = pseudo_tracks(&graph, "copy");
    let mut builder = MapBuilder::new(MergeConfig::default());
    builder.merge_tracks(&tracks).unwrap();

    assert!(is_isomorphic_matching(
        &graph.to_petgraph(),
        &builder.graph().to_petgraph(),
        |a, b| a == b,
        |_, _| true,
    ));
}
