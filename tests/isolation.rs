use trackmerge::{MergeConfig, MergeError, Point3, StreetGraph, Track, isolate_track};

fn p(x: f64, y: f64) -> Point3 {
    Point3::new(x, y, 0.0)
}

fn config() -> MergeConfig {
    MergeConfig {
        eps: 1.0,
        bbox_margin: 20.0,
        ..Default::default()
    }
}

fn street() -> StreetGraph {
    let mut graph = StreetGraph::new();
    graph
        .link_chain(&[p(0.0, 0.0), p(10.0, 0.0), p(20.0, 0.0)])
        .unwrap();
    graph
}

#[test]
fn test_isolation_leaves_graph_untouched() {
    let graph = street();
    let before = graph.clone();
    let mut track = Track::new(
        "ride",
        vec![p(0.0, 0.3), p(10.0, 0.3), p(20.0, 0.3), p(20.0, 15.0)],
    );

    let summary = isolate_track(&graph, &mut track, &config()).unwrap();

    assert_eq!(graph, before);
    assert_eq!(summary.intervals, 2);
    assert_eq!(track.total_entries(), 4);
}

#[test]
fn test_isolation_records_edge_points_on_track() {
    let graph = street();
    let mut track = Track::new(
        "ride",
        vec![p(0.0, 0.3), p(10.0, 0.3), p(20.0, 0.3), p(20.0, 15.0)],
    );
    isolate_track(&graph, &mut track, &config()).unwrap();

    let first: Vec<Point3> = track.entries(0).unwrap().iter().copied().collect();
    assert_eq!(first, vec![p(0.0, 0.0), p(10.0, 0.0)]);
    assert_eq!(track.entries(1).unwrap().len(), 0);
    assert_eq!(track.entries(2).unwrap().iter().next(), Some(&p(10.0, 0.0)));
    assert_eq!(track.entries(3).unwrap().iter().next(), Some(&p(20.0, 0.0)));
}

#[test]
fn test_isolation_against_empty_map_records_nothing() {
    let graph = StreetGraph::new();
    let mut track = Track::new("ride", vec![p(0.0, 0.0), p(5.0, 5.0)]);
    let summary = isolate_track(&graph, &mut track, &config()).unwrap();

    assert_eq!(summary.intervals, 0);
    assert_eq!(summary.gaps, 1);
    assert_eq!(track.total_entries(), 0);
    assert_eq!(graph.vertex_count(), 0);
}

#[test]
fn test_isolation_rejects_single_point_track() {
    let graph = street();
    let mut track = Track::new("dot", vec![p(1.0, 1.0)]);
    let err = isolate_track(&graph, &mut track, &config()).unwrap_err();
    assert_eq!(
        err,
        MergeError::DegenerateTrack {
            name: "dot".to_string(),
            points: 1
        }
    );
}
