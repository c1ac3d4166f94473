use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::json;

use crate::config::MergeConfig;
use crate::fixes::{Fix, FixTrack};
use crate::geometry::Point3;
use crate::graph::{StreetGraph, Vertex};
use crate::track::Track;

pub const VERTICES_FILE: &str = "vertices.txt";
pub const EDGES_FILE: &str = "edges.txt";

/// Writes `vertices.txt` (`index,x,y,z,runningAverageZ`) and `edges.txt`
/// (`edgeId,from,to`, each undirected edge once) into `dir`.
pub fn write_graph(graph: &StreetGraph, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating output folder {}", dir.display()))?;

    let vertices_path = dir.join(VERTICES_FILE);
    let mut vertices = BufWriter::new(
        File::create(&vertices_path)
            .with_context(|| format!("creating {}", vertices_path.display()))?,
    );
    for (i, v) in graph.vertices().iter().enumerate() {
        writeln!(
            vertices,
            "{},{},{},{},{}",
            i,
            v.position.x,
            v.position.y,
            v.position.z,
            v.running_average_z()
        )?;
    }
    vertices.flush()?;

    let edges_path = dir.join(EDGES_FILE);
    let mut edges = BufWriter::new(
        File::create(&edges_path).with_context(|| format!("creating {}", edges_path.display()))?,
    );
    let mut count = 0;
    for (id, (from, to)) in graph.edges().enumerate() {
        writeln!(edges, "{},{},{}", id, from, to)?;
        count += 1;
    }
    edges.flush()?;

    info!(
        "Wrote {} vertices and {} edges to {}",
        graph.vertex_count(),
        count,
        dir.display()
    );
    Ok(())
}

/// Reads a graph written by [`write_graph`]. Edges may appear in either direction and
/// in any order; the stored running average becomes the vertex's single entry.
pub fn read_graph(dir: &Path) -> Result<StreetGraph> {
    let vertices_path = dir.join(VERTICES_FILE);
    let edges_path = dir.join(EDGES_FILE);
    let mut graph = StreetGraph::new();

    for (line_no, fields) in csv_lines(&vertices_path)? {
        if fields.len() < 4 {
            bail!(
                "{}:{}: expected index,x,y,z[,avg], got {} fields",
                vertices_path.display(),
                line_no,
                fields.len()
            );
        }
        let index: usize = parse_field(&fields[0], &vertices_path, line_no)?;
        let position = Point3::new(
            parse_field(&fields[1], &vertices_path, line_no)?,
            parse_field(&fields[2], &vertices_path, line_no)?,
            parse_field(&fields[3], &vertices_path, line_no)?,
        );
        if index != graph.vertex_count() {
            bail!(
                "{}:{}: vertex index {} out of sequence, expected {}",
                vertices_path.display(),
                line_no,
                index,
                graph.vertex_count()
            );
        }

        let mut vertex = Vertex::new(position);
        if let Some(avg) = fields.get(4) {
            let avg: f64 = parse_field(avg, &vertices_path, line_no)?;
            vertex.entries.push(Point3::new(position.x, position.y, avg));
        }
        graph.push_vertex(vertex);
    }

    for (line_no, fields) in csv_lines(&edges_path)? {
        if fields.len() < 3 {
            bail!(
                "{}:{}: expected edgeId,from,to, got {} fields",
                edges_path.display(),
                line_no,
                fields.len()
            );
        }
        let from: usize = parse_field(&fields[1], &edges_path, line_no)?;
        let to: usize = parse_field(&fields[2], &edges_path, line_no)?;
        if from == to {
            warn!("{}:{}: ignoring self-loop at vertex {}", edges_path.display(), line_no, from);
            continue;
        }
        if !graph.connect(from, to) {
            bail!(
                "{}:{}: edge {}-{} references a missing vertex",
                edges_path.display(),
                line_no,
                from,
                to
            );
        }
    }

    info!(
        "Loaded graph from {}: {} vertices, {} edges",
        dir.display(),
        graph.vertex_count(),
        graph.edge_count()
    );
    Ok(graph)
}

/// Reads a raw track: one point per line as whitespace-separated `x y [z] ...`.
/// Without altitude every point gets `z = 0`; trailing columns are ignored.
pub fn read_track(path: &Path, config: &MergeConfig) -> Result<Track> {
    let file = File::open(path).with_context(|| format!("opening track {}", path.display()))?;
    let mut samples = Vec::new();

    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("reading {}", path.display()))?;
        let mut tokens = line.split_whitespace();
        let Some(x) = tokens.next() else {
            continue;
        };
        let y = tokens
            .next()
            .ok_or_else(|| anyhow!("{}:{}: missing y coordinate", path.display(), i + 1))?;
        let z = if config.has_altitude {
            let z = tokens
                .next()
                .ok_or_else(|| anyhow!("{}:{}: missing altitude", path.display(), i + 1))?;
            parse_field(z, path, i + 1)?
        } else {
            0.0
        };
        samples.push(Point3::new(parse_field(x, path, i + 1)?, parse_field(y, path, i + 1)?, z));
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let track = Track::from_samples(name, samples, config.min_point_separation);
    debug!("Read track {} with {} points", track.name, track.len());
    Ok(track)
}

/// Writes a track's points in the vertices format, with the running average taken
/// from the entries recorded during isolation.
pub fn write_track(track: &Track, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut out = BufWriter::new(
        File::create(path).with_context(|| format!("creating {}", path.display()))?,
    );
    for (i, p) in track.points().iter().enumerate() {
        writeln!(out, "{},{},{},{},{}", i, p.x, p.y, p.z, track.running_average_z(i))?;
    }
    out.flush()?;
    info!("Wrote {} track points to {}", track.len(), path.display());
    Ok(())
}

#[derive(Debug, Deserialize)]
struct FixRecord {
    id_object: String,
    latitude: f64,
    longitude: f64,
    online: String,
    date: String,
}

/// Reads a dataset of GPS fixes: a CSV file with the columns
/// `id_object,latitude,longitude,online,date`, ordered by object and time.
pub fn read_fixes(path: &Path) -> Result<Vec<Fix>> {
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("opening {}", path.display()))?;
    let mut fixes = Vec::new();

    for (i, record) in reader.deserialize::<FixRecord>().enumerate() {
        // the header is line 1
        let line = i + 2;
        let record = record.with_context(|| format!("{}:{}: bad record", path.display(), line))?;
        let time = parse_timestamp(&record.date)
            .with_context(|| format!("{}:{}: bad date", path.display(), line))?;
        fixes.push(Fix {
            object_id: record.id_object,
            x: record.longitude,
            y: record.latitude,
            time,
            online: matches!(record.online.trim(), "1" | "true" | "True"),
        });
    }

    info!("Read {} fixes from {}", fixes.len(), path.display());
    Ok(fixes)
}

/// Accepts RFC 3339 and naive `YYYY-MM-DD HH:MM:SS[.fff]` timestamps, the latter as UTC
fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return Ok(time.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|time| time.and_utc())
        .ok_or_else(|| anyhow!("unrecognised timestamp {:?}", value))
}

/// Writes every track of at least two fixes to `dir` as `track_<n>.txt`, one
/// `x y timestamp online` line per fix. Returns the number of files written.
pub fn write_fix_tracks(tracks: &[FixTrack], dir: &Path) -> Result<usize> {
    fs::create_dir_all(dir).with_context(|| format!("creating output folder {}", dir.display()))?;

    let usable: Vec<&FixTrack> = tracks.iter().filter(|t| t.fixes.len() >= 2).collect();
    let width = usable.len().saturating_sub(1).to_string().len();

    for (n, track) in usable.iter().enumerate() {
        let path = dir.join(format!("track_{:0width$}.txt", n, width = width));
        let mut out = BufWriter::new(
            File::create(&path).with_context(|| format!("creating {}", path.display()))?,
        );
        for fix in &track.fixes {
            writeln!(
                out,
                "{} {} {} {}",
                fix.x,
                fix.y,
                fix.time.timestamp_millis() as f64 / 1000.0,
                fix.online
            )?;
        }
        out.flush()?;
    }

    info!(
        "Exported {} of {} tracks to {}",
        usable.len(),
        tracks.len(),
        dir.display()
    );
    Ok(usable.len())
}

/// Converts the graph into a GeoJSON FeatureCollection with one LineString per edge
pub fn graph_to_geojson(graph: &StreetGraph) -> serde_json::Value {
    let features: Vec<serde_json::Value> = graph
        .edges()
        .map(|(a, b)| {
            let pa = graph.vertices()[a].position;
            let pb = graph.vertices()[b].position;
            json!({
                "type": "Feature",
                "properties": { "from": a, "to": b },
                "geometry": {
                    "type": "LineString",
                    "coordinates": [[pa.x, pa.y], [pb.x, pb.y]]
                }
            })
        })
        .collect();

    json!({
        "type": "FeatureCollection",
        "features": features
    })
}

fn csv_lines(path: &Path) -> Result<Vec<(usize, Vec<String>)>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut rows = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("reading {}", path.display()))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        rows.push((i + 1, trimmed.split(',').map(|f| f.trim().to_string()).collect()));
    }
    Ok(rows)
}

fn parse_field<T>(field: &str, path: &Path, line_no: usize) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    field
        .parse::<T>()
        .map_err(|e| anyhow!("{}:{}: invalid value {:?}: {}", path.display(), line_no, field, e))
}
