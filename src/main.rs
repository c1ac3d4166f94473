use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{info, warn};

use trackmerge::io::{
    graph_to_geojson, read_fixes, read_graph, read_track, write_fix_tracks, write_graph,
    write_track,
};
use trackmerge::{
    MapBuilder, MergeConfig, SplitConfig, SplitReport, StreetGraph, Track, count_points,
    isolate_track, pseudo_tracks, split_fixes,
};

#[derive(Parser)]
#[command(name = "trackmerge")]
#[command(about = "Builds street networks from GPS tracks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose debug output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge maps and tracks from a folder into one street graph
    Merge {
        /// Folder with map subfolders (the first, by name, is the base map) and track files
        input: PathBuf,

        /// Folder receiving vertices.txt and edges.txt
        output: PathBuf,

        /// Matching distance between a track and a street
        eps: f64,

        /// Track files carry an altitude column
        #[arg(action = clap::ArgAction::Set)]
        has_altitude: bool,

        /// Maximum altitude difference between a track and a street
        #[arg(default_value = "4.0")]
        alt_eps: f64,

        /// Also write the merged graph as GeoJSON
        #[arg(long)]
        geojson: Option<PathBuf>,
    },

    /// Match one track against an existing map without changing the map
    Isolate {
        /// Folder containing vertices.txt and edges.txt
        map: PathBuf,

        /// Track file
        track: PathBuf,

        /// Output file for the annotated track points
        output: PathBuf,

        /// Matching distance between the track and a street
        eps: f64,

        /// The track file carries an altitude column
        #[arg(action = clap::ArgAction::Set)]
        has_altitude: bool,

        /// Maximum altitude difference between the track and a street
        #[arg(default_value = "4.0")]
        alt_eps: f64,
    },

    /// Cut a CSV dataset of GPS fixes into track files
    Split {
        /// CSV file with id_object, latitude, longitude, online and date columns
        dataset: PathBuf,

        /// Folder receiving one track_<n>.txt per track
        output: PathBuf,

        /// Longest pause between fixes of one track, in seconds
        #[arg(long, default_value = "600")]
        max_time_gap: f64,

        /// Longest jump between fixes of one track
        #[arg(long, default_value = "0.2")]
        max_jump: f64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::builder()
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .format_target(false)
        .format_timestamp(None)
        .target(env_logger::Target::Stderr)
        .init();

    match cli.command {
        Commands::Merge {
            input,
            output,
            eps,
            has_altitude,
            alt_eps,
            geojson,
        } => {
            let config = MergeConfig {
                eps,
                alt_eps,
                has_altitude,
                show_progress: true,
                ..Default::default()
            };
            run_merge(&input, &output, geojson.as_deref(), config)
        }
        Commands::Isolate {
            map,
            track,
            output,
            eps,
            has_altitude,
            alt_eps,
        } => {
            let config = MergeConfig {
                eps,
                alt_eps,
                has_altitude,
                ..Default::default()
            };
            run_isolate(&map, &track, &output, config)
        }
        Commands::Split {
            dataset,
            output,
            max_time_gap,
            max_jump,
        } => {
            let config = SplitConfig {
                max_time_gap,
                max_jump,
            };
            run_split(&dataset, &output, config)
        }
    }
}

fn run_merge(
    input: &Path,
    output: &Path,
    geojson: Option<&Path>,
    config: MergeConfig,
) -> Result<()> {
    info!("Starting merge of {}", input.display());
    let (base, tracks) = load_inputs(input, &config)?;

    let mut builder = MapBuilder::with_graph(config, base);
    let report = builder.merge_tracks(&tracks)?;
    let graph = builder.into_graph();

    write_graph(&graph, output)?;
    if let Some(path) = geojson {
        fs::write(path, serde_json::to_string(&graph_to_geojson(&graph))?)
            .with_context(|| format!("writing {}", path.display()))?;
        info!("Wrote GeoJSON to {}", path.display());
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Collects the base map and the tracks to merge from `input`. Entries are taken in
/// name order: the first map folder is the base graph, every further map folder is
/// decomposed into pseudo-tracks, and plain files are read as raw tracks.
fn load_inputs(input: &Path, config: &MergeConfig) -> Result<(StreetGraph, Vec<Track>)> {
    if !input.is_dir() {
        bail!("Input folder not found: {}", input.display());
    }

    let mut entries: Vec<PathBuf> = fs::read_dir(input)
        .with_context(|| format!("listing {}", input.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    let mut base: Option<StreetGraph> = None;
    let mut tracks = Vec::new();

    for path in entries {
        if path.is_dir() {
            let graph = read_graph(&path)?;
            if base.is_none() {
                info!("Using {} as the base map", path.display());
                base = Some(graph);
            } else {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                tracks.extend(pseudo_tracks(&graph, &name));
            }
        } else {
            match read_track(&path, config) {
                Ok(track) => tracks.push(track),
                Err(e) => warn!("Skipping {}: {:#}", path.display(), e),
            }
        }
    }

    let base = base.unwrap_or_default();
    info!(
        "Loaded base map with {} vertices and {} tracks to merge",
        base.vertex_count(),
        tracks.len()
    );
    Ok((base, tracks))
}

fn run_isolate(map: &Path, track_path: &Path, output: &Path, config: MergeConfig) -> Result<()> {
    let mut track = read_track(track_path, &config)?;
    info!("Reading map from {}", map.display());
    let graph = read_graph(map)?;

    info!("Isolating track {}", track.name);
    isolate_track(&graph, &mut track, &config)
        .with_context(|| format!("isolating track {}", track_path.display()))?;

    write_track(&track, output)
}

fn run_split(dataset: &Path, output: &Path, config: SplitConfig) -> Result<()> {
    let fixes = read_fixes(dataset)?;
    let fix_count = fixes.len();

    let tracks = split_fixes(fixes, &config);
    let exported = write_fix_tracks(&tracks, output)?;
    let points = count_points(&tracks);
    info!(
        "{} of {} fixes lie on exported tracks",
        points.tracked,
        points.total()
    );

    let report = SplitReport {
        config,
        fixes: fix_count,
        tracks: tracks.len(),
        exported,
        points,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
