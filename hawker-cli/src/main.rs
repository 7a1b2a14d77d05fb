use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use hawker_roadgraph::{Coordinate, GraphCache, Router, TileId, TileSource, TileStore};
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "hawker-cli", version, about, long_about = None)]
struct Cli {
    /// Tile archive URL (file://, http(s)://, s3://, or gs://)
    #[arg(env = "PMTILES_SOURCE", long)]
    source: String,

    /// Road layer name within the tiles
    #[arg(env = "PMTILES_ROAD_LAYER", long, default_value = "transportation")]
    road_layer: String,

    /// Routing zoom level
    #[arg(env = "PMTILES_ZOOM_LEVEL", long, default_value_t = 14)]
    zoom: u8,

    /// Subcommand/tool to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Road distance from a source coordinate to one or more targets
    Route {
        /// Source as "lat,lng"
        source: String,
        /// Targets as "lat,lng"
        targets: Vec<String>,
    },
    /// Snap a coordinate to the nearest road node
    Snap {
        /// Coordinate as "lat,lng"
        coordinate: String,
    },
    /// Node and edge counts for a single tile graph
    Tile { z: u8, x: u32, y: u32 },
}

fn parse_coordinate(input: &str) -> anyhow::Result<Coordinate> {
    let (lat, lng) = input
        .split_once(',')
        .ok_or_else(|| anyhow!("expected \"lat,lng\", got {input:?}"))?;
    Ok(Coordinate::new(
        lat.trim().parse().context("invalid latitude")?,
        lng.trim().parse().context("invalid longitude")?,
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env()))
        .init();

    let source = TileSource::parse(&cli.source)?;
    let store = TileStore::open(&source)
        .await
        .context("failed to open the tile archive")?;
    let cache = Arc::new(GraphCache::new(store, cli.road_layer.clone()));

    match cli.command {
        Commands::Route { source, targets } => {
            let router = Router::new(cache, cli.zoom);
            let source = parse_coordinate(&source)?;
            let targets = targets
                .iter()
                .map(|t| parse_coordinate(t))
                .collect::<anyhow::Result<Vec<_>>>()?;

            let results = router.one_to_many(source, &targets).await;
            for (target, result) in targets.iter().zip(&results) {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "target": { "lat": target.lat, "lng": target.lng },
                        "result": result,
                    }))?
                );
            }
        }
        Commands::Snap { coordinate } => {
            let router = Router::new(cache, cli.zoom);
            let coordinate = parse_coordinate(&coordinate)?;
            match router.find_nearest_node(coordinate).await {
                Some(snapped) => println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "node": { "lat": snapped.coordinate.lat, "lng": snapped.coordinate.lng },
                        "snap_distance_m": snapped.snap_distance_m,
                    }))?
                ),
                None => println!("no road node within the snap budget"),
            }
        }
        Commands::Tile { z, x, y } => {
            let graph = cache.load_tile(TileId::new(z, x, y)).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "tile": format!("{z}/{x}/{y}"),
                    "nodes": graph.node_count(),
                    "edges": graph.edge_count(),
                }))?
            );
        }
    }

    Ok(())
}
