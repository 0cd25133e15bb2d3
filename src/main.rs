use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use flightcone::web::{AppState, cone_response, start_web_server};
use flightcone::{GlideQuery, TileStore, search_from_point};

#[derive(Parser, Debug)]
#[command(
    name = "flightcone",
    about = "Terrain-aware glide reachability cones from SRTM elevation data."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the reachability API over HTTP.
    Serve {
        /// Interface to bind.
        #[arg(long, default_value = "127.0.0.1")]
        interface: String,
        /// Port to listen on.
        #[arg(long, default_value_t = 3000)]
        port: u16,
        /// Directory holding .hgt tiles (overrides TERRAIN_DATA_PATH).
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Run a single search and print the result.
    Cone {
        /// Launch latitude in degrees.
        #[arg(long)]
        lat: f64,
        /// Launch longitude in degrees.
        #[arg(long)]
        lon: f64,
        /// Grid cell size in meters.
        #[arg(long, default_value_t = 200.0)]
        cell_size: f64,
        /// Glide number (horizontal per vertical meter).
        #[arg(long, default_value_t = 8.0)]
        glide_number: f64,
        /// Meters above ground at launch.
        #[arg(long, default_value_t = 10.0)]
        additional_height: f64,
        /// Trim airspeed in m/s.
        #[arg(long, default_value_t = 10.0)]
        trim_speed: f64,
        /// Wind speed in m/s.
        #[arg(long, default_value_t = 0.0)]
        wind_speed: f64,
        /// Direction the wind comes from, degrees.
        #[arg(long, default_value_t = 0.0)]
        wind_direction: f64,
        /// Directory holding .hgt tiles (overrides TERRAIN_DATA_PATH).
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Emit the full cone as JSON instead of a summary.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn tile_store(data_dir: Option<PathBuf>) -> TileStore {
    match data_dir {
        Some(dir) => TileStore::with_dir(dir),
        None => TileStore::new(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve {
            interface,
            port,
            data_dir,
        } => {
            let state = AppState {
                tiles: tile_store(data_dir),
            };
            start_web_server(interface, port, state).await
        }
        Command::Cone {
            lat,
            lon,
            cell_size,
            glide_number,
            additional_height,
            trim_speed,
            wind_speed,
            wind_direction,
            data_dir,
            json,
        } => {
            let store = tile_store(data_dir);
            let query = GlideQuery {
                glide_ratio: 1.0 / glide_number,
                trim_speed,
                wind_direction: wind_direction.to_radians(),
                wind_speed,
                additional_height,
            };

            let (state, grid) =
                tokio::task::spawn_blocking(move || {
                    search_from_point(&store, lat, lon, cell_size, &query)
                })
                .await??;

            if json {
                let response = cone_response(&state, &grid);
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                let reachable = state.explored.values().filter(|n| n.reachable).count();
                info!(
                    "reachable cells: {} of {} explored, grid {}x{} at {:.1} m/cell",
                    reachable,
                    state.explored.len(),
                    grid.rows,
                    grid.cols,
                    grid.cell_size
                );
                info!(
                    "bounds: lat {:.4}..{:.4}, lon {:.4}..{:.4}",
                    grid.latitudes.0, grid.latitudes.1, grid.longitudes.0, grid.longitudes.1
                );
            }
            Ok(())
        }
    }
}
