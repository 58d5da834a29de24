use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tilecache::{GeoPoint, Region};

mod commands;

/// Offline map tile cache CLI tool
#[derive(Parser)]
#[command(name = "tilecache")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding cached tiles
    #[arg(short = 'd', long, env = "TILECACHE_DIR", global = true)]
    cache_dir: Option<PathBuf>,

    /// Tile server URL template, e.g. https://tile.example.org/{z}/{x}/{y}.png
    #[arg(short, long, env = "TILECACHE_URL_TEMPLATE", global = true)]
    url_template: Option<String>,

    /// Serve from the cache only, never touch the network
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a single tile
    Get {
        /// Zoom level
        z: u8,

        /// Column
        x: u32,

        /// Row
        y: u32,

        /// Write the tile image to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// List the tiles covering a region
    Region {
        #[command(flatten)]
        region: RegionArgs,

        /// Output tiles as JSON
        #[arg(short, long, conflicts_with = "geojson")]
        json: bool,

        /// Output tile footprints as a GeoJSON FeatureCollection
        #[arg(short, long)]
        geojson: bool,
    },

    /// Download the tiles of a region into the cache
    Prefetch {
        #[command(flatten)]
        region: RegionArgs,

        /// Output the report as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// List cached tiles with their age
    List,

    /// Display cache statistics
    Info,

    /// Delete every cached tile
    Clear,
}

/// A region given by its center and extent, plus a zoom range.
#[derive(Args)]
pub struct RegionArgs {
    /// Latitude of the region center in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    lat: f64,

    /// Longitude of the region center in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    lon: f64,

    /// North-south extent in degrees
    #[arg(long)]
    lat_span: f64,

    /// East-west extent in degrees
    #[arg(long)]
    lon_span: f64,

    /// Lowest zoom level
    #[arg(long)]
    min_zoom: u8,

    /// Highest zoom level
    #[arg(long)]
    max_zoom: u8,
}

impl RegionArgs {
    pub fn region(&self) -> Result<Region> {
        let region = Region::new(GeoPoint::new(self.lat, self.lon), self.lat_span, self.lon_span);
        if !region.is_valid() {
            anyhow::bail!(
                "Invalid region: center ({}, {}) must be a valid position and spans must be positive",
                self.lat,
                self.lon
            );
        }
        Ok(region)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = commands::ServiceSettings {
        cache_dir: cli.cache_dir,
        url_template: cli.url_template,
        offline: cli.offline,
    };

    match cli.command {
        Commands::Get {
            z,
            x,
            y,
            output,
            json,
        } => commands::get::run(&settings, z, x, y, output, json),
        Commands::Region {
            region,
            json,
            geojson,
        } => commands::region::run(&region, json, geojson),
        Commands::Prefetch { region, json } => commands::prefetch::run(&settings, &region, json),
        Commands::List => commands::list::run(&settings),
        Commands::Info => commands::info::run(&settings),
        Commands::Clear => commands::clear::run(&settings),
    }
}
