use anyhow::{Context, Result};
use geojson::GeoJson;
use serde::Serialize;
use tilecache::{coords::tile_count_for_region, tiles_for_region, TileId, MAX_TILES, MAX_ZOOM};

use crate::RegionArgs;

/// Refuse to materialize more tiles than this.
const LIST_LIMIT: u64 = 1_000_000;

#[derive(Serialize)]
struct TileEntry {
    zoom: u8,
    x: u32,
    y: u32,
}

impl From<&TileId> for TileEntry {
    fn from(tile: &TileId) -> Self {
        Self {
            zoom: tile.zoom,
            x: tile.x,
            y: tile.y,
        }
    }
}

pub fn run(args: &RegionArgs, json: bool, geojson: bool) -> Result<()> {
    let region = args.region()?;

    if args.max_zoom > MAX_ZOOM {
        anyhow::bail!("Zoom level {} exceeds the maximum of {}", args.max_zoom, MAX_ZOOM);
    }

    let count = tile_count_for_region(&region, args.min_zoom, args.max_zoom);
    if count > LIST_LIMIT {
        anyhow::bail!(
            "Region covers {} tiles, more than {} can be listed. Narrow the region or zoom range",
            count,
            LIST_LIMIT
        );
    }

    let tiles = tiles_for_region(&region, args.min_zoom, args.max_zoom);

    if geojson {
        let collection = tilecache::geojson::tiles_to_feature_collection(&tiles);
        let output = serde_json::to_string_pretty(&GeoJson::from(collection))
            .context("Failed to serialize GeoJSON")?;
        println!("{}", output);
    } else if json {
        let entries: Vec<TileEntry> = tiles.iter().map(TileEntry::from).collect();
        println!("{}", serde_json::to_string(&entries)?);
    } else {
        println!("{:>4} {:>8} {:>8}", "ZOOM", "X", "Y");
        println!("{}", "-".repeat(22));
        for tile in &tiles {
            println!("{:>4} {:>8} {:>8}", tile.zoom, tile.x, tile.y);
        }
        println!();
        println!("Total tiles: {}", tiles.len());
        if tiles.len() > MAX_TILES {
            println!(
                "Note: a prefetch of this region fetches only the first {} tiles",
                MAX_TILES
            );
        }
    }

    Ok(())
}
