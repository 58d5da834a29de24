//! Basic example demonstrating tilecache library usage.
//!
//! Serves tiles from an existing cache directory without touching the network.
//!
//! Run with: cargo run --example basic -- /path/to/tile/cache

use std::env;
use tilecache::{point_to_tile, GeoPoint, TileCacheError, TileService};

fn main() -> Result<(), TileCacheError> {
    let cache_dir = env::args().nth(1).unwrap_or_else(|| {
        eprintln!("Usage: cargo run --example basic -- /path/to/tile/cache");
        std::process::exit(1);
    });

    let service = TileService::builder(&cache_dir).build()?;

    let locations = [
        ("Central Park, New York", 40.7829, -73.9654),
        ("Tower Bridge, London", 51.5055, -0.0754),
        ("Shibuya Crossing, Tokyo", 35.6595, 139.7005),
    ];

    println!("Tile lookups at zoom 15 (cache only):");
    println!("{:-<50}", "");

    for (name, lat, lon) in &locations {
        let tile = point_to_tile(GeoPoint::new(*lat, *lon), 15);
        match service.get_tile(tile.zoom, tile.x, tile.y) {
            Ok(bytes) => println!("{} ({}): {} bytes", name, tile, bytes.len()),
            Err(TileCacheError::Unavailable { .. }) => {
                println!("{} ({}): not cached", name, tile)
            }
            Err(e) => println!("{} ({}): error - {}", name, tile, e),
        }
    }

    let stats = service.cache_stats();
    println!("\nCache statistics:");
    println!("  Tiles on disk: {}", stats.disk_tiles);
    println!("  Disk usage: {} bytes", stats.disk_bytes);
    println!("  Memory hit rate: {:.1}%", stats.hit_rate() * 100.0);

    Ok(())
}
