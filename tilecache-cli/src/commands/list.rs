use anyhow::Result;
use std::time::Duration;

use super::{format_size, ServiceSettings};

pub fn run(settings: &ServiceSettings) -> Result<()> {
    let service = settings.build()?;
    let store = service.store();
    let tiles = store.list_tiles();

    if tiles.is_empty() {
        println!("No cached tiles in: {}", service.cache_dir().display());
        return Ok(());
    }

    let mut fresh_count = 0;
    let mut stale_count = 0;
    let mut total_size: u64 = 0;

    println!("{:<20} {:>12} {:>8} {:>12}", "TILE", "AGE", "STATUS", "SIZE");
    println!("{}", "-".repeat(55));

    for tile in &tiles {
        let size = std::fs::metadata(store.path_for(*tile))
            .map(|m| m.len())
            .unwrap_or(0);
        total_size += size;

        let age = store
            .age(*tile)
            .map(format_age)
            .unwrap_or_else(|_| "?".to_string());

        let status = if store.is_fresh(*tile) {
            fresh_count += 1;
            "fresh"
        } else {
            stale_count += 1;
            "stale"
        };

        println!(
            "{:<20} {:>12} {:>8} {:>12}",
            tile.to_string(),
            age,
            status,
            format_size(size)
        );
    }

    println!();
    println!("Summary:");
    println!("  Total tiles: {}", tiles.len());
    println!("  Fresh: {}", fresh_count);
    println!("  Stale: {}", stale_count);
    println!("  Total size: {}", format_size(total_size));
    println!("  Cache directory: {}", service.cache_dir().display());

    Ok(())
}

fn format_age(age: Duration) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;

    let secs = age.as_secs();
    if secs >= DAY {
        format!("{}d {}h", secs / DAY, (secs % DAY) / HOUR)
    } else if secs >= HOUR {
        format!("{}h {}m", secs / HOUR, (secs % HOUR) / MINUTE)
    } else if secs >= MINUTE {
        format!("{}m", secs / MINUTE)
    } else {
        format!("{}s", secs)
    }
}
