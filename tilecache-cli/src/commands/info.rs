use anyhow::Result;

use super::{format_size, ServiceSettings};

pub fn run(settings: &ServiceSettings) -> Result<()> {
    let service = settings.build()?;
    let stats = service.cache_stats();
    let freshness_hours = service.store().freshness().as_secs() / 3600;

    println!("Cache Information");
    println!("{}", "=".repeat(40));
    println!();
    println!("Directory:        {}", service.cache_dir().display());
    println!("Tiles on disk:    {}", stats.disk_tiles);
    println!("Disk usage:       {}", format_size(stats.disk_bytes));
    println!("Freshness window: {} hours", freshness_hours);
    println!(
        "Network:          {}",
        if settings.offline {
            "disabled (--offline)"
        } else if service.has_network_source() {
            "enabled"
        } else {
            "no tile URL template configured"
        }
    );

    let tiles = service.cached_tiles();
    if !tiles.is_empty() {
        let stale = tiles
            .iter()
            .filter(|tile| !service.store().is_fresh(**tile))
            .count();
        println!("Stale tiles:      {}", stale);

        let mut zooms: Vec<u8> = tiles.iter().map(|t| t.zoom).collect();
        zooms.dedup();
        println!(
            "Zoom levels:      {}",
            zooms
                .iter()
                .map(|z| z.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    Ok(())
}
