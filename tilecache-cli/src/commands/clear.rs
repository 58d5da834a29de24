use anyhow::Result;

use super::{format_size, ServiceSettings};

pub fn run(settings: &ServiceSettings) -> Result<()> {
    let service = settings.build()?;
    let stats = service.cache_stats();

    if !service.clear_cache() {
        anyhow::bail!(
            "Failed to clear tile cache at {}",
            service.cache_dir().display()
        );
    }

    println!(
        "Removed {} tiles ({}) from {}",
        stats.disk_tiles,
        format_size(stats.disk_bytes),
        service.cache_dir().display()
    );

    Ok(())
}
