use anyhow::{Context, Result};
use std::path::PathBuf;
use tilecache::{TileService, TileServiceBuilder};

pub mod clear;
pub mod get;
pub mod info;
pub mod list;
pub mod prefetch;
pub mod region;

/// Global options shared by every command that opens the cache.
pub struct ServiceSettings {
    pub cache_dir: Option<PathBuf>,
    pub url_template: Option<String>,
    pub offline: bool,
}

impl ServiceSettings {
    /// Build the tile service.
    ///
    /// Library settings from the environment (user agent, timeout, freshness)
    /// apply; command-line values override them.
    pub fn build(&self) -> Result<TileService> {
        let mut builder = match (&self.cache_dir, TileServiceBuilder::from_env()) {
            (Some(dir), Ok(builder)) => builder.cache_dir(dir),
            (Some(dir), Err(_)) => TileServiceBuilder::new(dir),
            (None, result) => result.context(
                "TILECACHE_DIR environment variable not set. Use --cache-dir or set TILECACHE_DIR",
            )?,
        };

        if let Some(template) = &self.url_template {
            builder = builder.url_template(template.clone());
        }

        builder
            .offline(self.offline)
            .build()
            .context("Failed to create tile service")
    }
}

pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
