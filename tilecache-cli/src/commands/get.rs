use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;

use super::ServiceSettings;

#[derive(Serialize)]
struct TileResponse {
    zoom: u8,
    x: u32,
    y: u32,
    bytes: usize,
    origin: &'static str,
    cache_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<PathBuf>,
}

pub fn run(
    settings: &ServiceSettings,
    z: u8,
    x: u32,
    y: u32,
    output: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let service = settings.build()?;

    let fetched = service
        .get_tile_with_origin(z, x, y)
        .with_context(|| format!("Failed to get tile {}/{}/{}", z, x, y))?;

    if let Some(path) = &output {
        std::fs::write(path, &fetched.bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    if json {
        let response = TileResponse {
            zoom: z,
            x,
            y,
            bytes: fetched.bytes.len(),
            origin: fetched.origin.as_str(),
            cache_path: service.store().path_for(fetched.tile),
            output,
        };
        println!("{}", serde_json::to_string(&response)?);
    } else {
        println!(
            "{}: {} bytes ({})",
            fetched.tile,
            fetched.bytes.len(),
            fetched.origin.as_str()
        );
        match output {
            Some(path) => println!("Written to {}", path.display()),
            None => println!(
                "Cached at {}",
                service.store().path_for(fetched.tile).display()
            ),
        }
    }

    Ok(())
}
