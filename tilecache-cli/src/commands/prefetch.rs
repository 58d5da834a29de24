use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tilecache::PrefetchJob;

use super::ServiceSettings;
use crate::RegionArgs;

#[derive(Serialize)]
struct PrefetchResponse {
    requested: usize,
    attempted: usize,
    succeeded: usize,
    failed: usize,
    already_fresh: usize,
    downloaded: usize,
    uncached: usize,
    stale: usize,
    elapsed_ms: u64,
    failed_tiles: Vec<String>,
}

pub fn run(settings: &ServiceSettings, args: &RegionArgs, json: bool) -> Result<()> {
    let region = args.region()?;
    let job = PrefetchJob::new(region, args.min_zoom, args.max_zoom)
        .context("Invalid prefetch request")?;
    let service = settings.build()?;

    if !service.has_network_source() {
        eprintln!("No tile URL template configured; only cached tiles will be counted");
    }

    let pb = if json {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(0)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )?
            .progress_chars("#>-"),
    );

    let report = service.prefetch_with_progress(&job, |completed, total| {
        pb.set_length(total as u64);
        pb.set_position(completed as u64);
    });
    pb.finish_and_clear();
    let report = report.with_context(|| {
        format!("Failed to prefetch into {}", service.cache_dir().display())
    })?;

    if json {
        let response = PrefetchResponse {
            requested: report.requested,
            attempted: report.attempted,
            succeeded: report.succeeded,
            failed: report.failed,
            already_fresh: report.already_fresh,
            downloaded: report.downloaded,
            uncached: report.uncached,
            stale: report.stale,
            elapsed_ms: report.elapsed_ms,
            failed_tiles: report.failed_tiles.iter().map(|t| t.to_string()).collect(),
        };
        println!("{}", serde_json::to_string(&response)?);
        return Ok(());
    }

    println!("Prefetch complete in {} ms", report.elapsed_ms);
    println!("  Tiles in region: {}", report.requested);
    if report.truncated() {
        println!("  Attempted: {} (capped)", report.attempted);
    } else {
        println!("  Attempted: {}", report.attempted);
    }
    println!("  Downloaded: {}", report.downloaded);
    println!("  Already fresh: {}", report.already_fresh);
    if report.uncached > 0 {
        println!("  Downloaded but not cached: {}", report.uncached);
    }
    if report.stale > 0 {
        println!("  Stale copies kept: {}", report.stale);
    }
    if report.failed > 0 {
        println!("  Failed: {}", report.failed);
        for tile in &report.failed_tiles {
            println!("    {}", tile);
        }
    }

    Ok(())
}
