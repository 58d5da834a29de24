//! tilecache Service - HTTP microservice for offline-tolerant map tiles.
//!
//! Serves XYZ raster tiles from a local cache, refreshing them from an
//! upstream tile server when they go stale.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `TILECACHE_DIR` | Cache directory | `./tile-cache` |
//! | `TILECACHE_URL_TEMPLATE` | Upstream URL template with `{z}`, `{x}`, `{y}` | None (cache only) |
//! | `TILECACHE_USER_AGENT` | `User-Agent` sent upstream | `tilecache/<version>` |
//! | `TILECACHE_TIMEOUT_SECS` | Upstream request timeout | 30 |
//! | `TILECACHE_FRESHNESS_HOURS` | Age after which tiles are refreshed | 168 |
//! | `TILECACHE_MEMORY_CACHE_MB` | In-memory cache budget | 32 |
//! | `TILECACHE_PROBE_URL` | URL probed to detect connectivity | None |
//! | `TILECACHE_PORT` | HTTP server port | 8080 |
//! | `TILECACHE_PREFETCH` | Regions to warm at startup, see below | None |
//! | `RUST_LOG` | Log level (e.g., "info", "debug") | "info" |
//!
//! `TILECACHE_PREFETCH` takes `lat,lon,lat_span,lon_span,min_zoom,max_zoom`,
//! several regions separated by `;`.
//!
//! ## Endpoints
//!
//! - `GET /tiles/{z}/{x}/{y}` - Tile image
//! - `GET /region?lat=..&lon=..&lat_span=..&lon_span=..&min_zoom=..&max_zoom=..` - Tiles of a region
//! - `POST /prefetch` - Download the tiles of a region
//! - `DELETE /cache` - Clear the cache
//! - `GET /health` - Health check
//! - `GET /stats` - Cache statistics
//! - `GET /docs` - OpenAPI documentation (Swagger UI)

use std::net::SocketAddr;
use std::sync::Arc;

use tilecache::TileServiceBuilder;
use tilecache_service::{parse_prefetch_jobs, router, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Directory used when `TILECACHE_DIR` is not set.
const FALLBACK_CACHE_DIR: &str = "./tile-cache";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tilecache_service=info,tilecache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load port from environment (service-specific config)
    let port: u16 = std::env::var("TILECACHE_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    // The blocking HTTP client must be created and dropped outside the async runtime
    let tile_service = match TileServiceBuilder::from_env() {
        Ok(builder) => builder.build()?,
        Err(_) => {
            tracing::warn!("TILECACHE_DIR not set, using {}", FALLBACK_CACHE_DIR);
            TileServiceBuilder::new(FALLBACK_CACHE_DIR).build()?
        }
    };

    tracing::info!(
        cache_dir = %tile_service.cache_dir().display(),
        network = tile_service.has_network_source(),
        port = port,
        "Starting tilecache service"
    );

    if let Ok(value) = std::env::var("TILECACHE_PREFETCH") {
        for job in parse_prefetch_jobs(&value) {
            tracing::info!(
                lat = job.region.center.latitude,
                lon = job.region.center.longitude,
                min_zoom = job.min_zoom,
                max_zoom = job.max_zoom,
                "Prefetching region"
            );
            match tile_service.prefetch_report(&job) {
                Ok(report) => tracing::info!(
                    attempted = report.attempted,
                    downloaded = report.downloaded,
                    already_fresh = report.already_fresh,
                    failed = report.failed,
                    uncached = report.uncached,
                    elapsed_ms = report.elapsed_ms,
                    "Startup prefetch complete"
                ),
                Err(e) => tracing::error!(error = %e, "Startup prefetch failed"),
            }
        }
    }

    let state = Arc::new(AppState { tile_service });

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(serve(state.clone(), port))
}

async fn serve(state: Arc<AppState>, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
