//! tilecache Service Library
//!
//! HTTP handlers, router and configuration helpers for the tile cache
//! service. This library is used by both the tilecache-service binary and
//! integration tests.

pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tilecache::{GeoPoint, PrefetchJob, Region, TileService};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Application state shared across handlers.
pub struct AppState {
    /// Tile cache serving all requests.
    pub tile_service: TileService,
}

// Re-export commonly used types for convenience
pub use handlers::{
    ClearResponse, ErrorResponse, HealthResponse, PrefetchResponse, RegionQuery, RegionResponse,
    StatsResponse, TileEntry,
};

/// OpenAPI documentation for the tile service.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "tilecache Tile Service",
        version = "0.1.0",
        description = "Offline-tolerant raster map tile cache with region prefetching.",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT"),
        contact(name = "Pedro Sanz Martinez", url = "https://github.com/pedrosanzmtz/tilecache")
    ),
    paths(
        handlers::get_tile,
        handlers::get_region,
        handlers::post_prefetch,
        handlers::clear_cache,
        handlers::health_check,
        handlers::get_stats,
    ),
    components(
        schemas(
            handlers::RegionQuery,
            handlers::TileEntry,
            handlers::RegionResponse,
            handlers::PrefetchResponse,
            handlers::ClearResponse,
            handlers::ErrorResponse,
            handlers::HealthResponse,
            handlers::StatsResponse,
        )
    ),
    tags(
        (name = "tiles", description = "Tile and region endpoints"),
        (name = "cache", description = "Cache maintenance endpoints"),
        (name = "system", description = "System and health endpoints")
    )
)]
pub struct ApiDoc;

/// Build the application router with documentation, tracing and CORS layers.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/tiles/:z/:x/:y", get(handlers::get_tile))
        .route("/region", get(handlers::get_region))
        .route("/prefetch", post(handlers::post_prefetch))
        .route("/cache", delete(handlers::clear_cache))
        .route("/health", get(handlers::health_check))
        .route("/stats", get(handlers::get_stats))
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}

/// Parse the `TILECACHE_PREFETCH` environment variable value into jobs.
///
/// Format: `lat,lon,lat_span,lon_span,min_zoom,max_zoom`, several jobs
/// separated by `;`. Malformed entries are logged and skipped.
pub fn parse_prefetch_jobs(value: &str) -> Vec<PrefetchJob> {
    value
        .split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let job = parse_prefetch_job(entry);
            if job.is_none() {
                tracing::warn!(
                    entry,
                    "Invalid prefetch entry, expected lat,lon,lat_span,lon_span,min_zoom,max_zoom"
                );
            }
            job
        })
        .collect()
}

fn parse_prefetch_job(entry: &str) -> Option<PrefetchJob> {
    let parts: Vec<&str> = entry.split(',').map(str::trim).collect();
    if parts.len() != 6 {
        return None;
    }

    let lat: f64 = parts[0].parse().ok()?;
    let lon: f64 = parts[1].parse().ok()?;
    let lat_span: f64 = parts[2].parse().ok()?;
    let lon_span: f64 = parts[3].parse().ok()?;
    let min_zoom: u8 = parts[4].parse().ok()?;
    let max_zoom: u8 = parts[5].parse().ok()?;

    let region = Region::new(GeoPoint::new(lat, lon), lat_span, lon_span);
    if !region.is_valid() {
        return None;
    }

    PrefetchJob::new(region, min_zoom, max_zoom).ok()
}
