//! HTTP request handlers for the tile service.
//!
//! Every call into the tile cache blocks on disk or network I/O, so handlers
//! run it on the blocking thread pool.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tilecache::{
    coords::tile_count_for_region, GeoPoint, PrefetchJob, Region, TileCacheError, TileId,
};
use utoipa::{IntoParams, ToSchema};

use crate::AppState;

/// Largest tile list returned by the region endpoint.
pub const REGION_LIST_LIMIT: u64 = 10_000;

/// Header naming the cache tier that served a tile.
pub const TILE_ORIGIN_HEADER: &str = "x-tile-origin";

/// A region and zoom range, used by the region and prefetch endpoints.
#[derive(Debug, Clone, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RegionQuery {
    /// Latitude of the region center in decimal degrees.
    pub lat: f64,
    /// Longitude of the region center in decimal degrees.
    pub lon: f64,
    /// North-south extent in degrees.
    pub lat_span: f64,
    /// East-west extent in degrees.
    pub lon_span: f64,
    /// Lowest zoom level.
    pub min_zoom: u8,
    /// Highest zoom level (at most 22).
    pub max_zoom: u8,
}

impl RegionQuery {
    fn job(&self) -> Result<PrefetchJob, Response> {
        let region = Region::new(GeoPoint::new(self.lat, self.lon), self.lat_span, self.lon_span);
        PrefetchJob::new(region, self.min_zoom, self.max_zoom).map_err(error_response)
    }
}

/// A tile address.
#[derive(Debug, Serialize, ToSchema)]
pub struct TileEntry {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl From<TileId> for TileEntry {
    fn from(tile: TileId) -> Self {
        Self {
            zoom: tile.zoom,
            x: tile.x,
            y: tile.y,
        }
    }
}

/// Tiles covering a region.
#[derive(Debug, Serialize, ToSchema)]
pub struct RegionResponse {
    /// Number of tiles.
    pub count: usize,
    /// Tiles ordered by zoom, then column, then row.
    pub tiles: Vec<TileEntry>,
}

/// Outcome of a prefetch.
#[derive(Debug, Serialize, ToSchema)]
pub struct PrefetchResponse {
    /// Tiles covering the region before the cap.
    pub requested: usize,
    /// Tiles a fetch was attempted for (at most 200).
    pub attempted: usize,
    /// Tiles in the cache after the prefetch.
    pub succeeded: usize,
    /// Tiles that could not be obtained.
    pub failed: usize,
    /// Tiles that were already fresh.
    pub already_fresh: usize,
    /// Tiles downloaded and cached.
    pub downloaded: usize,
    /// Tiles downloaded but not written to the cache.
    pub uncached: usize,
    /// Tiles only available as a stale copy.
    pub stale: usize,
    /// Total elapsed time in milliseconds.
    pub elapsed_ms: u64,
    /// Failed tiles as `z/x/y`.
    pub failed_tiles: Vec<String>,
}

/// Result of clearing the cache.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClearResponse {
    pub cleared: bool,
}

/// Error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
}

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
}

/// Cache statistics response.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    /// Tiles on disk.
    pub disk_tiles: u64,
    /// Bytes on disk.
    pub disk_bytes: u64,
    /// Tiles held in memory.
    pub memory_entries: u64,
    /// Reads served from memory.
    pub memory_hits: u64,
    /// Reads that went to disk.
    pub memory_misses: u64,
    /// Memory hit rate (0.0 to 1.0).
    pub hit_rate: f64,
    /// Requests served from a fresh cached copy.
    pub fresh_hits: u64,
    /// Requests served from a stale cached copy.
    pub stale_served: u64,
    /// Requests served by the tile server.
    pub network_fetches: u64,
    /// Requests that failed.
    pub failures: u64,
}

/// Get a tile image.
///
/// The `y` segment may carry a `.png` suffix.
#[utoipa::path(
    get,
    path = "/tiles/{z}/{x}/{y}",
    tag = "tiles",
    params(
        ("z" = u8, Path, description = "Zoom level (0-22)"),
        ("x" = u32, Path, description = "Column"),
        ("y" = String, Path, description = "Row, optionally followed by .png")
    ),
    responses(
        (status = 200, description = "Tile image; X-Tile-Origin names the serving tier", content_type = "image/png"),
        (status = 400, description = "Tile outside the grid", body = ErrorResponse),
        (status = 502, description = "Tile server failed and no cached copy exists", body = ErrorResponse),
        (status = 503, description = "Offline and tile not cached", body = ErrorResponse)
    )
)]
pub async fn get_tile(
    State(state): State<Arc<AppState>>,
    Path((z, x, y)): Path<(u8, u32, String)>,
) -> Response {
    let y: u32 = match y.strip_suffix(".png").unwrap_or(&y).parse() {
        Ok(y) => y,
        Err(_) => return bad_request(&format!("Invalid tile row: {}", y)),
    };

    tracing::debug!(z, x, y, "Tile request");

    let result =
        tokio::task::spawn_blocking(move || state.tile_service.get_tile_with_origin(z, x, y)).await;

    match result {
        Ok(Ok(fetched)) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, HeaderValue::from_static("image/png")),
                (
                    HeaderName::from_static(TILE_ORIGIN_HEADER),
                    HeaderValue::from_static(fetched.origin.as_str()),
                ),
            ],
            fetched.bytes,
        )
            .into_response(),
        Ok(Err(e)) => error_response(e),
        Err(e) => internal_error(e),
    }
}

/// List the tiles covering a region.
#[utoipa::path(
    get,
    path = "/region",
    tag = "tiles",
    params(RegionQuery),
    responses(
        (status = 200, description = "Tiles covering the region", body = RegionResponse),
        (status = 400, description = "Invalid region or zoom range, or too many tiles", body = ErrorResponse)
    )
)]
pub async fn get_region(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RegionQuery>,
) -> Response {
    let job = match query.job() {
        Ok(job) => job,
        Err(response) => return response,
    };

    let count = tile_count_for_region(&job.region, job.min_zoom, job.max_zoom);
    if count > REGION_LIST_LIMIT {
        return bad_request(&format!(
            "Region covers {} tiles, more than the limit of {}",
            count, REGION_LIST_LIMIT
        ));
    }

    let tiles = state
        .tile_service
        .get_tiles_for_region(&job.region, job.min_zoom, job.max_zoom);

    Json(RegionResponse {
        count: tiles.len(),
        tiles: tiles.into_iter().map(TileEntry::from).collect(),
    })
    .into_response()
}

/// Download the tiles of a region into the cache.
///
/// At most 200 tiles are fetched per request. Individual tile failures are
/// reported in the body, never as an error status.
#[utoipa::path(
    post,
    path = "/prefetch",
    tag = "cache",
    request_body = RegionQuery,
    responses(
        (status = 200, description = "Prefetch report", body = PrefetchResponse),
        (status = 400, description = "Invalid region or zoom range", body = ErrorResponse),
        (status = 500, description = "Cache directory unusable", body = ErrorResponse)
    )
)]
pub async fn post_prefetch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegionQuery>,
) -> Response {
    let job = match request.job() {
        Ok(job) => job,
        Err(response) => return response,
    };

    tracing::info!(
        lat = request.lat,
        lon = request.lon,
        min_zoom = job.min_zoom,
        max_zoom = job.max_zoom,
        "Prefetch requested"
    );

    let result = tokio::task::spawn_blocking(move || state.tile_service.prefetch_report(&job)).await;

    match result {
        Ok(Ok(report)) => Json(PrefetchResponse {
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
        })
        .into_response(),
        Ok(Err(e)) => error_response(e),
        Err(e) => internal_error(e),
    }
}

/// Delete every cached tile.
#[utoipa::path(
    delete,
    path = "/cache",
    tag = "cache",
    responses(
        (status = 200, description = "Cache cleared", body = ClearResponse),
        (status = 500, description = "Cache could not be cleared", body = ClearResponse)
    )
)]
pub async fn clear_cache(State(state): State<Arc<AppState>>) -> Response {
    let cleared = tokio::task::spawn_blocking(move || state.tile_service.clear_cache())
        .await
        .unwrap_or(false);

    let status = if cleared {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    (status, Json(ClearResponse { cleared })).into_response()
}

/// Health check endpoint.
///
/// Returns service status and version.
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses((status = 200, description = "Service is healthy", body = HealthResponse))
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Get cache statistics.
#[utoipa::path(
    get,
    path = "/stats",
    tag = "system",
    responses((status = 200, description = "Cache statistics", body = StatsResponse))
)]
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Response {
    let result = tokio::task::spawn_blocking(move || {
        (
            state.tile_service.cache_stats(),
            state.tile_service.fetch_stats(),
        )
    })
    .await;

    match result {
        Ok((cache, fetch)) => Json(StatsResponse {
            disk_tiles: cache.disk_tiles,
            disk_bytes: cache.disk_bytes,
            memory_entries: cache.entry_count,
            memory_hits: cache.hit_count,
            memory_misses: cache.miss_count,
            hit_rate: cache.hit_rate(),
            fresh_hits: fetch.fresh_hits,
            stale_served: fetch.stale_served,
            network_fetches: fetch.network_fetches,
            failures: fetch.failures,
        })
        .into_response(),
        Err(e) => internal_error(e),
    }
}

/// Map a library error to a status code and JSON body.
pub fn error_response(e: TileCacheError) -> Response {
    let status = match &e {
        TileCacheError::InvalidTile { .. }
        | TileCacheError::InvalidRegion { .. }
        | TileCacheError::InvalidZoomRange { .. } => StatusCode::BAD_REQUEST,
        TileCacheError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        TileCacheError::FetchFailed { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    tracing::warn!(error = %e, status = status.as_u16(), "Request failed");

    (status, Json(ErrorResponse { error: e.to_string() })).into_response()
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn internal_error(e: tokio::task::JoinError) -> Response {
    tracing::error!(error = %e, "Blocking task failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "internal error".to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_query_deserialize() {
        let json = r#"{"lat": 40.7, "lon": -74.0, "lat_span": 0.1, "lon_span": 0.2, "min_zoom": 10, "max_zoom": 12}"#;
        let query: RegionQuery = serde_json::from_str(json).unwrap();
        assert_eq!(query.lat, 40.7);
        assert_eq!(query.lon_span, 0.2);
        assert_eq!(query.max_zoom, 12);
        assert!(query.job().is_ok());
    }

    #[test]
    fn test_region_query_rejects_inverted_zoom() {
        let query = RegionQuery {
            lat: 0.0,
            lon: 0.0,
            lat_span: 1.0,
            lon_span: 1.0,
            min_zoom: 5,
            max_zoom: 3,
        };
        let response = query.job().unwrap_err();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_region_query_rejects_negative_span() {
        let query = RegionQuery {
            lat: 0.0,
            lon: 0.0,
            lat_span: -1.0,
            lon_span: 1.0,
            min_zoom: 3,
            max_zoom: 5,
        };
        let response = query.job().unwrap_err();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_status_mapping() {
        let tile = TileId { zoom: 3, x: 1, y: 1 };
        let cases = [
            (
                TileCacheError::InvalidTile { zoom: 1, x: 5, y: 0 },
                StatusCode::BAD_REQUEST,
            ),
            (
                TileCacheError::InvalidRegion {
                    region: Region::new(GeoPoint::new(0.0, 0.0), 0.0, 1.0),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                TileCacheError::Unavailable { tile },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                TileCacheError::FetchFailed {
                    tile,
                    reason: "HTTP 500".to_string(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                TileCacheError::NotFound { tile },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error_response(error).status(), expected);
        }
    }

    #[test]
    fn test_health_response_serialize() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            version: "0.1.0".to_string(),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("0.1.0"));
    }
}
