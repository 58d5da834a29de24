//! Tile sources and network reachability.
//!
//! The fetcher talks to the outside world through two narrow traits:
//!
//! - [`TileSource`] turns a [`TileId`] into image bytes
//! - [`Reachability`] answers whether the network is usable right now
//!
//! With the `download` feature, [`HttpTileSource`] fetches tiles from an XYZ
//! tile server and [`HttpProbe`] checks connectivity with a HEAD request.
//!
//! # URL Template Placeholders
//!
//! - `{z}` - Zoom level
//! - `{x}` - Column
//! - `{y}` - Row
//! - `{s}` - Subdomain, rotated over the configured list (optional)
//!
//! Example: `https://{s}.tile.example.org/{z}/{x}/{y}.png`

#[cfg(feature = "download")]
use reqwest::blocking::Client;

use crate::error::{Result, TileCacheError};
use crate::tile::TileId;

/// Default timeout for HTTP requests in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Timeout for reachability probes in seconds.
pub const PROBE_TIMEOUT_SECS: u64 = 5;

/// Client identifier sent with every tile request.
pub const DEFAULT_USER_AGENT: &str = concat!(
    "tilecache/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com/pedrosanzmtz/tilecache)"
);

/// Something that can produce the bytes of a tile.
pub trait TileSource: Send + Sync {
    /// Fetch a tile.
    ///
    /// # Errors
    ///
    /// Any failure (transport error, non-2xx status, timeout, unusable body)
    /// is reported as [`TileCacheError::FetchFailed`].
    fn fetch_tile(&self, tile: TileId) -> Result<Vec<u8>>;
}

/// Network connectivity check.
pub trait Reachability: Send + Sync {
    fn is_connected(&self) -> bool;
}

/// Reachability that always reports a working network.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl Reachability for AlwaysOnline {
    fn is_connected(&self) -> bool {
        true
    }
}

/// Reachability that always reports no network; serves from cache only.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOffline;

impl Reachability for AlwaysOffline {
    fn is_connected(&self) -> bool {
        false
    }
}

/// Configuration for an HTTP tile source.
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    /// URL template with `{z}`, `{x}`, `{y}` and optionally `{s}`.
    pub url_template: String,
    /// Value of the `User-Agent` header.
    pub user_agent: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Subdomains substituted for `{s}`.
    pub subdomains: Vec<String>,
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            url_template: String::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            subdomains: vec!["a".to_string(), "b".to_string(), "c".to_string()],
        }
    }
}

impl HttpSourceConfig {
    /// Create a configuration for the given URL template.
    ///
    /// # Example
    ///
    /// ```
    /// use tilecache::source::HttpSourceConfig;
    ///
    /// let config = HttpSourceConfig::with_url_template(
    ///     "https://tile.example.org/{z}/{x}/{y}.png",
    /// )
    /// .with_timeout(10);
    /// assert!(config.validate().is_ok());
    /// ```
    pub fn with_url_template(url_template: impl Into<String>) -> Self {
        Self {
            url_template: url_template.into(),
            ..Default::default()
        }
    }

    /// Set the `User-Agent` header value.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Set the subdomains used for `{s}`.
    pub fn with_subdomains<I, S>(mut self, subdomains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subdomains = subdomains.into_iter().map(Into::into).collect();
        self
    }

    /// Check that the configuration can produce tile URLs.
    pub fn validate(&self) -> Result<()> {
        if self.url_template.is_empty() {
            return Err(TileCacheError::InvalidConfig(
                "No tile URL template configured".to_string(),
            ));
        }

        for placeholder in ["{z}", "{x}", "{y}"] {
            if !self.url_template.contains(placeholder) {
                return Err(TileCacheError::InvalidConfig(format!(
                    "URL template '{}' is missing the {} placeholder",
                    self.url_template, placeholder
                )));
            }
        }

        if self.url_template.contains("{s}") && self.subdomains.is_empty() {
            return Err(TileCacheError::InvalidConfig(
                "URL template uses {s} but no subdomains are configured".to_string(),
            ));
        }

        if self.user_agent.trim().is_empty() {
            return Err(TileCacheError::InvalidConfig(
                "User agent must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Build the request URL for a tile.
    pub fn build_url(&self, tile: TileId) -> String {
        let url = tile.fill_template(&self.url_template);

        if self.subdomains.is_empty() {
            return url;
        }
        let index = (tile.x as usize + tile.y as usize) % self.subdomains.len();
        url.replace("{s}", &self.subdomains[index])
    }
}

/// Tile source backed by an XYZ tile server.
#[cfg(feature = "download")]
pub struct HttpTileSource {
    client: Client,
    config: HttpSourceConfig,
}

#[cfg(feature = "download")]
impl HttpTileSource {
    /// Create a source with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TileCacheError::InvalidConfig`] for an unusable template and
    /// if the HTTP client cannot be created.
    pub fn new(config: HttpSourceConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| {
                TileCacheError::InvalidConfig(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpSourceConfig {
        &self.config
    }
}

#[cfg(feature = "download")]
impl TileSource for HttpTileSource {
    fn fetch_tile(&self, tile: TileId) -> Result<Vec<u8>> {
        let url = self.config.build_url(tile);
        let failed = |reason: String| TileCacheError::FetchFailed { tile, reason };

        tracing::debug!(tile = %tile, url = %url, "Requesting tile");

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(failed(format!("HTTP {}", response.status())));
        }

        let bytes = response.bytes().map_err(|e| failed(e.to_string()))?;
        if bytes.is_empty() {
            return Err(failed("Empty response body".to_string()));
        }

        Ok(bytes.to_vec())
    }
}

/// Reachability check that sends a HEAD request to a fixed URL.
///
/// Any HTTP response, whatever its status, counts as connected.
#[cfg(feature = "download")]
pub struct HttpProbe {
    client: Client,
    url: String,
}

#[cfg(feature = "download")]
impl HttpProbe {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(PROBE_TIMEOUT_SECS))
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|e| {
                TileCacheError::InvalidConfig(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[cfg(feature = "download")]
impl Reachability for HttpProbe {
    fn is_connected(&self) -> bool {
        match self.client.head(&self.url).send() {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(url = %self.url, error = %e, "Reachability probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url() {
        let config = HttpSourceConfig::with_url_template("https://tile.example.org/{z}/{x}/{y}.png");
        let url = config.build_url(TileId {
            zoom: 12,
            x: 2200,
            y: 1343,
        });
        assert_eq!(url, "https://tile.example.org/12/2200/1343.png");
    }

    #[test]
    fn test_build_url_rotates_subdomains() {
        let config = HttpSourceConfig::with_url_template("https://{s}.example.org/{z}/{x}/{y}.png");

        let url = config.build_url(TileId { zoom: 2, x: 0, y: 0 });
        assert_eq!(url, "https://a.example.org/2/0/0.png");
        let url = config.build_url(TileId { zoom: 2, x: 1, y: 0 });
        assert_eq!(url, "https://b.example.org/2/1/0.png");
        let url = config.build_url(TileId { zoom: 2, x: 1, y: 1 });
        assert_eq!(url, "https://c.example.org/2/1/1.png");
        let url = config.build_url(TileId { zoom: 2, x: 3, y: 0 });
        assert_eq!(url, "https://a.example.org/2/3/0.png");
    }

    #[test]
    fn test_validate() {
        assert!(HttpSourceConfig::default().validate().is_err());
        assert!(HttpSourceConfig::with_url_template("https://example.org/{z}/{x}.png")
            .validate()
            .is_err());
        assert!(
            HttpSourceConfig::with_url_template("https://{s}.example.org/{z}/{x}/{y}.png")
                .with_subdomains(Vec::<String>::new())
                .validate()
                .is_err()
        );
        assert!(
            HttpSourceConfig::with_url_template("https://example.org/{z}/{x}/{y}.png")
                .with_user_agent(" ")
                .validate()
                .is_err()
        );
        assert!(
            HttpSourceConfig::with_url_template("https://example.org/{z}/{x}/{y}.png")
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_config_builder() {
        let config = HttpSourceConfig::with_url_template("https://example.org/{z}/{x}/{y}.png")
            .with_timeout(10)
            .with_user_agent("navigator/2.1")
            .with_subdomains(["t1", "t2"]);

        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.user_agent, "navigator/2.1");
        assert_eq!(config.subdomains, vec!["t1", "t2"]);
    }

    #[test]
    fn test_default_user_agent_identifies_client() {
        assert!(DEFAULT_USER_AGENT.starts_with("tilecache/"));
        assert_eq!(HttpSourceConfig::default().user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_fixed_reachability() {
        assert!(AlwaysOnline.is_connected());
        assert!(!AlwaysOffline.is_connected());
    }

    #[cfg(feature = "download")]
    #[test]
    fn test_http_source_rejects_bad_template() {
        let result = HttpTileSource::new(HttpSourceConfig::with_url_template("https://example.org"));
        assert!(matches!(result, Err(TileCacheError::InvalidConfig(_))));
    }

    #[cfg(feature = "download")]
    #[test]
    fn test_http_source_connection_refused_is_fetch_failed() {
        // Port 9 (discard) is closed on loopback in test environments
        let source = HttpTileSource::new(
            HttpSourceConfig::with_url_template("http://127.0.0.1:9/{z}/{x}/{y}.png").with_timeout(2),
        )
        .unwrap();

        let result = source.fetch_tile(TileId { zoom: 0, x: 0, y: 0 });
        assert!(matches!(result, Err(TileCacheError::FetchFailed { .. })));
    }
}
