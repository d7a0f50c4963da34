use std::env;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;

use crate::declarations;
use crate::error::SourceError;
use crate::gazetteer::{self, GeoReference};
use crate::types::RawDeclaration;

pub const DECLARATIONS_URL: &str = "https://www.fema.gov/api/open/v2/DisasterDeclarationsSummaries";
pub const GAZETTEER_URL: &str = "https://www2.census.gov/geo/docs/maps-data/data/gazetteer/2019_Gazetteer/2019_Gaz_zcta_national.zip";
pub const DEFAULT_WINDOW_DAYS: i64 = 30;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Configuration for DisasterClient
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// OpenFEMA declarations endpoint
    pub declarations_url: String,
    /// Zipped ZCTA gazetteer
    pub gazetteer_url: String,
    /// How far back to request declarations
    pub window_days: i64,
    /// How long a successful fetch is reused
    pub cache_ttl: Duration,
    /// Request timeout; `None` leaves the transport default (no timeout)
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            declarations_url: DECLARATIONS_URL.to_string(),
            gazetteer_url: GAZETTEER_URL.to_string(),
            window_days: DEFAULT_WINDOW_DAYS,
            cache_ttl: DEFAULT_CACHE_TTL,
            timeout: None,
        }
    }
}

impl ClientConfig {
    /// Read overrides from the environment, falling back to defaults for
    /// anything missing or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            declarations_url: env::var("DECLARATIONS_URL").unwrap_or(defaults.declarations_url),
            gazetteer_url: env::var("GAZETTEER_URL").unwrap_or(defaults.gazetteer_url),
            window_days: env::var("WINDOW_DAYS")
                .ok()
                .and_then(|d| d.parse().ok())
                .filter(|d: &i64| *d > 0)
                .unwrap_or(defaults.window_days),
            cache_ttl: env::var("CACHE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            timeout: env::var("HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs),
        }
    }
}

/// HTTP access to both upstream sources. Each call is a single attempt.
#[derive(Debug, Clone)]
pub struct DisasterClient {
    http_client: Client,
    config: ClientConfig,
}

impl DisasterClient {
    pub fn new() -> Result<Self, SourceError> {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Result<Self, SourceError> {
        let mut builder = Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| SourceError::unavailable("HTTP client", e))?;

        Ok(Self {
            http_client,
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Declarations issued within the last `window_days` before `now`.
    pub async fn fetch_recent_declarations(
        &self,
        window_days: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<RawDeclaration>, SourceError> {
        declarations::fetch_recent(
            &self.http_client,
            &self.config.declarations_url,
            window_days,
            now,
        )
        .await
    }

    /// Download and index the ZCTA gazetteer.
    pub async fn load_reference(&self) -> Result<GeoReference, SourceError> {
        gazetteer::load(&self.http_client, &self.config.gazetteer_url).await
    }
}
