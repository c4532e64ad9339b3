//! Collector configuration, loaded from YAML.
#![forbid(unsafe_code)]
#![deny(missing_docs)]
use crate::errors::ConfigError;
use serde::{
    Deserialize,
    Deserializer,
};
use std::fs::File;
use std::io::BufReader;
use std::path::{
    Path,
    PathBuf,
};
use std::time::Duration;
use tracing::debug;
use url::Url;

const DEFAULT_URL: &str              = "http://localhost:8000/admin/";
const DEFAULT_USERNAME: &str         = "admin";
const DEFAULT_PASSWORD: &str         = "hackme";
const DEFAULT_RESPONSE_TIMEOUT: u64  = 5;
const DEFAULT_GEOIP2_LANGUAGE: &str  = "en";

/// Configuration consumed by the `Collector` at construction.
///
/// Every field has a default, so an empty YAML document is a valid
/// configuration pointing at a local Icecast with its stock credentials.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Base URL of the Icecast admin interface, eg.
    /// `http://localhost:8000/admin/`. Endpoints are resolved relative to
    /// it, so it should normally end with a `/`.
    pub url: String,

    /// Username for HTTP basic authentication.
    pub username: String,

    /// Password for HTTP basic authentication.
    pub password: String,

    /// Deadline applied to each request, covering connect and body read.
    #[serde(deserialize_with = "deserialize_duration")]
    pub response_timeout: Duration,

    /// Whether to query the listener list of every mount.
    pub gather_listeners: bool,

    /// Path to a GeoIP2/GeoLite2 City database. Unset or empty disables
    /// geolocation of listeners.
    pub geoip2_path: Option<PathBuf>,

    /// Language used to pick localized continent, country and city names.
    /// Empty disables name tags.
    pub geoip2_language: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url:              DEFAULT_URL.into(),
            username:         DEFAULT_USERNAME.into(),
            password:         DEFAULT_PASSWORD.into(),
            response_timeout: Duration::from_secs(DEFAULT_RESPONSE_TIMEOUT),
            gather_listeners: true,
            geoip2_path:      None,
            geoip2_language:  DEFAULT_GEOIP2_LANGUAGE.into(),
        }
    }
}

impl Config {
    /// Loads a YAML config from the given path.
    pub fn from_yaml(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading configuration from: {}", path.display());

        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: Self = serde_yaml::from_reader(reader)?;

        config.validate()?;

        Ok(config)
    }

    /// Validates the configuration, returning the parsed base URL.
    pub fn validate(&self) -> Result<Url, ConfigError> {
        if self.response_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }

        self.base_url()
    }

    /// Parses and checks the base URL.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        debug!("Ensuring that url is valid");

        let url = Url::parse(&self.url).map_err(|source| {
            ConfigError::InvalidUrl {
                url: self.url.clone(),
                source,
            }
        })?;

        match url.scheme() {
            "http" | "https" => {},
            scheme           => {
                return Err(ConfigError::UnsupportedScheme(scheme.into()));
            },
        }

        if url.cannot_be_a_base() {
            return Err(ConfigError::NotABase(self.url.clone()));
        }

        Ok(url)
    }

    /// Returns the geolocation database path, if geolocation is enabled.
    pub fn geoip2_path(&self) -> Option<&Path> {
        self.geoip2_path
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }

    /// Returns the language for localized geolocation names, if enabled.
    pub fn geoip2_language(&self) -> Option<&str> {
        match self.geoip2_language.as_str() {
            ""       => None,
            language => Some(language),
        }
    }
}

// Durations are given as humantime strings, eg. "5s" or "1m 30s".
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where D: Deserializer<'de> {
    let s = String::deserialize(deserializer)?;

    humantime::parse_duration(&s).map_err(serde::de::Error::custom)
}
