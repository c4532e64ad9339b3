//! Error types returned by the collector and its components.
#![forbid(unsafe_code)]
#![deny(missing_docs)]
use reqwest::StatusCode;
use std::net::IpAddr;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

/// Errors raised while building or validating the configuration. These are
/// only ever returned during initialisation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Returned when the configured base URL cannot be parsed as an absolute
    /// URL.
    #[error("url '{url}' is not a valid absolute URL")]
    InvalidUrl {
        /// The offending URL as configured.
        url:    String,
        /// The underlying parse failure.
        #[source]
        source: url::ParseError,
    },

    /// Returned when the base URL is absolute but cannot be used to resolve
    /// the admin endpoints.
    #[error("url '{0}' cannot be used as a base URL")]
    NotABase(String),

    /// Returned when the base URL uses a scheme other than http or https.
    #[error("url scheme '{0}' is not supported, use http or https")]
    UnsupportedScheme(String),

    /// Returned when the response timeout is zero.
    #[error("response_timeout must be greater than zero")]
    ZeroTimeout,

    /// Returned at initialisation when the configured geolocation database
    /// cannot be read or opened.
    #[error("geoip2_path does not point to a usable database")]
    GeoDatabase(#[source] GeoError),

    /// Returned when the configuration file could not be read.
    #[error("failed to read configuration file")]
    Io(#[from] std::io::Error),

    /// Returned when the configuration file is not valid YAML or contains
    /// unknown keys.
    #[error("failed to parse configuration file")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors raised while fetching a document from the Icecast admin interface.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Returned when the HTTP client could not be constructed.
    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    /// Returned when a relative path cannot be resolved against the base
    /// URL.
    #[error("failed to resolve '{path}' against the base URL")]
    InvalidPath {
        /// The relative path that failed to resolve.
        path:   String,
        /// The underlying parse failure.
        #[source]
        source: url::ParseError,
    },

    /// Returned when the server answers with a non 2xx status.
    #[error("request to {url} failed with status {status}")]
    UpstreamStatus {
        /// The URL that was requested.
        url:    Url,
        /// The HTTP status returned by the server.
        status: StatusCode,
    },

    /// Returned on connection failures, timeouts and body read failures.
    #[error("request to {url} failed")]
    Unreachable {
        /// The URL that was requested.
        url:    Url,
        /// The underlying transport failure.
        #[source]
        source: reqwest::Error,
    },
}

/// Errors raised while parsing an Icecast XML document.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Returned when the document is not well formed XML.
    #[error("malformed XML document")]
    Xml(#[from] quick_xml::Error),

    /// Returned when the document contains no root element at all.
    #[error("XML document has no root element")]
    MissingRoot,

    /// Returned when the root element is not the one we expect.
    #[error("unexpected root element <{found}>, expected <{expected}>")]
    UnexpectedRoot {
        /// The root element we were looking for.
        expected: &'static str,
        /// The root element that was found.
        found:    String,
    },

    /// Returned when the document structure does not match the expected
    /// shape, eg. a counter that isn't a number.
    #[error("XML document does not match the expected structure")]
    Document(#[from] quick_xml::DeError),
}

/// Errors raised by the geolocation resolver.
#[derive(Debug, Error)]
pub enum GeoError {
    /// Returned when the database file cannot be inspected.
    #[error("failed to stat geolocation database {}", path.display())]
    Stat {
        /// Path to the database file.
        path:   PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Returned when the database file cannot be opened or is not a valid
    /// database.
    #[error("failed to open geolocation database {}", path.display())]
    Open {
        /// Path to the database file.
        path:   PathBuf,
        /// The underlying database failure.
        #[source]
        source: maxminddb::MaxMindDBError,
    },

    /// Returned when a lookup is attempted without an open database.
    #[error("geolocation database is not open")]
    NotOpen,

    /// Returned when a listener IP address cannot be parsed.
    #[error("'{0}' is not a valid IP address")]
    InvalidAddress(String),

    /// Returned when the database holds no record for an address.
    #[error("no geolocation record for {0}")]
    NotFound(IpAddr),

    /// Returned when the database lookup itself fails.
    #[error("geolocation lookup for {ip} failed")]
    Lookup {
        /// The address that was looked up.
        ip:     IpAddr,
        /// The underlying database failure.
        #[source]
        source: maxminddb::MaxMindDBError,
    },
}

/// Top level error returned by `Collector::init` and `Collector::gather`.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Configuration was invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A request to the Icecast server failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A response from the Icecast server could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The geolocation database could not be opened or queried.
    #[error(transparent)]
    Geo(#[from] GeoError),

    /// Writing gathered metrics failed.
    #[error("failed to write metrics")]
    Output(#[from] std::io::Error),
}
