//! icecast2_collector library
//!
//! This lib polls the admin interface of an Icecast 2 server and turns its
//! statistics into metric records. Each poll cycle produces one
//! `icecast_server` record, one `icecast_source` record per mount and,
//! optionally, one `icecast_listener` record per connected listener, tagged
//! with the listener's location when a GeoIP2 City database is configured.
//!
//! # Example
//!
//! ```no_run
//! use icecast2_collector::{
//!     Collector,
//!     Config,
//!     Metric,
//! };
//!
//! # async fn run() -> Result<(), icecast2_collector::CollectorError> {
//! let mut collector = Collector::new(Config::default()).await?;
//!
//! let mut metrics: Vec<Metric> = Vec::new();
//! collector.gather(&mut metrics).await?;
//! # Ok(())
//! # }
//! ```
#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod collector;
pub mod config;
pub mod errors;
pub mod fetch;
pub mod geoip;
pub mod metrics;
pub mod observer;
pub mod output;
pub mod schema;

pub use collector::Collector;
pub use config::Config;
pub use errors::{
    CollectorError,
    ConfigError,
    FetchError,
    GeoError,
    ParseError,
};
pub use metrics::{
    Accumulator,
    FieldValue,
    Metric,
};
pub use observer::{
    NoopObserver,
    Observer,
    TracingObserver,
};
