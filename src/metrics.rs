//! Derives metric records from parsed Icecast documents.
#![forbid(unsafe_code)]
#![deny(missing_docs)]
use crate::errors::GeoError;
use crate::geoip::GeoLookup;
use crate::schema::{
    ClientList,
    ServerStats,
    Source,
};
use chrono::DateTime;
use std::collections::BTreeMap;
use tracing::debug;

/// Measurement name of server wide records.
pub const SERVER_MEASUREMENT: &str   = "icecast_server";

/// Measurement name of per mount records.
pub const SOURCE_MEASUREMENT: &str   = "icecast_source";

/// Measurement name of per listener records.
pub const LISTENER_MEASUREMENT: &str = "icecast_listener";

// Icecast 2.4 writes the offset without a colon, which RFC 3339 rejects.
const ISO8601_BASIC_OFFSET: &str = "%Y-%m-%dT%H:%M:%S%z";

/// A field value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FieldValue {
    /// A signed integer.
    Integer(i64),

    /// A floating point number.
    Float(f64),
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// Field name to value mapping of a record.
pub type Fields = BTreeMap<&'static str, FieldValue>;

/// Tag name to value mapping of a record.
pub type Tags = BTreeMap<&'static str, String>;

/// A single metric record.
#[derive(Clone, Debug, PartialEq)]
pub struct Metric {
    /// Measurement name, one of the `*_MEASUREMENT` constants.
    pub measurement: &'static str,

    /// Numeric values of the record.
    pub fields: Fields,

    /// Indexing and grouping values of the record.
    pub tags: Tags,
}

/// A sink for metric records.
pub trait Accumulator {
    /// Adds one record.
    fn add_fields(&mut self, measurement: &'static str, fields: Fields, tags: Tags);

    /// Adds a record built by one of the derivation functions.
    fn add_metric(&mut self, metric: Metric) {
        self.add_fields(metric.measurement, metric.fields, metric.tags);
    }
}

impl Accumulator for Vec<Metric> {
    fn add_fields(&mut self, measurement: &'static str, fields: Fields, tags: Tags) {
        self.push(Metric {
            measurement,
            fields,
            tags,
        });
    }
}

/// Converts an ISO-8601 timestamp to nanoseconds since the Unix epoch.
///
/// Unparseable timestamps yield 0 rather than an error.
pub fn iso8601_to_nanos(timestamp: &str) -> i64 {
    DateTime::parse_from_rfc3339(timestamp)
        .or_else(|_| DateTime::parse_from_str(timestamp, ISO8601_BASIC_OFFSET))
        .ok()
        .and_then(|t| t.timestamp_nanos_opt())
        .unwrap_or(0)
}

/// Returns the mount path without its leading slash, eg. `/live` becomes
/// `live`.
///
/// Mount paths always start with `/`, so the first byte is dropped without
/// looking at it.
pub fn mount_tag(mount: &str) -> &str {
    mount.get(1..).unwrap_or_default()
}

/// Builds the `icecast_server` record.
pub fn server_metric(stats: &ServerStats) -> Metric {
    debug!("Deriving server metrics");

    let tags = Tags::from([
        ("admin",     stats.admin.clone()),
        ("host",      stats.host.clone()),
        ("location",  stats.location.clone()),
        ("server_id", stats.server_id.clone()),
    ]);

    let fields = Fields::from([
        // Point in time
        ("clients",      stats.clients.into()),
        ("listeners",    stats.listeners.into()),
        ("sources",      stats.sources.into()),
        ("stats",        stats.stats.into()),
        ("server_start", iso8601_to_nanos(&stats.server_start_iso8601).into()),

        // Counters
        ("client_connections",        stats.client_connections.into()),
        ("file_connections",          stats.file_connections.into()),
        ("listener_connections",      stats.listener_connections.into()),
        ("source_client_connections", stats.source_client_connections.into()),
        ("source_relay_connections",  stats.source_relay_connections.into()),
        ("source_total_connections",  stats.source_total_connections.into()),
        ("stats_connections",         stats.stats_connections.into()),
    ]);

    Metric {
        measurement: SERVER_MEASUREMENT,
        fields,
        tags,
    }
}

/// Builds one `icecast_source` record per mount, in document order.
pub fn source_metrics(stats: &ServerStats) -> Vec<Metric> {
    debug!("Deriving source metrics for {} sources", stats.sources_list.len());

    stats.sources_list
        .iter()
        .map(|source| source_metric(&stats.host, source))
        .collect()
}

fn source_metric(host: &str, source: &Source) -> Metric {
    let tags = Tags::from([
        ("host",               host.to_string()),
        ("mount",              mount_tag(&source.mount).to_string()),
        ("genre",              source.genre.clone()),
        ("listen_url",         source.listen_url.clone()),
        ("server_name",        source.server_name.clone()),
        ("server_description", source.server_description.clone()),
        ("server_type",        source.server_type.clone()),
        ("server_url",         source.server_url.clone()),
        ("source_ip",          source.source_ip.clone()),
    ]);

    let fields = Fields::from([
        // Point in time
        ("listeners",      source.listeners.into()),
        ("listener_peak",  source.listener_peak.into()),
        ("slow_listeners", source.slow_listeners.into()),
        ("stream_start",   iso8601_to_nanos(&source.stream_start_iso8601).into()),

        // Counters
        ("total_bytes_read", source.total_bytes_read.into()),
        ("total_bytes_sent", source.total_bytes_sent.into()),
    ]);

    Metric {
        measurement: SOURCE_MEASUREMENT,
        fields,
        tags,
    }
}

/// Builds one `icecast_listener` record per connected client of `source`.
///
/// When `geo` is given every listener is geolocated and a failed lookup
/// fails the whole batch. Localized name tags are only added when a
/// `language` is given.
pub fn listener_metrics(
    host: &str,
    source: &Source,
    clients: &ClientList,
    geo: Option<&dyn GeoLookup>,
    language: Option<&str>,
) -> Result<Vec<Metric>, GeoError> {
    debug!("Deriving listener metrics for mount: {}", source.mount);

    let mount = mount_tag(&source.mount);
    let mut metrics = Vec::with_capacity(clients.source.listener.len());

    for listener in &clients.source.listener {
        let mut tags = Tags::from([
            ("host",       host.to_string()),
            ("mount",      mount.to_string()),
            ("ip",         listener.ip.clone()),
            ("user_agent", listener.user_agent.clone()),
        ]);

        // Counter
        let mut fields = Fields::from([
            ("connected", listener.connected.into()),
        ]);

        if let Some(geo) = geo {
            let location = geo.resolve(&listener.ip)?;

            tags.insert("continent_code", location.continent_code);
            tags.insert("country_code", location.country_code);
            tags.insert("postal_code", location.postal_code);

            if language.is_some() {
                tags.insert("continent_name", location.continent_name);
                tags.insert("country_name", location.country_name);
                tags.insert("city_name", location.city_name);
            }

            fields.insert("latitude", location.latitude.into());
            fields.insert("longitude", location.longitude.into());
        }

        metrics.push(Metric {
            measurement: LISTENER_MEASUREMENT,
            fields,
            tags,
        });
    }

    Ok(metrics)
}
