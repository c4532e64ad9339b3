//! Icecast XML document shapes and the listener list schema shim.
//!
//! Icecast 2.4 answers /listclients with capitalised element names, 2.5 uses
//! lowercase ones. The 2.4 names are rewritten on the raw bytes before
//! parsing so only the 2.5 shape needs to be modelled. The rewrite is a blind
//! substring replacement: any text outside of element names that happens to
//! contain one of the legacy patterns is rewritten as well.
#![forbid(unsafe_code)]
#![deny(missing_docs)]
use crate::errors::ParseError;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use tracing::debug;

/// Root element of both the stats and the listener list documents.
const ROOT_ELEMENT: &str = "icestats";

/// Legacy (Icecast 2.4) listener list element name suffixes and their
/// current replacements. Matching includes the closing `>` so that only
/// element names are targeted, both in opening and closing tags.
const LEGACY_CLIENT_LIST_NAMES: &[(&[u8], &[u8])] = &[
    (b"ID>",        b"id>"),
    (b"IP>",        b"ip>"),
    (b"UserAgent>", b"useragent>"),
    (b"Connected>", b"connected>"),
    (b"Listeners>", b"listeners>"),
];

/// Server wide statistics, as returned by `/admin/stats`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerStats {
    /// Admin contact address.
    pub admin: String,

    /// Cumulative number of client connections.
    pub client_connections: i64,

    /// Currently connected clients.
    pub clients: i64,

    /// Cumulative number of connections of any kind.
    pub connections: i64,

    /// Cumulative number of file connections.
    pub file_connections: i64,

    /// Server hostname.
    pub host: String,

    /// Cumulative number of listener connections.
    pub listener_connections: i64,

    /// Currently connected listeners.
    pub listeners: i64,

    /// Server location.
    pub location: String,

    /// Server identifier, eg. `Icecast 2.4.4`.
    pub server_id: String,

    /// Server start time in human readable form.
    pub server_start: String,

    /// Server start time as an ISO-8601 timestamp.
    pub server_start_iso8601: String,

    /// Cumulative number of source client connections.
    pub source_client_connections: i64,

    /// Cumulative number of source relay connections.
    pub source_relay_connections: i64,

    /// Cumulative number of source connections.
    pub source_total_connections: i64,

    /// Currently active sources.
    pub sources: i64,

    /// Currently connected stats clients.
    pub stats: i64,

    /// Cumulative number of stats connections.
    pub stats_connections: i64,

    /// Active mount points, in document order.
    #[serde(rename = "source")]
    pub sources_list: Vec<Source>,
}

/// A single active mount point within `ServerStats`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Source {
    /// Mount path, always starting with `/`.
    #[serde(rename = "@mount")]
    pub mount: String,

    /// Stream bitrate.
    pub bitrate: String,

    /// Stream genre.
    pub genre: String,

    /// Peak number of listeners since the source connected.
    pub listener_peak: i64,

    /// Currently connected listeners.
    pub listeners: i64,

    /// Public URL of the stream.
    #[serde(rename = "listenurl")]
    pub listen_url: String,

    /// Listener limit, may be `unlimited`.
    pub max_listeners: String,

    /// Whether the stream is listed in directories.
    pub public: i64,

    /// Stream description.
    pub server_description: String,

    /// Stream name.
    pub server_name: String,

    /// Stream content type.
    pub server_type: String,

    /// Stream homepage.
    pub server_url: String,

    /// Listeners that are falling behind.
    pub slow_listeners: i64,

    /// Address of the source client.
    pub source_ip: String,

    /// Stream start time in human readable form.
    pub stream_start: String,

    /// Stream start time as an ISO-8601 timestamp.
    pub stream_start_iso8601: String,

    /// Cumulative bytes read from the source.
    pub total_bytes_read: i64,

    /// Cumulative bytes sent to listeners.
    pub total_bytes_sent: i64,

    /// Audio bitrate reported by the source.
    pub audio_bitrate: i64,

    /// Audio channel count reported by the source.
    pub audio_channels: i64,

    /// Audio sample rate reported by the source.
    pub audio_samplerate: i64,

    /// Bitrate from the `ice-bitrate` header.
    #[serde(rename = "ice-bitrate")]
    pub ice_bitrate: i64,

    /// Stream subtype, eg. `Vorbis`.
    pub subtype: String,
}

/// Listener list of a single mount, as returned by
/// `/admin/listclients?mount=`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientList {
    /// The mount the listeners are connected to.
    pub source: ClientListSource,
}

/// The `<source>` element of a `ClientList`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientListSource {
    /// Mount path, redundant with the query parameter.
    #[serde(rename = "@mount")]
    pub mount: String,

    /// Number of listeners reported by the server.
    pub listeners: i64,

    /// Connected listeners, in document order.
    #[serde(rename = "listener")]
    pub listener: Vec<Listener>,
}

/// A connected client.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Listener {
    /// Client identifier.
    pub id: String,

    /// Client address, IPv4 or IPv6.
    pub ip: String,

    /// Client user agent.
    #[serde(rename = "useragent")]
    pub user_agent: String,

    /// Seconds the client has been connected.
    pub connected: i64,
}

/// Rewrites legacy listener list element names to their current form.
///
/// Documents already in the current schema pass through unchanged, which
/// also makes the rewrite idempotent.
pub fn normalize_client_list(raw: &[u8]) -> Vec<u8> {
    LEGACY_CLIENT_LIST_NAMES
        .iter()
        .fold(raw.to_vec(), |data, (from, to)| replace_all(&data, from, to))
}

// Replaces every non-overlapping occurrence of from with to.
fn replace_all(haystack: &[u8], from: &[u8], to: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(haystack.len());
    let mut rest = haystack;

    while let Some(pos) = rest.windows(from.len()).position(|w| w == from) {
        output.extend_from_slice(&rest[..pos]);
        output.extend_from_slice(to);
        rest = &rest[pos + from.len()..];
    }

    output.extend_from_slice(rest);
    output
}

/// Parses a `/admin/stats` response.
pub fn parse_server_stats(raw: &[u8]) -> Result<ServerStats, ParseError> {
    debug!("Parsing server stats document");

    parse_document(raw)
}

/// Parses a `/admin/listclients` response. The input must already have been
/// passed through `normalize_client_list`.
pub fn parse_client_list(raw: &[u8]) -> Result<ClientList, ParseError> {
    debug!("Parsing client list document");

    parse_document(raw)
}

// Checks the root element and deserializes the document. Elements we don't
// model are ignored.
fn parse_document<T>(raw: &[u8]) -> Result<T, ParseError>
where T: for<'de> Deserialize<'de> {
    let root = root_element(raw)?;

    if root != ROOT_ELEMENT {
        return Err(ParseError::UnexpectedRoot {
            expected: ROOT_ELEMENT,
            found:    root,
        });
    }

    let document = quick_xml::de::from_reader(raw)?;

    Ok(document)
}

// Returns the local name of the first element in the document.
fn root_element(raw: &[u8]) -> Result<String, ParseError> {
    let mut reader = Reader::from_reader(raw);

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                let name = e.local_name();
                let name = String::from_utf8_lossy(name.as_ref());

                return Ok(name.into_owned());
            },
            Event::Eof => return Err(ParseError::MissingRoot),
            _          => {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn read_test_data(name: &str) -> Vec<u8> {
        fs::read(format!("test-data/{name}")).unwrap()
    }

    #[test]
    fn normalize_rewrites_legacy_names() {
        let raw = indoc!(r#"
            <icestats>
              <source mount="/live">
                <Listeners>1</Listeners>
                <listener>
                  <IP>192.0.2.1</IP>
                  <UserAgent>VLC</UserAgent>
                  <Connected>42</Connected>
                  <ID>7</ID>
                </listener>
              </source>
            </icestats>
        "#);

        let ok = indoc!(r#"
            <icestats>
              <source mount="/live">
                <listeners>1</listeners>
                <listener>
                  <ip>192.0.2.1</ip>
                  <useragent>VLC</useragent>
                  <connected>42</connected>
                  <id>7</id>
                </listener>
              </source>
            </icestats>
        "#);

        let normalized = normalize_client_list(raw.as_bytes());

        assert_eq!(String::from_utf8(normalized).unwrap(), ok);
    }

    #[test]
    fn normalize_leaves_current_schema_alone() {
        let raw = read_test_data("listclients_current.xml");
        let normalized = normalize_client_list(&raw);

        assert_eq!(normalized, raw);
    }

    #[test]
    fn normalize_is_idempotent() {
        let raw = read_test_data("listclients_legacy.xml");
        let once = normalize_client_list(&raw);
        let twice = normalize_client_list(&once);

        assert_eq!(once, twice);
    }

    #[test]
    fn legacy_and_current_schemas_parse_identically() {
        let legacy = read_test_data("listclients_legacy.xml");
        let current = read_test_data("listclients_current.xml");

        let legacy = parse_client_list(&normalize_client_list(&legacy)).unwrap();
        let current = parse_client_list(&normalize_client_list(&current)).unwrap();

        assert_eq!(legacy, current);
        assert_eq!(legacy.source.listener.len(), 3);
    }

    #[test]
    fn parse_client_list_ok() {
        let raw = read_test_data("listclients_current.xml");
        let clients = parse_client_list(&raw).unwrap();

        assert_eq!(clients.source.mount, "/live");
        assert_eq!(clients.source.listeners, 3);

        let first = &clients.source.listener[0];
        assert_eq!(first.id, "12");
        assert_eq!(first.ip, "192.0.2.10");
        assert_eq!(first.user_agent, "VLC/3.0.20 LibVLC/3.0.20");
        assert_eq!(first.connected, 3600);

        let last = &clients.source.listener[2];
        assert_eq!(last.ip, "2001:db8::1");
    }

    #[test]
    fn parse_client_list_no_listeners() {
        let raw = indoc!(r#"
            <?xml version="1.0"?>
            <icestats>
              <source mount="/quiet">
                <listeners>0</listeners>
              </source>
            </icestats>
        "#);

        let clients = parse_client_list(raw.as_bytes()).unwrap();

        assert_eq!(clients.source.mount, "/quiet");
        assert!(clients.source.listener.is_empty());
    }

    #[test]
    fn parse_server_stats_ok() {
        let raw = read_test_data("stats.xml");
        let stats = parse_server_stats(&raw).unwrap();

        assert_eq!(stats.admin, "icemaster@localhost");
        assert_eq!(stats.host, "localhost");
        assert_eq!(stats.location, "Earth");
        assert_eq!(stats.server_id, "Icecast 2.4.4");
        assert_eq!(stats.clients, 5);
        assert_eq!(stats.listeners, 3);
        assert_eq!(stats.sources, 2);
        assert_eq!(stats.stats, 0);
        assert_eq!(stats.client_connections, 1027);
        assert_eq!(stats.file_connections, 12);
        assert_eq!(stats.listener_connections, 880);
        assert_eq!(stats.source_client_connections, 3);
        assert_eq!(stats.source_relay_connections, 0);
        assert_eq!(stats.source_total_connections, 3);
        assert_eq!(stats.stats_connections, 0);
        assert_eq!(stats.server_start_iso8601, "2024-03-01T10:00:00+01:00");
        assert_eq!(stats.sources_list.len(), 2);

        let live = &stats.sources_list[0];
        assert_eq!(live.mount, "/live");
        assert_eq!(live.genre, "Jazz");
        assert_eq!(live.listen_url, "http://localhost:8000/live");
        assert_eq!(live.listeners, 3);
        assert_eq!(live.listener_peak, 9);
        assert_eq!(live.slow_listeners, 1);
        assert_eq!(live.total_bytes_read, 104857600);
        assert_eq!(live.total_bytes_sent, 314572800);
        assert_eq!(live.max_listeners, "unlimited");
        assert_eq!(live.ice_bitrate, 128);
        assert_eq!(live.subtype, "Vorbis");

        // The second source omits most optional elements.
        let backup = &stats.sources_list[1];
        assert_eq!(backup.mount, "/backup.mp3");
        assert_eq!(backup.genre, "");
        assert_eq!(backup.listeners, 0);
    }

    #[test]
    fn parse_server_stats_no_sources() {
        let raw = indoc!(r#"
            <icestats>
              <host>localhost</host>
              <sources>0</sources>
            </icestats>
        "#);

        let stats = parse_server_stats(raw.as_bytes()).unwrap();

        assert_eq!(stats.host, "localhost");
        assert!(stats.sources_list.is_empty());
    }

    #[test]
    fn parse_server_stats_ignores_unknown_elements() {
        let raw = indoc!(r#"
            <icestats>
              <host>localhost</host>
              <banned_ips>0</banned_ips>
              <source mount="/live">
                <yp_currently_playing>Something</yp_currently_playing>
                <listeners>1</listeners>
              </source>
            </icestats>
        "#);

        let stats = parse_server_stats(raw.as_bytes()).unwrap();

        assert_eq!(stats.sources_list[0].listeners, 1);
    }

    #[test]
    fn parse_wrong_root() {
        let raw = "<html><body>Login required</body></html>";
        let res = parse_server_stats(raw.as_bytes());

        assert!(matches!(
            res,
            Err(ParseError::UnexpectedRoot { found, .. }) if found == "html"
        ));
    }

    #[test]
    fn parse_empty_document() {
        let res = parse_server_stats(b"");

        assert!(matches!(res, Err(ParseError::MissingRoot)));
    }

    #[test]
    fn parse_malformed_document() {
        let raw = "<icestats><host>localhost</icestats>";
        let res = parse_server_stats(raw.as_bytes());

        assert!(res.is_err());
    }

    #[test]
    fn parse_non_numeric_counter() {
        let raw = "<icestats><clients>many</clients></icestats>";
        let res = parse_server_stats(raw.as_bytes());

        assert!(matches!(res, Err(ParseError::Document(_))));
    }
}
