//! Sequences fetching, parsing and metric derivation.
#![forbid(unsafe_code)]
#![deny(missing_docs)]
use crate::config::Config;
use crate::errors::{
    CollectorError,
    ConfigError,
};
use crate::fetch::Fetcher;
use crate::geoip::{
    GeoDatabase,
    GeoLookup,
    GeoResolver,
    MaxMindDatabase,
};
use crate::metrics::{
    listener_metrics,
    server_metric,
    source_metrics,
    Accumulator,
    Metric,
};
use crate::observer::{
    Observer,
    TracingObserver,
};
use crate::schema::{
    normalize_client_list,
    parse_client_list,
    parse_server_stats,
    ClientList,
    ServerStats,
};
use std::sync::Arc;
use tracing::{
    debug,
    info,
    warn,
};

const STATS_PATH: &str        = "stats";
const LIST_CLIENTS_PATH: &str = "listclients";

/// Collects Icecast server, source and listener metrics.
///
/// A collector must not be gathered from concurrently: `gather` takes
/// `&mut self`, and callers sharing one across tasks must serialise access
/// themselves, eg. with a `tokio::sync::Mutex`. The geolocation handle is
/// the only state carried from one cycle to the next.
pub struct Collector<D = MaxMindDatabase> {
    config:   Config,
    fetcher:  Fetcher,
    geo:      GeoResolver<D>,
    observer: Arc<dyn Observer>,
}

impl Collector {
    /// Initialises a collector backed by a MaxMind database, logging
    /// intermediate documents through `tracing`.
    pub async fn new(config: Config) -> Result<Self, CollectorError> {
        Self::init(config, Arc::new(TracingObserver)).await
    }

    /// Initialises a collector backed by a MaxMind database with the given
    /// observer.
    pub async fn with_observer(
        config: Config,
        observer: Arc<dyn Observer>,
    ) -> Result<Self, CollectorError> {
        Self::init(config, observer).await
    }
}

impl<D: GeoDatabase> Collector<D> {
    /// Validates `config`, opens the geolocation database if listeners are
    /// gathered and one is configured, and fetches the server statistics once to make sure the
    /// server is reachable. Any failure is fatal.
    pub async fn init(
        config: Config,
        observer: Arc<dyn Observer>,
    ) -> Result<Self, CollectorError> {
        debug!("Initialising collector");

        let base = config.validate()?;
        let fetcher = Fetcher::new(base, &config)?;

        let mut geo = GeoResolver::new(
            config.geoip2_path().map(Into::into),
            config.geoip2_language().map(Into::into),
        );

        if config.gather_listeners {
            geo.ensure_open().map_err(ConfigError::GeoDatabase)?;
        }

        let collector = Self {
            config,
            fetcher,
            geo,
            observer,
        };

        let stats = collector.fetch_server_stats().await?;

        info!(
            "Connected to {} at {} with {} sources",
            stats.server_id,
            collector.config.url,
            stats.sources_list.len(),
        );

        Ok(collector)
    }

    /// Runs one poll cycle, adding its records to `acc`.
    ///
    /// Records are only added once the whole cycle succeeded; a failed
    /// cycle adds nothing.
    pub async fn gather<A>(&mut self, acc: &mut A) -> Result<(), CollectorError>
    where A: Accumulator + ?Sized {
        let metrics = self.collect().await?;

        debug!("Gathered {} records", metrics.len());

        for metric in metrics {
            acc.add_metric(metric);
        }

        Ok(())
    }

    /// Runs one poll cycle and returns its records.
    pub async fn collect(&mut self) -> Result<Vec<Metric>, CollectorError> {
        debug!("Starting poll cycle");

        let stats = self.fetch_server_stats().await?;

        let mut metrics = Vec::with_capacity(1 + stats.sources_list.len());
        metrics.push(server_metric(&stats));
        metrics.extend(source_metrics(&stats));

        if !self.config.gather_listeners {
            return Ok(metrics);
        }

        self.geo.ensure_open()?;

        let geo: Option<&dyn GeoLookup> = if self.geo.is_open() {
            Some(&self.geo)
        }
        else {
            None
        };

        for source in &stats.sources_list {
            let clients = self.fetch_client_list(&source.mount).await?;

            if !clients.source.mount.is_empty()
                && clients.source.mount != source.mount
            {
                warn!(
                    "Client list for {} reports mount {}",
                    source.mount,
                    clients.source.mount,
                );
            }

            let listeners = listener_metrics(
                &stats.host,
                source,
                &clients,
                geo,
                self.geo.language(),
            )?;

            metrics.extend(listeners);
        }

        Ok(metrics)
    }

    async fn fetch_server_stats(&self) -> Result<ServerStats, CollectorError> {
        let url = self.fetcher.url_for(STATS_PATH, &[])?;
        self.observer.request(&url);

        let raw = self.fetcher.get(url).await?;
        let stats = parse_server_stats(&raw)?;
        self.observer.server_stats(&stats);

        Ok(stats)
    }

    async fn fetch_client_list(
        &self,
        mount: &str,
    ) -> Result<ClientList, CollectorError> {
        let url = self.fetcher.url_for(LIST_CLIENTS_PATH, &[("mount", mount)])?;
        self.observer.request(&url);

        let raw = self.fetcher.get(url).await?;
        let clients = parse_client_list(&normalize_client_list(&raw))?;
        self.observer.client_list(mount, &clients);

        Ok(clients)
    }
}
