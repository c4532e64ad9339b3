//
// icecast2_collector
//
// Polls an Icecast 2 server on a timer and prints its metrics as Influx line
// protocol.
//
#![forbid(unsafe_code)]
use clap::ArgMatches;
use icecast2_collector::output::{
    encode,
    now_nanos,
    Output,
};
use icecast2_collector::{
    Collector,
    CollectorError,
    Config,
    Metric,
};
use std::error::Error;
use std::future::Future;
use std::path::PathBuf;
use std::process::exit;
use std::time::Duration;
use tokio::signal;
use tokio::time::MissedTickBehavior;
use tracing::{
    debug,
    error,
    info,
    Level,
};

mod cli;
mod sample_config;

// Renders an error and its sources on a single line.
fn report(err: &dyn Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();

    while let Some(err) = source {
        message.push_str(": ");
        message.push_str(&err.to_string());
        source = err.source();
    }

    message
}

// Runs one poll cycle and writes its records.
async fn poll(
    collector: &mut Collector,
    output: &Output,
) -> Result<(), CollectorError> {
    let mut metrics: Vec<Metric> = Vec::new();
    collector.gather(&mut metrics).await?;

    let lines = encode(&metrics, now_nanos());
    output.write(&lines)?;

    debug!("Wrote {} records to {}", metrics.len(), output);

    Ok(())
}

// Polls every `interval` until `shutdown` completes. A shutdown that
// completes during a poll ends the loop once that poll has finished.
async fn poll_loop<F>(
    collector: &mut Collector,
    output: &Output,
    interval: Duration,
    shutdown: F,
)
where F: Future<Output = ()> {
    info!("Polling every {}", humantime::format_duration(interval));

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Interrupted, shutting down");
                break;
            },
            _ = ticker.tick() => {
                if let Err(e) = poll(collector, output).await {
                    error!("Poll cycle failed: {}", report(&e));
                }
            },
        }
    }
}

async fn run(matches: &ArgMatches) -> Result<(), CollectorError> {
    let config = match matches.get_one::<PathBuf>("CONFIG_FILE") {
        Some(path) => Config::from_yaml(path)?,
        None       => {
            info!("No config.file given, using defaults");
            Config::default()
        },
    };

    // Both have defaults, so they're always present.
    let output = matches
        .get_one::<Output>("OUTPUT_FILE_PATH")
        .cloned()
        .unwrap_or(Output::Stdout);

    let interval = matches
        .get_one::<Duration>("COLLECTION_INTERVAL")
        .copied()
        .unwrap_or(Duration::from_secs(10));

    let mut collector = Collector::new(config).await?;

    if matches.get_flag("ONCE") {
        return poll(&mut collector, &output).await;
    }

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Unable to listen for Ctrl-C: {}", e);
        }
    };

    poll_loop(&mut collector, &output, interval, shutdown).await;

    Ok(())
}

#[tokio::main]
async fn main() {
    let matches = cli::parse_args();

    let level = matches
        .get_one::<Level>("LOG_LEVEL")
        .copied()
        .unwrap_or(Level::INFO);

    // stdout carries the metrics, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    if matches.get_flag("SAMPLE_CONFIG") {
        sample_config::output();
        return;
    }

    if let Err(e) = run(&matches).await {
        error!("{}", report(&e));
        exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icecast2_collector::{
        ConfigError,
        FetchError,
    };
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::sync::Arc;
    use std::sync::atomic::{
        AtomicBool,
        Ordering,
    };
    use wiremock::matchers::{
        method,
        path,
    };
    use wiremock::{
        Mock,
        MockServer,
        ResponseTemplate,
    };

    const STATS: &str = indoc!(r#"
        <?xml version="1.0"?>
        <icestats>
          <host>localhost</host>
          <server_id>Icecast 2.4.4</server_id>
          <sources>0</sources>
        </icestats>
    "#);

    #[test]
    fn report_includes_sources() {
        let err = CollectorError::Config(ConfigError::Io(
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        ));

        assert_eq!(report(&err), "failed to read configuration file: gone");
    }

    #[test]
    fn report_fetch_error() {
        let err = FetchError::InvalidPath {
            path:   "stats".into(),
            source: url::ParseError::EmptyHost,
        };

        assert_eq!(
            report(&err),
            "failed to resolve 'stats' against the base URL: empty host",
        );
    }

    #[tokio::test]
    async fn poll_loop_stops_on_shutdown_during_poll() {
        let server = MockServer::start().await;

        // Slow enough that shutdown completes while a poll is in flight.
        Mock::given(method("GET"))
            .and(path("/admin/stats"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(STATS)
                    .set_delay(Duration::from_millis(200)),
            )
            .mount(&server)
            .await;

        let config = Config {
            url:              format!("{}/admin/", server.uri()),
            response_timeout: Duration::from_secs(2),
            ..Default::default()
        };

        let mut collector = Collector::new(config).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.lp");
        let output = Output::File(path.clone());

        let fired = Arc::new(AtomicBool::new(false));
        let shutdown = {
            let fired = Arc::clone(&fired);

            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                fired.store(true, Ordering::SeqCst);
            }
        };

        let res = tokio::time::timeout(
            Duration::from_secs(5),
            poll_loop(&mut collector, &output, Duration::from_millis(10), shutdown),
        ).await;

        assert!(res.is_ok(), "poll loop did not stop");
        assert!(fired.load(Ordering::SeqCst));

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("icecast_server,"));
    }
}
