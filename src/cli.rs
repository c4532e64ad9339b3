//!
//! Command line interface parsing
//!
#![forbid(unsafe_code)]
#![deny(missing_docs)]
use clap::{
    crate_description,
    crate_name,
    crate_version,
    Arg,
    ArgAction,
    ArgMatches,
    Command,
};
use tracing::debug;

mod validator;

// Create a clap app
fn create_app() -> Command {
    debug!("Creating clap app");

    Command::new(crate_name!())
        .version(crate_version!())
        .about(crate_description!())
        .term_width(80)
        .arg(
            Arg::new("CONFIG_FILE")
                .env("ICECAST2_COLLECTOR_CONFIG_FILE")
                .hide_env_values(true)
                .long("config.file")
                .value_name("FILE")
                .help("YAML configuration file. Defaults are used if unset.")
                .action(ArgAction::Set)
                .value_parser(validator::is_valid_config_file_path)
        )
        .arg(
            Arg::new("OUTPUT_FILE_PATH")
                .env("ICECAST2_COLLECTOR_OUTPUT_FILE_PATH")
                .hide_env_values(true)
                .long("output.file-path")
                .value_name("FILE")
                .help("File to output metrics to, - for stdout.")
                .action(ArgAction::Set)
                .default_value("-")
                .value_parser(validator::is_valid_output_file_path)
        )
        .arg(
            Arg::new("COLLECTION_INTERVAL")
                .env("ICECAST2_COLLECTOR_COLLECTION_INTERVAL")
                .hide_env_values(true)
                .long("collection.interval")
                .value_name("DURATION")
                .help("Time between poll cycles.")
                .action(ArgAction::Set)
                .default_value("10s")
                .value_parser(validator::is_valid_interval)
        )
        .arg(
            Arg::new("LOG_LEVEL")
                .env("ICECAST2_COLLECTOR_LOG_LEVEL")
                .hide_env_values(true)
                .long("log.level")
                .value_name("LEVEL")
                .help("Only log messages at or above this level.")
                .action(ArgAction::Set)
                .default_value("info")
                .value_parser(validator::is_valid_log_level)
        )
        .arg(
            Arg::new("ONCE")
                .long("once")
                .help("Run a single poll cycle and exit.")
                .action(ArgAction::SetTrue)
        )
        .arg(
            Arg::new("SAMPLE_CONFIG")
                .long("sample-config")
                .help("Dump an annotated sample configuration to stdout")
                .action(ArgAction::SetTrue)
        )
}

/// Parses the command line arguments and returns the matches.
pub fn parse_args() -> ArgMatches {
    debug!("Parsing command line arguments");

    create_app().get_matches()
}

#[cfg(test)]
mod tests {
    use super::*;
    use icecast2_collector::output::Output;
    use once_cell::sync::Lazy;
    use pretty_assertions::assert_eq;
    use std::env;
    use std::panic;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;
    use tracing::Level;

    // Used during env_tests
    static LOCK: Lazy<Mutex<i8>> = Lazy::new(|| Mutex::new(0));

    // Wraps setting and unsetting of environment variables
    fn env_test<T>(key: &str, var: &str, test: T)
    where T: FnOnce() + panic::UnwindSafe {
        // This ensures that only one test can be manipulating the environment
        // at a time.
        let _locked = LOCK.lock().unwrap();

        env::set_var(key, var);

        let result = panic::catch_unwind(|| {
            test()
        });

        env::remove_var(key);

        assert!(result.is_ok())
    }

    #[test]
    fn default_collection_interval() {
        // Must lock since we're still testing env vars here even though we're
        // not setting one.
        let _locked = LOCK.lock().unwrap();

        let argv = vec!["icecast2_collector"];
        let matches = create_app().get_matches_from(argv);
        let interval = matches.get_one::<Duration>("COLLECTION_INTERVAL");

        assert_eq!(interval, Some(&Duration::from_secs(10)));
    }

    #[test]
    fn default_output_file_path() {
        let _locked = LOCK.lock().unwrap();

        let argv = vec!["icecast2_collector"];
        let matches = create_app().get_matches_from(argv);
        let output = matches.get_one::<Output>("OUTPUT_FILE_PATH");

        assert_eq!(output, Some(&Output::Stdout));
    }

    #[test]
    fn default_log_level() {
        let _locked = LOCK.lock().unwrap();

        let argv = vec!["icecast2_collector"];
        let matches = create_app().get_matches_from(argv);
        let level = matches.get_one::<Level>("LOG_LEVEL");

        assert_eq!(level, Some(&Level::INFO));
    }

    #[test]
    fn default_config_file_unset() {
        let _locked = LOCK.lock().unwrap();

        let argv = vec!["icecast2_collector"];
        let matches = create_app().get_matches_from(argv);

        assert_eq!(matches.get_one::<PathBuf>("CONFIG_FILE"), None);
        assert!(!matches.get_flag("ONCE"));
        assert!(!matches.get_flag("SAMPLE_CONFIG"));
    }

    #[test]
    fn cli_set_config_file() {
        let argv = vec![
            "icecast2_collector",
            "--config.file=test-data/config_ok.yaml",
        ];

        let matches = create_app().get_matches_from(argv);
        let config = matches.get_one::<PathBuf>("CONFIG_FILE");

        assert_eq!(config, Some(&PathBuf::from("test-data/config_ok.yaml")));
    }

    #[test]
    fn cli_set_collection_interval() {
        let argv = vec![
            "icecast2_collector",
            "--collection.interval=1m",
        ];

        let matches = create_app().get_matches_from(argv);
        let interval = matches.get_one::<Duration>("COLLECTION_INTERVAL");

        assert_eq!(interval, Some(&Duration::from_secs(60)));
    }

    #[test]
    fn cli_set_once() {
        let argv = vec![
            "icecast2_collector",
            "--once",
        ];

        let matches = create_app().get_matches_from(argv);

        assert!(matches.get_flag("ONCE"));
    }

    #[test]
    fn cli_bad_collection_interval() {
        let argv = vec![
            "icecast2_collector",
            "--collection.interval=soon",
        ];

        let res = create_app().try_get_matches_from(argv);

        assert!(res.is_err());
    }

    #[test]
    fn cli_override_env_collection_interval() {
        env_test("ICECAST2_COLLECTOR_COLLECTION_INTERVAL", "30s", || {
            let argv = vec![
                "icecast2_collector",
                "--collection.interval=5s",
            ];

            let matches = create_app().get_matches_from(argv);
            let interval = matches.get_one::<Duration>("COLLECTION_INTERVAL");

            assert_eq!(interval, Some(&Duration::from_secs(5)));
        });
    }

    #[test]
    fn env_set_collection_interval() {
        env_test("ICECAST2_COLLECTOR_COLLECTION_INTERVAL", "30s", || {
            let argv = vec!["icecast2_collector"];
            let matches = create_app().get_matches_from(argv);
            let interval = matches.get_one::<Duration>("COLLECTION_INTERVAL");

            assert_eq!(interval, Some(&Duration::from_secs(30)));
        });
    }

    #[test]
    fn env_set_log_level() {
        env_test("ICECAST2_COLLECTOR_LOG_LEVEL", "debug", || {
            let argv = vec!["icecast2_collector"];
            let matches = create_app().get_matches_from(argv);
            let level = matches.get_one::<Level>("LOG_LEVEL");

            assert_eq!(level, Some(&Level::DEBUG));
        });
    }

    #[test]
    fn env_set_output_file_path() {
        env_test("ICECAST2_COLLECTOR_OUTPUT_FILE_PATH", "/tmp/icecast.lp", || {
            let argv = vec!["icecast2_collector"];
            let matches = create_app().get_matches_from(argv);
            let output = matches.get_one::<Output>("OUTPUT_FILE_PATH");

            assert_eq!(
                output,
                Some(&Output::File(PathBuf::from("/tmp/icecast.lp"))),
            );
        });
    }
}
