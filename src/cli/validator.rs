//! Command line interface parsing validators
#![forbid(unsafe_code)]
#![deny(missing_docs)]
use icecast2_collector::output::Output;
use std::path::{
    Path,
    PathBuf,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;
use tracing::Level;

// Basic checks that config.file points at an existing file.
pub fn is_valid_config_file_path(s: &str) -> Result<PathBuf, String> {
    debug!("Ensuring that config.file is valid");

    let path = Path::new(&s);

    if !path.is_file() {
        return Err("config.file doesn't exist or isn't a file".to_owned());
    }

    Ok(path.to_path_buf())
}

// Basic checks for valid filesystem path for the line protocol output file
pub fn is_valid_output_file_path(s: &str) -> Result<Output, String> {
    debug!("Ensuring that output.file-path is valid");

    // - is special and is a request for us to output to stdout
    if s == "-" {
        return Ok(Output::Stdout)
    }

    // Get a Path from our string and start checking
    let path = Path::new(&s);

    // We only take absolute paths
    if !path.is_absolute() {
        return Err("output.file-path only accepts absolute paths".to_owned());
    }

    // We can't write to a directory
    if path.is_dir() {
        return Err("output.file-path must not point at a directory".to_owned());
    }

    // Check that the directory exists
    if let Some(dir) = path.parent() {
        // Got a parent directory, ensure it exists
        if !dir.is_dir() {
            return Err("output.file-path directory must exist".to_owned());
        }
    }
    else {
        // Didn't get a parent directory at all
        return Err("output.file-path directory must exist".to_owned());
    }

    Ok(Output::File(path.to_path_buf()))
}

// Parses a humantime interval such as "10s" or "1m 30s".
pub fn is_valid_interval(s: &str) -> Result<Duration, String> {
    debug!("Ensuring that collection.interval is valid");

    let interval = humantime::parse_duration(s)
        .map_err(|e| format!("'{s}' is not a valid interval: {e}"))?;

    if interval.is_zero() {
        return Err("collection.interval must be greater than zero".into());
    }

    Ok(interval)
}

// Accepts the tracing level names, case insensitively.
pub fn is_valid_log_level(s: &str) -> Result<Level, String> {
    debug!("Ensuring that log.level is valid");

    Level::from_str(s).map_err(|_| {
        format!("'{s}' is not one of trace, debug, info, warn or error")
    })
}
