//! Line protocol output to stdout or a file.
#![forbid(unsafe_code)]
#![deny(missing_docs)]
use crate::metrics::{
    FieldValue,
    Metric,
};
use std::fmt::{
    self,
    Write as _,
};
use std::io::{
    self,
    Write,
};
use std::path::{
    Path,
    PathBuf,
};
use std::time::{
    SystemTime,
    UNIX_EPOCH,
};
use tempfile::NamedTempFile;
use tracing::debug;

/// Where encoded metrics are written.
#[derive(Clone, Debug, PartialEq)]
pub enum Output {
    /// Atomically replace the file at the path on every cycle.
    File(PathBuf),

    /// Append to stdout.
    Stdout,
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Stdout     => write!(f, "-"),
        }
    }
}

impl Output {
    /// Writes one cycle of already encoded metrics.
    pub fn write(&self, metrics: &str) -> io::Result<()> {
        debug!("Writing metrics to: {self}");

        match self {
            Self::Stdout => {
                let mut stdout = io::stdout().lock();
                stdout.write_all(metrics.as_bytes())?;
                stdout.flush()?;
            },
            Self::File(path) => {
                // The temporary file must live on the same filesystem as the
                // destination for the persist to be a rename.
                let parent = match path.parent() {
                    Some(parent) if !parent.as_os_str().is_empty() => parent,
                    _ => Path::new("."),
                };

                let mut file = NamedTempFile::new_in(parent)?;
                file.write_all(metrics.as_bytes())?;
                file.persist(path)?;
            },
        }

        Ok(())
    }
}

/// Returns the current time in nanoseconds since the Unix epoch.
pub fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Encodes `metrics` as Influx line protocol, one line per record, all
/// stamped with `timestamp`.
pub fn encode(metrics: &[Metric], timestamp: i64) -> String {
    let mut out = String::new();

    for metric in metrics {
        encode_metric(&mut out, metric, timestamp);
    }

    out
}

fn encode_metric(out: &mut String, metric: &Metric, timestamp: i64) {
    escape_into(out, metric.measurement, &[',', ' ']);

    // Tags are already sorted by key.
    for (key, value) in &metric.tags {
        if value.trim_end_matches('\\').is_empty() {
            continue;
        }

        out.push(',');
        escape_into(out, key, &[',', '=', ' ']);
        out.push('=');
        escape_into(out, value, &[',', '=', ' ']);
    }

    let mut separator = ' ';
    for (key, value) in &metric.fields {
        out.push(separator);
        separator = ',';

        escape_into(out, key, &[',', '=', ' ']);
        out.push('=');

        // Writing to a String can't fail.
        let _ = match value {
            FieldValue::Integer(i) => write!(out, "{i}i"),
            FieldValue::Float(f)   => write!(out, "{f}"),
        };
    }

    let _ = writeln!(out, " {timestamp}");
}

fn escape_into(out: &mut String, s: &str, special: &[char]) {
    // A trailing backslash would escape the separator written after it.
    for c in s.trim_end_matches('\\').chars() {
        if special.contains(&c) {
            out.push('\\');
        }

        out.push(c);
    }
}
