//! Handle dumping the sample configuration
#![forbid(unsafe_code)]
#![deny(missing_docs)]
use tracing::debug;

const SAMPLE_CONFIG: &str = include_str!("../config/icecast2_collector.yaml");

pub fn output() {
    debug!("Dumping sample configuration to stdout");

    print!("{SAMPLE_CONFIG}");
}
