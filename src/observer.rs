//! Diagnostic hooks invoked while gathering.
#![forbid(unsafe_code)]
#![deny(missing_docs)]
use crate::schema::{
    ClientList,
    ServerStats,
};
use tracing::debug;
use url::Url;

/// Receives the intermediate results of a gather cycle.
///
/// Every method defaults to doing nothing, so implementations only need to
/// override the hooks they care about.
pub trait Observer: Send + Sync {
    /// Called before each HTTP request.
    fn request(&self, _url: &Url) {}

    /// Called with the parsed server statistics document.
    fn server_stats(&self, _stats: &ServerStats) {}

    /// Called with the parsed client list of a mount.
    fn client_list(&self, _mount: &str, _clients: &ClientList) {}
}

/// Observer that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

/// Observer that dumps everything it sees at debug level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn request(&self, url: &Url) {
        debug!("Requesting: {url}");
    }

    fn server_stats(&self, stats: &ServerStats) {
        debug!("Server stats: {stats:?}");
    }

    fn client_list(&self, mount: &str, clients: &ClientList) {
        debug!("Client list for {mount}: {clients:?}");
    }
}
