//! Retrieves documents from the Icecast admin interface.
#![forbid(unsafe_code)]
#![deny(missing_docs)]
use crate::config::Config;
use crate::errors::FetchError;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

const USER_AGENT: &str = concat!(
    env!("CARGO_PKG_NAME"),
    "/",
    env!("CARGO_PKG_VERSION"),
);

/// Performs authenticated GET requests relative to the admin base URL.
#[derive(Clone, Debug)]
pub struct Fetcher {
    client:   Client,
    base:     Url,
    username: String,
    password: String,
    timeout:  Duration,
}

impl Fetcher {
    /// Creates a fetcher for the already validated `base` URL, using the
    /// credentials and timeout from `config`.
    pub fn new(base: Url, config: &Config) -> Result<Self, FetchError> {
        debug!("Building HTTP client for {}", base);

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            client,
            base,
            username: config.username.clone(),
            password: config.password.clone(),
            timeout:  config.response_timeout,
        })
    }

    /// Resolves `path` against the base URL and appends `query`.
    ///
    /// Resolution follows RFC 3986, so a base without a trailing slash has
    /// its last segment replaced.
    pub fn url_for(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Url, FetchError> {
        let mut url = self.base.join(path).map_err(|source| {
            FetchError::InvalidPath {
                path: path.into(),
                source,
            }
        })?;

        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        Ok(url)
    }

    /// Fetches `url` and returns the full response body.
    ///
    /// The timeout covers the whole exchange, from connecting to reading
    /// the last byte of the body.
    pub async fn get(&self, url: Url) -> Result<Vec<u8>, FetchError> {
        debug!("GET {}", url);

        let response = self.client
            .get(url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|source| {
                FetchError::Unreachable {
                    url: url.clone(),
                    source,
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::UpstreamStatus {
                url,
                status,
            });
        }

        let body = response.bytes().await.map_err(|source| {
            FetchError::Unreachable {
                url: url.clone(),
                source,
            }
        })?;

        debug!("Read {} bytes from {}", body.len(), url);

        Ok(body.to_vec())
    }
}
