//! HTTP probe: issue a GET against a running instance and check its status.

use std::time::Duration;

use reqwest::StatusCode;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::{Result, ServerError};
use crate::metrics;

/// Client for probing a base URL.
#[derive(Debug, Clone)]
pub struct Probe {
    /// HTTP client for probe requests.
    http: reqwest::Client,
    /// Base URL paths are joined onto.
    base_url: Url,
}

impl Probe {
    /// Create a probe for `base_url` with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { http, base_url })
    }

    /// Base URL this probe targets.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve `path` against the base URL.
    pub fn url_for(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Issue a GET and return the response status.
    #[instrument(skip(self), fields(base = %self.base_url))]
    pub async fn get(&self, path: &str) -> Result<StatusCode> {
        let url = self.url_for(path)?;
        let _timer = metrics::timer_probe();

        let response = self.http.get(url.clone()).send().await.map_err(|e| {
            warn!("GET {} failed: {}", url, e);
            metrics::inc_probe_failures();
            e
        })?;

        let status = response.status();
        debug!("GET {} -> {}", url, status);
        Ok(status)
    }

    /// Issue a GET and fail unless the status equals `expected`.
    pub async fn expect_status(&self, path: &str, expected: StatusCode) -> Result<StatusCode> {
        let actual = self.get(path).await?;

        if actual != expected {
            metrics::inc_probe_failures();
            return Err(ServerError::UnexpectedStatus {
                url: self.url_for(path)?.to_string(),
                expected,
                actual,
            });
        }

        Ok(actual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(base: &str) -> Probe {
        Probe::new(base, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn new_rejects_invalid_url() {
        let err = Probe::new("localhost without scheme", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ServerError::InvalidUrl(_)));
    }

    #[test]
    fn url_for_joins_root_and_nested_paths() {
        let p = probe("http://localhost:8080");
        assert_eq!(p.base_url().as_str(), "http://localhost:8080/");
        assert_eq!(p.url_for("/").unwrap().as_str(), "http://localhost:8080/");
        assert_eq!(
            p.url_for("/health").unwrap().as_str(),
            "http://localhost:8080/health"
        );
    }

    #[test]
    fn url_for_absolute_path_replaces_base_path() {
        let p = probe("http://localhost:8080/api/v1/");
        assert_eq!(p.url_for("status").unwrap().as_str(), "http://localhost:8080/api/v1/status");
        assert_eq!(p.url_for("/").unwrap().as_str(), "http://localhost:8080/");
    }

    #[tokio::test]
    async fn get_against_closed_port_is_http_error() {
        // Bind and drop to get a port that is very likely free.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let p = probe(&format!("http://{}", addr));
        let err = p.get("/").await.unwrap_err();
        assert!(matches!(err, ServerError::Http(_)));
    }
}
