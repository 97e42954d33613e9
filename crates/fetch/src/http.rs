//! HTTP-backed fetcher.
//!
//! Object-store sources are served through the store's public media
//! endpoint, so both source kinds share one blocking HTTP agent.

use crate::error::{Error, Result};
use crate::{Fetched, Fetcher, RemoteSource};
use url::Url;

const USER_AGENT: &str = concat!("osconfig-agent/", env!("CARGO_PKG_VERSION"));

/// Default object-store endpoint.
pub const DEFAULT_STORAGE_BASE: &str = "https://storage.googleapis.com/storage/v1";

/// Fetcher issuing blocking HTTP GET requests.
pub struct HttpFetcher {
    /// HTTP agent for requests.
    agent: ureq::Agent,
    /// Object-store API base URL.
    storage_base: String,
}

impl HttpFetcher {
    /// Create a fetcher using the default object-store endpoint.
    pub fn new() -> Self {
        Self::with_storage_base(DEFAULT_STORAGE_BASE)
    }

    /// Create a fetcher with a custom object-store endpoint (for testing).
    pub fn with_storage_base(storage_base: impl Into<String>) -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            storage_base: storage_base.into(),
        }
    }

    /// Build the request URL for a source.
    pub fn request_url(&self, source: &RemoteSource) -> Result<String> {
        match source {
            RemoteSource::Http { uri } => Ok(uri.clone()),
            RemoteSource::Gcs {
                bucket,
                object,
                generation,
            } => {
                let invalid = |message: String| Error::Request {
                    source_name: source.to_string(),
                    message,
                };
                let mut url = Url::parse(&self.storage_base).map_err(|e| invalid(e.to_string()))?;
                url.path_segments_mut()
                    .map_err(|()| invalid("storage base cannot carry a path".to_string()))?
                    .pop_if_empty()
                    .extend(["b", bucket.as_str(), "o", object.as_str()]);
                url.query_pairs_mut().append_pair("alt", "media");
                if let Some(generation) = generation {
                    url.query_pairs_mut()
                        .append_pair("generation", &generation.to_string());
                }
                Ok(url.into())
            }
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, source: &RemoteSource) -> Result<Fetched> {
        let url = self.request_url(source)?;
        log::debug!("Fetching {}", source);

        let response = self
            .agent
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .call()
            .map_err(|e| match e {
                ureq::Error::StatusCode(status) => Error::Status {
                    source_name: source.to_string(),
                    status,
                },
                other => Error::Request {
                    source_name: source.to_string(),
                    message: other.to_string(),
                },
            })?;

        let size = response
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        Ok(Fetched {
            reader: Box::new(response.into_body().into_reader()),
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_url_is_passed_through() {
        let fetcher = HttpFetcher::new();
        let url = fetcher
            .request_url(&RemoteSource::http("https://example.com/key.gpg"))
            .unwrap();
        assert_eq!(url, "https://example.com/key.gpg");
    }

    #[test]
    fn test_gcs_url_encodes_object_name() {
        let fetcher = HttpFetcher::new();
        let url = fetcher
            .request_url(&RemoteSource::gcs("my-bucket", "pkgs/tool 1.deb", Some(1234)))
            .unwrap();
        assert_eq!(
            url,
            "https://storage.googleapis.com/storage/v1/b/my-bucket/o/pkgs%2Ftool%201.deb?alt=media&generation=1234"
        );
    }

    #[test]
    fn test_gcs_url_without_generation() {
        let fetcher = HttpFetcher::with_storage_base("http://localhost:9000/storage/v1/");
        let url = fetcher
            .request_url(&RemoteSource::gcs("b", "o", None))
            .unwrap();
        assert_eq!(url, "http://localhost:9000/storage/v1/b/b/o/o?alt=media");
    }
}
