//! Page download.
//!
//! Every request goes through one shared `reqwest::Client`, so all sources
//! share a single connection pool. Timeouts are per request.

use crate::error::FetchError;
use reqwest::{Client, redirect};
use std::time::Duration;
use tracing::{debug, instrument};

/// Something that can GET a page body.
pub trait PageFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, FetchError>;
}

/// Build the shared HTTP client.
///
/// Idle connections per host are capped at the scrape concurrency so a pool
/// never holds more sockets than the pipeline can use.
pub fn build_http_client(user_agent: &str, max_concurrency: usize) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .redirect(redirect::Policy::limited(10))
        .pool_max_idle_per_host(max_concurrency)
        .build()
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl PageFetcher for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                    timeout,
                }
            } else {
                FetchError::Transport {
                    url: url.to_string(),
                    source: e,
                }
            }
        };

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(classify)?;
        debug!(bytes = body.len(), "Fetched page");
        Ok(body)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves canned pages; anything else is a 404.
    #[derive(Default)]
    pub(crate) struct StaticFetcher {
        pages: HashMap<String, String>,
        pub(crate) requests: Mutex<Vec<String>>,
    }

    impl StaticFetcher {
        pub(crate) fn with_page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), body.to_string());
            self
        }

        pub(crate) fn requests_for(&self, url: &str) -> usize {
            self.requests.lock().unwrap().iter().filter(|u| *u == url).count()
        }

        pub(crate) fn total_requests(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl PageFetcher for StaticFetcher {
        async fn fetch(&self, url: &str, _timeout: Duration) -> Result<String, FetchError> {
            self.requests.lock().unwrap().push(url.to_string());
            self.pages.get(url).cloned().ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    /// Serves a [`StaticFetcher`]'s pages after a delay, recording the
    /// largest number of requests ever in flight at once.
    pub(crate) struct SlowFetcher {
        pub(crate) pages: StaticFetcher,
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SlowFetcher {
        pub(crate) fn new(pages: StaticFetcher, delay: Duration) -> Self {
            Self {
                pages,
                delay,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        pub(crate) fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    impl PageFetcher for SlowFetcher {
        async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let page = self.pages.fetch(url, timeout).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            page
        }
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client("blog_pulse-test", 4).is_ok());
    }

    #[tokio::test]
    async fn test_static_fetcher_404s_unknown_pages() {
        let fetcher = StaticFetcher::default().with_page("https://a.example/", "<p>hi</p>");
        let timeout = Duration::from_secs(1);
        assert_eq!(fetcher.fetch("https://a.example/", timeout).await.unwrap(), "<p>hi</p>");
        let err = fetcher.fetch("https://b.example/", timeout).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
        assert_eq!(fetcher.total_requests(), 2);
    }

    #[tokio::test]
    async fn test_slow_fetcher_counts_overlapping_requests() {
        let fetcher = SlowFetcher::new(
            StaticFetcher::default().with_page("https://a.example/", "a"),
            Duration::from_millis(10),
        );
        let timeout = Duration::from_secs(1);
        let (a, b) = tokio::join!(
            fetcher.fetch("https://a.example/", timeout),
            fetcher.fetch("https://a.example/", timeout)
        );
        assert_eq!(a.unwrap(), "a");
        assert_eq!(b.unwrap(), "a");
        assert_eq!(fetcher.peak(), 2);
    }
}
