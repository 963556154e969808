//! Shared HTTP GET primitive used by the capture and index engines.
//!
//! [`HttpTransport`] keeps one pooled `reqwest` client per engine, retries
//! connection failures and 500/502/503/504 responses with exponential backoff, and
//! rejects robots.txt-excluded content by inspecting the body (the service answers
//! 200 for excluded content, so the status code alone cannot tell).
//!
//! The [`Transport`] trait is the seam the engines are written against; tests plug
//! in scripted implementations.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::USER_AGENT;
use tracing::{debug, warn};

use crate::config::{Config, TransportConfig};
use crate::{Error, Result};

/// Statuses retried by the transport before surfacing an error.
pub const RETRY_STATUSES: [u16; 4] = [500, 502, 503, 504];

/// Body marker the archive emits for robots.txt-excluded content.
pub const BLOCKED_SITE_MARKER: &str = "org.archive.util.io.RuntimeIOException: \
     org.archive.wayback.exception.AdministrativeAccessControlException: Blocked Site Error";

/// A fully read HTTP response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Final URL after redirects.
    pub url: String,
    /// Response headers in wire order; repeated headers appear once per value.
    pub headers: Vec<(String, String)>,
    /// Response body decoded as text.
    pub body: String,
}

impl HttpResponse {
    /// First value of a header, matched case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// HTTP GET with retry, as seen by the engines.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch `url`, identifying as `user_agent`.
    ///
    /// Implementations absorb transient failures and return
    /// [`Error::BlockedSite`] for robots.txt-excluded content.
    async fn get(&self, url: &str, user_agent: &str) -> Result<HttpResponse>;
}

/// [`Transport`] backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    policy: TransportConfig,
}

impl HttpTransport {
    /// Build a transport from the client and retry settings in `config`.
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.client.timeout())
            .user_agent(config.client.user_agent.as_str())
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(Error::Network)?;

        Ok(Self {
            client,
            policy: config.transport.clone(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str, user_agent: &str) -> Result<HttpResponse> {
        let mut retry = 0;

        loop {
            debug!(url, attempt = retry + 1, "GET");
            let sent = self
                .client
                .get(url)
                .header(USER_AGENT, user_agent)
                .send()
                .await;

            let response = match sent {
                Ok(response) => response,
                Err(e) if (e.is_connect() || e.is_timeout()) && retry < self.policy.retries => {
                    let delay = self.policy.backoff(retry);
                    warn!(url, error = %e, ?delay, "Transient network error, retrying");
                    tokio::time::sleep(delay).await;
                    retry += 1;
                    continue;
                },
                Err(e) => return Err(Error::Network(e)),
            };

            let status = response.status().as_u16();
            if RETRY_STATUSES.contains(&status) {
                if retry < self.policy.retries {
                    let delay = self.policy.backoff(retry);
                    warn!(url, status, ?delay, "Server error, retrying");
                    tokio::time::sleep(delay).await;
                    retry += 1;
                    continue;
                }
                return Err(Error::RetriesExhausted {
                    url: url.to_string(),
                    attempts: retry + 1,
                    status,
                });
            }

            let final_url = response.url().to_string();
            let headers = response
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect();
            let body = response.text().await?;

            check_blocked_site(&body, url)?;
            debug!(url, status, bytes = body.len(), "Response received");

            return Ok(HttpResponse {
                status,
                url: final_url,
                headers,
                body,
            });
        }
    }
}

/// Fail with [`Error::BlockedSite`] if `body` carries the exclusion marker.
pub fn check_blocked_site(body: &str, url: &str) -> Result<()> {
    if body.contains(BLOCKED_SITE_MARKER) {
        return Err(Error::BlockedSite {
            url: url.to_string(),
        });
    }
    Ok(())
}

/// Append percent-encoded query parameters to `endpoint`.
///
/// Keys are written as given, so multi-valued parameters keep their positional
/// suffixes (`filter0`, `filter1`, ...). Values are encoded with everything but
/// unreserved characters escaped.
///
/// ```rust
/// use wayback_core::transport::full_url;
///
/// let params = vec![
///     ("url".to_string(), "example.com/a b".to_string()),
///     ("filter0".to_string(), "statuscode:200".to_string()),
/// ];
/// assert_eq!(
///     full_url("https://web.archive.org/cdx/search/cdx", &params),
///     "https://web.archive.org/cdx/search/cdx?url=example.com%2Fa%20b&filter0=statuscode%3A200"
/// );
/// ```
#[must_use]
pub fn full_url(endpoint: &str, params: &[(String, String)]) -> String {
    if params.is_empty() {
        return endpoint.to_string();
    }

    let separator = if endpoint.ends_with('?') || endpoint.ends_with('&') {
        ""
    } else if endpoint.contains('?') {
        "&"
    } else {
        "?"
    };

    let query = params
        .iter()
        .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");

    format!("{endpoint}{separator}{query}")
}
