//! Capture orchestrator for the Save Page Now endpoint.
//!
//! A capture is triggered with `GET <save>/<url>`. The endpoint has no body
//! contract: the resulting archive URL has to be recovered from response headers
//! or from the final redirect target, and it frequently takes several attempts
//! before any of them carries it. [`CaptureClient::capture`] drives that loop:
//!
//! 1. sleep before every attempt but the first ([`retry_delay`])
//! 2. send the request; 429 and 509 end the loop immediately
//! 3. look for the archive URL in `Content-Location`, then the memento `Link`,
//!    then `X-Cache-Key`, then the response URL ([`extract_archive_url`])
//! 4. give up with [`Error::MaximumRetriesExceeded`] after `max_tries` misses
//!
//! The service often answers with an existing capture instead of making a new
//! one. [`CaptureResult::is_cached`] reports that: the archive timestamp is older
//! than the moment the request was created.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::clock::{Clock, Sleeper, SystemClock, TokioSleeper};
use crate::config::Config;
use crate::error::CaptureDiagnostics;
use crate::query::normalize_target;
use crate::timestamp::parse_wayback_timestamp;
use crate::transport::{HttpResponse, HttpTransport, Transport};
use crate::{Error, Result};

/// Rate limit status of the capture endpoint.
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Concurrent session limit status of the capture endpoint.
pub const STATUS_SESSION_LIMIT: u16 = 509;

#[allow(clippy::expect_used)]
static CONTENT_LOCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://[^/]+)?/web/([0-9]{14})/(.+)$").expect("content-location regex is valid")
});

#[allow(clippy::expect_used)]
static LINK_ENTRY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<([^>]*)>\s*;\s*rel="([^"]*)""#).expect("link regex is valid")
});

/// Cache keys end in a two-letter country code that is not part of the URL.
#[allow(clippy::expect_used)]
static CACHE_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/web/([0-9]{14})/(.+)[A-Z]{2}$").expect("cache-key regex is valid")
});

#[allow(clippy::expect_used)]
static ARCHIVE_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/web/([0-9]{14})/(.+)$").expect("archive path regex is valid"));

/// Which response signal carried the archive URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveSource {
    /// The `Content-Location` header.
    ContentLocation,
    /// A memento relation in the `Link` header.
    Link,
    /// The `X-Cache-Key` header.
    CacheKey,
    /// The final response URL after redirects.
    ResponseUrl,
}

/// An archive URL recovered from a capture response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMatch {
    /// `<archive_base>/web/<timestamp>/<url>`.
    pub archive_url: String,
    /// The 14-digit timestamp embedded in the URL.
    pub timestamp: String,
    /// Signal the URL came from.
    pub source: ArchiveSource,
}

/// One capture to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    /// Normalized target URL.
    pub url: String,
    /// `User-Agent` for the capture requests.
    pub user_agent: String,
    /// Attempts before giving up, at least one.
    pub max_tries: u32,
    /// When the request was created; older archive timestamps mean a cached capture.
    pub created_at: DateTime<Utc>,
}

impl CaptureRequest {
    /// Build a request, normalizing `url` and validating `max_tries`.
    pub fn new(
        url: &str,
        user_agent: impl Into<String>,
        max_tries: u32,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        if max_tries < 1 {
            return Err(Error::InvalidMaxTries(max_tries));
        }
        Ok(Self {
            url: normalize_target(url),
            user_agent: user_agent.into(),
            max_tries,
            created_at,
        })
    }
}

/// Outcome of a successful capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureResult {
    /// Archive URL of the capture.
    pub archive_url: String,
    /// Capture time parsed from the archive URL.
    pub timestamp: DateTime<Utc>,
    /// The service returned an existing capture instead of making a new one.
    pub is_cached: bool,
    /// Signal the archive URL was read from.
    pub source: ArchiveSource,
    /// Status of the final response.
    pub status: u16,
    /// Final response URL after redirects.
    pub response_url: String,
    /// Headers of the final response.
    pub headers: Vec<(String, String)>,
    /// Attempts made, including the successful one.
    pub attempts: u32,
}

/// Client for the Save Page Now endpoint.
#[derive(Clone)]
pub struct CaptureClient {
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
    clock: Arc<dyn Clock>,
    save_endpoint: String,
    archive_base: String,
    user_agent: String,
    max_tries: u32,
}

impl std::fmt::Debug for CaptureClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureClient")
            .field("save_endpoint", &self.save_endpoint)
            .field("archive_base", &self.archive_base)
            .field("max_tries", &self.max_tries)
            .finish_non_exhaustive()
    }
}

impl CaptureClient {
    /// Client using HTTP, tokio sleeps and the system clock.
    pub fn new(config: &Config) -> Result<Self> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::with_parts(
            Arc::new(transport),
            Arc::new(TokioSleeper),
            Arc::new(SystemClock),
            config,
        ))
    }

    /// Client using the given transport, sleeper and clock.
    pub fn with_parts(
        transport: Arc<dyn Transport>,
        sleeper: Arc<dyn Sleeper>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        Self {
            transport,
            sleeper,
            clock,
            save_endpoint: config.endpoints.save.trim_end_matches('/').to_string(),
            archive_base: config.archive_base().to_string(),
            user_agent: config.client.user_agent.clone(),
            max_tries: config.capture.max_tries,
        }
    }

    /// A request for `url` stamped with the current time and configured defaults.
    pub fn request(&self, url: &str) -> Result<CaptureRequest> {
        CaptureRequest::new(url, self.user_agent.as_str(), self.max_tries, self.clock.now())
    }

    /// Capture `url` with the configured defaults.
    pub async fn save(&self, url: &str) -> Result<CaptureResult> {
        let request = self.request(url)?;
        self.capture(&request).await
    }

    /// Run the capture loop for `request`.
    #[instrument(skip_all, fields(url = %request.url, max_tries = request.max_tries))]
    pub async fn capture(&self, request: &CaptureRequest) -> Result<CaptureResult> {
        if request.max_tries < 1 {
            return Err(Error::InvalidMaxTries(request.max_tries));
        }

        let save_url = format!("{}/{}", self.save_endpoint, request.url);
        let mut tries = 0;

        loop {
            if tries >= 1 {
                let delay = retry_delay(tries);
                debug!(tries, ?delay, "Waiting before next capture attempt");
                self.sleeper.sleep(delay).await;
            }

            debug!(attempt = tries + 1, "Requesting capture");
            let response = self.transport.get(&save_url, &request.user_agent).await?;

            match response.status {
                STATUS_TOO_MANY_REQUESTS => {
                    return Err(Error::TooManyRequests {
                        url: request.url.clone(),
                    });
                },
                STATUS_SESSION_LIMIT => {
                    return Err(Error::SessionLimit {
                        url: request.url.clone(),
                    });
                },
                _ => {},
            }

            if let Some(found) = extract_archive_url(&response, &self.archive_base) {
                return self.resolve(request, found, response, tries + 1);
            }

            tries += 1;
            debug!(tries, status = response.status, "No archive URL in capture response");
            if tries >= request.max_tries {
                return Err(Error::MaximumRetriesExceeded {
                    diagnostics: Box::new(CaptureDiagnostics {
                        url: request.url.clone(),
                        tries,
                        status: response.status,
                        response_url: response.url,
                        headers: response.headers,
                    }),
                });
            }
        }
    }

    fn resolve(
        &self,
        request: &CaptureRequest,
        found: ArchiveMatch,
        response: HttpResponse,
        attempts: u32,
    ) -> Result<CaptureResult> {
        let timestamp = parse_wayback_timestamp(&found.timestamp)
            .map_err(|_| Error::InvalidArchiveUrl(found.archive_url.clone()))?;
        let is_cached = timestamp < request.created_at.trunc_subsecs(0);

        if is_cached {
            warn!(
                archive_url = %found.archive_url,
                "Service returned an existing capture instead of a new one"
            );
        } else {
            info!(archive_url = %found.archive_url, source = ?found.source, attempts, "Captured");
        }

        Ok(CaptureResult {
            archive_url: found.archive_url,
            timestamp,
            is_cached,
            source: found.source,
            status: response.status,
            response_url: response.url,
            headers: response.headers,
            attempts,
        })
    }
}

/// Pause before the next attempt after `tries` failed ones: 10s on every third, else 5s.
#[must_use]
pub const fn retry_delay(tries: u32) -> Duration {
    if tries % 3 == 0 {
        Duration::from_secs(10)
    } else {
        Duration::from_secs(5)
    }
}

/// Recover the archive URL from a capture response.
///
/// Signals are tried in a fixed order and the first hit wins. The result is
/// always rebuilt on `archive_base`, whatever host the signal named.
#[must_use]
pub fn extract_archive_url(response: &HttpResponse, archive_base: &str) -> Option<ArchiveMatch> {
    let archive_base = archive_base.trim_end_matches('/');
    let build = |timestamp: &str, rest: &str, source| ArchiveMatch {
        archive_url: format!("{archive_base}/web/{timestamp}/{rest}"),
        timestamp: timestamp.to_string(),
        source,
    };

    if let Some(caps) = response
        .header("content-location")
        .and_then(|value| CONTENT_LOCATION_RE.captures(value.trim()))
    {
        return Some(build(&caps[1], &caps[2], ArchiveSource::ContentLocation));
    }

    let memento = memento_link(response);
    if let Some(caps) = memento.as_deref().and_then(|m| ARCHIVE_PATH_RE.captures(m)) {
        return Some(build(&caps[1], &caps[2], ArchiveSource::Link));
    }

    if let Some(caps) = response
        .header("x-cache-key")
        .and_then(|value| CACHE_KEY_RE.captures(value.trim()))
    {
        return Some(build(&caps[1], &caps[2], ArchiveSource::CacheKey));
    }

    ARCHIVE_PATH_RE
        .captures(response.url.trim())
        .map(|caps| build(&caps[1], &caps[2], ArchiveSource::ResponseUrl))
}

/// Target of the best memento relation across all `Link` headers.
///
/// `rel="memento"` wins over `rel="last memento"`, which wins over any other
/// memento relation. Only targets shaped like archive URLs are considered.
fn memento_link(response: &HttpResponse) -> Option<String> {
    response
        .headers
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case("link"))
        .flat_map(|(_, value)| LINK_ENTRY_RE.captures_iter(value))
        .filter_map(|caps| {
            let target = caps[1].trim();
            let rel = caps[2].trim();
            let rank = match rel {
                "memento" => 0,
                r if r.split_whitespace().any(|t| t == "memento") && r.contains("last") => 1,
                r if r.split_whitespace().any(|t| t == "memento") => 2,
                _ => return None,
            };
            ARCHIVE_PATH_RE
                .is_match(target)
                .then(|| (rank, target.to_string()))
        })
        .min_by_key(|(rank, _)| *rank)
        .map(|(_, target)| target)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    const BASE: &str = "https://web.archive.org";

    fn response(headers: &[(&str, &str)], url: &str) -> HttpResponse {
        HttpResponse {
            status: 200,
            url: url.to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            body: String::new(),
        }
    }

    #[test]
    fn test_retry_delay_schedule() {
        let delays: Vec<u64> = (1..=7).map(|t| retry_delay(t).as_secs()).collect();
        assert_eq!(delays, [5, 5, 10, 5, 5, 10, 5]);
    }

    #[test]
    fn test_content_location_wins() {
        let r = response(
            &[
                ("Content-Location", "/web/20201126185327/https://example.com/et-al"),
                (
                    "Link",
                    "<https://web.archive.org/web/20190101000000/https://example.com/>; rel=\"memento\"",
                ),
                ("X-Cache-Key", "httpsweb.archive.org/web/20180101000000/https://example.com/US"),
            ],
            "https://web.archive.org/web/20170101000000/https://example.com/",
        );

        let found = extract_archive_url(&r, BASE).unwrap();
        assert_eq!(found.source, ArchiveSource::ContentLocation);
        assert_eq!(
            found.archive_url,
            "https://web.archive.org/web/20201126185327/https://example.com/et-al"
        );
        assert_eq!(found.timestamp, "20201126185327");
    }

    #[test]
    fn test_content_location_must_have_archive_shape() {
        let r = response(&[("Content-Location", "/save/https://example.com")], "https://web.archive.org/save/x");
        assert!(extract_archive_url(&r, BASE).is_none());
    }

    #[test]
    fn test_link_prefers_exact_memento() {
        let link = "<https://example.com/>; rel=\"original\", \
                    <https://web.archive.org/web/timemap/link/https://example.com/>; rel=\"timemap\"; type=\"application/link-format\", \
                    <https://web.archive.org/web/20100101000000/https://example.com/>; rel=\"first memento\"; datetime=\"Fri, 01 Jan 2010 00:00:00 GMT\", \
                    <https://web.archive.org/web/20201126000000/https://example.com/>; rel=\"last memento\"; datetime=\"Thu, 26 Nov 2020 00:00:00 GMT\", \
                    <https://web.archive.org/web/20201126185327/https://example.com/>; rel=\"memento\"; datetime=\"Thu, 26 Nov 2020 18:53:27 GMT\"";
        let r = response(&[("Link", link)], "https://web.archive.org/save/https://example.com/");

        let found = extract_archive_url(&r, BASE).unwrap();
        assert_eq!(found.source, ArchiveSource::Link);
        assert_eq!(found.timestamp, "20201126185327");
    }

    #[test]
    fn test_link_falls_back_to_last_memento() {
        let link = "<https://web.archive.org/web/20100101000000/https://example.com/>; rel=\"first memento\", \
                    <https://web.archive.org/web/20201126000000/https://example.com/>; rel=\"last memento\"";
        let r = response(&[("link", link)], "");
        let found = extract_archive_url(&r, BASE).unwrap();
        assert_eq!(found.timestamp, "20201126000000");
    }

    #[test]
    fn test_cache_key_strips_country_code() {
        let r = response(
            &[("X-Cache-Key", "httpsweb.archive.org/web/20201126185327/https://example.com/et-alUS")],
            "https://web.archive.org/save/https://example.com/et-al",
        );
        let found = extract_archive_url(&r, BASE).unwrap();
        assert_eq!(found.source, ArchiveSource::CacheKey);
        assert_eq!(
            found.archive_url,
            "https://web.archive.org/web/20201126185327/https://example.com/et-al"
        );
    }

    #[test]
    fn test_response_url_is_last_resort() {
        let r = response(
            &[("Server", "nginx")],
            "https://web.archive.org/web/20201126185327/https://example.com/",
        );
        let found = extract_archive_url(&r, "http://127.0.0.1:8080/").unwrap();
        assert_eq!(found.source, ArchiveSource::ResponseUrl);
        assert_eq!(
            found.archive_url,
            "http://127.0.0.1:8080/web/20201126185327/https://example.com/"
        );
    }

    #[test]
    fn test_no_signal() {
        let r = response(
            &[("Server", "nginx")],
            "https://web.archive.org/save/https://example.com/",
        );
        assert!(extract_archive_url(&r, BASE).is_none());
    }

    #[test]
    fn test_request_validates_and_normalizes() {
        let now = Utc::now();
        assert!(matches!(
            CaptureRequest::new("example.com", "ua", 0, now),
            Err(Error::InvalidMaxTries(0))
        ));

        let request = CaptureRequest::new("  https://example.com/a b ", "ua", 1, now).unwrap();
        assert_eq!(request.url, "https://example.com/a%20b");
    }
}
