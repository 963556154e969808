//! Error types and handling for wayback-core operations.
//!
//! Every public operation returns [`Result<T>`] with a typed [`Error`]. Variants are
//! grouped into categories so callers can branch on the kind of failure rather than
//! on message text:
//!
//! - **config**: malformed filter/collapse/match-type/sort/timestamp input, detected
//!   while a [`QuerySpec`](crate::QuerySpec) or capture request is being built and
//!   before any network call
//! - **protocol**: the service answered, but not in a shape we can use (a CDX line
//!   without 7 fields, an unparseable page count, no archive URL after every attempt)
//! - **policy**: the service refused on purpose (robots.txt exclusion, rate limit,
//!   concurrent session limit); never retried
//! - **transport**: connection failures and 5xx responses that outlived the
//!   transport's own retry budget
//!
//! ```rust
//! use wayback_core::{Error, QuerySpec};
//!
//! let err = QuerySpec::builder("example.com")
//!     .filter("bogus")
//!     .build()
//!     .unwrap_err();
//!
//! assert!(matches!(err, Error::InvalidFilter { .. }));
//! assert_eq!(err.category(), "config");
//! assert!(!err.is_recoverable());
//! ```

use std::fmt;

use thiserror::Error;

/// Diagnostic payload attached to [`Error::MaximumRetriesExceeded`].
///
/// The capture endpoint reports its result only through headers and redirects, so
/// when no archive URL can be found the raw response is the only useful evidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureDiagnostics {
    /// Target URL the capture was requested for.
    pub url: String,
    /// Number of capture attempts made.
    pub tries: u32,
    /// HTTP status of the last response.
    pub status: u16,
    /// Final URL of the last response, after redirects.
    pub response_url: String,
    /// Headers of the last response, in the order the server sent them.
    pub headers: Vec<(String, String)>,
}

impl fmt::Display for CaptureDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "tried {} times but failed to save and retrieve the archive for '{}'",
            self.tries, self.url
        )?;
        writeln!(f, "Response status: {}", self.status)?;
        writeln!(f, "Response URL: {}", self.response_url)?;
        write!(f, "Response headers:")?;
        for (name, value) in &self.headers {
            write!(f, "\n  {name}: {value}")?;
        }
        Ok(())
    }
}

/// The main error type for wayback-core operations.
///
/// ## Display vs Debug
///
/// - `Display` provides user-facing messages (the retry-exhaustion variant prints its
///   whole diagnostic payload, since that is what a human needs to debug it)
/// - `Debug` includes the structured fields and source chain
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed while reading or writing configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request could not be completed (connection refused, DNS, timeout, TLS).
    ///
    /// Connection and timeout errors are recoverable; builder and URL errors are not.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server kept answering with a retryable 5xx status until the transport
    /// ran out of attempts.
    #[error("Giving up on '{url}' after {attempts} attempts (last status {status})")]
    RetriesExhausted {
        /// Request URL.
        url: String,
        /// Total requests made, including the first.
        attempts: u32,
        /// Status code of the final response.
        status: u16,
    },

    /// Configuration file or value is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A CDX filter does not follow `[!]field:regex`.
    #[error("Filter '{filter}' does not follow the CDX filter syntax `[!]field:regex`")]
    InvalidFilter {
        /// The rejected filter expression.
        filter: String,
    },

    /// A CDX collapse does not follow `field[:N]`.
    #[error("Collapse '{collapse}' does not follow the CDX collapse syntax `field[:N]`")]
    InvalidCollapse {
        /// The rejected collapse expression.
        collapse: String,
    },

    /// Match type is not one of `exact`, `prefix`, `host` or `domain`.
    #[error("'{value}' is not an allowed match type, use one of 'exact', 'prefix', 'host' or 'domain'")]
    InvalidMatchType {
        /// The rejected value.
        value: String,
    },

    /// A match type was combined with a wildcard in the target URL.
    #[error("Can not use a wildcard in the URL '{url}' together with a match type")]
    MatchTypeWithWildcard {
        /// Target URL containing `*`.
        url: String,
    },

    /// Sort is not one of `default`, `closest` or `reverse`, or `closest` lacks an anchor.
    #[error("Invalid sort: {0}")]
    InvalidSort(String),

    /// A timestamp bound is not a 1 to 14 digit Wayback timestamp.
    #[error("Invalid Wayback timestamp '{0}'")]
    InvalidTimestamp(String),

    /// `max_tries` for a capture must be at least one.
    #[error("max_tries must be positive, got {0}")]
    InvalidMaxTries(u32),

    /// A CDX line did not split into exactly seven space-separated fields.
    #[error("CDX record has {found} fields instead of the expected {expected}: '{line}'")]
    RecordFieldCount {
        /// Field count required by the CDX format.
        expected: usize,
        /// Field count actually present.
        found: usize,
        /// The offending raw line.
        line: String,
    },

    /// A CDX line is shorter than a timestamp plus a digest.
    #[error("CDX record is {length} characters, shorter than the minimum of {minimum}: '{line}'")]
    RecordTooShort {
        /// Length of the line in characters.
        length: usize,
        /// Minimum length of a valid record.
        minimum: usize,
        /// The offending raw line.
        line: String,
    },

    /// The `showNumPages` request did not return an integer.
    #[error("CDX server returned an invalid page count: '{0}'")]
    InvalidPageCount(String),

    /// The CDX server answered with a non-success status.
    #[error("CDX server returned HTTP {status} for '{url}': {body}")]
    UnexpectedStatus {
        /// Request URL.
        url: String,
        /// Response status code.
        status: u16,
        /// Response body, for diagnosis.
        body: String,
    },

    /// An archive URL did not contain a parseable 14-digit timestamp.
    #[error("Can not parse a timestamp from archive URL '{0}'")]
    InvalidArchiveUrl(String),

    /// No archive URL could be recovered from any capture response.
    #[error("Maximum capture attempts exceeded: {diagnostics}")]
    MaximumRetriesExceeded {
        /// Raw evidence from the last response.
        diagnostics: Box<CaptureDiagnostics>,
    },

    /// The target is excluded from the archive by the site's robots.txt policy.
    #[error("{url} is excluded from the Wayback Machine by the site's robots.txt policy")]
    BlockedSite {
        /// The blocked request URL.
        url: String,
    },

    /// The capture endpoint answered 429.
    #[error(
        "Can not save '{url}': save request refused by the server (HTTP 429). Save Page Now limits \
         the number of captures per minute, wait a few minutes before trying again"
    )]
    TooManyRequests {
        /// The target URL.
        url: String,
    },

    /// The capture endpoint answered 509.
    #[error("Can not save '{url}': the limit of concurrent capture sessions has been reached (HTTP 509)")]
    SessionLimit {
        /// The target URL.
        url: String,
    },

    /// The index has no record for a closest/oldest/newest lookup.
    #[error("No CDX record found: {0}")]
    NoRecordFound(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl Error {
    /// Check if the error might go away if the whole operation is retried later.
    ///
    /// Only transport failures qualify. Policy errors are deliberately excluded: a
    /// rate limit calls for caller-side backoff and resumption, and an exclusion is
    /// permanent.
    ///
    /// ```rust
    /// use wayback_core::Error;
    ///
    /// let transient = Error::RetriesExhausted {
    ///     url: "https://web.archive.org/cdx/search/cdx".into(),
    ///     attempts: 6,
    ///     status: 503,
    /// };
    /// assert!(transient.is_recoverable());
    ///
    /// let refused = Error::TooManyRequests { url: "https://example.com".into() };
    /// assert!(!refused.is_recoverable());
    /// ```
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect(),
            Self::RetriesExhausted { .. } => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Get the error category as a static identifier.
    ///
    /// - `"config"` - invalid user input or configuration
    /// - `"protocol"` - unusable response shape
    /// - `"policy"` - deliberate refusal by the service
    /// - `"transport"` - network and retryable HTTP failures
    /// - `"not_found"` - lookups with no matching record
    /// - `"io"` - local file access
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Network(_) | Self::RetriesExhausted { .. } => "transport",
            Self::Config(_)
            | Self::InvalidFilter { .. }
            | Self::InvalidCollapse { .. }
            | Self::InvalidMatchType { .. }
            | Self::MatchTypeWithWildcard { .. }
            | Self::InvalidSort(_)
            | Self::InvalidTimestamp(_)
            | Self::InvalidMaxTries(_) => "config",
            Self::RecordFieldCount { .. }
            | Self::RecordTooShort { .. }
            | Self::InvalidPageCount(_)
            | Self::UnexpectedStatus { .. }
            | Self::InvalidArchiveUrl(_)
            | Self::MaximumRetriesExceeded { .. } => "protocol",
            Self::BlockedSite { .. } | Self::TooManyRequests { .. } | Self::SessionLimit { .. } => {
                "policy"
            },
            Self::NoRecordFound(_) => "not_found",
        }
    }
}

/// Convenience type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::unnecessary_wraps)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io;

    fn diagnostics() -> CaptureDiagnostics {
        CaptureDiagnostics {
            url: "https://example.com".to_string(),
            tries: 3,
            status: 200,
            response_url: "https://web.archive.org/save/https://example.com".to_string(),
            headers: vec![
                ("server".to_string(), "nginx".to_string()),
                ("x-app-server".to_string(), "wwwb-app52".to_string()),
            ],
        }
    }

    #[test]
    fn test_error_categories() {
        let cases: Vec<(Error, &str)> = vec![
            (Error::InvalidFilter { filter: "x".into() }, "config"),
            (Error::InvalidCollapse { collapse: "x".into() }, "config"),
            (Error::MatchTypeWithWildcard { url: "*.x".into() }, "config"),
            (Error::InvalidTimestamp("abc".into()), "config"),
            (
                Error::RecordFieldCount {
                    expected: 7,
                    found: 6,
                    line: "a b c".into(),
                },
                "protocol",
            ),
            (Error::InvalidPageCount("nope".into()), "protocol"),
            (
                Error::MaximumRetriesExceeded {
                    diagnostics: Box::new(diagnostics()),
                },
                "protocol",
            ),
            (Error::BlockedSite { url: "x".into() }, "policy"),
            (Error::TooManyRequests { url: "x".into() }, "policy"),
            (Error::SessionLimit { url: "x".into() }, "policy"),
            (
                Error::RetriesExhausted {
                    url: "x".into(),
                    attempts: 6,
                    status: 502,
                },
                "transport",
            ),
            (Error::NoRecordFound("x".into()), "not_found"),
            (Error::Io(io::Error::other("boom")), "io"),
        ];

        for (error, expected) in cases {
            assert_eq!(error.category(), expected, "wrong category for {error:?}");
        }
    }

    #[test]
    fn test_policy_errors_are_not_recoverable() {
        assert!(!Error::BlockedSite { url: "x".into() }.is_recoverable());
        assert!(!Error::TooManyRequests { url: "x".into() }.is_recoverable());
        assert!(!Error::SessionLimit { url: "x".into() }.is_recoverable());
        assert!(
            !Error::RecordFieldCount {
                expected: 7,
                found: 8,
                line: String::new(),
            }
            .is_recoverable()
        );
    }

    #[test]
    fn test_io_recoverability() {
        assert!(Error::Io(io::Error::new(io::ErrorKind::TimedOut, "t")).is_recoverable());
        assert!(Error::Io(io::Error::new(io::ErrorKind::Interrupted, "i")).is_recoverable());
        assert!(!Error::Io(io::Error::new(io::ErrorKind::NotFound, "n")).is_recoverable());
    }

    #[test]
    fn test_retry_exhaustion_message_carries_diagnostics() {
        let error = Error::MaximumRetriesExceeded {
            diagnostics: Box::new(diagnostics()),
        };
        let message = error.to_string();

        assert!(message.contains("tried 3 times"));
        assert!(message.contains("Response URL: https://web.archive.org/save/https://example.com"));
        assert!(message.contains("x-app-server: wwwb-app52"));

        match error {
            Error::MaximumRetriesExceeded { diagnostics } => {
                assert_eq!(diagnostics.headers.len(), 2);
                assert_eq!(diagnostics.status, 200);
            },
            other => panic!("unexpected variant {other:?}"),
        }
    }

    #[test]
    fn test_record_errors_include_line() {
        let error = Error::RecordTooShort {
            length: 12,
            minimum: 46,
            line: "short record".into(),
        };
        let message = error.to_string();
        assert!(message.contains("12"));
        assert!(message.contains("short record"));
    }

    #[test]
    fn test_toml_error_maps_to_config() {
        let err = toml::from_str::<toml::Value>("not = [valid").unwrap_err();
        let error: Error = err.into();
        assert_eq!(error.category(), "config");
    }

    #[test]
    fn test_error_size() {
        // Large payloads are boxed so Result<T> stays cheap to move.
        assert!(std::mem::size_of::<Error>() <= 80);
    }

    proptest! {
        #[test]
        fn test_filter_error_with_arbitrary_input(filter in r".{0,200}") {
            let error = Error::InvalidFilter { filter: filter.clone() };
            let message = error.to_string();
            prop_assert!(message.contains(&filter));
            prop_assert_eq!(error.category(), "config");
        }
    }
}
