//! CDX index records.
//!
//! The CDX server answers with plain text, one capture per line, seven fields
//! separated by single spaces:
//!
//! ```text
//! urlkey timestamp original mimetype statuscode digest length
//! com,example)/ 20201126185327 https://example.com/ text/html 200 3I42H3S6NNFQ2MSVX7XZKYAYSCX5QBYJ 1256
//! ```
//!
//! - `urlkey`: the captured URI in SURT (Sort-friendly URI Reordering Transform) form,
//!   `<scheme://(tld,domain,)/path?query>`
//! - `timestamp`: `YYYYMMDDhhmmss`
//! - `mimetype`, `statuscode`: as served at crawl time; the status may be `-` or
//!   other non-numeric values for revisits and redirects
//! - `digest`: base32 SHA-1 of the payload
//! - `length`: bytes in the WARC file

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::timestamp::parse_wayback_timestamp;
use crate::{Error, Result};

/// Number of fields in a CDX line.
pub const FIELD_COUNT: usize = 7;

/// Shortest possible record: a 14-character timestamp plus a 32-character digest.
pub const MIN_RECORD_LEN: usize = 46;

/// One entry of the CDX index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct IndexRecord {
    /// SURT form of the captured URL.
    pub urlkey: String,
    /// Capture time, `YYYYMMDDhhmmss`.
    pub timestamp: String,
    /// The URL as it was captured.
    pub original: String,
    /// Content type at crawl time.
    pub mimetype: String,
    /// HTTP status at crawl time, possibly a non-numeric sentinel.
    pub statuscode: String,
    /// Payload digest.
    pub digest: String,
    /// Record length in the WARC file.
    pub length: String,
}

impl IndexRecord {
    /// Parse one CDX line.
    ///
    /// The line must be at least [`MIN_RECORD_LEN`] characters and split into exactly
    /// [`FIELD_COUNT`] fields on single spaces; anything else is a protocol error.
    pub fn parse(line: &str) -> Result<Self> {
        let char_count = line.chars().count();
        if char_count < MIN_RECORD_LEN {
            return Err(Error::RecordTooShort {
                length: char_count,
                minimum: MIN_RECORD_LEN,
                line: line.to_string(),
            });
        }

        let fields: Vec<&str> = line.split(' ').collect();
        let [urlkey, timestamp, original, mimetype, statuscode, digest, length] = fields.as_slice()
        else {
            return Err(Error::RecordFieldCount {
                expected: FIELD_COUNT,
                found: fields.len(),
                line: line.to_string(),
            });
        };

        Ok(Self {
            urlkey: (*urlkey).to_string(),
            timestamp: (*timestamp).to_string(),
            original: (*original).to_string(),
            mimetype: (*mimetype).to_string(),
            statuscode: (*statuscode).to_string(),
            digest: (*digest).to_string(),
            length: (*length).to_string(),
        })
    }

    /// Archive URL of this capture: `<archive_base>/web/<timestamp>/<original>`.
    #[must_use]
    pub fn archive_url(&self, archive_base: &str) -> String {
        format!(
            "{}/web/{}/{}",
            archive_base.trim_end_matches('/'),
            self.timestamp,
            self.original
        )
    }

    /// Capture time as a UTC datetime.
    pub fn captured_at(&self) -> Result<DateTime<Utc>> {
        parse_wayback_timestamp(&self.timestamp)
    }
}

impl FromStr for IndexRecord {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Renders the record exactly as the CDX server sent it.
impl fmt::Display for IndexRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {}",
            self.urlkey,
            self.timestamp,
            self.original,
            self.mimetype,
            self.statuscode,
            self.digest,
            self.length
        )
    }
}
