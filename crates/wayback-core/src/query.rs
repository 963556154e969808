//! Validated CDX query configuration.
//!
//! A [`QuerySpec`] is built once through [`QueryBuilder`] and never changes
//! afterwards. All user input is checked in [`QueryBuilder::build`], so a malformed
//! filter or an illegal option combination fails before any request is sent.
//!
//! ```rust
//! use wayback_core::{MatchType, Pagination, QuerySpec};
//!
//! let spec = QuerySpec::builder("archive.org")
//!     .from("2010")
//!     .to("2012")
//!     .match_type("prefix")
//!     .filter("statuscode:200")
//!     .filter("!mimetype:image/.*")
//!     .collapse("digest")
//!     .build()?;
//!
//! assert_eq!(spec.match_type(), Some(MatchType::Prefix));
//! assert_eq!(spec.filters().len(), 2);
//! assert_eq!(spec.pagination(), Pagination::Auto);
//! # Ok::<(), wayback_core::Error>(())
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::timestamp::validate_bound;
use crate::{Error, Result};

#[allow(clippy::expect_used)]
static FILTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^(!?)(urlkey|timestamp|original|mimetype|statuscode|digest|length):(.*)$")
        .expect("filter regex is valid")
});

#[allow(clippy::expect_used)]
static COLLAPSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(urlkey|timestamp|original|mimetype|statuscode|digest|length)(?::([0-9]{1,99}))?$")
        .expect("collapse regex is valid")
});

/// A CDX record field usable in filters and collapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    /// SURT form of the URL.
    UrlKey,
    /// Capture timestamp.
    Timestamp,
    /// Original URL.
    Original,
    /// MIME type.
    MimeType,
    /// HTTP status code.
    StatusCode,
    /// Payload digest.
    Digest,
    /// Record length.
    Length,
}

impl Field {
    /// Wire name of the field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UrlKey => "urlkey",
            Self::Timestamp => "timestamp",
            Self::Original => "original",
            Self::MimeType => "mimetype",
            Self::StatusCode => "statuscode",
            Self::Digest => "digest",
            Self::Length => "length",
        }
    }

    fn from_wire(name: &str) -> Option<Self> {
        Some(match name {
            "urlkey" => Self::UrlKey,
            "timestamp" => Self::Timestamp,
            "original" => Self::Original,
            "mimetype" => Self::MimeType,
            "statuscode" => Self::StatusCode,
            "digest" => Self::Digest,
            "length" => Self::Length,
            _ => return None,
        })
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `[!]field:regex` filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Filter {
    /// Keep records that do *not* match.
    pub negated: bool,
    /// Field the pattern applies to.
    pub field: Field,
    /// Pattern, passed to the server verbatim.
    pub pattern: String,
}

impl FromStr for Filter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidFilter {
            filter: s.to_string(),
        };
        let caps = FILTER_RE.captures(s).ok_or_else(invalid)?;
        let field = Field::from_wire(&caps[2]).ok_or_else(invalid)?;

        Ok(Self {
            negated: !caps[1].is_empty(),
            field,
            pattern: caps[3].to_string(),
        })
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bang = if self.negated { "!" } else { "" };
        write!(f, "{bang}{}:{}", self.field, self.pattern)
    }
}

/// A `field[:N]` collapse: drop adjacent records whose field (or its first `N`
/// characters) repeats.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Collapse {
    /// Field compared between adjacent records.
    pub field: Field,
    /// Optional prefix length, kept as the digits the user gave.
    pub prefix: Option<String>,
}

impl FromStr for Collapse {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidCollapse {
            collapse: s.to_string(),
        };
        let caps = COLLAPSE_RE.captures(s).ok_or_else(invalid)?;
        let field = Field::from_wire(&caps[1]).ok_or_else(invalid)?;

        Ok(Self {
            field,
            prefix: caps.get(2).map(|m| m.as_str().to_string()),
        })
    }
}

impl fmt::Display for Collapse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(n) => write!(f, "{}:{n}", self.field),
            None => write!(f, "{}", self.field),
        }
    }
}

/// How the target URL is matched against the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// Only the exact URL.
    Exact,
    /// Every URL under the given path.
    Prefix,
    /// Every URL on the host.
    Host,
    /// Every URL on the host and its subdomains.
    Domain,
}

impl MatchType {
    /// Wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Prefix => "prefix",
            Self::Host => "host",
            Self::Domain => "domain",
        }
    }
}

impl FromStr for MatchType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "exact" => Ok(Self::Exact),
            "prefix" => Ok(Self::Prefix),
            "host" => Ok(Self::Host),
            "domain" => Ok(Self::Domain),
            other => Err(Error::InvalidMatchType {
                value: other.to_string(),
            }),
        }
    }
}

/// Result ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Index order (ascending urlkey, then timestamp).
    Default,
    /// Nearest to the `closest` anchor first.
    Closest,
    /// Descending.
    Reverse,
}

impl SortOrder {
    /// Wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Closest => "closest",
            Self::Reverse => "reverse",
        }
    }
}

impl FromStr for SortOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "default" => Ok(Self::Default),
            "closest" => Ok(Self::Closest),
            "reverse" => Ok(Self::Reverse),
            other => Err(Error::InvalidSort(format!(
                "'{other}' is not an allowed sort, use one of 'default', 'closest' or 'reverse'"
            ))),
        }
    }
}

/// Which retrieval strategy the index engine uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Pagination {
    /// Let the engine decide from the query shape and the reported page count.
    #[default]
    Auto,
    /// Enumerate pages `0..total_pages`.
    Pages,
    /// Follow resume keys until the server stops sending one.
    ResumeKey,
}

/// Immutable, validated CDX query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    url: String,
    from: Option<String>,
    to: Option<String>,
    filters: Vec<Filter>,
    collapses: Vec<Collapse>,
    match_type: Option<MatchType>,
    sort: Option<SortOrder>,
    closest: Option<String>,
    limit: Option<i64>,
    gzip: Option<bool>,
    pagination: Pagination,
}

impl QuerySpec {
    /// Start building a query for `url`.
    pub fn builder(url: impl Into<String>) -> QueryBuilder {
        QueryBuilder::new(url)
    }

    /// Normalized target URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Lower time bound.
    #[must_use]
    pub fn from(&self) -> Option<&str> {
        self.from.as_deref()
    }

    /// Upper time bound.
    #[must_use]
    pub fn to(&self) -> Option<&str> {
        self.to.as_deref()
    }

    /// Filters in the order given.
    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Collapses in the order given.
    #[must_use]
    pub fn collapses(&self) -> &[Collapse] {
        &self.collapses
    }

    /// Match type, if any.
    #[must_use]
    pub const fn match_type(&self) -> Option<MatchType> {
        self.match_type
    }

    /// Sort order, if any.
    #[must_use]
    pub const fn sort(&self) -> Option<SortOrder> {
        self.sort
    }

    /// Anchor for closest sorting.
    #[must_use]
    pub fn closest(&self) -> Option<&str> {
        self.closest.as_deref()
    }

    /// Explicit page-size limit.
    #[must_use]
    pub const fn limit(&self) -> Option<i64> {
        self.limit
    }

    /// Requested pagination strategy.
    #[must_use]
    pub const fn pagination(&self) -> Pagination {
        self.pagination
    }

    /// Parameters shared by every data request of this query, in wire order.
    pub(crate) fn base_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("url".to_string(), self.url.clone())];

        if let Some(from) = &self.from {
            params.push(("from".to_string(), from.clone()));
        }
        if let Some(to) = &self.to {
            params.push(("to".to_string(), to.clone()));
        }
        for (i, filter) in self.filters.iter().enumerate() {
            params.push((format!("filter{i}"), filter.to_string()));
        }
        for (i, collapse) in self.collapses.iter().enumerate() {
            params.push((format!("collapse{i}"), collapse.to_string()));
        }
        if let Some(match_type) = self.match_type {
            params.push(("matchType".to_string(), match_type.as_str().to_string()));
        }
        if let Some(sort) = self.sort {
            params.push(("sort".to_string(), sort.as_str().to_string()));
        }
        if let Some(closest) = &self.closest {
            params.push(("closest".to_string(), closest.clone()));
        }
        params
    }

    /// Parameters for the `showNumPages` request. Filters and collapses do not
    /// change the page count, so they are left out.
    pub(crate) fn page_count_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("url".to_string(), self.url.clone())];

        if let Some(from) = &self.from {
            params.push(("from".to_string(), from.clone()));
        }
        if let Some(to) = &self.to {
            params.push(("to".to_string(), to.clone()));
        }
        if let Some(match_type) = self.match_type {
            params.push(("matchType".to_string(), match_type.as_str().to_string()));
        }
        params.push(("showNumPages".to_string(), "true".to_string()));
        params
    }

    /// The `gzip` parameter value; plain text unless asked otherwise.
    pub(crate) fn gzip_param(&self) -> (String, String) {
        ("gzip".to_string(), self.gzip.unwrap_or(false).to_string())
    }
}

/// Builder for [`QuerySpec`]. Input is kept raw until [`build`](Self::build).
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    url: String,
    from: Option<String>,
    to: Option<String>,
    filters: Vec<String>,
    collapses: Vec<String>,
    match_type: Option<String>,
    sort: Option<String>,
    closest: Option<String>,
    limit: Option<i64>,
    gzip: Option<bool>,
    pagination: Pagination,
}

impl QueryBuilder {
    /// New builder for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Only captures at or after this 1-14 digit timestamp.
    #[must_use]
    pub fn from(mut self, timestamp: impl Into<String>) -> Self {
        self.from = Some(timestamp.into());
        self
    }

    /// Only captures at or before this 1-14 digit timestamp.
    #[must_use]
    pub fn to(mut self, timestamp: impl Into<String>) -> Self {
        self.to = Some(timestamp.into());
        self
    }

    /// Add a `[!]field:regex` filter.
    #[must_use]
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filters.push(filter.into());
        self
    }

    /// Add several filters.
    #[must_use]
    pub fn filters<I, S>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters.extend(filters.into_iter().map(Into::into));
        self
    }

    /// Add a `field[:N]` collapse.
    #[must_use]
    pub fn collapse(mut self, collapse: impl Into<String>) -> Self {
        self.collapses.push(collapse.into());
        self
    }

    /// Add several collapses.
    #[must_use]
    pub fn collapses<I, S>(mut self, collapses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.collapses.extend(collapses.into_iter().map(Into::into));
        self
    }

    /// Set the match type (`exact`, `prefix`, `host`, `domain`).
    #[must_use]
    pub fn match_type(mut self, match_type: impl Into<String>) -> Self {
        self.match_type = Some(match_type.into());
        self
    }

    /// Set the sort order (`default`, `closest`, `reverse`).
    #[must_use]
    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    /// Anchor for closest sorting; implies `sort=closest` when no sort is set.
    #[must_use]
    pub fn closest(mut self, timestamp: impl Into<String>) -> Self {
        self.closest = Some(timestamp.into());
        self
    }

    /// Records per response. Negative values count from the end.
    #[must_use]
    pub const fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Ask the server for gzip-compressed CDX output.
    #[must_use]
    pub const fn gzip(mut self, gzip: bool) -> Self {
        self.gzip = Some(gzip);
        self
    }

    /// Choose the retrieval strategy.
    #[must_use]
    pub const fn pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    /// Validate everything and produce the query.
    pub fn build(self) -> Result<QuerySpec> {
        let url = normalize_target(&self.url);

        let filters = self
            .filters
            .iter()
            .map(|f| f.parse::<Filter>())
            .collect::<Result<Vec<_>>>()?;
        let collapses = self
            .collapses
            .iter()
            .map(|c| c.parse::<Collapse>())
            .collect::<Result<Vec<_>>>()?;

        let match_type = self
            .match_type
            .as_deref()
            .map(str::parse::<MatchType>)
            .transpose()?;
        if match_type.is_some() && url.contains('*') {
            return Err(Error::MatchTypeWithWildcard { url });
        }

        let from = self.from.as_deref().map(validate_bound).transpose()?;
        let to = self.to.as_deref().map(validate_bound).transpose()?;
        let closest = self.closest.as_deref().map(validate_bound).transpose()?;

        let sort = match (self.sort.as_deref().map(str::parse::<SortOrder>).transpose()?, &closest) {
            (None, Some(_)) => Some(SortOrder::Closest),
            (Some(SortOrder::Closest), None) => {
                return Err(Error::InvalidSort(
                    "sort 'closest' requires a closest timestamp".to_string(),
                ));
            },
            (Some(sort), Some(_)) if sort != SortOrder::Closest => {
                return Err(Error::InvalidSort(format!(
                    "a closest timestamp can not be combined with sort '{}'",
                    sort.as_str()
                )));
            },
            (sort, _) => sort,
        };

        Ok(QuerySpec {
            url,
            from,
            to,
            filters,
            collapses,
            match_type,
            sort,
            closest,
            limit: self.limit,
            gzip: self.gzip,
            pagination: self.pagination,
        })
    }
}

/// Trim a target URL and escape embedded spaces.
pub(crate) fn normalize_target(url: &str) -> String {
    url.trim().replace(' ', "%20")
}
