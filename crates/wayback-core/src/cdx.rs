//! Resumable CDX index query engine.
//!
//! [`CdxClient::snapshots`] returns a [`Snapshots`] cursor that pulls records one
//! at a time and only talks to the server when its buffer runs dry. Memory use is
//! bounded by a single response, no matter how many records the query matches.
//!
//! Two retrieval strategies exist:
//!
//! - **pages**: ask for the page count (`showNumPages=true`), then request
//!   `page=0..total_pages`. Two blank pages in a row end the scan early.
//! - **resume key**: request with `showResumeKey=true`; the server appends a
//!   continuation token after a blank line whenever more data exists.
//!
//! [`Pagination::Auto`] uses pages when the query has no collapses, no sort order,
//! and either no lower bound or an upper bound, falling back to resume keys when
//! the server reports fewer than two pages.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::Stream;
use futures::stream::try_unfold;
use tracing::{debug, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::query::{Pagination, QuerySpec};
use crate::record::IndexRecord;
use crate::timestamp::NearTime;
use crate::transport::{HttpResponse, HttpTransport, Transport, full_url};
use crate::{Error, Result};

/// Blank pages in a row after which a page scan stops.
const MAX_CONSECUTIVE_BLANK_PAGES: u32 = 2;

/// Client for the CDX index search endpoint.
#[derive(Clone)]
pub struct CdxClient {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    endpoint: String,
    user_agent: String,
    archive_base: String,
    default_limit: u64,
}

impl std::fmt::Debug for CdxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdxClient")
            .field("endpoint", &self.endpoint)
            .field("user_agent", &self.user_agent)
            .field("default_limit", &self.default_limit)
            .finish_non_exhaustive()
    }
}

impl CdxClient {
    /// Client using HTTP and the system clock.
    pub fn new(config: &Config) -> Result<Self> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::with_parts(Arc::new(transport), Arc::new(SystemClock), config))
    }

    /// Client using the given transport and clock.
    pub fn with_parts(
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        Self {
            transport,
            clock,
            endpoint: config.endpoints.cdx.clone(),
            user_agent: config.client.user_agent.clone(),
            archive_base: config.archive_base().to_string(),
            default_limit: config.cdx.limit,
        }
    }

    /// Archive base used to build archive URLs for returned records.
    #[must_use]
    pub fn archive_base(&self) -> &str {
        &self.archive_base
    }

    /// Lazily enumerate every record matching `spec`.
    ///
    /// No request is made until the first [`Snapshots::next_record`] call.
    #[must_use]
    pub fn snapshots(&self, spec: &QuerySpec) -> Snapshots {
        Snapshots {
            transport: Arc::clone(&self.transport),
            endpoint: self.endpoint.clone(),
            user_agent: self.user_agent.clone(),
            default_limit: self.default_limit,
            spec: spec.clone(),
            phase: Phase::Start,
            buffer: VecDeque::new(),
            last_request_url: None,
        }
    }

    /// Number of pages the pagination API reports for `spec`.
    pub async fn total_pages(&self, spec: &QuerySpec) -> Result<u64> {
        fetch_total_pages(self.transport.as_ref(), &self.endpoint, &self.user_agent, spec).await
    }

    /// Capture of `url` closest to `when`.
    #[instrument(skip(self))]
    pub async fn near(&self, url: &str, when: NearTime) -> Result<IndexRecord> {
        let anchor = when.resolve(self.clock.now())?;
        let spec = QuerySpec::builder(url)
            .closest(anchor.as_str())
            .limit(1)
            .pagination(Pagination::ResumeKey)
            .build()?;

        debug!(anchor = %anchor, "Looking up closest capture");
        self.snapshots(&spec).next_record().await?.ok_or_else(|| {
            Error::NoRecordFound(format!("no capture of '{}' near {anchor}", spec.url()))
        })
    }

    /// Earliest capture of `url`.
    pub async fn oldest(&self, url: &str) -> Result<IndexRecord> {
        self.near(url, NearTime::default().year(1994).month(1).day(1).hour(0).minute(0))
            .await
    }

    /// Most recent capture of `url`.
    pub async fn newest(&self, url: &str) -> Result<IndexRecord> {
        self.near(url, NearTime::at_unix(self.clock.now().timestamp()))
            .await
    }
}

#[derive(Debug)]
enum Phase {
    Start,
    Pages {
        next_page: u64,
        total_pages: u64,
        blank_streak: u32,
    },
    Resume {
        resume_key: Option<String>,
    },
    Done,
}

/// Pull cursor over the records of one query.
///
/// Records come out in server order. After an error or the last record the cursor
/// is fused and keeps returning `Ok(None)`.
pub struct Snapshots {
    transport: Arc<dyn Transport>,
    endpoint: String,
    user_agent: String,
    default_limit: u64,
    spec: QuerySpec,
    phase: Phase,
    buffer: VecDeque<String>,
    last_request_url: Option<String>,
}

impl std::fmt::Debug for Snapshots {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshots")
            .field("spec", &self.spec)
            .field("phase", &self.phase)
            .field("buffered", &self.buffer.len())
            .field("last_request_url", &self.last_request_url)
            .finish_non_exhaustive()
    }
}

impl Snapshots {
    /// Next record, fetching more data when the buffer is empty.
    pub async fn next_record(&mut self) -> Result<Option<IndexRecord>> {
        loop {
            if let Some(line) = self.buffer.pop_front() {
                return match IndexRecord::parse(&line) {
                    Ok(record) => Ok(Some(record)),
                    Err(e) => {
                        self.finish();
                        Err(e)
                    },
                };
            }

            if matches!(self.phase, Phase::Done) {
                return Ok(None);
            }

            if let Err(e) = self.advance().await {
                self.finish();
                return Err(e);
            }
        }
    }

    /// Adapt the cursor into a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Result<IndexRecord>> {
        try_unfold(self, |mut cursor| async move {
            Ok(cursor.next_record().await?.map(|record| (record, cursor)))
        })
    }

    /// URL of the most recent request, if any was made.
    #[must_use]
    pub fn last_request_url(&self) -> Option<&str> {
        self.last_request_url.as_deref()
    }

    fn finish(&mut self) {
        self.phase = Phase::Done;
        self.buffer.clear();
    }

    /// Run one step of the state machine: pick a strategy or fetch one response.
    async fn advance(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.phase, Phase::Done) {
            Phase::Start => {
                self.phase = self.choose_strategy().await?;
            },
            Phase::Pages {
                next_page,
                total_pages,
                blank_streak,
            } => {
                if next_page >= total_pages {
                    return Ok(());
                }

                let mut params = self.spec.base_params();
                params.push(self.spec.gzip_param());
                params.push(("page".to_string(), next_page.to_string()));
                let body = self.fetch(&params).await?;

                let blank_streak = if body.trim().is_empty() {
                    blank_streak + 1
                } else {
                    self.buffer.extend(data_lines(&body));
                    0
                };

                if blank_streak >= MAX_CONSECUTIVE_BLANK_PAGES {
                    debug!(page = next_page, "Consecutive blank pages, ending scan");
                    return Ok(());
                }

                self.phase = Phase::Pages {
                    next_page: next_page + 1,
                    total_pages,
                    blank_streak,
                };
            },
            Phase::Resume { resume_key } => {
                let limit = self
                    .spec
                    .limit()
                    .map_or_else(|| self.default_limit.to_string(), |l| l.to_string());

                let mut params = self.spec.base_params();
                params.push(("limit".to_string(), limit));
                params.push(self.spec.gzip_param());
                params.push(("showResumeKey".to_string(), "true".to_string()));
                if let Some(key) = resume_key {
                    params.push(("resumeKey".to_string(), key));
                }
                let body = self.fetch(&params).await?;

                let (lines, next_key) = split_resume_key(&body);
                self.buffer.extend(lines);
                if let Some(key) = next_key {
                    debug!(resume_key = %key, "Continuing with resume key");
                    self.phase = Phase::Resume {
                        resume_key: Some(key),
                    };
                }
            },
            Phase::Done => {},
        }
        Ok(())
    }

    async fn choose_strategy(&mut self) -> Result<Phase> {
        let spec = &self.spec;
        let resume = Phase::Resume { resume_key: None };

        match spec.pagination() {
            Pagination::ResumeKey => Ok(resume),
            Pagination::Pages if !spec.collapses().is_empty() => {
                warn!("Collapses are not supported by the pagination API, using resume keys");
                Ok(resume)
            },
            Pagination::Pages => {
                let total_pages = self.page_count().await?;
                Ok(Phase::Pages {
                    next_page: 0,
                    total_pages,
                    blank_streak: 0,
                })
            },
            Pagination::Auto => {
                let pageable = spec.collapses().is_empty()
                    && spec.sort().is_none()
                    && (spec.from().is_none() || spec.to().is_some());
                if !pageable {
                    return Ok(resume);
                }

                let total_pages = self.page_count().await?;
                if total_pages < 2 {
                    debug!(total_pages, "Too few pages to paginate, using resume keys");
                    return Ok(resume);
                }
                Ok(Phase::Pages {
                    next_page: 0,
                    total_pages,
                    blank_streak: 0,
                })
            },
        }
    }

    async fn page_count(&mut self) -> Result<u64> {
        self.last_request_url = Some(full_url(&self.endpoint, &self.spec.page_count_params()));
        fetch_total_pages(
            self.transport.as_ref(),
            &self.endpoint,
            &self.user_agent,
            &self.spec,
        )
        .await
    }

    async fn fetch(&mut self, params: &[(String, String)]) -> Result<String> {
        let url = full_url(&self.endpoint, params);
        self.last_request_url = Some(url.clone());
        let response = self.transport.get(&url, &self.user_agent).await?;
        ensure_success(&url, response)
    }
}

#[instrument(skip_all, fields(url = spec.url()))]
async fn fetch_total_pages(
    transport: &dyn Transport,
    endpoint: &str,
    user_agent: &str,
    spec: &QuerySpec,
) -> Result<u64> {
    let url = full_url(endpoint, &spec.page_count_params());
    let body = ensure_success(&url, transport.get(&url, user_agent).await?)?;
    let total = body
        .trim()
        .parse::<u64>()
        .map_err(|_| Error::InvalidPageCount(body.trim().to_string()))?;
    debug!(total, "Page count");
    Ok(total)
}

fn ensure_success(url: &str, response: HttpResponse) -> Result<String> {
    if response.is_success() {
        return Ok(response.body);
    }
    Err(Error::UnexpectedStatus {
        url: url.to_string(),
        status: response.status,
        body: response.body.chars().take(512).collect(),
    })
}

/// Non-blank lines of a response body, verbatim apart from the line ending.
fn data_lines(body: &str) -> impl Iterator<Item = String> + '_ {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(ToString::to_string)
}

/// Split a resume-mode body into record lines and the trailing resume key.
///
/// Leading and trailing blank lines are ignored. The key is the last line, and
/// only counts as one when the line before it is blank and at least one record
/// precedes the blank. A body of just a blank line and a key therefore has no
/// key: the key line is handed to the parser and fails the query.
fn split_resume_key(body: &str) -> (Vec<String>, Option<String>) {
    let mut lines: Vec<&str> = body.lines().collect();
    while lines.last().is_some_and(|line| line.trim().is_empty()) {
        lines.pop();
    }
    let first = lines
        .iter()
        .position(|line| !line.trim().is_empty())
        .unwrap_or(lines.len());
    let lines = &lines[first..];

    let records = |lines: &[&str]| -> Vec<String> {
        lines
            .iter()
            .filter(|line| !line.trim().is_empty())
            .map(ToString::to_string)
            .collect()
    };

    if lines.len() >= 3 && lines[lines.len() - 2].trim().is_empty() {
        let key = lines[lines.len() - 1].trim().to_string();
        return (records(&lines[..lines.len() - 2]), Some(key));
    }

    (records(lines), None)
}
