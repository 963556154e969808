//! # wayback-core
//!
//! Client core for the Wayback Machine: trigger captures through Save Page Now and
//! search the CDX index, on top of a service that is slow, rate-limited and not
//! always consistent in how it answers.
//!
//! ## Architecture
//!
//! - **Transport**: pooled HTTP GET with 5xx retry and robots.txt exclusion detection
//! - **Records**: the seven-field CDX line format
//! - **Queries**: validated filter, collapse, match-type and sort options
//! - **Index engine**: lazy, resumable record enumeration over pages or resume keys
//! - **Capture orchestrator**: the save retry loop and archive URL recovery
//!
//! Every engine is built from a [`Config`] and holds no global state.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wayback_core::{CaptureClient, CdxClient, Config, QuerySpec};
//!
//! # async fn run() -> wayback_core::Result<()> {
//! let config = Config::load()?;
//!
//! let spec = QuerySpec::builder("example.com")
//!     .match_type("prefix")
//!     .filter("statuscode:200")
//!     .build()?;
//!
//! let cdx = CdxClient::new(&config)?;
//! let mut snapshots = cdx.snapshots(&spec);
//! while let Some(record) = snapshots.next_record().await? {
//!     println!("{}", record.archive_url(cdx.archive_base()));
//! }
//!
//! let capture = CaptureClient::new(&config)?.save("https://example.com").await?;
//! println!("{} (cached: {})", capture.archive_url, capture.is_cached);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Invalid query input fails at [`QueryBuilder::build`], before any request:
//!
//! ```rust
//! use wayback_core::{Error, QuerySpec};
//!
//! match QuerySpec::builder("example.com/*").match_type("prefix").build() {
//!     Err(Error::MatchTypeWithWildcard { url }) => assert_eq!(url, "example.com/*"),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

/// Save Page Now capture orchestrator
pub mod capture;
/// Resumable CDX index query engine
pub mod cdx;
/// Injected time sources
pub mod clock;
/// Configuration management
pub mod config;
/// Error types and result aliases
pub mod error;
/// CDX query validation and parameters
pub mod query;
/// CDX record model
pub mod record;
/// Wayback timestamps and closest-capture anchors
pub mod timestamp;
/// HTTP transport with retry
pub mod transport;

pub use capture::{ArchiveMatch, ArchiveSource, CaptureClient, CaptureRequest, CaptureResult};
pub use cdx::{CdxClient, Snapshots};
pub use clock::{Clock, Sleeper, SystemClock, TokioSleeper};
pub use config::Config;
pub use error::{CaptureDiagnostics, Error, Result};
pub use query::{Collapse, Field, Filter, MatchType, Pagination, QueryBuilder, QuerySpec, SortOrder};
pub use record::IndexRecord;
pub use timestamp::NearTime;
pub use transport::{HttpResponse, HttpTransport, Transport};
