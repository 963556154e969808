//! # CLI Structure and Argument Parsing
//!
//! The command-line interface for `wayback`, built with `clap` derive macros.
//!
//! ```bash
//! # Capture a page
//! wayback save https://example.com
//!
//! # Search the index
//! wayback cdx example.com --match-type prefix -f statuscode:200 --collapse digest
//!
//! # Closest capture to a date, or the oldest/newest
//! wayback near example.com --year 2015 --month 6
//! wayback near example.com --oldest
//! ```
//!
//! Global options (`--verbose`, `--quiet`, `--config`, `--user-agent`) apply to
//! every subcommand. Query input is validated before any request is made.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use wayback_core::Pagination;

/// Main CLI structure for the `wayback` command.
#[derive(Parser, Clone, Debug)]
#[command(name = "wayback")]
#[command(version)]
#[command(about = "wayback - capture pages and search the Wayback Machine index", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Suppress informational messages (only show errors)
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true, env = "WAYBACK_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// User-Agent sent to the archive
    #[arg(long, global = true, value_name = "AGENT")]
    pub user_agent: Option<String>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Capture a URL with Save Page Now
    Save(SaveArgs),

    /// Search the CDX index
    Cdx(CdxArgs),

    /// Find the capture closest to a point in time
    Near(NearArgs),
}

impl Commands {
    /// Output format selected by the subcommand.
    pub const fn format(&self) -> OutputFormat {
        match self {
            Self::Save(args) => args.format,
            Self::Cdx(args) => args.format,
            Self::Near(args) => args.format,
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct SaveArgs {
    /// URL to capture
    pub url: String,

    /// Capture attempts before giving up
    #[arg(long, value_name = "N")]
    pub max_tries: Option<u32>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args, Clone, Debug)]
pub struct CdxArgs {
    /// URL to search for; may contain a `*` wildcard when no match type is given
    pub url: String,

    /// Only captures at or after this timestamp (1-14 digits, YYYYMMDDhhmmss)
    #[arg(long, value_name = "TIMESTAMP")]
    pub from: Option<String>,

    /// Only captures at or before this timestamp (1-14 digits, YYYYMMDDhhmmss)
    #[arg(long, value_name = "TIMESTAMP")]
    pub to: Option<String>,

    /// Filter as `[!]field:regex`; repeatable
    #[arg(short = 'f', long = "filter", value_name = "FILTER")]
    pub filters: Vec<String>,

    /// Collapse as `field[:N]`; repeatable
    #[arg(short = 'c', long = "collapse", value_name = "COLLAPSE")]
    pub collapses: Vec<String>,

    /// exact, prefix, host or domain
    #[arg(long, value_name = "TYPE")]
    pub match_type: Option<String>,

    /// default, closest or reverse
    #[arg(long, value_name = "ORDER")]
    pub sort: Option<String>,

    /// Anchor timestamp for closest sorting
    #[arg(long, value_name = "TIMESTAMP")]
    pub closest: Option<String>,

    /// Records per response
    #[arg(long, allow_negative_numbers = true)]
    pub limit: Option<i64>,

    /// Retrieval strategy
    #[arg(long, value_enum, default_value_t = PaginationArg::Auto)]
    pub pagination: PaginationArg,

    /// Stop after this many records
    #[arg(long, value_name = "N")]
    pub max_records: Option<usize>,

    /// Print archive URLs instead of raw index lines (text format only)
    #[arg(long)]
    pub archive_urls: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args, Clone, Debug)]
pub struct NearArgs {
    /// URL to look up
    pub url: String,

    /// Year of the anchor
    #[arg(long)]
    pub year: Option<i32>,

    /// Month of the anchor (1-12)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
    pub month: Option<u32>,

    /// Day of the anchor (1-31)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=31))]
    pub day: Option<u32>,

    /// Hour of the anchor (0-23)
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=23))]
    pub hour: Option<u32>,

    /// Minute of the anchor (0-59)
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=59))]
    pub minute: Option<u32>,

    /// Anchor at a unix timestamp instead of calendar parts
    #[arg(long, conflicts_with_all = ["year", "month", "day", "hour", "minute"])]
    pub unix: Option<i64>,

    /// Earliest capture
    #[arg(long, conflicts_with_all = ["newest", "unix", "year", "month", "day", "hour", "minute"])]
    pub oldest: bool,

    /// Most recent capture
    #[arg(long, conflicts_with_all = ["unix", "year", "month", "day", "hour", "minute"])]
    pub newest: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Output format for command results.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text (default)
    #[default]
    Text,
    /// Single JSON document
    Json,
    /// Newline-delimited JSON
    Jsonl,
}

impl OutputFormat {
    /// Whether the format is meant for machines.
    pub const fn is_machine(self) -> bool {
        matches!(self, Self::Json | Self::Jsonl)
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PaginationArg {
    /// Choose from the query shape and page count
    #[default]
    Auto,
    /// Page through the pagination API
    Pages,
    /// Follow resume keys
    ResumeKey,
}

impl From<PaginationArg> for Pagination {
    fn from(arg: PaginationArg) -> Self {
        match arg {
            PaginationArg::Auto => Self::Auto,
            PaginationArg::Pages => Self::Pages,
            PaginationArg::ResumeKey => Self::ResumeKey,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_repeatable_filters_keep_order() {
        let cli = Cli::try_parse_from([
            "wayback",
            "cdx",
            "example.com",
            "-f",
            "statuscode:200",
            "--filter",
            "!mimetype:image/.*",
            "--collapse",
            "digest",
        ])
        .unwrap();

        match cli.command {
            Commands::Cdx(args) => {
                assert_eq!(args.filters, ["statuscode:200", "!mimetype:image/.*"]);
                assert_eq!(args.collapses, ["digest"]);
                assert_eq!(args.pagination, PaginationArg::Auto);
            },
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_oldest_conflicts_with_anchor_parts() {
        assert!(Cli::try_parse_from(["wayback", "near", "example.com", "--oldest", "--year", "2010"]).is_err());
        assert!(Cli::try_parse_from(["wayback", "near", "example.com", "--month", "13"]).is_err());
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["wayback", "-v", "-q", "save", "example.com"]).is_err());
    }
}
