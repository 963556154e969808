//! `wayback cdx`: stream index records for a query.

use std::pin::pin;

use anyhow::Result;
use futures::TryStreamExt;
use wayback_core::{CdxClient, Config, IndexRecord, QuerySpec};

use crate::cli::{CdxArgs, OutputFormat};

/// Translate the arguments into a validated query.
pub fn build_query(args: &CdxArgs) -> wayback_core::Result<QuerySpec> {
    let mut builder = QuerySpec::builder(args.url.as_str())
        .filters(args.filters.iter().cloned())
        .collapses(args.collapses.iter().cloned())
        .pagination(args.pagination.into());

    if let Some(from) = &args.from {
        builder = builder.from(from.as_str());
    }
    if let Some(to) = &args.to {
        builder = builder.to(to.as_str());
    }
    if let Some(match_type) = &args.match_type {
        builder = builder.match_type(match_type.as_str());
    }
    if let Some(sort) = &args.sort {
        builder = builder.sort(sort.as_str());
    }
    if let Some(closest) = &args.closest {
        builder = builder.closest(closest.as_str());
    }
    if let Some(limit) = args.limit {
        builder = builder.limit(limit);
    }

    builder.build()
}

pub async fn execute(args: &CdxArgs, config: &Config) -> Result<()> {
    let spec = build_query(args)?;
    let client = CdxClient::new(config)?;

    let mut stream = pin!(client.snapshots(&spec).into_stream());
    let mut collected: Vec<IndexRecord> = Vec::new();
    let mut count = 0usize;

    while let Some(record) = stream.try_next().await? {
        match args.format {
            OutputFormat::Text if args.archive_urls => {
                println!("{}", record.archive_url(client.archive_base()));
            },
            OutputFormat::Text => println!("{record}"),
            OutputFormat::Jsonl => println!("{}", serde_json::to_string(&record)?),
            OutputFormat::Json => collected.push(record),
        }

        count += 1;
        if args.max_records.is_some_and(|max| count >= max) {
            break;
        }
    }

    if args.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&collected)?);
    }
    tracing::debug!(count, "Finished index query");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use wayback_core::{Error, MatchType, Pagination};

    fn args(argv: &[&str]) -> CdxArgs {
        let mut full = vec!["wayback", "cdx"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Commands::Cdx(args) => args,
            _ => unreachable!("parsed a cdx command"),
        }
    }

    #[test]
    fn test_build_query_maps_every_option() {
        let spec = build_query(&args(&[
            "example.com",
            "--from",
            "2010",
            "--to",
            "2012",
            "--match-type",
            "host",
            "-f",
            "statuscode:200",
            "--pagination",
            "resume-key",
            "--limit",
            "-5",
        ]))
        .unwrap();

        assert_eq!(spec.from(), Some("2010"));
        assert_eq!(spec.to(), Some("2012"));
        assert_eq!(spec.match_type(), Some(MatchType::Host));
        assert_eq!(spec.filters().len(), 1);
        assert_eq!(spec.limit(), Some(-5));
        assert_eq!(spec.pagination(), Pagination::ResumeKey);
    }

    #[test]
    fn test_build_query_rejects_bad_collapse() {
        let err = build_query(&args(&["example.com", "--collapse", "urlkey:x"])).unwrap_err();
        assert!(matches!(err, Error::InvalidCollapse { .. }));
    }
}
