//! `wayback near`: closest, oldest or newest capture of a URL.

use anyhow::Result;
use wayback_core::{CdxClient, Config, NearTime};

use crate::cli::{NearArgs, OutputFormat};

fn anchor(args: &NearArgs) -> NearTime {
    if let Some(seconds) = args.unix {
        return NearTime::at_unix(seconds);
    }
    NearTime {
        year: args.year,
        month: args.month,
        day: args.day,
        hour: args.hour,
        minute: args.minute,
        unix_timestamp: None,
    }
}

pub async fn execute(args: &NearArgs, config: &Config) -> Result<()> {
    let client = CdxClient::new(config)?;

    let record = if args.oldest {
        client.oldest(&args.url).await?
    } else if args.newest {
        client.newest(&args.url).await?
    } else {
        client.near(&args.url, anchor(args)).await?
    };

    match args.format {
        OutputFormat::Text => println!("{}", record.archive_url(client.archive_base())),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record)?),
        OutputFormat::Jsonl => println!("{}", serde_json::to_string(&record)?),
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    fn near_args(argv: &[&str]) -> NearArgs {
        let mut full = vec!["wayback", "near", "example.com"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Commands::Near(args) => args,
            _ => unreachable!("parsed a near command"),
        }
    }

    #[test]
    fn test_anchor_from_parts() {
        let anchor = anchor(&near_args(&["--year", "2015", "--month", "6"]));
        assert_eq!(anchor.year, Some(2015));
        assert_eq!(anchor.month, Some(6));
        assert_eq!(anchor.day, None);
        assert_eq!(anchor.unix_timestamp, None);
    }

    #[test]
    fn test_anchor_from_unix() {
        let anchor = anchor(&near_args(&["--unix", "1600000000"]));
        assert_eq!(anchor, NearTime::at_unix(1_600_000_000));
    }
}
