//! `wayback save`: trigger a capture and print the archive URL.

use anyhow::Result;
use wayback_core::{CaptureClient, Config};

use crate::cli::{OutputFormat, SaveArgs};

pub async fn execute(args: &SaveArgs, config: &Config) -> Result<()> {
    let mut config = config.clone();
    if let Some(max_tries) = args.max_tries {
        config.capture.max_tries = max_tries;
    }

    let client = CaptureClient::new(&config)?;
    let request = client.request(&args.url)?;
    let result = client.capture(&request).await?;

    match args.format {
        OutputFormat::Text => {
            println!("{}", result.archive_url);
            if result.is_cached {
                eprintln!(
                    "note: the archive returned an existing capture from {}",
                    result.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
        },
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Jsonl => println!("{}", serde_json::to_string(&result)?),
    }
    Ok(())
}
