//! Fetches the URLs given on the command line into `./models` and renders
//! the task while it runs.
//!
//! ```text
//! RUST_LOG=comfy_fetch=debug cargo run --example fetch -- https://example.com/a.safetensors
//! ```
//!
//! Ctrl-C pauses the task; running the same command again resumes from the
//! partial files.

use color_eyre::{eyre::eyre, Result};
use comfy_fetch::{BatchRequest, StyleOptions, TaskDisplay, TaskStatus, TransferItem, TransferService};
use reqwest::Url;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        return Err(eyre!("usage: fetch <url>..."));
    }

    let directory = PathBuf::from("models");
    let items = urls
        .iter()
        .map(|url| -> Result<TransferItem> {
            Ok(TransferItem::from_url(&Url::parse(url)?, &directory)?)
        })
        .collect::<Result<Vec<_>>>()?;

    let service = TransferService::builder()
        .on_finish(|snapshot| {
            for failure in &snapshot.item_errors {
                eprintln!("{} failed: {}", failure.source_url, failure.message);
            }
        })
        .build()?;
    let id = service.download_batch(BatchRequest::new(items).with_alias("fetch"))?;

    let pauser = service.clone();
    let paused_id = id.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            pauser.pause(&paused_id);
        }
    });

    let mut display = TaskDisplay::new(StyleOptions::default(), "models");
    let last = display
        .watch(&service, &id, Duration::from_millis(200))
        .await
        .ok_or_else(|| eyre!("task {} vanished", id))?;

    match last.status {
        TaskStatus::Completed => println!("Fetched {} file(s) into {:?}", urls.len(), directory),
        TaskStatus::Pending => println!("Paused at item {}, run again to resume", last.current_index + 1),
        status => println!("Stopped: {:?} {}", status, last.error.unwrap_or_default()),
    }

    Ok(())
}
