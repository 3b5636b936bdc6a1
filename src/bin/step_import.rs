//! Step Import - load decoded device updates into the store
//!
//! Reads one JSON `SourcedUpdate` per line, e.g.
//! `{"mac_address":187723572702975,"timestamp":1440,"walking_steps":12,"running_steps":0}`
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin step_import -- --input updates.jsonl
//! cat updates.jsonl | cargo run --release --bin step_import
//! ```
//!
//! ## Arguments
//!
//! - `--db <PATH>` - overrides STEPLEDGER_DB_PATH
//! - `--input <PATH>` - JSONL file (default: stdin)
//! - `--requeue-export` - queue every stored bucket for export after the import

use dotenv::dotenv;
use stepledger::store::{BufferedUpdateWriter, UpdateSinkBackend};
use stepledger::{SourcedUpdate, StoreConfig, UpdateStore};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].clone())
}

async fn open_input(path: Option<&str>) -> Result<Box<dyn AsyncRead + Unpin + Send>, std::io::Error> {
    match path {
        Some(path) => Ok(Box::new(tokio::fs::File::open(path).await?)),
        None => Ok(Box::new(tokio::io::stdin())),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut config = StoreConfig::from_env()?;
    if let Some(db) = arg_value(&args, "--db") {
        config.db_path = PathBuf::from(db);
    }
    let input = arg_value(&args, "--input");

    log::info!("🚀 Starting step import");
    log::info!("🗄️  Database: {}", config.db_path.display());
    log::info!("📥 Input: {}", input.as_deref().unwrap_or("stdin"));

    let store = Arc::new(UpdateStore::open_with_options(&config.db_path, config.store_options())?);
    let mut writer = BufferedUpdateWriter::from_config(store.clone(), &config);
    log::info!(
        "💾 Backend: {} (batch {}, flush every {:?})",
        writer.backend_type(),
        config.write_batch_size,
        config.flush_interval
    );

    let mut lines = BufReader::new(open_input(input.as_deref()).await?).lines();
    let mut line_number = 0u64;
    let mut rejected = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<SourcedUpdate>(&line) {
            Ok(update) => writer.write(&update).await?,
            Err(e) => {
                rejected += 1;
                log::warn!("⚠️  Skipping line {}: {}", line_number, e);
            }
        }
    }

    writer.flush().await?;

    let totals = writer.totals();
    log::info!(
        "✅ Imported {} lines: {} written, {} zero-step, {} out of window, {} not larger, {} unparseable",
        line_number,
        totals.written,
        totals.zero_steps,
        totals.out_of_window,
        totals.not_larger,
        rejected
    );
    log::info!("📦 {} export buckets queued", store.queued_export_buckets()?.len());

    if args.iter().any(|a| a == "--requeue-export") {
        store.requeue_all_for_export()?;
    }

    Ok(())
}
