//! Step Report - hourly and daily totals for one local day
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin step_report -- --date 2016-03-13 --tz America/New_York
//! cargo run --release --bin step_report -- --source aa:bb:cc:dd:ee:ff --json
//! cargo run --release --bin step_report -- --days 7
//! ```
//!
//! ## Arguments
//!
//! - `--db <PATH>` - overrides STEPLEDGER_DB_PATH
//! - `--tz <ZONE>` - overrides STEPLEDGER_TIMEZONE
//! - `--date <YYYY-MM-DD>` - local day to report (default: today in the zone)
//! - `--source <MAC>` - restrict to one device
//! - `--days <N>` - also print daily totals for the N days ending on `--date`
//! - `--json` - print the day report as JSON
//!
//! Opening the store migrates it to the current schema when needed.

use chrono::{NaiveDate, Utc};
use dotenv::dotenv;
use stepledger::activity_core::update::parse_mac_address;
use stepledger::config::parse_time_zone;
use stepledger::{ActivityReport, BoundaryDates, DayReport, StoreConfig, UpdateStore};
use std::path::PathBuf;

#[derive(Debug)]
struct ReportArgs {
    date: Option<NaiveDate>,
    source: Option<u64>,
    days: u32,
    json: bool,
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].clone())
}

fn parse_args(config: &mut StoreConfig) -> Result<ReportArgs, Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if let Some(db) = arg_value(&args, "--db") {
        config.db_path = PathBuf::from(db);
    }

    if let Some(tz) = arg_value(&args, "--tz") {
        config.time_zone = parse_time_zone(&tz)?;
    }

    let date = arg_value(&args, "--date")
        .map(|raw| {
            NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                .map_err(|_| format!("Invalid --date '{}', expected YYYY-MM-DD", raw))
        })
        .transpose()?;

    let source = arg_value(&args, "--source")
        .map(|raw| parse_mac_address(&raw).ok_or_else(|| format!("Invalid --source MAC address: {}", raw)))
        .transpose()?;

    let days = match arg_value(&args, "--days") {
        Some(raw) => raw
            .parse::<u32>()
            .map_err(|_| format!("Invalid --days '{}'", raw))?,
        None => 0,
    };

    Ok(ReportArgs {
        date,
        source,
        days,
        json: args.iter().any(|a| a == "--json"),
    })
}

fn print_day(report: &DayReport, config: &StoreConfig) {
    let tz = config.time_zone;

    println!("📅 {} ({})", report.date, report.time_zone);
    if let Some(source) = &report.source {
        println!("⌚ Device {}", source);
    }
    println!("{:<12} {:>10} {:>10} {:>10}", "hour", "walking", "running", "total");

    for hour in &report.hours {
        if hour.steps.step_count() == 0 {
            continue;
        }
        println!(
            "{:<12} {:>10} {:>10} {:>10}",
            hour.window.start.with_timezone(&tz).format("%H:%M %Z").to_string(),
            hour.steps.walking_step_count,
            hour.steps.running_step_count,
            hour.steps.step_count()
        );
    }

    println!(
        "{:<12} {:>10} {:>10} {:>10}",
        "TOTAL",
        report.total.walking_step_count,
        report.total.running_step_count,
        report.total.step_count()
    );
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let mut config = StoreConfig::from_env()?;
    let args = parse_args(&mut config)?;
    let tz = config.time_zone;

    log::info!("🗄️  Database: {}", config.db_path.display());
    log::info!("🌍 Time zone: {}", tz.name());

    let store = UpdateStore::open_with_options(&config.db_path, config.store_options())?;
    let migration = store.migration();
    if migration.migrated() {
        log::info!(
            "🔧 Migrated schema v{} → v{} ({} legacy rows, {} duplicates merged)",
            migration.from_version,
            migration.to_version,
            migration.legacy_rows,
            migration.duplicates_merged
        );
    }

    let date = args
        .date
        .unwrap_or_else(|| Utc::now().with_timezone(&tz).date_naive());
    let source = args.source.map(|mac| mac as i64);

    let report = ActivityReport::new(&store, tz);
    let day = report.day(date, source)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&day)?);
    } else {
        print_day(&day, &config);
    }

    if args.days > 0 && source.is_none() {
        let range = BoundaryDates::local_days_ending(tz, date, args.days)
            .ok_or_else(|| format!("Invalid --days '{}': range starts before the calendar", args.days))?;

        println!();
        for window in report.daily_steps(&range)? {
            println!(
                "{}  {:>10}",
                window.window.start.with_timezone(&tz).format("%Y-%m-%d"),
                window.steps.step_count()
            );
        }
    } else if args.days > 0 {
        log::warn!("⚠️  --days ignores --source; daily totals cover every device");
    }

    Ok(())
}
