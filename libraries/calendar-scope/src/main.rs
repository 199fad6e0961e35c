use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result, bail};
use calendar_frontend_rs::device_id::DeviceId;
use calendar_frontend_rs::progress::{ProgressRecord, ProgressStore};
use calendar_frontend_rs::unlock::{TileStatus, UnlockState, format_countdown};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use keepsake::supabase::{SupabaseConfig, SupabaseStore};
use serde_json::Value;

/// Inspect calendar progress records.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    source: Source,

    /// Evaluate cooldowns at this time (ms since the epoch) instead of now
    #[arg(long)]
    now: Option<i64>,
}

#[derive(Subcommand, Debug)]
enum Source {
    /// A JSON export: one progress document, or an array of `{id, data}` rows
    File { path: PathBuf },
    /// Fetch one device's record from Supabase (needs SUPABASE_URL and SUPABASE_ANON_KEY)
    Remote { device_id: String },
}

fn records_from_export(export: Value) -> Result<Vec<(String, ProgressRecord)>> {
    match export {
        Value::Object(document) => Ok(vec![(
            "(export)".to_string(),
            ProgressRecord::from_document(&document),
        )]),
        Value::Array(rows) => rows
            .into_iter()
            .enumerate()
            .map(|(index, row)| {
                let id = row
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("row {index}"));
                let Some(Value::Object(data)) = row.get("data") else {
                    bail!("Row {index} has no `data` object");
                };
                Ok((id, ProgressRecord::from_document(data)))
            })
            .collect(),
        other => bail!("Expected a document or an array of rows, got {other}"),
    }
}

fn describe_days(days: &[u32]) -> String {
    if days.is_empty() {
        return "none".to_string();
    }
    // collapse runs: 1, 2, 3, 5 -> 1-3, 5
    let mut runs: Vec<(u32, u32)> = Vec::new();
    for &day in days {
        match runs.last_mut() {
            Some((_, end)) if *end + 1 == day => *end = day,
            _ => runs.push((day, day)),
        }
    }
    runs.iter()
        .map(|&(start, end)| {
            if start == end {
                start.to_string()
            } else {
                format!("{start}-{end}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn summarize(id: &str, record: ProgressRecord, now_ms: i64) -> String {
    let state = UnlockState::from_record(record);
    let tiles = state.tiles(now_ms);
    let unlocked: Vec<u32> = state.unlocked_days.iter().copied().collect();
    let skipped: Vec<u32> = tiles
        .iter()
        .filter(|tile| tile.status == TileStatus::Skipped)
        .map(|tile| tile.day)
        .collect();

    let next = state.next_unlockable_day();
    let next_line = if next > calendar_frontend_rs::unlock::DAYS {
        "all days unlocked".to_string()
    } else if state.can_unlock_now(now_ms) {
        format!("{next} (available now)")
    } else {
        format!("{next} (in {})", format_countdown(state.countdown(now_ms)))
    };

    let last_open = match state.last_open_at {
        Some(ms) => DateTime::<Utc>::from_timestamp_millis(ms)
            .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| format!("{ms} (out of range)")),
        None => "never, or reset".to_string(),
    };

    format!(
        "{id}\n  unlocked: {} day(s): {}\n  next day: {next_line}\n  last open: {last_open}\n  replies: {}\n  skipped days: {}",
        unlocked.len(),
        describe_days(&unlocked),
        state.replies.len(),
        describe_days(&skipped),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    dotenv::dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let now_ms = args.now.unwrap_or_else(|| Utc::now().timestamp_millis());

    let records = match args.source {
        Source::File { path } => {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let export: Value = serde_json::from_str(&contents)
                .with_context(|| format!("{} is not valid JSON", path.display()))?;
            records_from_export(export)?
        }
        Source::Remote { device_id } => {
            let supabase_url =
                std::env::var("SUPABASE_URL").context("SUPABASE_URL environment variable not set")?;
            let supabase_anon_key = std::env::var("SUPABASE_ANON_KEY")
                .context("SUPABASE_ANON_KEY environment variable not set")?;
            let store = Rc::new(SupabaseStore::new(SupabaseConfig {
                supabase_url,
                supabase_anon_key,
            }));
            let device_id = DeviceId::new(device_id);
            let record = ProgressStore::new(store)
                .load_progress(&device_id)
                .await
                .with_context(|| format!("Failed to load progress for {device_id}"))?;
            vec![(device_id.to_string(), record)]
        }
    };

    log::info!("Summarizing {} record(s)", records.len());
    for (id, record) in records {
        println!("{}", summarize(&id, record, now_ms));
    }
    Ok(())
}
