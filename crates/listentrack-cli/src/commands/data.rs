use std::path::{Path, PathBuf};

use clap::Subcommand;
use listentrack_core::time::parse_timestamp;
use listentrack_core::{ListenerSample, StoreRequest};
use serde::Deserialize;

use super::{print_json, print_queued, CmdResult, Context, Write};

#[derive(Subcommand)]
pub enum DataAction {
    /// Delete every sample (ground truth is kept)
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Import samples from a JSON array of {timestamp, listenerCount}
    Import { file: PathBuf },
    /// Write every sample as CSV
    Export {
        /// Output file (default: stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

/// One record of a JSON export from an earlier deployment.
#[derive(Deserialize)]
struct ImportRecord {
    timestamp: String,
    #[serde(rename = "listenerCount", alias = "count")]
    listener_count: u32,
}

fn read_import(file: &Path) -> Result<Vec<ListenerSample>, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| format!("cannot read {}: {e}", file.display()))?;
    let records: Vec<ImportRecord> = serde_json::from_str(&content)?;
    records
        .into_iter()
        .enumerate()
        .map(|(i, r)| {
            let at = parse_timestamp(&r.timestamp)
                .map_err(|e| format!("record {i}: bad timestamp '{}': {e}", r.timestamp))?;
            Ok::<_, Box<dyn std::error::Error>>(ListenerSample::new(at, r.listener_count))
        })
        .collect()
}

pub fn run(ctx: Context, action: DataAction) -> CmdResult {
    match action {
        DataAction::Clear { yes: false } => {
            Err("refusing to delete all samples without --yes".into())
        }
        DataAction::Clear { yes: true } => match ctx.write(StoreRequest::ClearSamples)? {
            Write::Queued(path) => print_queued(&path),
            Write::Direct(analytics) => {
                let deleted = analytics.clear_samples()?;
                print_json(&serde_json::json!({ "deleted": deleted }))
            }
        },
        DataAction::Import { file } => {
            let samples = read_import(&file)?;
            match ctx.write(StoreRequest::Import { samples: samples.clone() })? {
                Write::Queued(path) => print_queued(&path),
                Write::Direct(analytics) => print_json(&analytics.import(&samples)?),
            }
        }
        DataAction::Export { output } => {
            let csv = ctx.analytics()?.export_csv()?;
            match output {
                Some(path) => {
                    std::fs::write(&path, csv)?;
                    eprintln!("wrote {}", path.display());
                }
                None => print!("{csv}"),
            }
            Ok(())
        }
    }
}
