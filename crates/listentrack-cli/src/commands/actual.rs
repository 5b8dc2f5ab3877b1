use clap::Subcommand;
use listentrack_core::StoreRequest;

use super::{parse_date, print_json, print_queued, CmdResult, Context, Write};

#[derive(Subcommand)]
pub enum ActualAction {
    /// List ground-truth records, newest first
    List,
    /// Record the real stream count for a day
    Set {
        /// UTC day (YYYY-MM-DD)
        date: String,
        streams: u64,
    },
    /// Remove the record for a day
    Delete {
        /// UTC day (YYYY-MM-DD)
        date: String,
    },
}

pub fn run(ctx: Context, action: ActualAction) -> CmdResult {
    match action {
        ActualAction::List => print_json(&ctx.analytics()?.list_actuals()?),
        ActualAction::Set { date, streams } => {
            let date = parse_date(&date)?;
            match ctx.write(StoreRequest::SetActual { date, streams })? {
                Write::Queued(path) => print_queued(&path),
                Write::Direct(analytics) => {
                    analytics.set_actual(date, streams)?;
                    println!("ok");
                    Ok(())
                }
            }
        }
        ActualAction::Delete { date } => {
            let date = parse_date(&date)?;
            match ctx.write(StoreRequest::DeleteActual { date })? {
                Write::Queued(path) => print_queued(&path),
                Write::Direct(analytics) => {
                    if analytics.delete_actual(date)? {
                        println!("deleted");
                        Ok(())
                    } else {
                        Err(format!("no record for {date}").into())
                    }
                }
            }
        }
    }
}
