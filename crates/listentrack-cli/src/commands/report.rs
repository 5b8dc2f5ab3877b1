use chrono::Utc;
use clap::{Subcommand, ValueEnum};
use listentrack_core::reports::report_html;
use listentrack_core::ReportKind;

use super::{print_json, runtime, CmdResult, Context};

#[derive(Clone, Copy, ValueEnum)]
pub enum Kind {
    Daily,
    Weekly,
    Monthly,
}

impl From<Kind> for ReportKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Daily => ReportKind::Daily,
            Kind::Weekly => ReportKind::Weekly,
            Kind::Monthly => ReportKind::Monthly,
        }
    }
}

#[derive(Subcommand)]
pub enum ReportAction {
    /// Build a report without sending it
    Preview {
        #[arg(value_enum)]
        kind: Kind,
        /// Print the mail body instead of JSON
        #[arg(long)]
        html: bool,
    },
    /// Build and mail a report now
    Send {
        #[arg(value_enum)]
        kind: Kind,
    },
}

pub fn run(ctx: Context, action: ReportAction) -> CmdResult {
    let analytics = ctx.analytics()?;
    let now = Utc::now();

    match action {
        ReportAction::Preview { kind, html } => {
            let report = analytics.report_preview(kind.into(), now)?;
            match (report, html) {
                (Some(report), true) => {
                    println!("{}", report_html(&report));
                    Ok(())
                }
                (report, _) => print_json(&report),
            }
        }
        ReportAction::Send { kind } => {
            let sent = runtime()?.block_on(analytics.send_report(kind.into(), now))?;
            match sent {
                Some(report) => {
                    println!("sent: {} ({})", report.title, report.period.label);
                    Ok(())
                }
                None => Err("no samples in the report period, nothing sent".into()),
            }
        }
    }
}
