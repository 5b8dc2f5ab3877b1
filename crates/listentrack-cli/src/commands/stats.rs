use chrono::Utc;
use clap::Subcommand;
use listentrack_core::stats::DEFAULT_RECENT_LIMIT;
use listentrack_core::CurveRange;

use super::{parse_instant, print_json, CmdResult, Context};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Totals, extremes and the latest sample
    Overview,
    /// Average/peak/minimum and predicted streams for an interval
    Period {
        /// Start (RFC 3339 or YYYY-MM-DD, inclusive)
        start: String,
        /// End (RFC 3339 or YYYY-MM-DD, exclusive)
        end: String,
    },
    /// Hour-of-day averages, over all data or an interval
    Hourly {
        #[arg(long, requires = "end")]
        start: Option<String>,
        #[arg(long, requires = "start")]
        end: Option<String>,
    },
    /// Per-day rows, newest first
    Daily {
        #[arg(long, default_value = "30")]
        limit: usize,
        #[arg(long, default_value = "0")]
        offset: usize,
        /// Only the last seven days
        #[arg(long, conflicts_with_all = ["limit", "offset"])]
        week: bool,
    },
    /// Highest samples with weekday and hour
    Peaks {
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// 24-hour profile for a named range
    Curve {
        /// today, yesterday, last7days, this_week, last_week, last28days,
        /// this_month, last_month, last_year, this_year, all
        range: String,
    },
    /// Trailing window against the window before it
    Trend {
        #[arg(long, default_value = "1")]
        hours: u32,
    },
    /// Latest samples, oldest first
    Recent {
        #[arg(long, default_value_t = DEFAULT_RECENT_LIMIT)]
        limit: usize,
        /// Only the last five minutes
        #[arg(long, conflicts_with = "limit")]
        realtime: bool,
    },
}

pub fn run(ctx: Context, action: StatsAction) -> CmdResult {
    let analytics = ctx.analytics()?;
    let now = Utc::now();

    match action {
        StatsAction::Overview => print_json(&analytics.overview()?),
        StatsAction::Period { start, end } => {
            let stats = analytics.stats_for_period(parse_instant(&start)?, parse_instant(&end)?)?;
            print_json(&stats)
        }
        StatsAction::Hourly { start, end } => match (start, end) {
            (Some(start), Some(end)) => {
                print_json(&analytics.hourly(parse_instant(&start)?, parse_instant(&end)?)?)
            }
            _ => print_json(&analytics.hourly_all()?),
        },
        StatsAction::Daily { week: true, .. } => print_json(&analytics.daily_comparison(now)?),
        StatsAction::Daily { limit, offset, .. } => print_json(&analytics.daily(limit, offset)?),
        StatsAction::Peaks { limit } => print_json(&analytics.peaks(limit)?),
        StatsAction::Curve { range } => {
            let range: CurveRange = range.parse()?;
            print_json(&analytics.curve(range, now)?)
        }
        StatsAction::Trend { hours } => print_json(&analytics.trend(now, hours)?),
        StatsAction::Recent { realtime: true, .. } => print_json(&analytics.realtime(now)?),
        StatsAction::Recent { limit, .. } => print_json(&analytics.recent(limit)?),
    }
}
