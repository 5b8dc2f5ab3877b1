use chrono::Utc;

use super::{print_json, CmdResult, Context};

pub fn predict(ctx: Context) -> CmdResult {
    let analytics = ctx.analytics()?;
    print_json(&analytics.predict_today(Utc::now())?)
}

pub fn calibration(ctx: Context) -> CmdResult {
    let analytics = ctx.analytics()?;
    print_json(&analytics.calibration()?)
}
