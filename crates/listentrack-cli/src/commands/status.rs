use super::{print_json, CmdResult, Context};

pub fn run(ctx: Context) -> CmdResult {
    let analytics = ctx.analytics()?;
    print_json(&analytics.status()?)
}
