use chrono::Utc;
use clap::Subcommand;

use super::{print_json, runtime, CmdResult, Context};

#[derive(Subcommand)]
pub enum NotifyAction {
    /// Notification settings (secrets masked) and delivery state
    Status,
    /// Send a test mail, ignoring the cooldown
    Test,
}

pub fn run(ctx: Context, action: NotifyAction) -> CmdResult {
    let analytics = ctx.analytics()?;
    match action {
        NotifyAction::Status => print_json(&analytics.notification_status()),
        NotifyAction::Test => {
            runtime()?.block_on(analytics.send_test_notification(Utc::now()))?;
            println!("test mail sent");
            Ok(())
        }
    }
}
