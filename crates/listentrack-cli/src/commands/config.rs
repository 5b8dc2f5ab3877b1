use clap::Subcommand;
use listentrack_core::Config;

use super::{CmdResult, Context};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Dot-separated key (e.g. "sampling.interval_secs")
        key: String,
    },
    /// Set a config value
    Set {
        /// Dot-separated key
        key: String,
        /// New value, parsed as the type of the current one
        value: String,
    },
    /// Print the whole config as JSON (secrets masked)
    Show,
    /// Print the config file location
    Path,
    /// Reset config to defaults
    Reset,
}

pub fn run(ctx: Context, action: ConfigAction) -> CmdResult {
    let Context {
        config_path,
        mut config,
    } = ctx;

    match action {
        ConfigAction::Get { key } => match config.get(&key) {
            Some(value) => println!("{value}"),
            None => return Err(format!("unknown key: {key}").into()),
        },
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            config.save_to(&config_path)?;
            println!("ok");
        }
        ConfigAction::Show => {
            config.notifications = config.notifications.masked();
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::Path => println!("{}", config_path.display()),
        ConfigAction::Reset => {
            Config::default().save_to(&config_path)?;
            println!("config reset to defaults");
        }
    }
    Ok(())
}
