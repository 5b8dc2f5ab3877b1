use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::Context;

#[derive(Parser)]
#[command(name = "listentrack", version, about = "Live listener sampler and stream estimator")]
struct Cli {
    /// Config file (default: ~/.config/listentrack/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sampling daemon until Ctrl-C
    Run,
    /// Last daemon session snapshot and data totals
    Status,
    /// Listener statistics
    Stats {
        #[command(subcommand)]
        action: commands::stats::StatsAction,
    },
    /// Predict today's streams
    Predict,
    /// Calibration factor and the ground-truth days behind it
    Calibration,
    /// Ground-truth stream counts
    Actual {
        #[command(subcommand)]
        action: commands::actual::ActualAction,
    },
    /// Daily, weekly and monthly reports
    Report {
        #[command(subcommand)]
        action: commands::report::ReportAction,
    },
    /// Notification delivery
    Notify {
        #[command(subcommand)]
        action: commands::notify::NotifyAction,
    },
    /// Sample data maintenance
    Data {
        #[command(subcommand)]
        action: commands::data::DataAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("listentrack=info,listentrack_core=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let result = Context::load(cli.config).and_then(|ctx| match cli.command {
        Commands::Run => commands::run::run(ctx),
        Commands::Status => commands::status::run(ctx),
        Commands::Stats { action } => commands::stats::run(ctx, action),
        Commands::Predict => commands::analysis::predict(ctx),
        Commands::Calibration => commands::analysis::calibration(ctx),
        Commands::Actual { action } => commands::actual::run(ctx, action),
        Commands::Report { action } => commands::report::run(ctx, action),
        Commands::Notify { action } => commands::notify::run(ctx, action),
        Commands::Data { action } => commands::data::run(ctx, action),
        Commands::Config { action } => commands::config::run(ctx, action),
    });

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
