#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use orchestra_core::Config;
use output::OutputMode;
use std::env;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "orchestra",
    author,
    version,
    about = "orchestra: Todoist rituals and hourly alarms",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Config file to use instead of the default location.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    const fn output_mode(&self) -> OutputMode {
        OutputMode::from_flag(self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Pull from Todoist, merge and rebuild rituals",
        long_about = "Pull changes from Todoist, merge them into the local snapshot and rebuild the ritual document.\n\nA full pull happens when there is no usable snapshot or --full is given."
    )]
    Sync(cmd::sync::SyncArgs),

    #[command(about = "Rebuild rituals from the local snapshot")]
    Extract,

    #[command(about = "Set today's remaining hourly alarms")]
    Alarms(cmd::alarms::AlarmArgs),

    #[command(about = "Show the effective configuration")]
    Config,

    #[command(about = "Generate shell completion scripts")]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("ORCHESTRA_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "orchestra=debug,orchestra_core=debug,info"
        } else {
            "orchestra=info,orchestra_core=info,warn"
        })
    });

    let format = env::var("ORCHESTRA_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let output = cli.output_mode();
    if let Commands::Completions(args) = &cli.command {
        let mut command = Cli::command();
        return cmd::completions::run_completions(args.shell, &mut command);
    }

    let config = Config::load(cli.config.as_deref()).map_err(cmd::coded)?;

    match cli.command {
        Commands::Sync(ref args) => cmd::sync::run_sync(args, config, output),
        Commands::Extract => cmd::extract::run_extract(config, output),
        Commands::Alarms(ref args) => cmd::alarms::run_alarms(args, &config, output),
        Commands::Config => cmd::config::run_config(&config, output),
        Commands::Completions(_) => Ok(()),
    }
}
