//! telesplit - splits a telemetry JSON stream into per-session logs.
//!
//! Single binary. `watch` tails the log, `reset` starts over, `status`
//! reports where the watcher is.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;
mod config;
mod error;
mod watcher;

pub use config::Config;
pub use error::Error;

#[derive(Parser)]
#[command(name = "telesplit")]
#[command(about = "Split a telemetry JSON stream into per-session logs")]
#[command(version)]
struct Cli {
    /// Directory holding log.jsonl, the state file and session folders
    #[arg(long, global = true, default_value = config::DEFAULT_DIR)]
    dir: PathBuf,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the log and route new records into session folders
    Watch {
        /// Quiet period before a burst of changes is processed
        #[arg(long, default_value_t = config::DEFAULT_DEBOUNCE_MS)]
        debounce_ms: u64,
    },

    /// Empty the log and reset watcher state
    Reset,

    /// Show watcher status
    Status,
}

fn main() -> Result<(), Error> {
    let cli = Cli::parse();

    let directive = if cli.verbose {
        "telesplit=debug"
    } else {
        "telesplit=info"
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(directive.parse().unwrap()))
        .init();

    let config = Config::new(&cli.dir);

    match cli.command {
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
        Some(Commands::Watch { debounce_ms }) => {
            let config = config.with_debounce(Duration::from_millis(debounce_ms));
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            rt.block_on(cli::watch::run(&config))?;
        }
        Some(Commands::Reset) => {
            cli::reset::run(&config)?;
        }
        Some(Commands::Status) => {
            let exit_code = cli::status::run(&config)?;
            if exit_code != 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}
