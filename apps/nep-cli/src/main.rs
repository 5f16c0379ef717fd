//! `nep`: look at files through the dispatch engine.

mod commands;

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use nep_core::EngineConfig;

#[derive(Parser, Debug)]
#[command(name = "nep", version, about = "Format detection and inspection for NEP datasets")]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Engine configuration as JSON (missing keys keep their defaults).
    #[arg(long, env = "NEP_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report which format would open each path, and by which rule.
    Detect {
        paths: Vec<String>,
        /// Mode flags, e.g. "NETCDF4" or "UDF3|WRITE".
        #[arg(long)]
        mode: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List registered and quarantined formats.
    Formats {
        #[arg(long)]
        json: bool,
    },
    /// Open a file and print its dimensions, variables and global attributes.
    Inspect {
        path: String,
        #[arg(long)]
        mode: Option<String>,
    },
}

fn setup_logger(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        };
        EnvFilter::builder()
            .with_default_directive(level.into())
            .parse_lossy("")
    });
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_ansi(std::io::stderr().is_terminal())
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logger(cli.verbose);

    let config = load_config(cli.config.as_ref())?;
    let engine = nep_plugins::runtime::init_engine(config, |engine| {
        if let Err(e) = nep_formats::register_all(engine) {
            warn!(error = %e, "built-in extension formats not registered");
        }
    });
    let engine = engine.read().expect("engine lock poisoned");

    let mut out = std::io::stdout().lock();
    match cli.command {
        Command::Detect { paths, mode, json } => {
            let mode = commands::parse_mode(mode.as_deref())?;
            commands::detect(&engine, &paths, mode, json, &mut out)
        }
        Command::Formats { json } => {
            commands::formats(&engine, nep_plugins::runtime::load_report(), json, &mut out)
        }
        Command::Inspect { path, mode } => {
            let mode = commands::parse_mode(mode.as_deref())?;
            commands::inspect(&engine, &path, mode, &mut out)
        }
    }
}
