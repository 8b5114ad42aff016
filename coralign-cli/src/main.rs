//! Coralign CLI: resolve experiment settings from presets and check them.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Resolve experiment settings from dataset, algorithm and model presets
#[derive(Parser, Debug)]
#[command(name = "coralign", version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Fill in every default implied by the dataset and algorithm
    Resolve {
        /// Dataset name (e.g., camelyon17, iwildcam, fmow)
        #[arg(short, long)]
        dataset: Option<String>,

        /// Algorithm name (e.g., deepCORAL, ERM, groupDRO)
        #[arg(short, long)]
        algorithm: Option<String>,

        #[command(flatten)]
        input: InputArgs,
    },
    /// Fill in the defaults for SwAV pretraining
    Swav {
        /// Dataset name (e.g., camelyon17, iwildcam, fmow, poverty)
        #[arg(short, long)]
        dataset: Option<String>,

        #[command(flatten)]
        input: InputArgs,
    },
    /// Strictly check a settings file against a template
    Check {
        /// Settings file (TOML or JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Template file (TOML or JSON)
        #[arg(short, long)]
        template: PathBuf,
    },
    /// List the known presets
    Presets {
        #[arg(value_enum, default_value_t = PresetKind::Datasets)]
        kind: PresetKind,

        /// Extra presets layered over the built-in ones
        #[arg(long)]
        presets: Option<PathBuf>,
    },
}

/// Settings sources shared by `resolve` and `swav`.
#[derive(clap::Args, Debug)]
struct InputArgs {
    /// Settings file (TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Extra presets layered over the built-in ones
    #[arg(long)]
    presets: Option<PathBuf>,

    /// Override a field, e.g. --set lr=0.01 --set 'groupby_fields=["hospital"]'
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Json,
    Toml,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum PresetKind {
    Datasets,
    Algorithms,
    Models,
    Schedulers,
    Splits,
    Swav,
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "coralign", "coralign")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "coralign.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let output = commands::handle_command(cli.command)?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
