use anyhow::Result;
use clap::Parser;
use pencil_spectrum::{Config, EngineKind, Precision};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pencil_spectrum", about = "Isotropic power spectrum of a synthetic 3D field")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
    /// Directory holding plain-text `stdin` and `dims` inputs, used instead of --config
    #[arg(long)]
    legacy: Option<PathBuf>,
    /// Number of ranks to run with
    #[arg(short = 'n', long)]
    ranks: Option<usize>,
    #[arg(long, value_enum)]
    precision: Option<Precision>,
    #[arg(long, value_enum)]
    engine: Option<EngineKind>,
    /// Only log warnings and errors
    #[arg(long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut cfg = match &cli.legacy {
        Some(dir) => Config::from_legacy_dir(dir)?,
        None => Config::load_or_default(&cli.config)?,
    };
    if let Some(ranks) = cli.ranks {
        cfg.run.ranks = ranks;
    }
    if let Some(precision) = cli.precision {
        cfg.run.precision = precision;
    }
    if let Some(engine) = cli.engine {
        cfg.run.engine = engine;
    }

    pencil_spectrum::run(cfg)
}
