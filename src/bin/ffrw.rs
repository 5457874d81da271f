use anyhow::{Context, Result};
use clap::Parser;
use ffrw::{reweight::run, ReweightOptions};

/// Compute form-factor weights for a simulated B0 -> D* tau nu sample.
#[derive(Parser)]
#[command(name = "ffrw", version, about)]
struct Cli {
    /// Truth-level ntuple (.root or .parquet)
    input: String,
    /// File to write the weight table to (.root or .parquet)
    output: String,
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    run(&cli.input, &cli.output, &ReweightOptions::default())
        .with_context(|| format!("failed to reweight {} into {}", cli.input, cli.output))?;
    Ok(())
}
