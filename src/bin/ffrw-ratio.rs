use anyhow::{Context, Result};
use clap::Parser;
use ffrw::{
    data::read_weights,
    ratio::{compare_observable, Binning},
    reweight::OUTPUT_TREE,
    Observable,
};

/// Compare the fit variables of a weight table with and without the form-factor weight.
#[derive(Parser)]
#[command(name = "ffrw-ratio", version, about)]
struct Cli {
    /// Weight table written by `ffrw`
    weights: String,

    /// Tree holding the weights (ROOT files only)
    #[arg(long, default_value = OUTPUT_TREE)]
    tree: String,

    /// Variables to compare
    #[arg(long, num_args = 1.., default_values_t = Observable::ALL)]
    vars: Vec<Observable>,

    /// Binning as "(bins,low,high)", one per variable; defaults depend on the variable
    #[arg(long, num_args = 1..)]
    bin_ranges: Vec<Binning>,
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

    if !cli.bin_ranges.is_empty() && cli.bin_ranges.len() != cli.vars.len() {
        anyhow::bail!(
            "got {} bin ranges for {} variables",
            cli.bin_ranges.len(),
            cli.vars.len()
        );
    }
    let table = read_weights(&cli.weights, Some(&cli.tree))
        .with_context(|| format!("failed to read weights from {}", cli.weights))?;
    tracing::info!(rows = table.len(), path = %cli.weights, "Loaded weight table");

    for (i, &observable) in cli.vars.iter().enumerate() {
        let binning = cli
            .bin_ranges
            .get(i)
            .copied()
            .unwrap_or_else(|| Binning::for_observable(observable));
        let ratio = compare_observable(&table, observable, &binning)?;
        println!("{observable} {binning}");
        println!("{ratio}");
    }
    Ok(())
}
