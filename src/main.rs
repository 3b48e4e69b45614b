// Entry point: loads the config, runs one tree and prints its summary.
mod cli;

use std::error::Error;
use std::fs;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use malus::config::SimConfig;
use malus::sim::simulation::Simulation;

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = cli::Args::parse();
    init_tracing(args.log_level.as_deref());

    let mut config = SimConfig::load(&args.config)?;
    args.apply(&mut config);

    let mut simulation = Simulation::new(config)?;
    let report = simulation.run()?;
    println!("{report}");

    if let Some(path) = &args.summary {
        fs::write(path, serde_json::to_string_pretty(&report)?)?;
    }
    Ok(())
}
