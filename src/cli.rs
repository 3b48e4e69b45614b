use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Args {
    /// Path to config TOML (written with commented defaults if missing)
    #[arg(long, default_value = "malus.toml")]
    pub config: PathBuf,

    /// Random seed (overrides config)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Last simulated date, YYYY-MM-DD (overrides config)
    #[arg(long, value_name = "DATE")]
    pub until: Option<NaiveDate>,

    /// Write the final report as JSON
    #[arg(long, value_name = "PATH")]
    pub summary: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "malus::sim=debug" (overrides RUST_LOG)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

impl Args {
    /// Apply command-line overrides to a loaded config.
    pub fn apply(&self, config: &mut malus::config::SimConfig) {
        if let Some(seed) = self.seed {
            config.general.seed = seed;
        }
        if let Some(until) = self.until {
            config.general.date_end = until;
        }
    }
}
