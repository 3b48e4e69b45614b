use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::sim::calendar::Events;
use crate::sim::structure::TreeParams;
use crate::tree::apex::ApexParams;
use crate::tree::fruit::FruitModelConfig;
use crate::tree::internode::InternodeParams;
use crate::tree::leaf::LeafParams;
use crate::tree::sequences::LONG_SHOOT_FLOOR;
use crate::tree::wood::WoodParams;

/// Shortest growth unit the generators produce (spurs and inflorescences).
const SHORTEST_UNIT: usize = 4;
const LONGEST_UNIT: usize = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "GeneralConfig::default_date_start")]
    pub date_start: NaiveDate,
    #[serde(default = "GeneralConfig::default_date_end")]
    pub date_end: NaiveDate,
    /// Days per step.
    #[serde(default = "GeneralConfig::default_time_step")]
    pub time_step: u32,
    #[serde(default = "GeneralConfig::default_seed")]
    pub seed: u64,
    /// Draw second-year long shoots from observed branches.
    #[serde(default = "GeneralConfig::default_second_year_draws")]
    pub second_year_draws: bool,
    #[serde(default = "GeneralConfig::default_ruptures")]
    pub ruptures: bool,
    #[serde(default = "GeneralConfig::default_stake")]
    pub stake: bool,
    #[serde(default = "GeneralConfig::default_select_trunk")]
    pub select_trunk: usize,
    #[serde(default = "GeneralConfig::default_mechanics")]
    pub mechanics: bool,
    #[serde(default = "GeneralConfig::default_convergence_steps")]
    pub convergence_steps: u32,
}

impl GeneralConfig {
    fn default_date_start() -> NaiveDate {
        NaiveDate::from_ymd_opt(1994, 1, 1).unwrap_or_default()
    }
    fn default_date_end() -> NaiveDate {
        NaiveDate::from_ymd_opt(1998, 6, 30).unwrap_or_default()
    }
    fn default_time_step() -> u32 {
        1
    }
    fn default_seed() -> u64 {
        1_163_078_255
    }
    fn default_second_year_draws() -> bool {
        true
    }
    fn default_ruptures() -> bool {
        false
    }
    fn default_stake() -> bool {
        true
    }
    fn default_select_trunk() -> usize {
        0
    }
    fn default_mechanics() -> bool {
        true
    }
    fn default_convergence_steps() -> u32 {
        2
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            date_start: Self::default_date_start(),
            date_end: Self::default_date_end(),
            time_step: Self::default_time_step(),
            seed: Self::default_seed(),
            second_year_draws: Self::default_second_year_draws(),
            ruptures: Self::default_ruptures(),
            stake: Self::default_stake(),
            select_trunk: Self::default_select_trunk(),
            mechanics: Self::default_mechanics(),
            convergence_steps: Self::default_convergence_steps(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkovConfig {
    #[serde(default = "MarkovConfig::default_minimum_length")]
    pub minimum_length: usize,
    #[serde(default = "MarkovConfig::default_maximum_length")]
    pub maximum_length: usize,
    #[serde(default = "MarkovConfig::default_max_iterations")]
    pub max_iterations: usize,
    /// `[[model]]` records replacing the built-in library.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models_path: Option<PathBuf>,
}

impl MarkovConfig {
    fn default_minimum_length() -> usize {
        4
    }
    fn default_maximum_length() -> usize {
        70
    }
    fn default_max_iterations() -> usize {
        1000
    }
}

impl Default for MarkovConfig {
    fn default() -> Self {
        Self {
            minimum_length: Self::default_minimum_length(),
            maximum_length: Self::default_maximum_length(),
            max_iterations: Self::default_max_iterations(),
            models_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leaf_area_path: Option<PathBuf>,
    #[serde(default = "InputConfig::default_leaf_area_function")]
    pub leaf_area_function: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trunk_sequences_path: Option<PathBuf>,
}

impl InputConfig {
    fn default_leaf_area_function() -> String {
        "leaf_area".to_string()
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            leaf_area_path: None,
            leaf_area_function: Self::default_leaf_area_function(),
            trunk_sequences_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SimConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub events: Events,
    #[serde(default)]
    pub tree: TreeParams,
    #[serde(default)]
    pub wood: WoodParams,
    #[serde(default)]
    pub internode: InternodeParams,
    #[serde(default)]
    pub apex: ApexParams,
    #[serde(default)]
    pub markov: MarkovConfig,
    #[serde(default)]
    pub fruit: FruitModelConfig,
    #[serde(default)]
    pub leaf: LeafParams,
    #[serde(default)]
    pub input: InputConfig,
}

fn check_probability(name: &str, p: f64) -> Result<()> {
    if (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(Error::invalid(format!("{name} must lie in [0, 1], got {p}")))
    }
}

impl SimConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let general = &self.general;
        if general.time_step == 0 {
            return Err(Error::invalid("general.time_step must be at least 1"));
        }
        if general.convergence_steps == 0 {
            return Err(Error::invalid("general.convergence_steps must be at least 1"));
        }
        if general.date_end < general.date_start {
            return Err(Error::invalid(format!(
                "general.date_end {} precedes date_start {}",
                general.date_end, general.date_start
            )));
        }

        let markov = &self.markov;
        if markov.minimum_length == 0 || markov.minimum_length > SHORTEST_UNIT {
            return Err(Error::invalid(format!(
                "markov.minimum_length must lie in [1, {SHORTEST_UNIT}], got {}",
                markov.minimum_length
            )));
        }
        if !(LONG_SHOOT_FLOOR..=LONGEST_UNIT).contains(&markov.maximum_length) {
            return Err(Error::invalid(format!(
                "markov.maximum_length must lie in [{LONG_SHOOT_FLOOR}, {LONGEST_UNIT}], got {}",
                markov.maximum_length
            )));
        }

        self.events.validate()?;
        check_probability("tree.spur_death_probability", self.tree.spur_death_probability)?;
        check_probability(
            "tree.inflorescence_death_probability",
            self.tree.inflorescence_death_probability,
        )?;
        check_probability("leaf.fall_probability", self.leaf.fall_probability)?;
        let FruitModelConfig::Expolinear(law) = &self.fruit;
        check_probability("fruit.probability", law.probability)?;
        Ok(())
    }

    /// Defaults as TOML with every value commented out. Section headers stay
    /// so a line can be enabled in place; nested tables are commented whole.
    pub fn commented_defaults() -> Result<String> {
        let text = toml::to_string_pretty(&Self::default())?;
        let mut commented = String::new();
        let mut nested = false;
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                commented.push('\n');
            } else if trimmed.starts_with('[') && trimmed.ends_with(']') {
                nested = trimmed.contains('.');
                if nested {
                    commented.push_str("# ");
                }
                commented.push_str(line);
                commented.push('\n');
            } else if !nested && trimmed.starts_with("type =") {
                commented.push_str(line);
                commented.push('\n');
            } else {
                commented.push_str("# ");
                commented.push_str(line);
                commented.push('\n');
            }
        }
        Ok(commented)
    }

    /// Read `path`, or write the commented defaults there and use them when
    /// the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let contents = fs::read_to_string(path)?;
            return Self::from_toml_str(&contents);
        }

        let default_cfg = Self::default();
        match Self::commented_defaults() {
            Ok(text) => match fs::write(path, text) {
                Ok(()) => info!(target: "malus::sim", path = %path.display(), "wrote default config"),
                Err(err) => warn!(
                    target: "malus::sim",
                    "failed to write default config to {}: {err}",
                    path.display()
                ),
            },
            Err(err) => warn!(target: "malus::sim", "failed to serialize default config: {err}"),
        }
        Ok(default_cfg)
    }
}
