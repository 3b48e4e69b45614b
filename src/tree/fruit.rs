use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FruitState {
    Flower,
    NoFlower,
    FruitScar,
    Fruit,
}

impl FruitState {
    pub fn as_str(self) -> &'static str {
        match self {
            FruitState::Flower => "FLOWER",
            FruitState::NoFlower => "NO_FLOWER",
            FruitState::FruitScar => "FRUIT_SCAR",
            FruitState::Fruit => "FRUIT",
        }
    }
}

impl fmt::Display for FruitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FruitState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        [
            FruitState::Flower,
            FruitState::NoFlower,
            FruitState::FruitScar,
            FruitState::Fruit,
        ]
        .into_iter()
        .find(|st| st.as_str() == upper)
        .ok_or_else(|| Error::invalid(format!("unknown fruit state '{s}'")))
    }
}

/// Growth law turning fruit age into fresh mass.
pub trait MassModel: std::fmt::Debug {
    /// Mass in kg at `age` days after bloom.
    fn mass_at(&self, age: f64) -> f64;
    /// Days a flower stays open before it sets or drops.
    fn flower_duration(&self) -> f64;
    /// Chance that an open flower sets fruit.
    fn set_probability(&self) -> f64;
}

/// Expolinear apple growth: exponential at first, then linear at
/// `max_absolute_growth_rate` after a lag of `lost_time` days.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpolinearGrowth {
    #[serde(default = "ExpolinearGrowth::default_flower_duration")]
    pub flower_duration: f64,
    #[serde(default = "ExpolinearGrowth::default_max_relative_growth_rate")]
    pub max_relative_growth_rate: f64,
    #[serde(default = "ExpolinearGrowth::default_lost_time")]
    pub lost_time: f64,
    #[serde(default = "ExpolinearGrowth::default_max_age")]
    pub max_age: f64,
    #[serde(default = "ExpolinearGrowth::default_probability")]
    pub probability: f64,
    #[serde(default = "ExpolinearGrowth::default_max_absolute_growth_rate")]
    pub max_absolute_growth_rate: f64,
}

impl ExpolinearGrowth {
    fn default_flower_duration() -> f64 {
        10.0
    }
    fn default_max_relative_growth_rate() -> f64 {
        0.167
    }
    fn default_lost_time() -> f64 {
        28.0
    }
    fn default_max_age() -> f64 {
        147.0
    }
    fn default_probability() -> f64 {
        0.3
    }
    fn default_max_absolute_growth_rate() -> f64 {
        0.0018
    }
}

impl Default for ExpolinearGrowth {
    fn default() -> Self {
        Self {
            flower_duration: Self::default_flower_duration(),
            max_relative_growth_rate: Self::default_max_relative_growth_rate(),
            lost_time: Self::default_lost_time(),
            max_age: Self::default_max_age(),
            probability: Self::default_probability(),
            max_absolute_growth_rate: Self::default_max_absolute_growth_rate(),
        }
    }
}

impl MassModel for ExpolinearGrowth {
    fn mass_at(&self, age: f64) -> f64 {
        let rmax = self.max_relative_growth_rate;
        let r = self.max_absolute_growth_rate / rmax;
        let fruit_age = (age - self.flower_duration).min(self.max_age);
        r * (1.0 + (rmax * (fruit_age - self.lost_time)).exp()).ln()
    }

    fn flower_duration(&self) -> f64 {
        self.flower_duration
    }

    fn set_probability(&self) -> f64 {
        self.probability
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FruitModelConfig {
    Expolinear(ExpolinearGrowth),
}

impl Default for FruitModelConfig {
    fn default() -> Self {
        FruitModelConfig::Expolinear(ExpolinearGrowth::default())
    }
}

impl FruitModelConfig {
    pub fn create_model(self) -> AnyMassModel {
        match self {
            FruitModelConfig::Expolinear(law) => AnyMassModel::Expolinear(law),
        }
    }
}

#[derive(Debug, Clone)]
pub enum AnyMassModel {
    Expolinear(ExpolinearGrowth),
}

impl MassModel for AnyMassModel {
    fn mass_at(&self, age: f64) -> f64 {
        match self {
            AnyMassModel::Expolinear(m) => m.mass_at(age),
        }
    }

    fn flower_duration(&self) -> f64 {
        match self {
            AnyMassModel::Expolinear(m) => m.flower_duration(),
        }
    }

    fn set_probability(&self) -> f64 {
        match self {
            AnyMassModel::Expolinear(m) => m.set_probability(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Fruit {
    state: FruitState,
    pub age: f64,
    pub mass: f64,
    model: AnyMassModel,
}

impl Fruit {
    pub fn new(model: AnyMassModel) -> Self {
        Self {
            state: FruitState::NoFlower,
            age: 0.0,
            mass: 0.0,
            model,
        }
    }

    pub fn model(&self) -> &AnyMassModel {
        &self.model
    }

    pub fn state(&self) -> FruitState {
        self.state
    }

    pub fn set_state(&mut self, state: FruitState) {
        self.state = state;
    }

    pub fn set_state_named(&mut self, name: &str) -> Result<()> {
        self.state = name.parse()?;
        Ok(())
    }

    pub fn compute_mass(&mut self) -> f64 {
        self.mass = self.model.mass_at(self.age);
        self.mass
    }
}
