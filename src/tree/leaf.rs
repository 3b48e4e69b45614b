use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::fset::FSet;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeafParams {
    /// Daily probability of falling during the leaf-fall window.
    #[serde(default = "LeafParams::default_fall_probability")]
    pub fall_probability: f64,
    /// Days to full expansion.
    #[serde(default = "LeafParams::default_maturation")]
    pub maturation: f64,
    /// kg/m².
    #[serde(default = "LeafParams::default_mass_per_area")]
    pub mass_per_area: f64,
    #[serde(default = "LeafParams::default_max_area")]
    pub max_area: f64,
    #[serde(default = "LeafParams::default_min_final_area")]
    pub min_final_area: f64,
    #[serde(default = "LeafParams::default_petiole_radius")]
    pub petiole_radius: f64,
    /// Leaves already formed in the bud; they stay small.
    #[serde(default = "LeafParams::default_preformed_leaves")]
    pub preformed_leaves: u32,
}

impl LeafParams {
    fn default_fall_probability() -> f64 {
        0.1
    }
    fn default_maturation() -> f64 {
        12.0
    }
    fn default_mass_per_area() -> f64 {
        0.220
    }
    fn default_max_area() -> f64 {
        0.003
    }
    fn default_min_final_area() -> f64 {
        0.002
    }
    fn default_petiole_radius() -> f64 {
        0.0006
    }
    fn default_preformed_leaves() -> u32 {
        8
    }
}

impl Default for LeafParams {
    fn default() -> Self {
        Self {
            fall_probability: Self::default_fall_probability(),
            maturation: Self::default_maturation(),
            mass_per_area: Self::default_mass_per_area(),
            max_area: Self::default_max_area(),
            min_final_area: Self::default_min_final_area(),
            petiole_radius: Self::default_petiole_radius(),
            preformed_leaves: Self::default_preformed_leaves(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafState {
    Growing,
    Scar,
}

impl fmt::Display for LeafState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeafState::Growing => f.write_str("GROWING"),
            LeafState::Scar => f.write_str("SCAR"),
        }
    }
}

impl FromStr for LeafState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GROWING" => Ok(LeafState::Growing),
            "SCAR" => Ok(LeafState::Scar),
            _ => Err(Error::invalid(format!("unknown leaf state '{s}'"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Leaf {
    state: LeafState,
    pub age: f64,
    pub area: f64,
    pub mass: f64,
    pub maturity: bool,
    params: LeafParams,
}

impl Leaf {
    pub fn new(params: LeafParams) -> Self {
        Self {
            state: LeafState::Growing,
            age: 0.0,
            area: 0.0,
            mass: 0.0,
            maturity: false,
            params,
        }
    }

    pub fn params(&self) -> &LeafParams {
        &self.params
    }

    pub fn state(&self) -> LeafState {
        self.state
    }

    pub fn set_state(&mut self, state: LeafState) {
        self.state = state;
    }

    pub fn set_state_named(&mut self, name: &str) -> Result<()> {
        self.state = name.parse()?;
        Ok(())
    }

    /// Area once fully expanded, for the metamer `number` on its shoot.
    pub fn compute_area(&self, number: u32) -> f64 {
        if number < self.params.preformed_leaves {
            self.params.min_final_area
        } else {
            self.params.max_area
        }
    }

    /// Area at the current age, following `expansion` of relative age until
    /// maturity.
    pub fn compute_area_from_func(&mut self, number: u32, expansion: &FSet) -> f64 {
        if !self.maturity && self.age < self.params.maturation {
            self.compute_area(number) * expansion.gety(self.age / self.params.maturation)
        } else {
            self.maturity = true;
            self.compute_area(number)
        }
    }

    pub fn compute_mass(&mut self) -> f64 {
        self.mass = self.area * self.params.mass_per_area;
        self.mass
    }
}
