use serde::{Deserialize, Serialize};

use crate::core::frame::Frame;
use crate::error::{Error, Result};
use crate::tree::observation::Observation;
use crate::tree::sequences::{Sequence, SequenceEntry};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApexParams {
    /// Radius growth of a terminal apex, m/day.
    #[serde(default = "ApexParams::default_terminal_expansion_rate")]
    pub terminal_expansion_rate: f64,
    #[serde(default = "ApexParams::default_minimum_size")]
    pub minimum_size: f64,
    #[serde(default = "ApexParams::default_maximum_size")]
    pub maximum_size: f64,
    /// Days a terminal apex keeps expanding.
    #[serde(default = "ApexParams::default_expansion_period")]
    pub expansion_period: u32,
}

impl ApexParams {
    fn default_terminal_expansion_rate() -> f64 {
        0.00002
    }
    fn default_minimum_size() -> f64 {
        0.00075
    }
    fn default_maximum_size() -> f64 {
        0.003
    }
    fn default_expansion_period() -> u32 {
        300
    }
}

impl Default for ApexParams {
    fn default() -> Self {
        Self {
            terminal_expansion_rate: Self::default_terminal_expansion_rate(),
            minimum_size: Self::default_minimum_size(),
            maximum_size: Self::default_maximum_size(),
            expansion_period: Self::default_expansion_period(),
        }
    }
}

/// A growth point consuming its bud-fate sequence one metamer at a time.
#[derive(Debug, Clone)]
pub struct Apex {
    observation: Observation,
    pub parent_observation: Observation,
    pub trunk: bool,
    pub frame: Frame,
    pub sequence: Option<Sequence>,
    pub sequence_position: usize,
    pub radius: f64,
    pub target_radius: f64,
    pub expansion_period: u32,
    pub expansion_days_counter: f64,
    sequence_minimum_length: usize,
    sequence_maximum_length: usize,
    terminal_expansion_rate: f64,
    minimum_size: f64,
    maximum_size: f64,

    pub parent_unit_id: usize,
    pub parent_fbr_id: usize,
    pub parent_tree_id: usize,
    /// Year the current growth unit was generated in.
    pub year: i32,
    pub sylleptic: bool,
    pub from_pruning: bool,
    pub rank: u32,
    pub react_pos: u32,
    pub closest_apex: u32,
    pub farthest_apex: u32,
    pub sons_nb: u32,
}

impl Apex {
    pub fn new(
        params: &ApexParams,
        frame: Frame,
        observation: Observation,
        minimum_length: usize,
        maximum_length: usize,
    ) -> Result<Self> {
        if maximum_length <= minimum_length {
            return Err(Error::invalid(format!(
                "apex sequence bounds [{minimum_length}, {maximum_length}] are empty"
            )));
        }
        Ok(Self {
            observation,
            parent_observation: Observation::NewShoot,
            trunk: observation == Observation::Trunk,
            frame,
            sequence: None,
            sequence_position: 0,
            radius: 0.0,
            target_radius: 0.0,
            expansion_period: params.expansion_period,
            expansion_days_counter: 0.0,
            sequence_minimum_length: minimum_length,
            sequence_maximum_length: maximum_length,
            terminal_expansion_rate: params.terminal_expansion_rate,
            minimum_size: params.minimum_size,
            maximum_size: params.maximum_size,
            parent_unit_id: 0,
            parent_fbr_id: 0,
            parent_tree_id: 0,
            year: 0,
            sylleptic: false,
            from_pruning: false,
            rank: 0,
            react_pos: 0,
            closest_apex: 0,
            farthest_apex: 0,
            sons_nb: 0,
        })
    }

    pub fn observation(&self) -> Observation {
        self.observation
    }

    pub fn set_observation(&mut self, observation: Observation) {
        self.observation = observation;
    }

    pub fn set_observation_named(&mut self, name: &str) -> Result<()> {
        self.observation = name.parse()?;
        Ok(())
    }

    /// Start a new growth unit.
    pub fn set_sequence(&mut self, sequence: Sequence, year: i32) {
        self.sequence = Some(sequence);
        self.sequence_position = 0;
        self.year = year;
    }

    pub fn current_entry(&self) -> Option<SequenceEntry> {
        self.sequence
            .as_ref()
            .and_then(|s| s.get(self.sequence_position))
            .copied()
    }

    pub fn advance(&mut self) {
        self.sequence_position += 1;
    }

    pub fn is_exhausted(&self) -> bool {
        self.sequence
            .as_ref()
            .is_some_and(|s| self.sequence_position >= s.len())
    }

    fn current_code(&self) -> Option<u8> {
        self.current_entry().map(|e| e.observation)
    }

    /// Lateral bud type at the cursor.
    pub fn observation_from_sequence(&self) -> Observation {
        self.current_code()
            .map_or(Observation::Dormant, Observation::from_sequence_code)
    }

    /// Whether the bud at the cursor grows in the same season.
    pub fn trunk_sylleptic(&self) -> Result<bool> {
        match self.current_code() {
            Some(0..=4) => Ok(false),
            Some(5..=7) => Ok(true),
            other => Err(Error::invalid(format!(
                "no sylleptic rule for sequence code {other:?}"
            ))),
        }
    }

    /// Radius a terminal apex expands towards, growing with the number of
    /// metamers it produced.
    pub fn max_terminal_radius_target(&mut self) -> Result<()> {
        if self.sequence_position < self.sequence_minimum_length {
            return Err(Error::invalid(format!(
                "apex at position {} is shorter than the minimum sequence length {}",
                self.sequence_position, self.sequence_minimum_length
            )));
        }
        let length_range = (self.sequence_maximum_length - self.sequence_minimum_length) as f64;
        let radius_range = self.maximum_size - self.minimum_size;
        self.target_radius = self.minimum_size
            + radius_range * (self.sequence_position - self.sequence_minimum_length) as f64
                / length_range;
        Ok(())
    }

    pub fn terminal_expansion(&mut self, dt: f64) {
        self.radius += self.terminal_expansion_rate * dt;
        self.expansion_days_counter += dt;
    }

    pub fn is_expanding(&self) -> bool {
        self.expansion_days_counter < self.expansion_period as f64 && self.radius < self.target_radius
    }
}
