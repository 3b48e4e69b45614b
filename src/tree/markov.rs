//! Hidden semi-Markov models of shoot bud-fate sequences and the bounded
//! generator built on them.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use rand::distr::weighted::WeightedIndex;
use rand_distr::{Binomial, Gamma, Poisson};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::random::SimRng;
use crate::error::{Error, Result};

/// Attempts above which a successful generation is still reported.
pub const SLOW_GENERATION_ATTEMPTS: usize = 100;
const OCCUPANCY_REDRAWS: usize = 10_000;
const MAX_STATE_VISITS: usize = 1_000;
const BUILTIN_MODELS: &str = include_str!("../../data/markov_models.toml");

/// `(state, observation)` pairs in generation order.
pub type MarkovSequence = Vec<(usize, usize)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LengthClass {
    Medium,
    Long,
}

impl fmt::Display for LengthClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LengthClass::Medium => f.write_str("MEDIUM"),
            LengthClass::Long => f.write_str("LONG"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DistributionKind {
    NegativeBinomial,
    Binomial,
    Poisson,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccupancyConfig {
    pub distribution: DistributionKind,
    #[serde(default)]
    pub parameter: Option<f64>,
    #[serde(default)]
    pub probability: Option<f64>,
    pub bounds: [u64; 2],
}

/// One model record as written in a model file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkovModelConfig {
    pub year: u32,
    pub length: LengthClass,
    pub initial_probabilities: Vec<f64>,
    pub transition_probabilities: Vec<Vec<f64>>,
    pub occupancy_distributions: Vec<OccupancyConfig>,
    pub observation_distributions: Vec<Vec<f64>>,
}

#[derive(Debug, Clone)]
enum OccupancyLaw {
    /// Gamma–Poisson mixture.
    NegativeBinomial(Gamma<f64>),
    Binomial(Binomial),
    Poisson(Poisson<f64>),
}

#[derive(Debug, Clone)]
pub struct Occupancy {
    law: OccupancyLaw,
    lower: u64,
    upper: u64,
}

impl Occupancy {
    fn from_config(state: usize, cfg: &OccupancyConfig) -> Result<Self> {
        let [lower, upper] = cfg.bounds;
        let bad = |msg: String| Error::model(format!("occupancy of state {state}: {msg}"));
        if lower > upper {
            return Err(bad(format!("bounds [{lower}, {upper}] are reversed")));
        }
        let law = match cfg.distribution {
            DistributionKind::NegativeBinomial => {
                let n = cfg
                    .parameter
                    .ok_or_else(|| bad("NEGATIVE_BINOMIAL needs a parameter".into()))?;
                let p = cfg
                    .probability
                    .ok_or_else(|| bad("NEGATIVE_BINOMIAL needs a probability".into()))?;
                if !(n > 0.0) || !(p > 0.0 && p < 1.0) {
                    return Err(bad(format!("NEGATIVE_BINOMIAL({n}, {p}) is degenerate")));
                }
                let gamma = Gamma::new(n, (1.0 - p) / p).map_err(|e| bad(e.to_string()))?;
                OccupancyLaw::NegativeBinomial(gamma)
            }
            DistributionKind::Binomial => {
                let p = cfg
                    .probability
                    .ok_or_else(|| bad("BINOMIAL needs a probability".into()))?;
                if lower > 1 {
                    return Err(bad(format!("bounds [{lower}, {upper}] exclude BINOMIAL(1, p)")));
                }
                OccupancyLaw::Binomial(Binomial::new(1, p).map_err(|e| bad(e.to_string()))?)
            }
            DistributionKind::Poisson => {
                let lambda = cfg
                    .parameter
                    .ok_or_else(|| bad("POISSON needs a parameter".into()))?;
                OccupancyLaw::Poisson(Poisson::new(lambda).map_err(|e| bad(e.to_string()))?)
            }
        };
        Ok(Self { law, lower, upper })
    }

    fn sample_once(&self, rng: &mut SimRng) -> Result<u64> {
        Ok(match &self.law {
            OccupancyLaw::NegativeBinomial(gamma) => {
                let lambda: f64 = rng.sample(gamma);
                if lambda > 0.0 {
                    let poisson = Poisson::new(lambda)
                        .map_err(|e| Error::model(format!("negative binomial mixture: {e}")))?;
                    rng.sample::<f64, _>(&poisson) as u64
                } else {
                    0
                }
            }
            OccupancyLaw::Binomial(binomial) => rng.sample::<u64, _>(binomial),
            OccupancyLaw::Poisson(poisson) => rng.sample::<f64, _>(poisson) as u64,
        })
    }

    /// Draw until the value falls inside the state bounds; `None` when the
    /// bounds are practically unreachable.
    fn draw(&self, rng: &mut SimRng) -> Result<Option<u64>> {
        for _ in 0..OCCUPANCY_REDRAWS {
            let value = self.sample_once(rng)?;
            if (self.lower..=self.upper).contains(&value) {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    pub fn bounds(&self) -> (u64, u64) {
        (self.lower, self.upper)
    }
}

fn normalize(row: &[f64], what: &str) -> Result<Vec<f64>> {
    if row.iter().any(|p| !p.is_finite() || *p < 0.0) {
        return Err(Error::model(format!("{what} has a negative or non-finite entry")));
    }
    let total: f64 = row.iter().sum();
    if !(total > 0.0) {
        return Err(Error::model(format!("{what} has no probability mass")));
    }
    Ok(row.iter().map(|p| p / total).collect())
}

fn weighted(row: &[f64], what: &str) -> Result<WeightedIndex<f64>> {
    WeightedIndex::new(row).map_err(|e| Error::model(format!("{what}: {e}")))
}

/// Validated, normalized model for one (length class, year) pair.
///
/// State `N - 1` is the absorbing final state; it emits nothing.
#[derive(Debug, Clone)]
pub struct MarkovModel {
    year: u32,
    length: LengthClass,
    initial_probabilities: Vec<f64>,
    transition_probabilities: Vec<Vec<f64>>,
    observation_distributions: Vec<Vec<f64>>,
    occupancies: Vec<Occupancy>,
    initial: WeightedIndex<f64>,
    transitions: Vec<WeightedIndex<f64>>,
    emissions: Vec<WeightedIndex<f64>>,
}

impl MarkovModel {
    pub fn new(cfg: &MarkovModelConfig) -> Result<Self> {
        let n = cfg.initial_probabilities.len();
        let label = format!("{} model for year {}", cfg.length, cfg.year);
        if n < 2 {
            return Err(Error::model(format!("{label}: needs at least two states")));
        }
        if cfg.transition_probabilities.len() != n
            || cfg.transition_probabilities.iter().any(|r| r.len() != n)
        {
            return Err(Error::model(format!(
                "{label}: transition matrix must be {n}x{n}"
            )));
        }
        if cfg.observation_distributions.len() != n
            || cfg.observation_distributions.iter().any(|r| r.len() != n - 1)
        {
            return Err(Error::model(format!(
                "{label}: observation matrix must be {n}x{}",
                n - 1
            )));
        }
        if cfg.occupancy_distributions.len() != n - 1 {
            return Err(Error::model(format!(
                "{label}: expected {} occupancy distributions, got {}",
                n - 1,
                cfg.occupancy_distributions.len()
            )));
        }

        let initial_probabilities =
            normalize(&cfg.initial_probabilities, &format!("{label}: initial vector"))?;
        let transition_probabilities = cfg
            .transition_probabilities
            .iter()
            .enumerate()
            .map(|(i, r)| normalize(r, &format!("{label}: transition row {i}")))
            .collect::<Result<Vec<_>>>()?;
        let absorbing = transition_probabilities[n - 1]
            .iter()
            .enumerate()
            .all(|(j, &p)| if j == n - 1 { p == 1.0 } else { p == 0.0 });
        if !absorbing {
            return Err(Error::model(format!(
                "{label}: last state {} must be absorbing",
                n - 1
            )));
        }
        let observation_distributions = cfg
            .observation_distributions
            .iter()
            .enumerate()
            .map(|(i, r)| normalize(r, &format!("{label}: observation row {i}")))
            .collect::<Result<Vec<_>>>()?;
        let occupancies = cfg
            .occupancy_distributions
            .iter()
            .enumerate()
            .map(|(i, o)| Occupancy::from_config(i, o))
            .collect::<Result<Vec<_>>>()?;

        let initial = weighted(&initial_probabilities, &label)?;
        let transitions = transition_probabilities
            .iter()
            .map(|r| weighted(r, &label))
            .collect::<Result<Vec<_>>>()?;
        let emissions = observation_distributions
            .iter()
            .map(|r| weighted(r, &label))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            year: cfg.year,
            length: cfg.length,
            initial_probabilities,
            transition_probabilities,
            observation_distributions,
            occupancies,
            initial,
            transitions,
            emissions,
        })
    }

    pub fn year(&self) -> u32 {
        self.year
    }

    pub fn length(&self) -> LengthClass {
        self.length
    }

    pub fn states(&self) -> usize {
        self.initial_probabilities.len()
    }

    pub fn initial_probabilities(&self) -> &[f64] {
        &self.initial_probabilities
    }

    pub fn transition_probabilities(&self) -> &[Vec<f64>] {
        &self.transition_probabilities
    }

    pub fn observation_distributions(&self) -> &[Vec<f64>] {
        &self.observation_distributions
    }

    pub fn occupancies(&self) -> &[Occupancy] {
        &self.occupancies
    }

    /// One generation attempt; `None` when it must be discarded.
    fn attempt(&self, rng: &mut SimRng, lower: usize, upper: usize) -> Result<Option<MarkovSequence>> {
        let final_state = self.states() - 1;

        let mut visited = Vec::new();
        let mut state = rng.sample(&self.initial);
        while state != final_state {
            if visited.len() >= MAX_STATE_VISITS {
                return Ok(None);
            }
            visited.push(state);
            state = rng.sample(&self.transitions[state]);
        }

        let mut runs = Vec::with_capacity(visited.len());
        for &s in &visited {
            match self.occupancies[s].draw(rng)? {
                Some(k) => runs.push((s, k as usize)),
                None => return Ok(None),
            }
        }

        let total: usize = runs.iter().map(|(_, k)| k).sum();
        if total < lower || total > upper {
            return Ok(None);
        }

        let mut sequence = Vec::with_capacity(total);
        for (s, k) in runs {
            for _ in 0..k {
                sequence.push((s, rng.sample(&self.emissions[s])));
            }
        }
        Ok(Some(sequence))
    }

    /// Generate a sequence whose length lies in `[lower, upper]`, discarding
    /// whole attempts that miss the bounds.
    pub fn generate_bounded(
        &self,
        rng: &mut SimRng,
        lower: usize,
        upper: usize,
        max_iterations: usize,
    ) -> Result<MarkovSequence> {
        if lower > upper {
            return Err(Error::invalid(format!(
                "sequence bounds [{lower}, {upper}] are reversed"
            )));
        }
        for attempt in 1..=max_iterations {
            if let Some(sequence) = self.attempt(rng, lower, upper)? {
                if attempt > SLOW_GENERATION_ATTEMPTS {
                    warn!(
                        target: "malus::markov",
                        "{} sequence in [{lower}, {upper}] took {attempt} attempts",
                        self.length
                    );
                }
                return Ok(sequence);
            }
        }
        Err(Error::ExhaustedRetries {
            attempts: max_iterations,
            lower,
            upper,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ModelFile {
    #[serde(default)]
    model: Vec<MarkovModelConfig>,
}

/// Every loaded model, keyed by length class and year.
#[derive(Debug, Clone, Default)]
pub struct MarkovLibrary {
    models: BTreeMap<(LengthClass, u32), Arc<MarkovModel>>,
}

impl MarkovLibrary {
    pub fn from_configs(configs: &[MarkovModelConfig]) -> Result<Self> {
        let mut models = BTreeMap::new();
        for cfg in configs {
            let model = MarkovModel::new(cfg)?;
            if models
                .insert((cfg.length, cfg.year), Arc::new(model))
                .is_some()
            {
                return Err(Error::model(format!(
                    "duplicate {} model for year {}",
                    cfg.length, cfg.year
                )));
            }
        }
        let library = Self { models };
        for class in [LengthClass::Medium, LengthClass::Long] {
            if !library.models.keys().any(|(c, _)| *c == class) {
                return Err(Error::model(format!("no {class} model configured")));
            }
        }
        Ok(library)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: ModelFile = toml::from_str(text)?;
        Self::from_configs(&file.model)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        Self::from_toml_str(&fs::read_to_string(path)?)
    }

    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_MODELS)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Model for `year`, or the closest configured year of the same class.
    pub fn get(&self, class: LengthClass, year: u32) -> Option<Arc<MarkovModel>> {
        if let Some(model) = self.models.get(&(class, year)) {
            return Some(model.clone());
        }
        let nearest = self
            .models
            .iter()
            .filter(|((c, _), _)| *c == class)
            .min_by_key(|((_, y), _)| y.abs_diff(year))?;
        debug!(
            target: "malus::markov",
            "no {class} model for year {year}, using year {}", (nearest.0).1
        );
        Some(nearest.1.clone())
    }

    /// Model years used for a simulation year: (medium, long).
    pub fn schedule(year_no: u32) -> (u32, u32) {
        match year_no {
            0 => (3, 1),
            1 => (3, 2),
            2 => (3, 3),
            3 => (4, 4),
            _ => (5, 5),
        }
    }

    pub fn select(&self, year_no: u32) -> Result<(Arc<MarkovModel>, Arc<MarkovModel>)> {
        let (medium_year, long_year) = Self::schedule(year_no);
        let medium = self
            .get(LengthClass::Medium, medium_year)
            .ok_or_else(|| Error::model("no MEDIUM model configured"))?;
        let long = self
            .get(LengthClass::Long, long_year)
            .ok_or_else(|| Error::model("no LONG model configured"))?;
        Ok((medium, long))
    }
}

/// Bounded sequence generator over the models selected for the current year.
#[derive(Debug, Clone)]
pub struct Markov {
    minimum_length: usize,
    maximum_length: usize,
    max_iterations: usize,
    medium: Option<Arc<MarkovModel>>,
    long: Option<Arc<MarkovModel>>,
}

impl Markov {
    pub fn new(minimum_length: usize, maximum_length: usize, max_iterations: usize) -> Result<Self> {
        if minimum_length == 0 {
            return Err(Error::invalid("minimum sequence length must be positive"));
        }
        if maximum_length <= minimum_length {
            return Err(Error::invalid(format!(
                "maximum sequence length {maximum_length} must exceed minimum {minimum_length}"
            )));
        }
        if maximum_length > 300 {
            return Err(Error::invalid(format!(
                "maximum sequence length {maximum_length} exceeds 300"
            )));
        }
        if max_iterations == 0 {
            return Err(Error::invalid("max_iterations must be positive"));
        }
        Ok(Self {
            minimum_length,
            maximum_length,
            max_iterations,
            medium: None,
            long: None,
        })
    }

    pub fn minimum_length(&self) -> usize {
        self.minimum_length
    }

    pub fn maximum_length(&self) -> usize {
        self.maximum_length
    }

    pub fn set_models(&mut self, medium: Arc<MarkovModel>, long: Arc<MarkovModel>) {
        self.medium = Some(medium);
        self.long = Some(long);
    }

    pub fn select_year(&mut self, library: &MarkovLibrary, year_no: u32) -> Result<()> {
        let (medium, long) = library.select(year_no)?;
        debug!(
            target: "malus::markov",
            "year {year_no}: medium model {}, long model {}",
            medium.year(),
            long.year()
        );
        self.set_models(medium, long);
        Ok(())
    }

    pub fn generate_bounded_medium_sequence(
        &self,
        rng: &mut SimRng,
        lower: usize,
        upper: usize,
    ) -> Result<MarkovSequence> {
        let model = self
            .medium
            .as_ref()
            .ok_or_else(|| Error::model("no MEDIUM model selected"))?;
        model.generate_bounded(rng, lower, upper, self.max_iterations)
    }

    pub fn generate_bounded_long_sequence(
        &self,
        rng: &mut SimRng,
        lower: usize,
        upper: usize,
    ) -> Result<MarkovSequence> {
        let model = self
            .long
            .as_ref()
            .ok_or_else(|| Error::model("no LONG model selected"))?;
        model.generate_bounded(rng, lower, upper, self.max_iterations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occupancy(distribution: DistributionKind, parameter: f64, probability: f64, bounds: [u64; 2]) -> OccupancyConfig {
        OccupancyConfig {
            distribution,
            parameter: Some(parameter),
            probability: Some(probability),
            bounds,
        }
    }

    fn small_config() -> MarkovModelConfig {
        MarkovModelConfig {
            year: 1,
            length: LengthClass::Medium,
            initial_probabilities: vec![2.0, 2.0, 0.0],
            transition_probabilities: vec![
                vec![0.0, 3.0, 1.0],
                vec![0.0, 0.0, 5.0],
                vec![0.0, 0.0, 1.0],
            ],
            occupancy_distributions: vec![
                occupancy(DistributionKind::Poisson, 3.0, 0.5, [1, 8]),
                occupancy(DistributionKind::NegativeBinomial, 2.0, 0.4, [0, 10]),
            ],
            observation_distributions: vec![vec![1.0, 3.0], vec![4.0, 0.0], vec![1.0, 1.0]],
        }
    }

    #[test]
    fn rows_are_normalized() {
        let model = MarkovModel::new(&small_config()).unwrap();
        assert_eq!(model.initial_probabilities(), &[0.5, 0.5, 0.0]);
        assert_eq!(model.transition_probabilities()[0], vec![0.0, 0.75, 0.25]);
        assert_eq!(model.observation_distributions()[0], vec![0.25, 0.75]);
    }

    #[test]
    fn shape_mismatch_is_invalid_model() {
        let mut cfg = small_config();
        cfg.observation_distributions[1] = vec![1.0, 1.0, 1.0];
        assert!(matches!(MarkovModel::new(&cfg), Err(Error::InvalidModel(_))));

        let mut cfg = small_config();
        cfg.occupancy_distributions.pop();
        assert!(matches!(MarkovModel::new(&cfg), Err(Error::InvalidModel(_))));

        let mut cfg = small_config();
        cfg.transition_probabilities[2] = vec![0.0, 0.0];
        assert!(matches!(MarkovModel::new(&cfg), Err(Error::InvalidModel(_))));
    }

    #[test]
    fn last_state_must_be_absorbing() {
        let mut cfg = small_config();
        cfg.transition_probabilities[2] = vec![0.5, 0.5, 0.0];
        assert!(matches!(MarkovModel::new(&cfg), Err(Error::InvalidModel(_))));

        let mut cfg = small_config();
        cfg.transition_probabilities[2] = vec![0.1, 0.0, 0.9];
        assert!(matches!(MarkovModel::new(&cfg), Err(Error::InvalidModel(_))));

        let mut cfg = small_config();
        cfg.transition_probabilities[2] = vec![0.0, 0.0, 7.0];
        assert!(MarkovModel::new(&cfg).is_ok());
    }

    #[test]
    fn zero_mass_row_is_rejected() {
        let mut cfg = small_config();
        cfg.observation_distributions[2] = vec![0.0, 0.0];
        assert!(matches!(MarkovModel::new(&cfg), Err(Error::InvalidModel(_))));
    }

    #[test]
    fn binomial_bounds_must_be_reachable() {
        let mut cfg = small_config();
        cfg.occupancy_distributions[0] = occupancy(DistributionKind::Binomial, 1.0, 0.5, [2, 4]);
        assert!(matches!(MarkovModel::new(&cfg), Err(Error::InvalidModel(_))));
    }

    #[test]
    fn generated_length_respects_bounds() {
        let model = MarkovModel::new(&small_config()).unwrap();
        let mut rng = SimRng::new(5);
        for _ in 0..200 {
            let seq = model.generate_bounded(&mut rng, 4, 9, 1000).unwrap();
            assert!((4..=9).contains(&seq.len()));
            assert!(seq.iter().all(|(s, _)| *s < 2));
        }
    }

    #[test]
    fn impossible_bounds_exhaust_retries() {
        let model = MarkovModel::new(&small_config()).unwrap();
        let mut rng = SimRng::new(5);
        let err = model.generate_bounded(&mut rng, 100, 120, 50).unwrap_err();
        assert!(matches!(
            err,
            Error::ExhaustedRetries {
                attempts: 50,
                lower: 100,
                upper: 120
            }
        ));
    }

    #[test]
    fn generator_needs_selected_models() {
        let markov = Markov::new(4, 70, 1000).unwrap();
        let mut rng = SimRng::new(1);
        assert!(markov.generate_bounded_medium_sequence(&mut rng, 5, 15).is_err());
        assert!(Markov::new(0, 70, 1000).is_err());
        assert!(Markov::new(10, 10, 1000).is_err());
        assert!(Markov::new(4, 301, 1000).is_err());
    }

    #[test]
    fn builtin_library_covers_schedule() {
        let library = MarkovLibrary::builtin().unwrap();
        for year_no in 0..8 {
            let (medium, long) = library.select(year_no).unwrap();
            assert_eq!(medium.length(), LengthClass::Medium);
            assert_eq!(long.length(), LengthClass::Long);
        }
    }
}
