//! Bud-fate sequences: what each apex will produce, metamer by metamer.
//!
//! A [`Sequence`] is stored base first. Markov output and tabulated rows are
//! generated tip first and reversed on the way in.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::core::random::SimRng;
use crate::error::{Error, Result};
use crate::tree::markov::{Markov, MarkovSequence};
use crate::tree::observation::{Observation, Zone};

/// Row terminator in tabulated sequences.
pub const SENTINEL: u8 = 9;
const BUILTIN_TRUNKS: &str = include_str!("../../data/trunk_sequences.txt");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceEntry {
    pub zone: Option<Zone>,
    pub observation: u8,
}

impl SequenceEntry {
    pub fn new(zone: Option<Zone>, observation: u8) -> Self {
        Self { zone, observation }
    }
}

pub type Sequence = Vec<SequenceEntry>;

pub fn markov_to_sequence(markov: &MarkovSequence) -> Result<Sequence> {
    let mut sequence = markov
        .iter()
        .map(|&(state, obs)| {
            let observation = u8::try_from(obs)
                .map_err(|_| Error::invalid(format!("observation code {obs} out of range")))?;
            Ok(SequenceEntry::new(Some(Zone::from_state(state)?), observation))
        })
        .collect::<Result<Sequence>>()?;
    sequence.reverse();
    Ok(sequence)
}

fn tabulated(row: &[u8]) -> Sequence {
    let mut sequence: Sequence = row
        .iter()
        .take_while(|code| **code != SENTINEL)
        .map(|&code| SequenceEntry::new(None, code))
        .collect();
    sequence.reverse();
    sequence
}

pub fn generate_short_sequence() -> Sequence {
    vec![SequenceEntry::new(Some(Zone::DormantStart), 0); 4]
}

pub fn generate_floral_sequence() -> Sequence {
    vec![SequenceEntry::new(Some(Zone::DormantStart), 0); 4]
}

/// Fixed-width table of trunk variants, one per row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrunkTable {
    rows: Vec<Vec<u8>>,
}

impl TrunkTable {
    pub fn parse(text: &str) -> Result<Self> {
        let mut rows = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let row = line
                .split_whitespace()
                .map(|field| {
                    field.parse::<u8>().map_err(|_| {
                        Error::parse(
                            "trunk table",
                            format!("line {}: bad code '{field}'", lineno + 1),
                        )
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            rows.push(row);
        }
        let Some(width) = rows.first().map(Vec::len) else {
            return Err(Error::parse("trunk table", "no rows"));
        };
        if rows.iter().any(|r| r.len() != width) {
            return Err(Error::parse("trunk table", "rows differ in width"));
        }
        Ok(Self { rows })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        Self::parse(&fs::read_to_string(path)?)
    }

    /// The four bundled trunk variants.
    pub fn builtin() -> Result<Self> {
        Self::parse(BUILTIN_TRUNKS)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, select: usize) -> Result<&[u8]> {
        self.rows.get(select).map(Vec::as_slice).ok_or_else(|| {
            Error::invalid(format!(
                "trunk variant {select} out of range (table has {})",
                self.rows.len()
            ))
        })
    }

    pub fn generate_trunk(&self, select: usize) -> Result<Sequence> {
        Ok(tabulated(self.row(select)?))
    }
}

/// Observed second-year long shoots, tip first, used instead of the long
/// Markov model when second-year draws are enabled.
const SECOND_YEAR_BRANCHES: [&[u8]; 9] = [
    &[
        0, 0, 0, 0, 0, 3, 2, 2, 1, 1, 0, 0, 0, 0, 2, 0, 1, 1, 4, 1, 4, 4, 4, 4, 4, 4, 0, 0, 0, 0,
        0, 0, 0, 0, 0, 0, 0, 0, 0,
    ],
    &[0, 0, 0, 0, 4, 0, 0, 4, 0, 4, 0, 0, 4, 0, 0, 0, 0, 0, 0, 0],
    &[
        0, 0, 0, 0, 0, 0, 0, 0, 0, 3, 3, 0, 0, 0, 0, 0, 4, 4, 4, 4, 4, 3, 0, 4, 4, 4, 0, 4, 0, 4,
        4, 0, 0, 4, 0, 0, 0, 2, 3, 0, 0, 0, 3, 3, 3, 3, 0, 0,
    ],
    &[
        0, 0, 0, 0, 0, 0, 0, 3, 0, 3, 4, 0, 1, 4, 4, 1, 0, 4, 0, 1, 4, 4, 0, 4, 4, 4, 4, 4, 4, 0,
        4, 4, 0, 0, 0, 1, 0, 4, 4, 4, 0, 4, 0, 4, 0, 0, 0, 3, 0, 1, 0, 0, 0,
    ],
    &[
        0, 0, 0, 0, 0, 0, 0, 2, 2, 4, 1, 1, 4, 3, 1, 0, 0, 4, 0, 0, 4, 0, 0, 4, 0, 4, 4, 4, 4, 4,
        4, 4, 4, 0, 0, 3, 0, 0, 0,
    ],
    &[
        0, 0, 0, 0, 0, 0, 3, 2, 3, 0, 0, 3, 3, 0, 0, 0, 1, 2, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        0, 0, 0, 0, 4, 0, 4, 0, 0, 4, 0, 0, 0, 0, 0, 0,
    ],
    &[
        0, 0, 0, 0, 4, 3, 2, 4, 4, 0, 2, 0, 3, 0, 2, 0, 0, 4, 0, 4, 4, 4, 4, 4, 0, 0, 0, 0, 0, 0,
        0, 4, 0, 4, 4, 0, 0, 0, 0, 4, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 3, 0, 2, 3, 0, 0, 0, 3, 2,
        0, 0,
    ],
    &[
        0, 0, 0, 0, 1, 4, 0, 4, 0, 3, 0, 0, 1, 3, 2, 0, 0, 0, 0, 0, 0, 0, 4, 0, 0, 0, 3, 0, 0, 1,
        1, 0, 0, 3, 4, 0, 4, 0, 0, 4, 0, 4, 0, 0, 0, 0, 0, 1, 0, 3, 0, 1, 0, 0, 0, 0, 1,
    ],
    &[
        0, 0, 0, 0, 0, 3, 0, 3, 3, 0, 3, 0, 0, 0, 0, 0, 0, 0, 3, 0, 1, 0, 0, 4, 0, 4, 0, 0, 0, 0,
        0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 4, 0, 0, 1, 0, 0, 1, 1, 1, 1,
    ],
];

pub fn generate_random_draw_sequence(rng: &mut SimRng) -> Result<Sequence> {
    let select = rng.uniform_int(SECOND_YEAR_BRANCHES.len())?;
    Ok(tabulated(SECOND_YEAR_BRANCHES[select]))
}

/// Shortest shoot of the longest length class.
pub const LONG_SHOOT_FLOOR: usize = 41;

/// Shoot-length class for a long shoot: 1 → [15, 26], 2 → [26, 41],
/// 3 → [41, maximum_length].
pub fn length_pool(rng: &mut SimRng, year_no: u32) -> Result<usize> {
    let pdf: [f64; 3] = match year_no {
        0 | 1 => [0.111, 0.222, 0.667],
        2 => [0.538, 0.346, 0.116],
        3 => [0.830, 0.170, 0.000],
        4 => [0.940, 0.060, 0.000],
        _ => [0.965, 0.035, 0.000],
    };
    rng.draw_index(&pdf)
}

/// Categorical fate of a terminal apex, by year and shoot type.
#[derive(Debug, Clone)]
pub struct TerminalFateTable {
    data: HashMap<(u32, Observation), [f64; 4]>,
}

impl Default for TerminalFateTable {
    fn default() -> Self {
        use Observation::{Floral, Large, Medium, Small};
        // per year: LARGE, MEDIUM, SMALL, FLORAL rows
        let years: [[[f64; 4]; 4]; 6] = [
            [
                [0.500, 0.167, 0.000, 0.333],
                [0.000, 0.000, 0.000, 1.000],
                [0.100, 0.100, 0.300, 0.500],
                [0.100, 0.300, 0.600, 0.000],
            ],
            [
                [0.246, 0.185, 0.000, 0.569],
                [0.016, 0.238, 0.032, 0.714],
                [0.066, 0.067, 0.317, 0.550],
                [0.317, 0.250, 0.433, 0.000],
            ],
            [
                [0.351, 0.106, 0.010, 0.533],
                [0.123, 0.148, 0.063, 0.666],
                [0.015, 0.094, 0.453, 0.438],
                [0.182, 0.249, 0.569, 0.000],
            ],
            [
                [0.213, 0.082, 0.000, 0.705],
                [0.027, 0.046, 0.016, 0.911],
                [0.000, 0.024, 0.205, 0.771],
                [0.003, 0.413, 0.584, 0.000],
            ],
            [
                [0.100, 0.050, 0.000, 0.850],
                [0.000, 0.020, 0.130, 0.850],
                [0.000, 0.000, 0.375, 0.625],
                [0.008, 0.325, 0.667, 0.000],
            ],
            [
                [0.000, 0.100, 0.000, 0.900],
                [0.000, 0.050, 0.050, 0.900],
                [0.000, 0.000, 0.350, 0.650],
                [0.000, 0.200, 0.800, 0.000],
            ],
        ];
        let mut data = HashMap::new();
        for (i, rows) in years.iter().enumerate() {
            let year = i as u32 + 1;
            for (shoot, row) in [Large, Medium, Small, Floral].into_iter().zip(rows) {
                data.insert((year, shoot), *row);
            }
        }
        Self { data }
    }
}

impl TerminalFateTable {
    /// Distribution over {LARGE, MEDIUM, SMALL, FLORAL}. Years saturate to
    /// `[1, 6]`; sylleptic shoots use their plain class.
    pub fn probabilities(&self, year_no: i32, shoot_type: Observation) -> Result<[f64; 4]> {
        let year = year_no.clamp(1, 6) as u32;
        self.data
            .get(&(year, shoot_type.shoot_class()))
            .copied()
            .ok_or_else(|| {
                Error::invalid(format!(
                    "terminal fate is undefined for {shoot_type}; expected LARGE, MEDIUM, SMALL or FLORAL"
                ))
            })
    }

    pub fn terminal_fate(
        &self,
        rng: &mut SimRng,
        year_no: i32,
        shoot_type: Observation,
    ) -> Result<Observation> {
        let pdf = self.probabilities(year_no, shoot_type)?;
        match rng.draw_index(&pdf)? {
            1 => Ok(Observation::Large),
            2 => Ok(Observation::Medium),
            3 => Ok(Observation::Small),
            4 => Ok(Observation::Floral),
            other => Err(Error::invalid(format!("terminal fate index {other}"))),
        }
    }
}

/// Knobs of [`generate_sequence`] that come from the run options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceOptions {
    pub second_year_draws: bool,
    pub select_trunk: usize,
}

/// Bud-fate sequence for a new growth unit of type `observation`.
pub fn generate_sequence(
    observation: Observation,
    markov: &Markov,
    trunks: &TrunkTable,
    rng: &mut SimRng,
    year_no: u32,
    options: SequenceOptions,
) -> Result<Sequence> {
    match observation {
        Observation::Trunk => trunks.generate_trunk(options.select_trunk),
        Observation::Small | Observation::SyllepticSmall => Ok(generate_short_sequence()),
        Observation::Floral => Ok(generate_floral_sequence()),
        Observation::Medium | Observation::SyllepticMedium => {
            markov_to_sequence(&markov.generate_bounded_medium_sequence(rng, 5, 15)?)
        }
        Observation::Large | Observation::SyllepticLarge => {
            if options.second_year_draws && year_no == 1 {
                return generate_random_draw_sequence(rng);
            }
            let (lower, upper) = match length_pool(rng, year_no)? {
                1 => (15, 26),
                2 => (26, LONG_SHOOT_FLOOR),
                _ => (LONG_SHOOT_FLOOR, markov.maximum_length()),
            };
            markov_to_sequence(&markov.generate_bounded_long_sequence(rng, lower, upper)?)
        }
        other => Err(Error::invalid(format!(
            "no sequence can be generated for a {other} apex"
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruningCase {
    A,
    B,
    C,
}

impl FromStr for PruningCase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "A" => Ok(PruningCase::A),
            "B" => Ok(PruningCase::B),
            "C" => Ok(PruningCase::C),
            other => Err(Error::invalid(format!("unknown pruning case '{other}'"))),
        }
    }
}

/// Shoot type regrown `react_pos` buds below a cut of `case` severity.
pub fn shoot_type_react(
    fates: &TerminalFateTable,
    rng: &mut SimRng,
    year_no: i32,
    pruned: Observation,
    case: PruningCase,
    react_pos: u32,
) -> Result<Observation> {
    let (reiteration, succession, lower) = if pruned == Observation::Trunk {
        let lower = fates.terminal_fate(rng, year_no, Observation::Large)?;
        (Observation::Large, Observation::Large, lower)
    } else {
        let succession = fates.terminal_fate(rng, year_no, pruned)?;
        // Two generations down, drawn apart from the succession type.
        let next = fates.terminal_fate(rng, year_no, pruned)?;
        let lower = fates.terminal_fate(rng, year_no, next)?;
        (pruned, succession, lower)
    };

    use PruningCase::{A, B, C};
    match (react_pos, case) {
        (0, A) => Ok(succession),
        (0, B | C) => Ok(reiteration),
        (1, A | B) => Ok(succession),
        (1, C) => Ok(reiteration),
        (2, A | B) => Ok(lower),
        (2, C) => Ok(succession),
        _ => Err(Error::invalid(format!(
            "no pruning reaction defined at bud rank {react_pos}"
        ))),
    }
}
