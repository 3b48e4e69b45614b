use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Classified type of a shoot or bud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Observation {
    Dormant,
    Small,
    Medium,
    Large,
    Floral,
    Trunk,
    NewShoot,
    SyllepticSmall,
    SyllepticMedium,
    SyllepticLarge,
}

impl Observation {
    pub const ALL: [Observation; 10] = [
        Observation::Dormant,
        Observation::Small,
        Observation::Medium,
        Observation::Large,
        Observation::Floral,
        Observation::Trunk,
        Observation::NewShoot,
        Observation::SyllepticSmall,
        Observation::SyllepticMedium,
        Observation::SyllepticLarge,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Observation::Dormant => "DORMANT",
            Observation::Small => "SMALL",
            Observation::Medium => "MEDIUM",
            Observation::Large => "LARGE",
            Observation::Floral => "FLORAL",
            Observation::Trunk => "TRUNK",
            Observation::NewShoot => "NEW_SHOOT",
            Observation::SyllepticSmall => "SYLLEPTIC_SMALL",
            Observation::SyllepticMedium => "SYLLEPTIC_MEDIUM",
            Observation::SyllepticLarge => "SYLLEPTIC_LARGE",
        }
    }

    /// Lateral bud type for an observation code stored in a sequence.
    /// Unknown codes (older tables pad with 9) read as dormant.
    pub fn from_sequence_code(code: u8) -> Self {
        match code {
            1 => Observation::Large,
            2 => Observation::Medium,
            3 => Observation::Small,
            4 => Observation::Floral,
            5 => Observation::SyllepticSmall,
            6 => Observation::SyllepticMedium,
            7 => Observation::SyllepticLarge,
            _ => Observation::Dormant,
        }
    }

    pub fn is_sylleptic(self) -> bool {
        matches!(
            self,
            Observation::SyllepticSmall | Observation::SyllepticMedium | Observation::SyllepticLarge
        )
    }

    /// Sylleptic variants fold onto the shoot class they grow like.
    pub fn shoot_class(self) -> Self {
        match self {
            Observation::SyllepticSmall => Observation::Small,
            Observation::SyllepticMedium => Observation::Medium,
            Observation::SyllepticLarge => Observation::Large,
            other => other,
        }
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Observation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        Observation::ALL
            .into_iter()
            .find(|o| o.as_str() == upper)
            .ok_or_else(|| Error::invalid(format!("unknown observation '{s}'")))
    }
}

/// Bud-fate zone along a generated shoot; Markov state `i` is zone `i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Zone {
    DormantStart,
    Small,
    Diffuse,
    Medium,
    Floral,
    DormantEnd,
}

impl Zone {
    pub const ALL: [Zone; 6] = [
        Zone::DormantStart,
        Zone::Small,
        Zone::Diffuse,
        Zone::Medium,
        Zone::Floral,
        Zone::DormantEnd,
    ];

    pub fn from_state(state: usize) -> Result<Self> {
        Zone::ALL
            .get(state)
            .copied()
            .ok_or_else(|| Error::invalid(format!("no zone for Markov state {state}")))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Zone::DormantStart => "DORMANT_START",
            Zone::Small => "SMALL",
            Zone::Diffuse => "DIFFUSE",
            Zone::Medium => "MEDIUM",
            Zone::Floral => "FLORAL",
            Zone::DormantEnd => "DORMANT_END",
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Zone {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        Zone::ALL
            .into_iter()
            .find(|z| z.as_str() == upper)
            .ok_or_else(|| Error::invalid(format!("unknown zone '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_case_insensitively() {
        assert_eq!("large".parse::<Observation>().unwrap(), Observation::Large);
        assert_eq!(
            "SYLLEPTIC_MEDIUM".parse::<Observation>().unwrap(),
            Observation::SyllepticMedium
        );
        assert_eq!("dormant_end".parse::<Zone>().unwrap(), Zone::DormantEnd);
        assert!(matches!(
            "branchy".parse::<Observation>(),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn sequence_codes_default_to_dormant() {
        assert_eq!(Observation::from_sequence_code(1), Observation::Large);
        assert_eq!(Observation::from_sequence_code(7), Observation::SyllepticLarge);
        assert_eq!(Observation::from_sequence_code(9), Observation::Dormant);
    }

    #[test]
    fn zone_from_state_bounds() {
        assert_eq!(Zone::from_state(0).unwrap(), Zone::DormantStart);
        assert!(Zone::from_state(6).is_err());
    }
}
