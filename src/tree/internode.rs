use serde::{Deserialize, Serialize};

use crate::tree::observation::Zone;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternodeParams {
    #[serde(default = "InternodeParams::default_min_length")]
    pub min_length: f64,
    /// Days an internode keeps elongating.
    #[serde(default = "InternodeParams::default_elongation_period")]
    pub elongation_period: f64,
    /// Days between two successive metamers on one apex.
    #[serde(default = "InternodeParams::default_plastochron")]
    pub plastochron: u32,
    #[serde(default = "InternodeParams::default_max_length")]
    pub max_length: f64,
}

impl InternodeParams {
    fn default_min_length() -> f64 {
        0.0001
    }
    fn default_elongation_period() -> f64 {
        10.0
    }
    fn default_plastochron() -> u32 {
        3
    }
    fn default_max_length() -> f64 {
        0.03
    }
}

impl Default for InternodeParams {
    fn default() -> Self {
        Self {
            min_length: Self::default_min_length(),
            elongation_period: Self::default_elongation_period(),
            plastochron: Self::default_plastochron(),
            max_length: Self::default_max_length(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Internode {
    params: InternodeParams,
}

impl Internode {
    pub fn new(params: InternodeParams) -> Self {
        Self { params }
    }

    pub fn min_length(&self) -> f64 {
        self.params.min_length
    }

    pub fn elongation_period(&self) -> f64 {
        self.params.elongation_period
    }

    /// Length reached at the end of elongation in a given zone.
    pub fn final_length(&self, zone: Option<Zone>) -> f64 {
        let base = self.params.max_length / 1.5;
        let factor = match zone {
            None => 1.0,
            Some(Zone::DormantStart) => 0.25,
            Some(Zone::Small) => 0.5,
            Some(Zone::Diffuse) => 1.0,
            Some(Zone::Medium) => 0.75,
            Some(Zone::Floral) => 0.5,
            Some(Zone::DormantEnd) => 0.25,
        };
        base * factor
    }

    /// Constant elongation velocity, m/day.
    pub fn growth_rate(&self, zone: Option<Zone>) -> f64 {
        self.final_length(zone) / self.params.elongation_period
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_rate_by_zone() {
        let internode = Internode::new(InternodeParams::default());
        let full = 0.03 / 1.5 / 10.0;
        assert!((internode.growth_rate(None) - full).abs() < 1e-15);
        assert!((internode.growth_rate(Some(Zone::Diffuse)) - full).abs() < 1e-15);
        assert!((internode.growth_rate(Some(Zone::Medium)) - 0.75 * full).abs() < 1e-15);
        assert!((internode.growth_rate(Some(Zone::DormantEnd)) - 0.25 * full).abs() < 1e-15);
    }

    #[test]
    fn full_elongation_reaches_final_length() {
        let internode = Internode::new(InternodeParams::default());
        let zone = Some(Zone::Small);
        let grown = internode.growth_rate(zone) * internode.elongation_period();
        assert!((grown - internode.final_length(zone)).abs() < 1e-15);
    }
}
