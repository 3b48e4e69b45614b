//! Wood properties and the per-metamer stack of annual cambial layers.

use serde::{Deserialize, Serialize};

use crate::core::physics::{DEFAULT_MODULUS_OF_RUPTURE, second_moment_of_area_annular_section};
use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WoodParams {
    /// kg/m³.
    #[serde(default = "WoodParams::default_density")]
    pub density: f64,
    #[serde(default = "WoodParams::default_reaction_wood_rate")]
    pub reaction_wood_rate: f64,
    /// Share of a layer's second moment credited to reaction wood.
    #[serde(default = "WoodParams::default_reaction_wood_inertia_coefficient")]
    pub reaction_wood_inertia_coefficient: f64,
    /// GPa.
    #[serde(default = "WoodParams::default_youngs_modulus")]
    pub youngs_modulus: f64,
    /// Pa.
    #[serde(default = "WoodParams::default_modulus_of_rupture")]
    pub modulus_of_rupture: f64,
}

impl WoodParams {
    fn default_density() -> f64 {
        1000.0
    }
    fn default_reaction_wood_rate() -> f64 {
        0.5
    }
    fn default_reaction_wood_inertia_coefficient() -> f64 {
        0.1
    }
    fn default_youngs_modulus() -> f64 {
        1.1
    }
    fn default_modulus_of_rupture() -> f64 {
        DEFAULT_MODULUS_OF_RUPTURE
    }

    pub fn youngs_modulus_pa(&self) -> f64 {
        self.youngs_modulus * 1e9
    }
}

impl Default for WoodParams {
    fn default() -> Self {
        Self {
            density: Self::default_density(),
            reaction_wood_rate: Self::default_reaction_wood_rate(),
            reaction_wood_inertia_coefficient: Self::default_reaction_wood_inertia_coefficient(),
            youngs_modulus: Self::default_youngs_modulus(),
            modulus_of_rupture: Self::default_modulus_of_rupture(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CambialLayer {
    pub thickness: f64,
    /// Inner radius of the ring.
    pub radius: f64,
    /// Angular extent of reaction wood, radians.
    pub reaction_wood: f64,
    pub second_moment_of_area: f64,
}

impl CambialLayer {
    pub fn new(thickness: f64, radius: f64) -> Self {
        Self {
            thickness,
            radius,
            reaction_wood: 0.0,
            second_moment_of_area: 0.0,
        }
    }

    fn reaction_moment(&self, coefficient: f64) -> Result<f64> {
        Ok(
            second_moment_of_area_annular_section(self.radius, self.thickness, self.reaction_wood)?
                * coefficient,
        )
    }
}

/// Append-only layers; only the newest one changes.
#[derive(Debug, Clone, Default)]
pub struct CambialStack {
    layers: Vec<CambialLayer>,
    sealed_second_moment: f64,
}

impl CambialStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stack holding the initial solid core.
    pub fn with_core(thickness: f64) -> Self {
        Self {
            layers: vec![CambialLayer::new(thickness, 0.0)],
            sealed_second_moment: 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[CambialLayer] {
        &self.layers
    }

    pub fn current(&self) -> Option<&CambialLayer> {
        self.layers.last()
    }

    pub fn sealed_second_moment(&self) -> f64 {
        self.sealed_second_moment
    }

    /// Freeze the newest layer and open a new one outside `radius`.
    pub fn seal_and_append(&mut self, radius: f64, coefficient: f64) -> Result<()> {
        if let Some(last) = self.layers.last_mut() {
            let moment = last.reaction_moment(coefficient)?;
            last.second_moment_of_area = moment;
            self.sealed_second_moment += moment;
        }
        self.layers.push(CambialLayer::new(0.0, radius));
        Ok(())
    }

    /// Raise the newest layer's reaction wood towards `target`; it never
    /// decreases.
    pub fn accrue_reaction_wood(&mut self, target: f64, rate: f64, dt: f64) {
        if let Some(last) = self.layers.last_mut() {
            if target > last.reaction_wood {
                last.reaction_wood += rate * dt * (target - last.reaction_wood);
            }
        }
    }

    pub fn current_second_moment(&self, coefficient: f64) -> Result<f64> {
        match self.layers.last() {
            Some(last) => last.reaction_moment(coefficient),
            None => Ok(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use super::*;

    #[test]
    fn sealing_freezes_previous_layer() {
        let mut stack = CambialStack::with_core(0.001);
        stack.accrue_reaction_wood(PI, 0.5, 1.0);
        let before = stack.current_second_moment(0.1).unwrap();
        assert!(before > 0.0);

        stack.seal_and_append(0.001, 0.1).unwrap();
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.sealed_second_moment(), before);
        assert_eq!(stack.layers()[0].second_moment_of_area, before);

        stack.accrue_reaction_wood(PI, 0.5, 1.0);
        assert_eq!(stack.layers()[0].reaction_wood, PI / 2.0);
        assert_eq!(stack.current().unwrap().reaction_wood, PI / 2.0);
    }

    #[test]
    fn reaction_wood_never_decreases() {
        let mut stack = CambialStack::with_core(0.001);
        stack.accrue_reaction_wood(1.0, 0.5, 1.0);
        assert_eq!(stack.current().unwrap().reaction_wood, 0.5);
        stack.accrue_reaction_wood(0.2, 0.5, 1.0);
        assert_eq!(stack.current().unwrap().reaction_wood, 0.5);
    }

    #[test]
    fn opened_layer_has_no_thickness() {
        let mut stack = CambialStack::with_core(0.001);
        stack.seal_and_append(0.0015, 0.1).unwrap();
        let last = stack.current().unwrap();
        assert_eq!(last.thickness, 0.0);
        assert_eq!(last.radius, 0.0015);
        assert_eq!(stack.current_second_moment(0.1).unwrap(), 0.0);
    }

    #[test]
    fn empty_stack_contributes_nothing() {
        let stack = CambialStack::new();
        assert_eq!(stack.current_second_moment(0.1).unwrap(), 0.0);
    }

    #[test]
    fn youngs_modulus_in_pascal() {
        assert_eq!(WoodParams::default().youngs_modulus_pa(), 1.1e9);
    }
}
