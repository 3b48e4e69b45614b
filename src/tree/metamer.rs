//! One repeating unit of a shoot axis and its daily update.
//!
//! A metamer owns its leaf, fruit, internode and cambial layers. Each day the
//! tree calls, in this order: [`Metamer::update_metamer_parameters`],
//! [`Metamer::organ_activity`], [`Metamer::compute_mass`], then (once torques
//! are known) [`Metamer::calculate_rotation_velocity`], [`Metamer::reorient`]
//! and [`Metamer::update_position`].

use std::f64::consts::PI;

use tracing::trace;

use crate::core::frame::{Frame, Vec3, reorient_frame_about, rotate_frame_at_branch};
use crate::core::fset::FSet;
use crate::core::physics::{reaction_wood_target, second_moment_of_area_circle};
use crate::core::random::SimRng;
use crate::error::{Error, Result};
use crate::sim::calendar::ActiveEvents;
use crate::tree::fruit::{Fruit, FruitState, MassModel};
use crate::tree::internode::Internode;
use crate::tree::leaf::{Leaf, LeafState};
use crate::tree::observation::{Observation, Zone};
use crate::tree::wood::{CambialStack, WoodParams};

/// Organ instances handed to a new metamer.
#[derive(Debug, Clone)]
pub struct Organs {
    pub leaf: Leaf,
    pub fruit: Fruit,
    pub internode: Internode,
    pub wood: WoodParams,
}

#[derive(Debug, Clone)]
pub struct Metamer {
    pub frame: Frame,
    /// Heading at the start of the season, reference for reaction wood.
    pub season_initial_heading: Vec3,
    pub leaf: Leaf,
    pub fruit: Fruit,
    internode: Internode,
    wood: WoodParams,
    layers: CambialStack,

    /// Rank within the growth unit.
    pub number: u32,
    pub zone: Option<Zone>,
    pub observation: Observation,
    pub parent_observation: Observation,
    pub parent_unit_id: usize,
    pub parent_fbr_id: usize,
    pub parent_tree_id: usize,
    pub trunk: bool,
    pub sylleptic: bool,
    /// Calendar year of the newest cambial layer.
    pub year: i32,
    /// Days.
    pub age: f64,

    pub length: f64,
    pub radius: f64,
    pub position: Vec3,
    pub phyllotactic_angle: f64,
    pub branching_angle: f64,

    pub cumulated_mass: f64,
    pub cumulated_torque: Vec3,
    pub acting_rotation: Vec3,
    pub rotation_memory: Vec3,
    pub rotation_velocity: Vec3,
    pub rv_norm: f64,
    /// Pa·m⁴.
    pub rigidity: f64,

    pub pre_harvest_mass: f64,
    pub pre_harvest_rotation: Vec3,
    pub pre_harvest_radius: f64,

    pub leaf_state: LeafState,
    pub leaf_area: f64,

    pub developed: bool,
    pub pruning_react: bool,
    pub to_prune: bool,
    pub cut: bool,
    pub ruptured: bool,
    pub closest_apex: u32,
    pub farthest_apex: u32,
    pub sons_nb: u32,
}

impl Metamer {
    pub fn new(organs: Organs, frame: Frame, number: u32, floral: bool) -> Self {
        let Organs {
            leaf,
            mut fruit,
            internode,
            wood,
        } = organs;
        let radius = leaf.params().petiole_radius;
        let length = internode.min_length();
        fruit.set_state(if floral {
            FruitState::Flower
        } else {
            FruitState::NoFlower
        });
        let layers = if number != 0 {
            CambialStack::with_core(radius)
        } else {
            CambialStack::new()
        };
        let leaf_state = leaf.state();

        Self {
            frame,
            season_initial_heading: frame.heading,
            leaf,
            fruit,
            internode,
            wood,
            layers,
            number,
            zone: None,
            observation: Observation::Dormant,
            parent_observation: Observation::NewShoot,
            parent_unit_id: 0,
            parent_fbr_id: 0,
            parent_tree_id: 0,
            trunk: false,
            sylleptic: false,
            year: 0,
            age: 0.0,
            length,
            radius,
            position: Vec3::zeros(),
            phyllotactic_angle: 0.0,
            branching_angle: 0.0,
            cumulated_mass: 0.0,
            cumulated_torque: Vec3::zeros(),
            acting_rotation: Vec3::zeros(),
            rotation_memory: Vec3::zeros(),
            rotation_velocity: Vec3::zeros(),
            rv_norm: 0.0,
            rigidity: 0.0,
            pre_harvest_mass: 0.0,
            pre_harvest_rotation: Vec3::zeros(),
            pre_harvest_radius: 0.0,
            leaf_state,
            leaf_area: 0.0,
            developed: false,
            pruning_react: true,
            to_prune: false,
            cut: false,
            ruptured: false,
            closest_apex: 0,
            farthest_apex: 0,
            sons_nb: 0,
        }
    }

    pub fn layers(&self) -> &CambialStack {
        &self.layers
    }

    pub fn internode(&self) -> &Internode {
        &self.internode
    }

    pub fn wood(&self) -> &WoodParams {
        &self.wood
    }

    /// Fruit then leaf transitions for one day. Returns the number of fruits
    /// set today.
    pub fn organ_activity(
        &mut self,
        events: &ActiveEvents,
        rng: &mut SimRng,
        leaf_area: &FSet,
    ) -> Result<u32> {
        let mut additional_fruit = 0;
        match self.fruit.state() {
            FruitState::NoFlower => {
                if events.harvest {
                    self.fruit.set_state(FruitState::FruitScar);
                }
            }
            FruitState::Flower => {
                if self.age > self.fruit.model().flower_duration() {
                    let probability = self.fruit.model().set_probability();
                    if rng.boolean(probability)? {
                        self.fruit.set_state(FruitState::Fruit);
                        additional_fruit += 1;
                    } else {
                        self.fruit.set_state(FruitState::FruitScar);
                    }
                }
            }
            FruitState::Fruit => {
                if events.harvest {
                    self.fruit.set_state(FruitState::FruitScar);
                    self.fruit.mass = 0.0;
                } else {
                    self.fruit.compute_mass();
                }
            }
            FruitState::FruitScar => self.fruit.mass = 0.0,
        }

        if self.leaf.state() != LeafState::Scar {
            if events.leaf_out {
                self.leaf.set_state(LeafState::Scar);
            }
            if events.leaf_fall && rng.boolean(self.leaf.params().fall_probability)? {
                self.leaf.set_state(LeafState::Scar);
            }
            if self.leaf.state() == LeafState::Growing {
                if self.leaf.age < self.leaf.params().maturation {
                    self.leaf.area = self.leaf.compute_area_from_func(self.number, leaf_area);
                }
                self.leaf.compute_mass();
            }
        }
        if self.leaf.state() == LeafState::Scar {
            self.leaf.area = 0.0;
            self.leaf.mass = 0.0;
        }

        self.leaf_state = self.leaf.state();
        self.leaf_area = self.leaf.area;
        Ok(additional_fruit)
    }

    /// Ageing, cambial layers, reaction wood, elongation and rigidity.
    pub fn update_metamer_parameters(
        &mut self,
        events: &ActiveEvents,
        dt: f64,
        current_year: i32,
    ) -> Result<()> {
        self.age += dt;
        self.leaf.age += dt;
        self.fruit.age += dt;

        let coefficient = self.wood.reaction_wood_inertia_coefficient;
        if self.year < current_year && events.new_cambial_layer {
            self.season_initial_heading = self.frame.heading;
            self.layers.seal_and_append(self.radius, coefficient)?;
            self.year = current_year;
            trace!(
                target: "malus::mechanics",
                layers = self.layers.len(),
                radius = self.radius,
                "new cambial layer"
            );
        }

        if self.layers.len() >= 2 {
            let target = reaction_wood_target(
                &self.frame.up,
                &self.frame.heading,
                &self.season_initial_heading,
            );
            self.layers
                .accrue_reaction_wood(target, self.wood.reaction_wood_rate, dt);
        }

        if self.age < self.internode.elongation_period() {
            self.length += self.internode.growth_rate(self.zone) * dt;
        }

        let second_moment = self.layers.sealed_second_moment()
            + second_moment_of_area_circle(self.radius)
            + self.layers.current_second_moment(coefficient)?;
        self.rigidity = second_moment * self.wood.youngs_modulus_pa();

        if events.pre_harvest {
            self.pre_harvest_mass = self.cumulated_mass;
            self.pre_harvest_rotation = self.rotation_velocity;
        }
        if events.bud_break {
            self.pre_harvest_radius = self.radius;
        }
        Ok(())
    }

    /// Own wood, leaf and fruit mass plus the cumulated masses of the two
    /// children, if any.
    pub fn compute_mass(&mut self, successor: Option<&Metamer>, lateral: Option<&Metamer>) {
        self.cumulated_mass = PI * self.radius * self.radius * self.length * self.wood.density;
        self.cumulated_mass += self.leaf.mass + self.fruit.mass;
        if let Some(m) = successor {
            self.cumulated_mass += m.cumulated_mass;
        }
        if let Some(m) = lateral {
            self.cumulated_mass += m.cumulated_mass;
        }
    }

    /// Blend the rotation induced by the cumulated torque and the harvest
    /// memory into the rotation velocity. `step` is the convergence fraction.
    pub fn calculate_rotation_velocity(
        &mut self,
        events: &ActiveEvents,
        stake: bool,
        step: f64,
    ) -> Result<()> {
        if stake && self.trunk {
            self.rotation_velocity = Vec3::zeros();
            self.rv_norm = 0.0;
            return Ok(());
        }
        if self.rigidity == 0.0 {
            return Err(Error::DivisionByZero("acting rotation (zero rigidity)"));
        }
        self.acting_rotation = self.cumulated_torque / self.rigidity;

        if events.harvest {
            let delta_mass = if self.pre_harvest_mass != 0.0 {
                (self.pre_harvest_mass - self.cumulated_mass) / self.pre_harvest_mass
            } else {
                0.0
            };
            self.rotation_memory = self.pre_harvest_rotation * delta_mass;
        }

        let target = self.acting_rotation + self.rotation_memory;
        let blended = target * step + self.rotation_velocity * (1.0 - step);
        // Stored as a unit direction; the magnitude lives in rv_norm.
        self.rv_norm = blended.norm();
        self.rotation_velocity = if self.rv_norm > 0.0 {
            blended / self.rv_norm
        } else {
            blended
        };
        Ok(())
    }

    /// Bend the frame inherited from the predecessor by the current rotation
    /// velocity over this internode.
    pub fn reorient(&mut self, initial: &Frame) {
        self.frame =
            reorient_frame_about(initial, &self.rotation_velocity, self.rv_norm, self.length);
    }

    pub fn update_position(&mut self, left_metamer_position: Option<Vec3>) {
        let base = left_metamer_position.unwrap_or_else(Vec3::zeros);
        self.position = base + self.frame.heading * self.length;
    }

    /// Branching and phyllotactic angles for a shoot regrown after pruning.
    ///
    /// The branching angle brings the shoot back towards vertical in
    /// proportion to the pruned length; the phyllotactic angle is the best of
    /// five candidates `i * phyllotactic_step + self.phyllotactic_angle`.
    pub fn pruning_reaction_angle(&self, phyllotactic_step: f64) -> Result<(f64, f64)> {
        let span = self.number + self.farthest_apex;
        if span == 0 {
            return Err(Error::invalid(
                "pruning reaction needs a metamer rank or a remaining apex",
            ));
        }
        let vertical = Vec3::z();
        let angle_to_vertical = |heading: &Vec3| -> f64 {
            let h = heading.try_normalize(0.0).unwrap_or(*heading);
            h.dot(&vertical).clamp(-1.0, 1.0).acos()
        };

        let angle_to_vert = (angle_to_vertical(&self.frame.heading) * 100.0).round() / 100.0;
        let vert_ratio = 1.0 - self.number as f64 / span as f64;
        let branching = vert_ratio * angle_to_vert;

        let mut best = (0, f64::INFINITY);
        for i in 0..5 {
            let candidate = i as f64 * phyllotactic_step + self.phyllotactic_angle;
            let frame = rotate_frame_at_branch(&self.frame, branching, candidate);
            let angle = angle_to_vertical(&frame.heading);
            if angle < best.1 {
                best = (i, angle);
            }
        }
        Ok((
            branching,
            best.0 as f64 * phyllotactic_step + self.phyllotactic_angle,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::calendar::EventKind;
    use crate::tree::fruit::{ExpolinearGrowth, FruitModelConfig};
    use crate::tree::internode::InternodeParams;
    use crate::tree::leaf::LeafParams;

    fn organs() -> Organs {
        Organs {
            leaf: Leaf::new(LeafParams::default()),
            fruit: Fruit::new(FruitModelConfig::default().create_model()),
            internode: Internode::new(InternodeParams::default()),
            wood: WoodParams::default(),
        }
    }

    fn metamer(floral: bool) -> Metamer {
        Metamer::new(organs(), Frame::vertical(), 1, floral)
    }

    #[test]
    fn construction_defaults() {
        let m = metamer(true);
        assert_eq!(m.radius, 0.0006);
        assert_eq!(m.length, 0.0001);
        assert_eq!(m.fruit.state(), FruitState::Flower);
        assert_eq!(m.layers().len(), 1);
        assert_eq!(m.layers().layers()[0].thickness, 0.0006);

        let unranked = Metamer::new(organs(), Frame::vertical(), 0, false);
        assert_eq!(unranked.fruit.state(), FruitState::NoFlower);
        assert!(unranked.layers().is_empty());
    }

    #[test]
    fn staked_trunk_never_rotates() {
        let mut m = metamer(false);
        m.trunk = true;
        m.cumulated_torque = Vec3::new(3.0, -2.0, 0.5);
        m.rotation_velocity = Vec3::new(1.0, 1.0, 1.0);
        m.calculate_rotation_velocity(&ActiveEvents::default(), true, 0.5)
            .unwrap();
        assert_eq!(m.rotation_velocity, Vec3::zeros());
        assert_eq!(m.rv_norm, 0.0);
    }

    #[test]
    fn rotation_needs_rigidity() {
        let mut m = metamer(false);
        m.cumulated_torque = Vec3::new(1.0, 0.0, 0.0);
        assert!(matches!(
            m.calculate_rotation_velocity(&ActiveEvents::default(), false, 0.5),
            Err(Error::DivisionByZero(_))
        ));
    }

    #[test]
    fn rotation_velocity_is_blended() {
        let mut m = metamer(false);
        m.update_metamer_parameters(&ActiveEvents::default(), 1.0, 1994)
            .unwrap();
        assert!(m.rigidity > 0.0);
        m.cumulated_torque = Vec3::new(m.rigidity, 0.0, 0.0);
        m.calculate_rotation_velocity(&ActiveEvents::default(), false, 0.5)
            .unwrap();
        assert_eq!(m.rotation_velocity, Vec3::x());
        assert!((m.rv_norm - 0.5).abs() < 1e-12);

        m.cumulated_torque = Vec3::new(0.0, m.rigidity, 0.0);
        m.calculate_rotation_velocity(&ActiveEvents::default(), false, 0.5)
            .unwrap();
        let half = 0.5f64.sqrt();
        assert!((m.rv_norm - half).abs() < 1e-12);
        assert!((m.rotation_velocity - Vec3::new(1.0, 1.0, 0.0).normalize()).norm() < 1e-12);
        assert!((m.rotation_velocity.norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn harvest_memory_scales_with_lost_mass() {
        let mut m = metamer(false);
        m.rigidity = 1.0;
        m.pre_harvest_mass = 2.0;
        m.cumulated_mass = 1.5;
        m.pre_harvest_rotation = Vec3::new(0.0, 4.0, 0.0);
        let harvest = ActiveEvents::with(&[EventKind::Harvest]);
        m.calculate_rotation_velocity(&harvest, false, 1.0).unwrap();
        assert_eq!(m.rotation_memory, Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(m.rotation_velocity, Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(m.rv_norm, 1.0);

        m.pre_harvest_mass = 0.0;
        m.calculate_rotation_velocity(&harvest, false, 1.0).unwrap();
        assert_eq!(m.rotation_memory, Vec3::zeros());
    }

    #[test]
    fn forced_fruit_set_counts_one_fruit() {
        let sure = ExpolinearGrowth {
            probability: 1.0,
            ..ExpolinearGrowth::default()
        };
        let mut o = organs();
        o.fruit = Fruit::new(FruitModelConfig::Expolinear(sure).create_model());
        let mut m = Metamer::new(o, Frame::vertical(), 1, true);
        let mut rng = SimRng::new(7);
        let curve = FSet::leaf_area_default();
        let quiet = ActiveEvents::default();

        m.age = 5.0;
        assert_eq!(m.organ_activity(&quiet, &mut rng, &curve).unwrap(), 0);
        assert_eq!(m.fruit.state(), FruitState::Flower);

        m.age = 11.0;
        assert_eq!(m.organ_activity(&quiet, &mut rng, &curve).unwrap(), 1);
        assert_eq!(m.fruit.state(), FruitState::Fruit);
        assert_eq!(m.organ_activity(&quiet, &mut rng, &curve).unwrap(), 0);

        let harvest = ActiveEvents::with(&[EventKind::Harvest]);
        m.organ_activity(&harvest, &mut rng, &curve).unwrap();
        assert_eq!(m.fruit.state(), FruitState::FruitScar);
        assert_eq!(m.fruit.mass, 0.0);
    }

    #[test]
    fn leaf_out_scars_leaf_and_clears_mirror() {
        let mut m = metamer(false);
        let mut rng = SimRng::new(1);
        let curve = FSet::leaf_area_default();
        m.leaf.age = 6.0;
        m.organ_activity(&ActiveEvents::default(), &mut rng, &curve)
            .unwrap();
        assert!(m.leaf_area > 0.0);
        assert_eq!(m.leaf_state, LeafState::Growing);

        m.organ_activity(&ActiveEvents::with(&[EventKind::LeafOut]), &mut rng, &curve)
            .unwrap();
        assert_eq!(m.leaf_state, LeafState::Scar);
        assert_eq!(m.leaf_area, 0.0);
        assert_eq!(m.leaf.mass, 0.0);
    }

    #[test]
    fn one_cambial_layer_per_year() {
        let mut m = metamer(false);
        m.year = 1994;
        let layer_day = ActiveEvents::with(&[EventKind::NewCambialLayer]);
        m.update_metamer_parameters(&layer_day, 1.0, 1995).unwrap();
        m.update_metamer_parameters(&layer_day, 1.0, 1995).unwrap();
        assert_eq!(m.layers().len(), 2);
        assert_eq!(m.year, 1995);
        m.update_metamer_parameters(&layer_day, 1.0, 1996).unwrap();
        assert_eq!(m.layers().len(), 3);
    }

    #[test]
    fn internode_elongates_during_period_only() {
        let mut m = metamer(false);
        m.zone = Some(Zone::Diffuse);
        for _ in 0..30 {
            m.update_metamer_parameters(&ActiveEvents::default(), 1.0, 1994)
                .unwrap();
        }
        let rate = m.internode().growth_rate(Some(Zone::Diffuse));
        // ages 1 through 9 are still inside the elongation period
        let expected = 0.0001 + 9.0 * rate;
        assert!((m.length - expected).abs() < 1e-12);
        assert!(m.age >= 30.0);
    }

    #[test]
    fn mass_includes_children() {
        let mut child = metamer(false);
        child.compute_mass(None, None);
        let own = PI * 0.0006 * 0.0006 * 0.0001 * 1000.0;
        assert!((child.cumulated_mass - own).abs() < 1e-18);

        let mut parent = metamer(false);
        parent.compute_mass(Some(&child), Some(&child));
        assert!((parent.cumulated_mass - 3.0 * own).abs() < 1e-18);
    }

    #[test]
    fn position_follows_heading() {
        let mut m = metamer(false);
        m.length = 0.02;
        m.update_position(None);
        assert!((m.position - Vec3::new(0.0, 0.0, 0.02)).norm() < 1e-15);
        m.update_position(Some(Vec3::new(1.0, 1.0, 1.0)));
        assert!((m.position - Vec3::new(1.0, 1.0, 1.02)).norm() < 1e-15);
    }

    #[test]
    fn pruning_reaction_prefers_vertical() {
        let mut m = metamer(false);
        m.number = 0;
        assert!(m.pruning_reaction_angle(0.5).is_err());

        m.number = 3;
        m.farthest_apex = 3;
        m.frame = rotate_frame_at_branch(&Frame::vertical(), 0.6, 0.0);
        let (branching, phyllotactic) = m.pruning_reaction_angle(PI / 2.0).unwrap();
        assert!((branching - 0.3).abs() < 1e-12);
        let regrown = rotate_frame_at_branch(&m.frame, branching, phyllotactic);
        let tilt = regrown.heading.dot(&Vec3::z()).clamp(-1.0, 1.0).acos();
        assert!(tilt < 0.6);
    }
}
