//! Arena holding the metamers and apices of one tree.
//!
//! Nodes are only ever appended, and a metamer is always pushed after the
//! metamer it grows from, so a reverse index walk visits children before
//! parents and a forward walk visits parents first.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::frame::{Frame, Vec3, rotate_frame_at_branch};
use crate::core::fset::FSet;
use crate::core::physics::{DEFAULT_RADIUS_EXPONENT, get_new_radius, rupture};
use crate::core::random::SimRng;
use crate::error::Result;
use crate::sim::calendar::ActiveEvents;
use crate::tree::apex::{Apex, ApexParams};
use crate::tree::fruit::{Fruit, FruitModelConfig, FruitState};
use crate::tree::internode::{Internode, InternodeParams};
use crate::tree::leaf::{Leaf, LeafParams};
use crate::tree::markov::Markov;
use crate::tree::metamer::{Metamer, Organs};
use crate::tree::observation::Observation;
use crate::tree::sequences::{
    Sequence, SequenceEntry, SequenceOptions, TerminalFateTable, TrunkTable, generate_sequence,
};
use crate::tree::wood::WoodParams;

/// m/s².
pub const GRAVITY: f64 = 9.81;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeParams {
    /// Degrees between successive laterals on one axis.
    #[serde(default = "TreeParams::default_phyllotactic_angle")]
    pub phyllotactic_angle: f64,
    /// Degrees.
    #[serde(default = "TreeParams::default_branching_angle")]
    pub branching_angle: f64,
    /// Degrees, used for floral laterals.
    #[serde(default = "TreeParams::default_floral_branching_angle")]
    pub floral_branching_angle: f64,
    #[serde(default = "TreeParams::default_spur_death_probability")]
    pub spur_death_probability: f64,
    #[serde(default = "TreeParams::default_inflorescence_death_probability")]
    pub inflorescence_death_probability: f64,
}

impl TreeParams {
    fn default_phyllotactic_angle() -> f64 {
        -144.0
    }
    fn default_branching_angle() -> f64 {
        45.0
    }
    fn default_floral_branching_angle() -> f64 {
        -10.0
    }
    fn default_spur_death_probability() -> f64 {
        0.3
    }
    fn default_inflorescence_death_probability() -> f64 {
        0.2
    }
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            phyllotactic_angle: Self::default_phyllotactic_angle(),
            branching_angle: Self::default_branching_angle(),
            floral_branching_angle: Self::default_floral_branching_angle(),
            spur_death_probability: Self::default_spur_death_probability(),
            inflorescence_death_probability: Self::default_inflorescence_death_probability(),
        }
    }
}

/// Parameters every new metamer's organs are built from.
#[derive(Debug, Clone, Default)]
pub struct OrganTemplates {
    pub leaf: LeafParams,
    pub internode: InternodeParams,
    pub wood: WoodParams,
    pub fruit: FruitModelConfig,
}

impl OrganTemplates {
    pub fn organs(&self) -> Organs {
        Organs {
            leaf: Leaf::new(self.leaf.clone()),
            fruit: Fruit::new(self.fruit.clone().create_model()),
            internode: Internode::new(self.internode.clone()),
            wood: self.wood.clone(),
        }
    }
}

/// Shared inputs of one simulated day.
#[derive(Debug, Clone, Copy)]
pub struct DayContext<'a> {
    pub events: &'a ActiveEvents,
    pub year: i32,
    pub year_no: u32,
    pub dt: f64,
    pub markov: &'a Markov,
    pub trunks: &'a TrunkTable,
    pub fates: &'a TerminalFateTable,
    pub leaf_area: &'a FSet,
    pub options: SequenceOptions,
}

/// Switches of the biomechanics passes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mechanics {
    pub enabled: bool,
    /// Staked trunks never bend.
    pub stake: bool,
    pub ruptures: bool,
    /// Rotation convergence fraction.
    pub step: f64,
    pub modulus_of_rupture: f64,
}

#[derive(Debug, Clone)]
pub struct MetamerNode {
    pub metamer: Metamer,
    /// Metamer this one grows from.
    pub parent: Option<usize>,
    /// First metamer of a lateral shoot.
    pub lateral: bool,
    pub successor: Option<usize>,
    pub branch: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApexStatus {
    /// Waiting for a bud break in a later year.
    Dormant,
    Growing,
    /// Growth unit finished; expands until the next bud break.
    Resting,
    Dead,
}

#[derive(Debug, Clone)]
pub struct ApexNode {
    pub apex: Apex,
    pub status: ApexStatus,
    /// Metamer the next one attaches to.
    pub bearer: Option<usize>,
    pub lateral: bool,
    /// Radians, for the first metamer of a lateral.
    pub branching_angle: f64,
    pub insertion_angle: f64,
    produced: u32,
    plastochron_days: f64,
    phyllotaxy: f64,
}

impl ApexNode {
    fn new(apex: Apex, bearer: Option<usize>, lateral: bool) -> Self {
        Self {
            apex,
            status: ApexStatus::Dormant,
            bearer,
            lateral,
            branching_angle: 0.0,
            insertion_angle: 0.0,
            produced: 0,
            plastochron_days: 0.0,
            phyllotaxy: 0.0,
        }
    }

    pub fn produced(&self) -> u32 {
        self.produced
    }
}

#[derive(Debug, Clone)]
pub struct TreeStructure {
    metamers: Vec<MetamerNode>,
    apices: Vec<ApexNode>,
    templates: OrganTemplates,
    apex_params: ApexParams,
    params: TreeParams,
    minimum_length: usize,
    maximum_length: usize,
    root_frame: Frame,
    fruits_set: u64,
    ruptures: u64,
}

impl TreeStructure {
    pub fn new(
        templates: OrganTemplates,
        apex_params: ApexParams,
        params: TreeParams,
        minimum_length: usize,
        maximum_length: usize,
    ) -> Self {
        Self {
            metamers: Vec::new(),
            apices: Vec::new(),
            templates,
            apex_params,
            params,
            minimum_length,
            maximum_length,
            root_frame: Frame::vertical(),
            fruits_set: 0,
            ruptures: 0,
        }
    }

    /// Start the tree from one vertical trunk apex consuming `sequence`.
    pub fn plant_trunk(&mut self, sequence: Sequence, year: i32) -> Result<usize> {
        let mut apex = Apex::new(
            &self.apex_params,
            self.root_frame,
            Observation::Trunk,
            self.minimum_length,
            self.maximum_length,
        )?;
        apex.set_sequence(sequence, year);
        let mut node = ApexNode::new(apex, None, false);
        node.status = ApexStatus::Growing;
        self.apices.push(node);
        Ok(self.apices.len() - 1)
    }

    pub fn metamers(&self) -> &[MetamerNode] {
        &self.metamers
    }

    pub fn apices(&self) -> &[ApexNode] {
        &self.apices
    }

    pub fn metamer_count(&self) -> usize {
        self.metamers.len()
    }

    pub fn apex_count(&self) -> usize {
        self.apices.len()
    }

    pub fn active_apex_count(&self) -> usize {
        self.apices
            .iter()
            .filter(|a| a.status == ApexStatus::Growing)
            .count()
    }

    pub fn fruit_count(&self) -> usize {
        self.metamers
            .iter()
            .filter(|n| n.metamer.fruit.state() == FruitState::Fruit)
            .count()
    }

    pub fn fruits_set(&self) -> u64 {
        self.fruits_set
    }

    pub fn ruptures(&self) -> u64 {
        self.ruptures
    }

    pub fn total_leaf_area(&self) -> f64 {
        self.metamers.iter().map(|n| n.metamer.leaf_area).sum()
    }

    pub fn trunk_base_radius(&self) -> f64 {
        self.metamers.first().map_or(0.0, |n| n.metamer.radius)
    }

    pub fn height(&self) -> f64 {
        self.metamers
            .iter()
            .map(|n| n.metamer.position.z)
            .fold(0.0, f64::max)
    }

    /// Ageing, layers, elongation and organ transitions of every metamer.
    /// Returns the fruits set today.
    pub fn update_organs(&mut self, ctx: &DayContext<'_>, rng: &mut SimRng) -> Result<u32> {
        let mut fruits = 0;
        for node in &mut self.metamers {
            node.metamer
                .update_metamer_parameters(ctx.events, ctx.dt, ctx.year)?;
            fruits += node.metamer.organ_activity(ctx.events, rng, ctx.leaf_area)?;
        }
        self.fruits_set += fruits as u64;
        Ok(fruits)
    }

    /// Tip-to-base accumulation of mass, radius and torque, then base-to-tip
    /// rotation, reorientation and placement.
    pub fn update_mechanics(&mut self, events: &ActiveEvents, mechanics: &Mechanics) -> Result<()> {
        let gravity = Vec3::new(0.0, 0.0, -GRAVITY);

        for i in (0..self.metamers.len()).rev() {
            let (head, tail) = self.metamers.split_at_mut(i + 1);
            let tail: &[MetamerNode] = tail;
            let node = &mut head[i];
            let successor = node.successor.map(|j| &tail[j - i - 1].metamer);
            let lateral = node.branch.map(|j| &tail[j - i - 1].metamer);
            let m = &mut node.metamer;

            m.compute_mass(successor, lateral);

            let merged = match (successor, lateral) {
                (Some(s), Some(l)) => get_new_radius(s.radius, l.radius, DEFAULT_RADIUS_EXPONENT),
                (Some(c), None) | (None, Some(c)) => c.radius,
                (None, None) => 0.0,
            };
            if merged > m.radius {
                m.radius = merged;
            }

            let segment = m.frame.heading * m.length;
            let children_mass: f64 = [successor, lateral]
                .into_iter()
                .flatten()
                .map(|c| c.cumulated_mass)
                .sum();
            let own_mass = m.cumulated_mass - children_mass;
            let mut torque = (segment * 0.5).cross(&(gravity * own_mass));
            for c in [successor, lateral].into_iter().flatten() {
                torque += c.cumulated_torque + segment.cross(&(gravity * c.cumulated_mass));
            }
            m.cumulated_torque = torque;

            if mechanics.ruptures
                && !m.ruptured
                && rupture(&torque, m.radius, mechanics.modulus_of_rupture)
            {
                m.ruptured = true;
                self.ruptures += 1;
                warn!(
                    target: "malus::mechanics",
                    metamer = i,
                    torque = torque.norm(),
                    radius = m.radius,
                    "branch rupture"
                );
            }
        }

        let root_frame = self.root_frame;
        for i in 0..self.metamers.len() {
            let (head, tail) = self.metamers.split_at_mut(i);
            let head: &[MetamerNode] = head;
            let node = &mut tail[0];
            let parent = node.parent.map(|p| &head[p].metamer);
            let m = &mut node.metamer;
            let initial = match parent {
                None => root_frame,
                Some(p) if node.lateral => {
                    rotate_frame_at_branch(&p.frame, m.branching_angle, m.phyllotactic_angle)
                }
                Some(p) => p.frame,
            };
            if mechanics.enabled {
                m.calculate_rotation_velocity(events, mechanics.stake, mechanics.step)?;
                m.reorient(&initial);
            }
            m.update_position(parent.map(|p| p.position));
        }

        for node in &mut self.apices {
            if let Some(b) = node.bearer {
                let bearer = &self.metamers[b].metamer;
                node.apex.frame = if node.lateral && node.produced == 0 {
                    rotate_frame_at_branch(&bearer.frame, node.branching_angle, node.insertion_angle)
                } else {
                    bearer.frame
                };
            }
        }
        Ok(())
    }

    /// Apex activity for one day: metamer production, terminal expansion and
    /// bud break. Nothing grows during the growth pause.
    pub fn grow(&mut self, ctx: &DayContext<'_>, rng: &mut SimRng) -> Result<()> {
        if ctx.events.growth_pause {
            return Ok(());
        }
        let count = self.apices.len();
        for index in 0..count {
            match self.apices[index].status {
                ApexStatus::Dead => {}
                ApexStatus::Dormant => {
                    let apex = &self.apices[index].apex;
                    if ctx.events.bud_break && apex.year < ctx.year {
                        let observation = apex.observation();
                        self.start_growth_unit(index, observation, ctx, rng)?;
                    }
                }
                ApexStatus::Growing => self.advance_apex(index, ctx, rng)?,
                ApexStatus::Resting => self.rest(index, ctx, rng)?,
            }
        }
        Ok(())
    }

    fn start_growth_unit(
        &mut self,
        index: usize,
        observation: Observation,
        ctx: &DayContext<'_>,
        rng: &mut SimRng,
    ) -> Result<()> {
        let sequence = generate_sequence(
            observation,
            ctx.markov,
            ctx.trunks,
            rng,
            ctx.year_no,
            ctx.options,
        )?;
        debug!(
            target: "malus::sim",
            apex = index,
            %observation,
            length = sequence.len(),
            "new growth unit"
        );
        let node = &mut self.apices[index];
        node.apex.set_observation(observation);
        node.apex.set_sequence(sequence, ctx.year);
        node.apex.expansion_days_counter = 0.0;
        node.status = ApexStatus::Growing;
        node.plastochron_days = 0.0;
        Ok(())
    }

    fn advance_apex(&mut self, index: usize, ctx: &DayContext<'_>, rng: &mut SimRng) -> Result<()> {
        let plastochron = self.templates.internode.plastochron as f64;
        {
            let node = &mut self.apices[index];
            node.plastochron_days += ctx.dt;
            if node.plastochron_days < plastochron {
                return Ok(());
            }
            node.plastochron_days -= plastochron;
        }

        if let Some(entry) = self.apices[index].apex.current_entry() {
            self.produce_metamer(index, entry, ctx, rng)?;
            self.apices[index].apex.advance();
        }

        let node = &mut self.apices[index];
        if node.apex.current_entry().is_none() {
            node.apex.max_terminal_radius_target()?;
            node.status = ApexStatus::Resting;
        }
        Ok(())
    }

    fn rest(&mut self, index: usize, ctx: &DayContext<'_>, rng: &mut SimRng) -> Result<()> {
        let node = &mut self.apices[index];
        if node.apex.is_expanding() {
            node.apex.terminal_expansion(ctx.dt);
            if let Some(b) = node.bearer {
                let bearer = &mut self.metamers[b].metamer;
                bearer.radius = bearer.radius.max(node.apex.radius);
            }
        }
        if !(ctx.events.bud_break && node.apex.year < ctx.year) {
            return Ok(());
        }

        let shoot = match node.apex.observation() {
            Observation::Trunk => Observation::Large,
            other => other,
        };
        let fate = ctx.fates.terminal_fate(rng, ctx.year_no as i32, shoot)?;
        let dies = match fate {
            Observation::Small => rng.boolean(self.params.spur_death_probability)?,
            Observation::Floral => rng.boolean(self.params.inflorescence_death_probability)?,
            _ => false,
        };
        if dies {
            debug!(target: "malus::sim", apex = index, %fate, "apex died");
            node.apex.set_observation(fate);
            node.status = ApexStatus::Dead;
            return Ok(());
        }
        self.start_growth_unit(index, fate, ctx, rng)
    }

    fn produce_metamer(
        &mut self,
        index: usize,
        entry: SequenceEntry,
        ctx: &DayContext<'_>,
        rng: &mut SimRng,
    ) -> Result<()> {
        let node = &self.apices[index];
        let lateral = node.lateral && node.produced == 0;
        let frame = match node.bearer {
            None => node.apex.frame,
            Some(b) if lateral => rotate_frame_at_branch(
                &self.metamers[b].metamer.frame,
                node.branching_angle,
                node.insertion_angle,
            ),
            Some(b) => self.metamers[b].metamer.frame,
        };

        let apex = &node.apex;
        let rank = apex.sequence_position;
        let floral = apex.observation() == Observation::Floral && rank == 0;
        let mut metamer = Metamer::new(self.templates.organs(), frame, rank as u32 + 1, floral);
        metamer.zone = entry.zone;
        metamer.observation = Observation::from_sequence_code(entry.observation);
        metamer.parent_observation = apex.observation();
        metamer.parent_unit_id = apex.parent_unit_id;
        metamer.parent_fbr_id = apex.parent_fbr_id;
        metamer.parent_tree_id = apex.parent_tree_id;
        metamer.trunk = apex.trunk;
        metamer.sylleptic = apex.sylleptic;
        metamer.year = ctx.year;
        if lateral {
            metamer.branching_angle = node.branching_angle;
            metamer.phyllotactic_angle = node.insertion_angle;
        }
        let parent = node.bearer;
        metamer.update_position(parent.map(|p| self.metamers[p].metamer.position));

        let new_index = self.metamers.len();
        self.metamers.push(MetamerNode {
            metamer,
            parent,
            lateral,
            successor: None,
            branch: None,
        });
        if let Some(p) = parent {
            if lateral {
                self.metamers[p].branch = Some(new_index);
            } else {
                self.metamers[p].successor = Some(new_index);
            }
        }
        let node = &mut self.apices[index];
        node.bearer = Some(new_index);
        node.produced += 1;

        let bud = Observation::from_sequence_code(entry.observation);
        if bud != Observation::Dormant {
            self.attach_lateral(index, new_index, bud, ctx, rng)?;
        }
        Ok(())
    }

    fn attach_lateral(
        &mut self,
        axis: usize,
        metamer_index: usize,
        bud: Observation,
        ctx: &DayContext<'_>,
        rng: &mut SimRng,
    ) -> Result<()> {
        let axis_node = &mut self.apices[axis];
        axis_node.phyllotaxy =
            (axis_node.phyllotaxy + self.params.phyllotactic_angle.to_radians()).rem_euclid(TAU);
        let insertion = axis_node.phyllotaxy;
        let branching = if bud == Observation::Floral {
            self.params.floral_branching_angle
        } else {
            self.params.branching_angle
        }
        .to_radians();

        let bearer = &mut self.metamers[metamer_index].metamer;
        bearer.developed = true;
        let frame = rotate_frame_at_branch(&bearer.frame, branching, insertion);
        let mut apex = Apex::new(
            &self.apex_params,
            frame,
            bud,
            self.minimum_length,
            self.maximum_length,
        )?;
        let parent = &self.apices[axis].apex;
        apex.parent_observation = parent.observation();
        apex.parent_unit_id = axis;
        apex.parent_fbr_id = axis;
        apex.parent_tree_id = parent.parent_tree_id;
        apex.year = ctx.year;
        apex.sylleptic = bud.is_sylleptic();
        apex.rank = bearer.number;

        let mut node = ApexNode::new(apex, Some(metamer_index), true);
        node.branching_angle = branching;
        node.insertion_angle = insertion;
        self.apices.push(node);
        let new_index = self.apices.len() - 1;

        if bud.is_sylleptic() {
            self.start_growth_unit(new_index, bud, ctx, rng)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::sim::calendar::{EventKind, Events, GrowthPause};
    use crate::tree::markov::MarkovLibrary;

    struct Fixture {
        markov: Markov,
        trunks: TrunkTable,
        fates: TerminalFateTable,
        leaf_area: FSet,
    }

    impl Fixture {
        fn new() -> Self {
            let mut markov = Markov::new(4, 70, 1000).unwrap();
            markov
                .select_year(&MarkovLibrary::builtin().unwrap(), 0)
                .unwrap();
            Self {
                markov,
                trunks: TrunkTable::builtin().unwrap(),
                fates: TerminalFateTable::default(),
                leaf_area: FSet::leaf_area_default(),
            }
        }

        fn day<'a>(&'a self, events: &'a ActiveEvents, year: i32) -> DayContext<'a> {
            DayContext {
                events,
                year,
                year_no: (year - 1994) as u32,
                dt: 1.0,
                markov: &self.markov,
                trunks: &self.trunks,
                fates: &self.fates,
                leaf_area: &self.leaf_area,
                options: SequenceOptions {
                    second_year_draws: true,
                    select_trunk: 0,
                },
            }
        }
    }

    fn tree() -> TreeStructure {
        TreeStructure::new(
            OrganTemplates::default(),
            ApexParams::default(),
            TreeParams::default(),
            4,
            70,
        )
    }

    fn entries(codes: &[u8]) -> Sequence {
        codes.iter().map(|&c| SequenceEntry::new(None, c)).collect()
    }

    fn mechanics() -> Mechanics {
        Mechanics {
            enabled: true,
            stake: true,
            ruptures: false,
            step: 0.5,
            modulus_of_rupture: 50e6,
        }
    }

    #[test]
    fn apex_produces_one_metamer_per_plastochron() {
        let fx = Fixture::new();
        let mut t = tree();
        let mut rng = SimRng::new(3);
        t.plant_trunk(entries(&[0, 0, 0, 0, 0]), 1994).unwrap();
        let quiet = ActiveEvents::default();
        for _ in 0..9 {
            t.grow(&fx.day(&quiet, 1994), &mut rng).unwrap();
        }
        assert_eq!(t.metamer_count(), 3);
        assert_eq!(t.metamers()[1].parent, Some(0));
        assert_eq!(t.metamers()[0].successor, Some(1));
        assert!(t.metamers().iter().all(|n| n.metamer.trunk));
    }

    #[test]
    fn lateral_buds_become_apices() {
        let fx = Fixture::new();
        let mut t = tree();
        let mut rng = SimRng::new(3);
        t.plant_trunk(entries(&[0, 3, 6, 0]), 1994).unwrap();
        let quiet = ActiveEvents::default();
        for _ in 0..9 {
            t.grow(&fx.day(&quiet, 1994), &mut rng).unwrap();
        }
        assert_eq!(t.apex_count(), 3);
        let small = &t.apices()[1];
        assert_eq!(small.apex.observation(), Observation::Small);
        assert_eq!(small.status, ApexStatus::Dormant);
        assert_eq!(small.bearer, Some(1));
        let sylleptic = &t.apices()[2];
        assert_eq!(sylleptic.status, ApexStatus::Growing);
        assert!(sylleptic.apex.sylleptic);
        assert!(t.metamers()[1].metamer.developed);
    }

    #[test]
    fn exhausted_trunk_rests_then_breaks_bud() {
        let fx = Fixture::new();
        let mut t = tree();
        let mut rng = SimRng::new(11);
        t.plant_trunk(entries(&[0, 0, 0, 0]), 1994).unwrap();
        let quiet = ActiveEvents::default();
        for _ in 0..12 {
            t.grow(&fx.day(&quiet, 1994), &mut rng).unwrap();
        }
        assert_eq!(t.metamer_count(), 4);
        assert_eq!(t.apices()[0].status, ApexStatus::Resting);

        let bud_break = ActiveEvents::with(&[EventKind::BudBreak]);
        t.grow(&fx.day(&bud_break, 1995), &mut rng).unwrap();
        let status = t.apices()[0].status;
        assert!(matches!(status, ApexStatus::Growing | ApexStatus::Dead));
        assert!(t.apices()[0].apex.trunk);
    }

    #[test]
    fn nothing_grows_during_pause() {
        let fx = Fixture::new();
        let mut t = tree();
        let mut rng = SimRng::new(3);
        t.plant_trunk(entries(&[0, 0, 0, 0]), 1994).unwrap();
        let mut pause = GrowthPause::default();
        let mut today = Events::default().active(NaiveDate::from_ymd_opt(1994, 12, 25).unwrap());
        pause.apply(&mut today);
        for _ in 0..9 {
            t.grow(&fx.day(&today, 1994), &mut rng).unwrap();
        }
        assert_eq!(t.metamer_count(), 0);
    }

    #[test]
    fn staked_trunk_stays_vertical_and_stacks_up() {
        let fx = Fixture::new();
        let mut t = tree();
        let mut rng = SimRng::new(5);
        t.plant_trunk(entries(&[0, 1, 0, 2, 0, 0]), 1994).unwrap();
        let quiet = ActiveEvents::default();
        for _ in 0..40 {
            let day = fx.day(&quiet, 1994);
            t.update_organs(&day, &mut rng).unwrap();
            t.update_mechanics(&quiet, &mechanics()).unwrap();
            t.grow(&day, &mut rng).unwrap();
        }
        let trunk: Vec<_> = t.metamers().iter().filter(|n| n.metamer.trunk).collect();
        assert_eq!(trunk.len(), 6);
        for n in &trunk {
            assert_eq!(n.metamer.rotation_velocity, Vec3::zeros());
            assert!((n.metamer.frame.heading - Vec3::z()).norm() < 1e-12);
        }
        let mut z = 0.0;
        for n in &trunk {
            z += n.metamer.length;
            assert!((n.metamer.position.z - z).abs() < 1e-12);
        }
        assert!(t.height() >= z - 1e-12);
        assert!(t.metamers()[0].metamer.cumulated_mass > 0.0);
    }

    #[test]
    fn laterals_bend_under_their_own_weight() {
        let fx = Fixture::new();
        let mut t = tree();
        let mut rng = SimRng::new(5);
        t.plant_trunk(entries(&[0, 6, 0, 0]), 1994).unwrap();
        let quiet = ActiveEvents::default();
        for _ in 0..90 {
            let day = fx.day(&quiet, 1994);
            t.update_organs(&day, &mut rng).unwrap();
            t.update_mechanics(&quiet, &mechanics()).unwrap();
            t.grow(&day, &mut rng).unwrap();
        }
        let lateral: Vec<_> = t.metamers().iter().filter(|n| !n.metamer.trunk).collect();
        assert!(!lateral.is_empty());
        assert!(lateral.iter().any(|n| n.metamer.rv_norm > 0.0));
        assert!(t.total_leaf_area() > 0.0);
        assert!(t.trunk_base_radius() >= 0.0006);
    }
}
