//! Daily loop driving one tree from `date_start` to `date_end`.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::SimConfig;
use crate::core::fset::{FSet, read_function};
use crate::core::random::SimRng;
use crate::error::Result;
use crate::sim::calendar::{ActiveEvents, Calendar, Events, GrowthPause, RotationConvergence};
use crate::sim::structure::{DayContext, Mechanics, OrganTemplates, TreeStructure};
use crate::tree::markov::{Markov, MarkovLibrary};
use crate::tree::sequences::{SequenceOptions, TerminalFateTable, TrunkTable};

pub struct Simulation {
    config: SimConfig,
    calendar: Calendar,
    events: Events,
    pause: GrowthPause,
    convergence: RotationConvergence,
    rng: SimRng,
    library: MarkovLibrary,
    markov: Markov,
    selected_year_no: u32,
    trunks: TrunkTable,
    fates: TerminalFateTable,
    leaf_area: FSet,
    tree: TreeStructure,
    days: u64,
}

impl Simulation {
    /// Load models and tables named by `config` and plant the trunk.
    pub fn new(config: SimConfig) -> Result<Self> {
        config.validate()?;
        let general = &config.general;

        let library = match &config.markov.models_path {
            Some(path) => MarkovLibrary::load(path)?,
            None => MarkovLibrary::builtin()?,
        };
        let mut markov = Markov::new(
            config.markov.minimum_length,
            config.markov.maximum_length,
            config.markov.max_iterations,
        )?;
        markov.select_year(&library, 0)?;

        let trunks = match &config.input.trunk_sequences_path {
            Some(path) => TrunkTable::load(path)?,
            None => TrunkTable::builtin()?,
        };
        let leaf_area = match &config.input.leaf_area_path {
            Some(path) => read_function(path, &config.input.leaf_area_function)?,
            None => FSet::leaf_area_default(),
        };

        let calendar = Calendar::new(general.date_start, general.time_step)?;
        let convergence = RotationConvergence::new(general.convergence_steps)?;
        let rng = SimRng::new(general.seed);

        let templates = OrganTemplates {
            leaf: config.leaf.clone(),
            internode: config.internode.clone(),
            wood: config.wood.clone(),
            fruit: config.fruit.clone(),
        };
        let mut tree = TreeStructure::new(
            templates,
            config.apex.clone(),
            config.tree.clone(),
            config.markov.minimum_length,
            config.markov.maximum_length,
        );
        tree.plant_trunk(trunks.generate_trunk(general.select_trunk)?, calendar.year())?;

        info!(
            target: "malus::sim",
            start = %general.date_start,
            end = %general.date_end,
            seed = general.seed,
            trunk = general.select_trunk,
            "simulation ready"
        );

        Ok(Self {
            events: config.events.clone(),
            config,
            calendar,
            pause: GrowthPause::default(),
            convergence,
            rng,
            library,
            markov,
            selected_year_no: 0,
            trunks,
            fates: TerminalFateTable::default(),
            leaf_area,
            tree,
            days: 0,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn date(&self) -> NaiveDate {
        self.calendar.date()
    }

    pub fn days(&self) -> u64 {
        self.days
    }

    pub fn tree(&self) -> &TreeStructure {
        &self.tree
    }

    pub fn is_finished(&self) -> bool {
        self.calendar.date() >= self.config.general.date_end
    }

    /// Advance one time step and return the events that were active.
    pub fn step(&mut self) -> Result<ActiveEvents> {
        if self.calendar.advance()? {
            info!(
                target: "malus::sim",
                year = self.calendar.year(),
                metamers = self.tree.metamer_count(),
                apices = self.tree.apex_count(),
                "new year"
            );
        }
        let year_no = self.calendar.year_no();
        if year_no != self.selected_year_no {
            self.markov.select_year(&self.library, year_no)?;
            self.selected_year_no = year_no;
        }

        let mut events = self.events.active(self.calendar.date());
        self.pause.apply(&mut events);
        if events != ActiveEvents::default() {
            debug!(
                target: "malus::sim",
                date = %self.calendar.date(),
                events = ?events.names(),
                "active events"
            );
        }

        let general = &self.config.general;
        let ctx = DayContext {
            events: &events,
            year: self.calendar.year(),
            year_no,
            dt: self.calendar.dt(),
            markov: &self.markov,
            trunks: &self.trunks,
            fates: &self.fates,
            leaf_area: &self.leaf_area,
            options: SequenceOptions {
                second_year_draws: general.second_year_draws,
                select_trunk: general.select_trunk,
            },
        };
        let mechanics = Mechanics {
            enabled: general.mechanics,
            stake: general.stake,
            ruptures: general.ruptures,
            step: self.convergence.step,
            modulus_of_rupture: self.config.wood.modulus_of_rupture,
        };

        self.tree.update_organs(&ctx, &mut self.rng)?;
        self.tree.update_mechanics(&events, &mechanics)?;
        self.tree.grow(&ctx, &mut self.rng)?;
        self.days += 1;
        Ok(events)
    }

    /// Step until `date_end` and summarise the final tree.
    pub fn run(&mut self) -> Result<SimulationReport> {
        while !self.is_finished() {
            self.step()?;
        }
        let report = self.report();
        info!(
            target: "malus::sim",
            days = report.days,
            metamers = report.metamers,
            fruits = report.fruits,
            "simulation finished"
        );
        Ok(report)
    }

    pub fn report(&self) -> SimulationReport {
        SimulationReport {
            seed: self.config.general.seed,
            days: self.days,
            final_date: self.calendar.date(),
            metamers: self.tree.metamer_count(),
            apices: self.tree.apex_count(),
            active_apices: self.tree.active_apex_count(),
            fruits: self.tree.fruit_count(),
            fruits_set: self.tree.fruits_set(),
            total_leaf_area: self.tree.total_leaf_area(),
            trunk_base_radius: self.tree.trunk_base_radius(),
            height: self.tree.height(),
            ruptures: self.tree.ruptures(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    pub seed: u64,
    pub days: u64,
    pub final_date: NaiveDate,
    pub metamers: usize,
    pub apices: usize,
    pub active_apices: usize,
    /// Fruits on the tree at the end of the run.
    pub fruits: usize,
    pub fruits_set: u64,
    /// m².
    pub total_leaf_area: f64,
    /// m.
    pub trunk_base_radius: f64,
    /// m.
    pub height: f64,
    pub ruptures: u64,
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "date          {} ({} days, seed {})", self.final_date, self.days, self.seed)?;
        writeln!(f, "metamers      {}", self.metamers)?;
        writeln!(f, "apices        {} ({} growing)", self.apices, self.active_apices)?;
        writeln!(f, "fruits        {} ({} set)", self.fruits, self.fruits_set)?;
        writeln!(f, "leaf area     {:.4} m2", self.total_leaf_area)?;
        writeln!(f, "trunk radius  {:.4} m", self.trunk_base_radius)?;
        writeln!(f, "height        {:.3} m", self.height)?;
        write!(f, "ruptures      {}", self.ruptures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short_config(days: u64) -> SimConfig {
        let mut config = SimConfig::default();
        let start = NaiveDate::from_ymd_opt(1994, 5, 1).unwrap();
        config.general.date_start = start;
        config.general.date_end = start + chrono::Days::new(days);
        config
    }

    #[test]
    fn run_stops_at_end_date() {
        let mut sim = Simulation::new(short_config(30)).unwrap();
        let report = sim.run().unwrap();
        assert_eq!(report.days, 30);
        assert_eq!(report.final_date, NaiveDate::from_ymd_opt(1994, 5, 31).unwrap());
        assert!(sim.is_finished());
        assert!(report.metamers > 0);
    }

    #[test]
    fn same_seed_same_tree() {
        let a = Simulation::new(short_config(60)).unwrap().run().unwrap();
        let b = Simulation::new(short_config(60)).unwrap().run().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn bud_break_is_reported() {
        let mut sim = Simulation::new(short_config(30)).unwrap();
        let mut seen = false;
        while !sim.is_finished() {
            seen |= sim.step().unwrap().bud_break;
        }
        assert!(seen);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = short_config(10);
        config.general.convergence_steps = 0;
        assert!(Simulation::new(config).is_err());
    }
}
