//! Simulated calendar and the yearly events that drive organ transitions.

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Current date advanced by a fixed number of days per step.
#[derive(Debug, Clone)]
pub struct Calendar {
    date: NaiveDate,
    time_step: u32,
    start_year: i32,
}

impl Calendar {
    pub fn new(start: NaiveDate, time_step: u32) -> Result<Self> {
        if time_step == 0 {
            return Err(Error::invalid("time step must be at least one day"));
        }
        Ok(Self {
            date: start,
            time_step,
            start_year: start.year(),
        })
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn year(&self) -> i32 {
        self.date.year()
    }

    /// Whole years elapsed since the first simulated year.
    pub fn year_no(&self) -> u32 {
        (self.date.year() - self.start_year).max(0) as u32
    }

    pub fn time_step(&self) -> u32 {
        self.time_step
    }

    pub fn dt(&self) -> f64 {
        self.time_step as f64
    }

    /// Move forward one step. Returns true when a new year was entered.
    pub fn advance(&mut self) -> Result<bool> {
        let before = self.date.year();
        self.date = self
            .date
            .checked_add_days(Days::new(self.time_step as u64))
            .ok_or_else(|| Error::invalid(format!("calendar overflow after {}", self.date)))?;
        Ok(self.date.year() > before)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    BudBreak,
    NewCambialLayer,
    PreHarvest,
    Harvest,
    Autumn,
    LeafFall,
    LeafOut,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::BudBreak,
        EventKind::NewCambialLayer,
        EventKind::PreHarvest,
        EventKind::Harvest,
        EventKind::Autumn,
        EventKind::LeafFall,
        EventKind::LeafOut,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::BudBreak => "bud_break",
            EventKind::NewCambialLayer => "new_cambial_layer",
            EventKind::PreHarvest => "pre_harvest",
            EventKind::Harvest => "harvest",
            EventKind::Autumn => "autumn",
            EventKind::LeafFall => "leaf_fall",
            EventKind::LeafOut => "leaf_out",
        }
    }
}

/// Yearly window opening on `month`/`day` and lasting `duration` days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventWindow {
    pub month: u32,
    pub day: u32,
    #[serde(default = "EventWindow::default_duration")]
    pub duration: u32,
}

impl EventWindow {
    fn default_duration() -> u32 {
        1
    }

    pub fn new(month: u32, day: u32, duration: u32) -> Result<Self> {
        let window = Self {
            month,
            day,
            duration,
        };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> Result<()> {
        // 2000 is a leap year, so 29 February is accepted.
        if NaiveDate::from_ymd_opt(2000, self.month, self.day).is_none() {
            return Err(Error::invalid(format!(
                "no such calendar day {}/{}",
                self.month, self.day
            )));
        }
        if self.duration >= 365 {
            return Err(Error::invalid(format!(
                "event lasting {} days would overlap itself",
                self.duration
            )));
        }
        Ok(())
    }

    fn start_in(&self, year: i32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(year, self.month, self.day)
            .or_else(|| {
                self.day
                    .checked_sub(1)
                    .and_then(|day| NaiveDate::from_ymd_opt(year, self.month, day))
            })
    }

    /// Active on `[start, start + duration]`, including a tail carried over
    /// from the previous year.
    pub fn is_active(&self, date: NaiveDate) -> bool {
        [date.year(), date.year() - 1].into_iter().any(|year| {
            self.start_in(year).is_some_and(|start| {
                start
                    .checked_add_days(Days::new(self.duration as u64))
                    .is_some_and(|end| start <= date && date <= end)
            })
        })
    }
}

/// Event windows of one run, usually taken from the `[events]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Events {
    #[serde(default = "Events::default_bud_break")]
    pub bud_break: EventWindow,
    #[serde(default = "Events::default_new_cambial_layer")]
    pub new_cambial_layer: EventWindow,
    #[serde(default = "Events::default_pre_harvest")]
    pub pre_harvest: EventWindow,
    #[serde(default = "Events::default_harvest")]
    pub harvest: EventWindow,
    #[serde(default = "Events::default_autumn")]
    pub autumn: EventWindow,
    #[serde(default = "Events::default_leaf_fall")]
    pub leaf_fall: EventWindow,
    #[serde(default = "Events::default_leaf_out")]
    pub leaf_out: EventWindow,
}

impl Events {
    fn default_bud_break() -> EventWindow {
        EventWindow { month: 5, day: 15, duration: 1 }
    }
    fn default_new_cambial_layer() -> EventWindow {
        EventWindow { month: 5, day: 15, duration: 1 }
    }
    fn default_pre_harvest() -> EventWindow {
        EventWindow { month: 10, day: 29, duration: 1 }
    }
    fn default_harvest() -> EventWindow {
        EventWindow { month: 10, day: 30, duration: 1 }
    }
    fn default_autumn() -> EventWindow {
        EventWindow { month: 11, day: 1, duration: 45 }
    }
    fn default_leaf_fall() -> EventWindow {
        EventWindow { month: 11, day: 15, duration: 45 }
    }
    fn default_leaf_out() -> EventWindow {
        EventWindow { month: 12, day: 25, duration: 1 }
    }

    pub fn window(&self, kind: EventKind) -> &EventWindow {
        match kind {
            EventKind::BudBreak => &self.bud_break,
            EventKind::NewCambialLayer => &self.new_cambial_layer,
            EventKind::PreHarvest => &self.pre_harvest,
            EventKind::Harvest => &self.harvest,
            EventKind::Autumn => &self.autumn,
            EventKind::LeafFall => &self.leaf_fall,
            EventKind::LeafOut => &self.leaf_out,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for kind in EventKind::ALL {
            self.window(kind)
                .validate()
                .map_err(|e| Error::invalid(format!("event {}: {e}", kind.as_str())))?;
        }
        Ok(())
    }

    pub fn active(&self, date: NaiveDate) -> ActiveEvents {
        let mut active = ActiveEvents::default();
        for kind in EventKind::ALL {
            if self.window(kind).is_active(date) {
                active.insert(kind);
            }
        }
        active
    }
}

impl Default for Events {
    fn default() -> Self {
        Self {
            bud_break: Self::default_bud_break(),
            new_cambial_layer: Self::default_new_cambial_layer(),
            pre_harvest: Self::default_pre_harvest(),
            harvest: Self::default_harvest(),
            autumn: Self::default_autumn(),
            leaf_fall: Self::default_leaf_fall(),
            leaf_out: Self::default_leaf_out(),
        }
    }
}

/// Events open on one simulated day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActiveEvents {
    pub bud_break: bool,
    pub new_cambial_layer: bool,
    pub pre_harvest: bool,
    pub harvest: bool,
    pub autumn: bool,
    pub leaf_fall: bool,
    pub leaf_out: bool,
    /// Dormancy between leaf_out and the next bud_break.
    pub growth_pause: bool,
}

impl ActiveEvents {
    pub fn with(kinds: &[EventKind]) -> Self {
        let mut active = Self::default();
        for kind in kinds {
            active.insert(*kind);
        }
        active
    }

    pub fn insert(&mut self, kind: EventKind) {
        *self.flag_mut(kind) = true;
    }

    pub fn contains(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::BudBreak => self.bud_break,
            EventKind::NewCambialLayer => self.new_cambial_layer,
            EventKind::PreHarvest => self.pre_harvest,
            EventKind::Harvest => self.harvest,
            EventKind::Autumn => self.autumn,
            EventKind::LeafFall => self.leaf_fall,
            EventKind::LeafOut => self.leaf_out,
        }
    }

    fn flag_mut(&mut self, kind: EventKind) -> &mut bool {
        match kind {
            EventKind::BudBreak => &mut self.bud_break,
            EventKind::NewCambialLayer => &mut self.new_cambial_layer,
            EventKind::PreHarvest => &mut self.pre_harvest,
            EventKind::Harvest => &mut self.harvest,
            EventKind::Autumn => &mut self.autumn,
            EventKind::LeafFall => &mut self.leaf_fall,
            EventKind::LeafOut => &mut self.leaf_out,
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = EventKind::ALL
            .into_iter()
            .filter(|k| self.contains(*k))
            .map(EventKind::as_str)
            .collect();
        if self.growth_pause {
            names.insert(0, "growth_pause");
        }
        names
    }
}

/// Latch that holds the growth pause from leaf_out until bud_break.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrowthPause {
    paused: bool,
}

impl GrowthPause {
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Update the latch from today's events and stamp the result on them.
    pub fn apply(&mut self, active: &mut ActiveEvents) {
        if active.leaf_out {
            self.paused = true;
        } else if active.bud_break {
            self.paused = false;
        }
        active.growth_pause = self.paused;
    }
}

/// Sub-stepping of the rotation velocity update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationConvergence {
    pub steps: u32,
    pub step: f64,
}

impl RotationConvergence {
    pub fn new(steps: u32) -> Result<Self> {
        if steps == 0 {
            return Err(Error::invalid("rotation convergence needs at least one step"));
        }
        Ok(Self {
            steps,
            step: 1.0 / steps as f64,
        })
    }
}

impl Default for RotationConvergence {
    fn default() -> Self {
        Self { steps: 2, step: 0.5 }
    }
}
