pub mod calendar;
pub mod simulation;
pub mod structure;
