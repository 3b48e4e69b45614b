//! Seeded simulation of apple tree architecture: bud fate sequences, organ
//! growth and branch biomechanics, advanced one calendar day at a time.

pub mod config;
pub mod core;
pub mod error;
pub mod sim;
pub mod tree;

pub use error::{Error, Result};
