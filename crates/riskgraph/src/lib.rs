//! Command-line boundary for the riskgraph engine
//!
//! Loads graphs from JSON files, enforces resource ceilings and prints
//! results as JSON.

pub mod commands;
pub mod io;
pub mod limits;
pub mod logging;

pub use limits::{LimitOverrides, Limits};
pub use logging::init_logging;

#[cfg(test)]
mod tests;
