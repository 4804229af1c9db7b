//! Resource ceilings enforced at the command-line boundary
//!
//! Values are layered: built-in defaults, then an optional YAML file, then
//! environment variables, then explicit flags.

use std::path::Path;

use color_eyre::eyre::{Result, WrapErr, eyre};
use riskgraph_core::{SimulationConfig, SimulationResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const ENV_MAX_ITERATIONS: &str = "MAX_SIMULATION_ITERATIONS";
pub const ENV_MAX_TIME: &str = "MAX_SIMULATION_TIME";
pub const ENV_MAX_STORED: &str = "MAX_STORED_RESULTS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_simulation_iterations: usize,
    /// Wall-clock budget per run, in milliseconds
    pub max_simulation_time_ms: u64,
    /// Per-iteration samples kept in printed results
    pub max_stored_results: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_simulation_iterations: 100_000,
            max_simulation_time_ms: 60_000,
            max_stored_results: 10_000,
        }
    }
}

/// Flag values that take precedence over every other source
#[derive(Debug, Clone, Copy, Default)]
pub struct LimitOverrides {
    pub max_simulation_iterations: Option<usize>,
    pub max_simulation_time_ms: Option<u64>,
    pub max_stored_results: Option<usize>,
}

impl Limits {
    /// Parse a YAML document; missing keys keep their defaults
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_saphyr::from_str(yaml).map_err(|e| eyre!("invalid limits config: {e}"))
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_saphyr::to_string(self).map_err(|e| eyre!("failed to serialize limits: {e}"))
    }

    /// Defaults, or the file's values when a path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read {}", path.display()))?;
        let limits = Self::from_yaml(&content)?;
        debug!(path = %path.display(), ?limits, "loaded limits config");
        Ok(limits)
    }

    /// Overlay values from the process environment
    pub fn with_env(self) -> Result<Self> {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup`, which maps variable names to values
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(v) = parse_var(&lookup, ENV_MAX_ITERATIONS)? {
            self.max_simulation_iterations = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_MAX_TIME)? {
            self.max_simulation_time_ms = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_MAX_STORED)? {
            self.max_stored_results = v;
        }
        Ok(self)
    }

    #[must_use]
    pub fn with_overrides(mut self, overrides: LimitOverrides) -> Self {
        if let Some(v) = overrides.max_simulation_iterations {
            self.max_simulation_iterations = v;
        }
        if let Some(v) = overrides.max_simulation_time_ms {
            self.max_simulation_time_ms = v;
        }
        if let Some(v) = overrides.max_stored_results {
            self.max_stored_results = v;
        }
        self
    }

    /// Clamp the iteration count and tighten the time budget.
    ///
    /// A budget the caller already set is kept when it is shorter.
    pub fn apply(&self, config: &mut SimulationConfig) {
        if config.iterations > self.max_simulation_iterations {
            warn!(
                requested = config.iterations,
                limit = self.max_simulation_iterations,
                "clamping simulation iterations"
            );
            config.iterations = self.max_simulation_iterations;
        }
        let budget = config
            .max_execution_time_ms
            .map_or(self.max_simulation_time_ms, |t| t.min(self.max_simulation_time_ms));
        config.max_execution_time_ms = Some(budget);
    }

    /// Drop stored samples past the ceiling; returns how many were dropped.
    ///
    /// Aggregated metrics were computed from every sample and are untouched.
    pub fn truncate(&self, result: &mut SimulationResult) -> usize {
        let dropped = result.results.len().saturating_sub(self.max_stored_results);
        if dropped > 0 {
            result.results.truncate(self.max_stored_results);
            debug!(dropped, "truncated stored samples");
        }
        if let Some(rows) = result.intermediates.as_mut() {
            rows.truncate(self.max_stored_results);
        }
        dropped
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| eyre!("{key}={raw:?} is not a valid number: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let limits = Limits::from_yaml("max_stored_results: 25\n").unwrap();
        assert_eq!(limits.max_stored_results, 25);
        assert_eq!(limits.max_simulation_iterations, 100_000);
        assert_eq!(limits.max_simulation_time_ms, 60_000);
    }

    #[test]
    fn test_yaml_round_trip() {
        let limits = Limits {
            max_simulation_iterations: 10,
            max_simulation_time_ms: 20,
            max_stored_results: 30,
        };
        let yaml = limits.to_yaml().unwrap();
        assert_eq!(Limits::from_yaml(&yaml).unwrap(), limits);
    }

    #[test]
    fn test_bad_env_value_is_an_error() {
        let err = Limits::default()
            .with_env_from(|k| (k == ENV_MAX_TIME).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_MAX_TIME));
    }
}
