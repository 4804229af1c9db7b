use serde::{Deserialize, Serialize};

use crate::error::SensitivityError;
use crate::model::{NodeId, Value};

fn default_field() -> String {
    "value".to_string()
}

fn default_iterations() -> usize {
    1
}

/// One-parameter sweep specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensitivityConfig {
    /// Node whose data field is swept
    pub parameter_node_id: NodeId,
    /// Dotted path into the node's `data` payload
    #[serde(default = "default_field")]
    pub parameter_field: String,
    /// Node whose value is observed
    pub output_node_id: NodeId,
    /// Field of the observed value; `value` or empty reads the whole value
    #[serde(default = "default_field")]
    pub output_field: String,
    /// Minimum value for the sweep
    pub min_value: f64,
    /// Maximum value for the sweep
    pub max_value: f64,
    /// Number of steps (points) in the sweep
    pub steps: usize,
    /// Iterations per point; more than one records the mean output
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Seed shared by every point
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Run parameters overlaid on the graph's `params`
    #[serde(default, skip_serializing_if = "Value::is_nullish")]
    pub parameters: Value,
}

impl SensitivityConfig {
    #[must_use]
    pub fn new(
        parameter_node_id: impl Into<NodeId>,
        parameter_field: impl Into<String>,
        output_node_id: impl Into<NodeId>,
        output_field: impl Into<String>,
        (min_value, max_value): (f64, f64),
        steps: usize,
    ) -> Self {
        Self {
            parameter_node_id: parameter_node_id.into(),
            parameter_field: parameter_field.into(),
            output_node_id: output_node_id.into(),
            output_field: output_field.into(),
            min_value,
            max_value,
            steps,
            iterations: default_iterations(),
            seed: None,
            parameters: Value::Undefined,
        }
    }

    #[must_use]
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: impl Into<Value>) -> Self {
        self.parameters = parameters.into();
        self
    }

    /// Generate the sweep values, evenly spaced and inclusive of both ends
    pub fn sweep_values(&self) -> Result<Vec<f64>, SensitivityError> {
        let (lo, hi) = (self.min_value, self.max_value);
        if !lo.is_finite() || !hi.is_finite() || lo > hi {
            return Err(SensitivityError::InvalidRange(lo, hi));
        }
        match self.steps {
            0 => Err(SensitivityError::NoSteps),
            1 => Ok(vec![lo]),
            n => {
                let step_size = (hi - lo) / (n - 1) as f64;
                Ok((0..n)
                    .map(|i| if i == n - 1 { hi } else { lo + step_size * i as f64 })
                    .collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sweep(lo: f64, hi: f64, steps: usize) -> SensitivityConfig {
        SensitivityConfig::new("p", "value", "out", "value", (lo, hi), steps)
    }

    #[test]
    fn test_sweep_values_inclusive() {
        let values = sweep(20.0, 80.0, 4).sweep_values().unwrap();
        assert_eq!(values, vec![20.0, 40.0, 60.0, 80.0]);
        assert_eq!(sweep(5.0, 9.0, 1).sweep_values().unwrap(), vec![5.0]);
    }

    #[test]
    fn test_sweep_rejects_bad_input() {
        assert_eq!(sweep(0.0, 1.0, 0).sweep_values(), Err(SensitivityError::NoSteps));
        assert!(matches!(
            sweep(2.0, 1.0, 3).sweep_values(),
            Err(SensitivityError::InvalidRange(..))
        ));
        assert!(sweep(f64::NAN, 1.0, 3).sweep_values().is_err());
    }

    #[test]
    fn test_config_from_json() {
        let config: SensitivityConfig = serde_json::from_str(
            r#"{"parameterNodeId": "price", "outputNodeId": "revenue",
                "minValue": 20, "maxValue": 80, "steps": 20}"#,
        )
        .unwrap();
        assert_eq!(config.parameter_field, "value");
        assert_eq!(config.iterations, 1);
        assert_eq!(config.steps, 20);
    }
}
