//! Probability distributions sampled by DISTRIBUTION nodes

use rand::distr::weighted::WeightedIndex;
use rand::distr::{Bernoulli, Uniform};
use rand::{Rng, distr::Distribution};
use serde::{Deserialize, Serialize};

use crate::error::DistributionError;

/// A distribution and its parameters, tagged by `distributionType`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "distributionType",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum DistributionSpec {
    Normal {
        mean: f64,
        std_dev: f64,
    },
    /// Parameters are those of the underlying normal distribution
    LogNormal {
        mu: f64,
        sigma: f64,
    },
    Uniform {
        min: f64,
        max: f64,
    },
    Triangular {
        min: f64,
        mode: f64,
        max: f64,
    },
    /// Beta-PERT on `[min, max]` peaking at `mode`
    Pert {
        min: f64,
        mode: f64,
        max: f64,
    },
    Beta {
        alpha: f64,
        beta: f64,
    },
    Exponential {
        lambda: f64,
    },
    Poisson {
        lambda: f64,
    },
    Bernoulli {
        p: f64,
    },
    /// Location-scale Student's t
    StudentT {
        df: f64,
        #[serde(default)]
        location: f64,
        #[serde(default = "one")]
        scale: f64,
    },
    /// Weighted choice among fixed values
    Discrete {
        values: Vec<f64>,
        weights: Vec<f64>,
    },
    Fixed {
        value: f64,
    },
}

fn one() -> f64 {
    1.0
}

impl DistributionSpec {
    #[must_use]
    pub fn normal(mean: f64, std_dev: f64) -> Self {
        DistributionSpec::Normal { mean, std_dev }
    }

    #[must_use]
    pub fn uniform(min: f64, max: f64) -> Self {
        DistributionSpec::Uniform { min, max }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            DistributionSpec::Normal { .. } => "normal",
            DistributionSpec::LogNormal { .. } => "logNormal",
            DistributionSpec::Uniform { .. } => "uniform",
            DistributionSpec::Triangular { .. } => "triangular",
            DistributionSpec::Pert { .. } => "pert",
            DistributionSpec::Beta { .. } => "beta",
            DistributionSpec::Exponential { .. } => "exponential",
            DistributionSpec::Poisson { .. } => "poisson",
            DistributionSpec::Bernoulli { .. } => "bernoulli",
            DistributionSpec::StudentT { .. } => "studentT",
            DistributionSpec::Discrete { .. } => "discrete",
            DistributionSpec::Fixed { .. } => "fixed",
        }
    }

    /// Draw one sample.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64, DistributionError> {
        let invalid = |reason: &'static str| DistributionError {
            distribution: self.label(),
            reason,
        };

        match self {
            DistributionSpec::Normal { mean, std_dev } => rand_distr::Normal::new(*mean, *std_dev)
                .map(|d| d.sample(rng))
                .map_err(|_| invalid("stdDev must be non-negative and finite")),
            DistributionSpec::LogNormal { mu, sigma } => rand_distr::LogNormal::new(*mu, *sigma)
                .map(|d| d.sample(rng))
                .map_err(|_| invalid("sigma must be non-negative and finite")),
            DistributionSpec::Uniform { min, max } => {
                if min == max {
                    return Ok(*min);
                }
                Uniform::new(*min, *max)
                    .map(|d| d.sample(rng))
                    .map_err(|_| invalid("min must be less than max"))
            }
            DistributionSpec::Triangular { min, mode, max } => {
                rand_distr::Triangular::new(*min, *max, *mode)
                    .map(|d| d.sample(rng))
                    .map_err(|_| invalid("requires min <= mode <= max"))
            }
            DistributionSpec::Pert { min, mode, max } => {
                if !(min < max && min <= mode && mode <= max) {
                    return Err(invalid("requires min <= mode <= max and min < max"));
                }
                let range = max - min;
                let alpha = 1.0 + 4.0 * (mode - min) / range;
                let beta = 1.0 + 4.0 * (max - mode) / range;
                rand_distr::Beta::new(alpha, beta)
                    .map(|d| min + d.sample(rng) * range)
                    .map_err(|_| invalid("derived shape parameters are invalid"))
            }
            DistributionSpec::Beta { alpha, beta } => rand_distr::Beta::new(*alpha, *beta)
                .map(|d| d.sample(rng))
                .map_err(|_| invalid("alpha and beta must be positive")),
            DistributionSpec::Exponential { lambda } => rand_distr::Exp::new(*lambda)
                .map(|d| d.sample(rng))
                .map_err(|_| invalid("lambda must be non-negative")),
            DistributionSpec::Poisson { lambda } => rand_distr::Poisson::new(*lambda)
                .map(|d| d.sample(rng))
                .map_err(|_| invalid("lambda must be positive and finite")),
            DistributionSpec::Bernoulli { p } => Bernoulli::new(*p)
                .map(|d| if d.sample(rng) { 1.0 } else { 0.0 })
                .map_err(|_| invalid("p must be within [0, 1]")),
            DistributionSpec::StudentT {
                df,
                location,
                scale,
            } => rand_distr::StudentT::new(*df)
                .map(|d| location + scale * d.sample(rng))
                .map_err(|_| invalid("degrees of freedom must be positive and finite")),
            DistributionSpec::Discrete { values, weights } => {
                if values.is_empty() || values.len() != weights.len() {
                    return Err(invalid("values and weights must be non-empty and equal length"));
                }
                WeightedIndex::new(weights)
                    .map(|d| values[d.sample(rng)])
                    .map_err(|_| invalid("weights must be non-negative with a positive sum"))
            }
            DistributionSpec::Fixed { value } => Ok(*value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn test_serde_tagging() {
        let json = serde_json::json!({"distributionType": "normal", "mean": 100.0, "stdDev": 15.0});
        let spec: DistributionSpec = serde_json::from_value(json).unwrap();
        assert_eq!(spec, DistributionSpec::normal(100.0, 15.0));

        let t: DistributionSpec =
            serde_json::from_value(serde_json::json!({"distributionType": "studentT", "df": 5.0}))
                .unwrap();
        assert_eq!(
            t,
            DistributionSpec::StudentT {
                df: 5.0,
                location: 0.0,
                scale: 1.0
            }
        );
    }

    #[test]
    fn test_samples_respect_bounds() {
        let mut rng = SmallRng::seed_from_u64(7);
        let specs = [
            DistributionSpec::uniform(2.0, 5.0),
            DistributionSpec::Triangular {
                min: 0.0,
                mode: 1.0,
                max: 4.0,
            },
            DistributionSpec::Pert {
                min: 10.0,
                mode: 12.0,
                max: 20.0,
            },
        ];
        for spec in &specs {
            for _ in 0..500 {
                let x = spec.sample(&mut rng).unwrap();
                let (lo, hi) = match spec {
                    DistributionSpec::Uniform { min, max } => (*min, *max),
                    DistributionSpec::Triangular { min, max, .. }
                    | DistributionSpec::Pert { min, max, .. } => (*min, *max),
                    _ => unreachable!(),
                };
                assert!(x >= lo && x <= hi, "{} sample {x} out of [{lo}, {hi}]", spec.label());
            }
        }
    }

    #[test]
    fn test_discrete_only_yields_listed_values() {
        let mut rng = SmallRng::seed_from_u64(3);
        let spec = DistributionSpec::Discrete {
            values: vec![1.0, 5.0],
            weights: vec![0.0, 1.0],
        };
        for _ in 0..50 {
            assert_eq!(spec.sample(&mut rng).unwrap(), 5.0);
        }
    }

    #[test]
    fn test_invalid_parameters() {
        let mut rng = SmallRng::seed_from_u64(1);
        let err = DistributionSpec::normal(0.0, -1.0)
            .sample(&mut rng)
            .unwrap_err();
        assert_eq!(err.distribution, "normal");
        assert!(DistributionSpec::uniform(5.0, 1.0).sample(&mut rng).is_err());
        assert!(
            DistributionSpec::Bernoulli { p: 1.5 }
                .sample(&mut rng)
                .is_err()
        );
    }

    #[test]
    fn test_fixed_seed_is_reproducible() {
        let spec = DistributionSpec::normal(0.0, 1.0);
        let draw = |seed| {
            let mut rng = SmallRng::seed_from_u64(seed);
            (0..10)
                .map(|_| spec.sample(&mut rng).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(draw(11), draw(11));
        assert_ne!(draw(11), draw(12));
    }
}
