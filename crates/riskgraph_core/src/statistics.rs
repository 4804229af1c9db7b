//! Risk statistics over Monte Carlo samples
//!
//! Moments use population formulas. Percentiles interpolate linearly between
//! adjacent order statistics at rank `p * (n - 1)`.

use serde::{Deserialize, Serialize};

/// Summary statistics of one output's sample vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskMetrics {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub standard_deviation: f64,
    pub variance: f64,
    pub min: f64,
    pub max: f64,
    /// Third standardized moment; 0 for a degenerate sample
    pub skewness: f64,
    /// Excess kurtosis; 0 for a degenerate sample
    pub kurtosis: f64,
    pub p5: f64,
    pub p10: f64,
    pub p25: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub confidence_level: f64,
    /// Historical VaR: the `1 - confidenceLevel` percentile
    pub value_at_risk: f64,
    /// Mean of the samples at or below the VaR
    pub conditional_value_at_risk: f64,
}

/// Percentile `p` in `[0, 1]` of an ascending slice.
///
/// Returns NaN for an empty slice.
#[must_use]
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let rank = p.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

impl RiskMetrics {
    /// Compute metrics over `samples`, ignoring NaN.
    ///
    /// Returns `None` when no non-NaN samples remain.
    #[must_use]
    pub fn from_samples(samples: &[f64], confidence_level: f64) -> Option<Self> {
        let mut sorted: Vec<f64> = samples.iter().copied().filter(|x| !x.is_nan()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let (m2, m3, m4) = sorted.iter().fold((0.0, 0.0, 0.0), |(m2, m3, m4), &x| {
            let d = x - mean;
            let d2 = d * d;
            (m2 + d2, m3 + d2 * d, m4 + d2 * d2)
        });
        let variance = m2 / n;
        let std_dev = variance.sqrt();
        let (skewness, kurtosis) = if std_dev > 0.0 && std_dev.is_finite() {
            ((m3 / n) / variance.powf(1.5), (m4 / n) / (variance * variance) - 3.0)
        } else {
            (0.0, 0.0)
        };

        let var = percentile(&sorted, 1.0 - confidence_level);
        let tail: Vec<f64> = sorted.iter().copied().take_while(|&x| x <= var).collect();
        let cvar = if tail.is_empty() {
            var
        } else {
            tail.iter().sum::<f64>() / tail.len() as f64
        };

        Some(Self {
            count: sorted.len(),
            mean,
            median: percentile(&sorted, 0.5),
            standard_deviation: std_dev,
            variance,
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            skewness,
            kurtosis,
            p5: percentile(&sorted, 0.05),
            p10: percentile(&sorted, 0.10),
            p25: percentile(&sorted, 0.25),
            p75: percentile(&sorted, 0.75),
            p90: percentile(&sorted, 0.90),
            p95: percentile(&sorted, 0.95),
            p99: percentile(&sorted, 0.99),
            confidence_level,
            value_at_risk: var,
            conditional_value_at_risk: cvar,
        })
    }
}

/// One bar of a histogram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// Equal-width histogram over the finite samples.
///
/// The last bin is closed on the right so the maximum is counted.
#[must_use]
pub fn histogram(samples: &[f64], bins: usize) -> Vec<HistogramBin> {
    let finite: Vec<f64> = samples.iter().copied().filter(|x| x.is_finite()).collect();
    if finite.is_empty() || bins == 0 {
        return Vec::new();
    }
    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if min == max {
        return vec![HistogramBin {
            lower: min,
            upper: max,
            count: finite.len(),
        }];
    }

    let width = (max - min) / bins as f64;
    let mut counts = vec![0usize; bins];
    for x in finite {
        let bin = (((x - min) / width) as usize).min(bins - 1);
        counts[bin] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            lower: min + width * i as f64,
            upper: if i == bins - 1 {
                max
            } else {
                min + width * (i + 1) as f64
            },
            count,
        })
        .collect()
}
