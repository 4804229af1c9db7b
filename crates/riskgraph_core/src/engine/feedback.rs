//! Delayed values carried by FEEDBACK edges, and convergence tracking

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::model::{EdgeId, Value};

/// Consecutive within-tolerance iterations needed to call a loop converged
pub const CONVERGENCE_WINDOW: usize = 1;

/// History of the values a FEEDBACK edge has carried, bounded by its delay
#[derive(Debug, Clone)]
pub(crate) struct FeedbackHistory {
    delay: usize,
    history: VecDeque<Value>,
    tolerance: Option<f64>,
    previous: Option<f64>,
    streak: usize,
    converged_at: Option<usize>,
    last_delta: Option<f64>,
}

impl FeedbackHistory {
    pub(crate) fn new(delay: usize, tolerance: Option<f64>) -> Self {
        let delay = delay.max(1);
        Self {
            delay,
            history: VecDeque::with_capacity(delay),
            tolerance,
            previous: None,
            streak: 0,
            converged_at: None,
            last_delta: None,
        }
    }

    /// The value captured `delay` iterations ago, once that many exist
    pub(crate) fn delayed(&self) -> Option<&Value> {
        if self.history.len() == self.delay {
            self.history.front()
        } else {
            None
        }
    }

    /// Record the source's value at the end of `iteration`
    pub(crate) fn record(&mut self, iteration: usize, value: Value) {
        let current = value.as_number();
        if let (Some(prev), Some(cur)) = (self.previous, current) {
            let delta = (cur - prev).abs();
            self.last_delta = Some(delta);
            match self.tolerance {
                Some(tol) if delta <= tol => {
                    self.streak += 1;
                    if self.streak >= CONVERGENCE_WINDOW && self.converged_at.is_none() {
                        self.converged_at = Some(iteration);
                    }
                }
                _ => self.streak = 0,
            }
        }
        self.previous = current;

        if self.history.len() == self.delay {
            self.history.pop_front();
        }
        self.history.push_back(value);
    }

    pub(crate) fn report(&self, edge_id: &EdgeId) -> ConvergenceReport {
        ConvergenceReport {
            edge_id: edge_id.clone(),
            tolerance: self.tolerance,
            converged: self.tolerance.is_some() && self.streak >= CONVERGENCE_WINDOW,
            converged_at_iteration: self.converged_at,
            final_delta: self.last_delta,
        }
    }
}

/// Advisory convergence status of one FEEDBACK edge over a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvergenceReport {
    pub edge_id: EdgeId,
    pub tolerance: Option<f64>,
    /// Whether the loop is within tolerance at the end of the run
    pub converged: bool,
    /// First iteration at which the carried value settled within tolerance
    pub converged_at_iteration: Option<usize>,
    /// Change between the last two carried values
    pub final_delta: Option<f64>,
}
