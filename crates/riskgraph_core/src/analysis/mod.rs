//! Sensitivity analysis.
//!
//! Sweeps one numeric field of one node across a range and records how an
//! observed node responds:
//!
//! ```ignore
//! use riskgraph_core::analysis::{SensitivityConfig, run_sensitivity_analysis};
//!
//! let config = SensitivityConfig::new("price", "value", "revenue", "value", (20.0, 80.0), 20)
//!     .with_seed(42);
//! let result = run_sensitivity_analysis(&graph, &config, None);
//! let best = result.peak();
//! ```

mod config;
mod sensitivity;

pub use config::*;
pub use sensitivity::*;
