//! # riskalloc algorithms
//!
//! Deforestation risk allocation over a jurisdiction.
//!
//! ## Stages
//!
//! - **vulnerability**: distance-to-forest-edge zoning, Natural Risk Threshold
//! - **allocation**: modeling regions, relative frequencies, density maps, adjustment
//! - **evaluation**: Thiessen-cell comparison of predicted and observed deforestation
//!
//! Workflows report progress through [`progress::Progress`].

pub mod allocation;
pub mod evaluation;
mod maybe_rayon;
mod outputs;
pub mod progress;
pub mod vulnerability;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::allocation::{
        converge, density_map, modeling_regions, run_fit, run_prediction, AdjustmentParams,
        ConvergenceStatus, FitPaths, FrequencyTable, PredictionPaths, PredictionTarget,
    };
    pub use crate::evaluation::{
        evaluate, run_evaluation, AccuracyStats, ChartRenderer, EvaluationParams, EvaluationPaths,
    };
    pub use crate::progress::{Progress, Silent};
    pub use crate::vulnerability::{
        geometric_classification, natural_risk_threshold, quantile_classification, NrtPolicy,
        VulnerabilityParams,
    };
    pub use riskalloc_core::prelude::*;
}
