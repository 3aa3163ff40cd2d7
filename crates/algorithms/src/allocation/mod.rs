//! Risk allocation
//!
//! - **modeling_region**: vulnerability class x subdivision bins
//! - **frequency**: per-bin relative frequency tables and imputation
//! - **density**: frequency tables mapped back onto bin grids
//! - **adjustment**: rescaling a density map to a target total
//! - **workflow**: fitting, confirmation and validity runs over files

mod adjustment;
mod density;
mod frequency;
mod modeling_region;
mod workflow;

pub use adjustment::{
    confirmation_target, converge, Adjustment, AdjustmentParams, ConvergenceStatus,
    CONVERGENCE_THRESHOLD, DEFAULT_MAX_ITERATIONS,
};
pub use density::{density_map, BinLookup, DENSITY_NODATA};
pub use frequency::{
    backup_path, observed_bins, stage_table_update, FrequencyRow, FrequencyTable, Imputation,
};
pub use modeling_region::{
    modeling_regions, zone_of, ModelingRegions, BIN_FACTOR, BIN_NODATA, MAX_CLASS,
};
pub use workflow::{
    run_fit, run_prediction, FitOutcome, FitPaths, PredictionOutcome, PredictionPaths,
    PredictionTarget,
};
