//! Spatial evaluation of predicted against observed deforestation
//!
//! - **polygonize**: jurisdiction mask to boundary polygon
//! - **lattice**: systematic sampling lattice and k-d tree
//! - **tessellation**: Thiessen cells clipped to the boundary
//! - **zonal**: area-weighted sums over cells
//! - **regression**: accuracy statistics
//! - **report**: chart table, cell features, residual grid
//! - **workflow**: evaluation run over files

mod clip;
mod lattice;
mod polygonize;
mod regression;
mod report;
mod tessellation;
mod workflow;
mod zonal;

pub use lattice::{lattice_pitch, systematic_lattice, KdTree, Neighbor};
pub use polygonize::jurisdiction_polygon;
pub use regression::{accuracy_statistics, AccuracyStats};
pub use report::{
    boundary_features, cell_features, residual_grid, write_performance_chart, CellRecord, ChartRenderer,
};
pub use tessellation::{clip_to_boundary, voronoi_cells, ThiessenCell, VoronoiCell, DEFAULT_FIDELITY};
pub use workflow::{
    evaluate, run_evaluation, Evaluation, EvaluationParams, EvaluationPaths, DEFAULT_CELL_AREA_HA,
};
pub use zonal::zonal_sum;
