//! Adjustment-ratio convergence
//!
//! Rescales a modeled density grid until its total matches a target
//! deforestation area. Each pass multiplies the current candidate by the
//! adjustment ratio `AR = target / total`, capping every pixel at the
//! physical maximum (its own area). Capping removes mass, so several passes
//! may be needed; the number of passes is bounded.

use riskalloc_core::raster::Raster;
use riskalloc_core::{Error, Result};
use tracing::{debug, info, warn};

/// AR at or below which the candidate is accepted
pub const CONVERGENCE_THRESHOLD: f64 = 1.00001;

/// Default bound on rescaling passes
pub const DEFAULT_MAX_ITERATIONS: usize = 5;

/// Parameters for [`converge`]
#[derive(Debug, Clone)]
pub struct AdjustmentParams {
    /// Deforestation the final grid should add up to, in hectares
    pub target_ha: f64,
    /// Rescaling passes allowed before giving up
    pub max_iterations: usize,
    /// Per-pixel ceiling, normally the pixel area in hectares
    pub max_pixel_density: f64,
    /// Length of the target period; the result is divided by it
    pub elapsed_years: f64,
}

impl Default for AdjustmentParams {
    fn default() -> Self {
        Self {
            target_ha: 0.0,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_pixel_density: f64::INFINITY,
            elapsed_years: 1.0,
        }
    }
}

impl AdjustmentParams {
    fn validate(&self) -> Result<()> {
        if !(self.target_ha.is_finite() && self.target_ha >= 0.0) {
            return Err(Error::InvalidParameter {
                name: "target_ha",
                value: self.target_ha.to_string(),
                reason: "must be zero or positive".into(),
            });
        }
        if !(self.max_pixel_density > 0.0) {
            return Err(Error::InvalidParameter {
                name: "max_pixel_density",
                value: self.max_pixel_density.to_string(),
                reason: "must be positive".into(),
            });
        }
        if !(self.elapsed_years.is_finite() && self.elapsed_years > 0.0) {
            return Err(Error::InvalidParameter {
                name: "elapsed_years",
                value: self.elapsed_years.to_string(),
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}

/// How the rescaling loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceStatus {
    Converged,
    /// The iteration bound was hit with AR still above the threshold
    Exhausted,
}

/// Outcome of [`converge`]
#[derive(Debug, Clone)]
pub struct Adjustment {
    /// Final (or best available) density grid, annualized
    pub density: Raster<f64>,
    /// Rescaling passes performed
    pub iterations: usize,
    /// Last adjustment ratio computed
    pub ratio: f64,
    pub status: ConvergenceStatus,
}

impl Adjustment {
    pub fn is_converged(&self) -> bool {
        self.status == ConvergenceStatus::Converged
    }

    /// The density grid, or `ConvergenceExhausted` if the loop ran out of passes
    pub fn into_converged(self) -> Result<Raster<f64>> {
        match self.status {
            ConvergenceStatus::Converged => Ok(self.density),
            ConvergenceStatus::Exhausted => Err(Error::ConvergenceExhausted {
                iterations: self.iterations,
                ratio: self.ratio,
            }),
        }
    }
}

/// `target / sum(density)`, rejecting an undefined ratio
fn adjustment_ratio(density: &Raster<f64>, target_ha: f64) -> Result<f64> {
    let modeled = density.valid_sum();
    let ratio = target_ha / modeled;
    if modeled <= 0.0 || !ratio.is_finite() {
        return Err(Error::ZeroModeledDeforestation);
    }
    Ok(ratio)
}

/// Multiply valid pixels by `factor` and clamp them to `cap`
fn rescale(density: &Raster<f64>, factor: f64, cap: f64) -> Raster<f64> {
    let nodata = density.nodata();
    let mut out = density.clone();
    out.data_mut().mapv_inplace(|v| {
        if riskalloc_core::RasterElement::is_nodata(&v, nodata) {
            v
        } else {
            (v * factor).min(cap)
        }
    });
    out
}

/// Divide valid pixels by the number of years
fn annualize(density: &mut Raster<f64>, years: f64) {
    if years == 1.0 {
        return;
    }
    let nodata = density.nodata();
    density.data_mut().mapv_inplace(|v| {
        if riskalloc_core::RasterElement::is_nodata(&v, nodata) {
            v
        } else {
            v / years
        }
    });
}

/// Rescale `initial` until its total matches `params.target_ha`.
///
/// While `AR > 1.00001` and fewer than `max_iterations + 1` passes have
/// run, the candidate is replaced by `min(AR * candidate, cap)`. On
/// success the last AR is applied once more and the grid is divided by
/// `elapsed_years`. A zero target converges at once to an all-zero grid.
/// When the passes run out, the last candidate is still
/// returned (annualized likewise) with [`ConvergenceStatus::Exhausted`].
///
/// # Errors
/// * `InvalidParameter` for a negative target or a non-positive cap or period
/// * `ZeroModeledDeforestation` if the modeled total is 0 or the ratio is not finite
pub fn converge(initial: &Raster<f64>, params: AdjustmentParams) -> Result<Adjustment> {
    params.validate()?;
    let cap = params.max_pixel_density;

    let mut ratio = adjustment_ratio(initial, params.target_ha)?;
    let mut candidate = initial.clone();
    let mut iterations = 0usize;
    debug!("Initial adjustment ratio {:.6}", ratio);

    while ratio > CONVERGENCE_THRESHOLD && iterations <= params.max_iterations {
        candidate = rescale(&candidate, ratio, cap);
        ratio = adjustment_ratio(&candidate, params.target_ha)?;
        iterations += 1;
        debug!("Iteration {}: adjustment ratio {:.6}", iterations, ratio);
    }

    let (mut density, status) = if iterations <= params.max_iterations {
        (rescale(&candidate, ratio, cap), ConvergenceStatus::Converged)
    } else {
        warn!(
            "Maximum number of iterations reached ({}); adjustment ratio is still {:.6}",
            iterations, ratio
        );
        (candidate, ConvergenceStatus::Exhausted)
    };
    annualize(&mut density, params.elapsed_years);

    if status == ConvergenceStatus::Converged {
        info!("Converged after {} iterations (AR {:.6})", iterations, ratio);
    }

    Ok(Adjustment {
        density,
        iterations,
        ratio,
        status,
    })
}

/// Observed deforestation area: deforested pixels (value 1) times the pixel area
pub fn confirmation_target(deforestation: &Raster<u8>) -> f64 {
    deforestation.count_equal(1) as f64 * deforestation.pixel_area_ha()
}
