//! Raster downscaling via robust regression
//!
//! Predicts a coarse-resolution response raster at the resolution of one
//! or more fine covariate rasters. The covariates are block-aggregated to
//! the coarse grid, a Huber-robust linear model is fitted between the
//! coarse response and the aggregated covariates, and the fitted model is
//! applied to the fine covariate pixels. Coarse-scale residuals can
//! optionally be resampled back onto the fine grid and added to the
//! prediction.
//!
//! Reference:
//! Kustas, W.P. et al. (2003). Estimating subpixel surface temperatures
//! and energy fluxes from the vegetation index-radiometric temperature
//! relationship. Remote Sensing of Environment.

mod robust;

use crate::maybe_rayon::*;
use ndarray::Array2;
use terrastat_core::raster::resample::{aggregate_mean, bilinear_sample};
use terrastat_core::raster::Raster;
use terrastat_core::{Error, Result};

use robust::huber_irls;

/// Parameters for robust-regression downscaling
#[derive(Debug, Clone)]
pub struct DownscaleParams {
    /// Huber tuning constant controlling outlier downweighting
    /// (default: 1.345, 95% efficiency at the normal)
    pub tuning_constant: f64,
    /// Maximum number of reweighting iterations (default: 25)
    pub max_iterations: usize,
    /// Convergence threshold on the largest coefficient change
    /// (default: 1e-6)
    pub tolerance: f64,
    /// Add bilinearly resampled coarse residuals to the fine prediction,
    /// and return the coarse residual raster (default: false)
    pub residual_correction: bool,
}

impl Default for DownscaleParams {
    fn default() -> Self {
        Self {
            tuning_constant: 1.345,
            max_iterations: 25,
            tolerance: 1e-6,
            residual_correction: false,
        }
    }
}

/// Result of raster downscaling
#[derive(Debug, Clone)]
pub struct DownscaleResult {
    /// Response predicted on the fine covariate grid
    pub downscaled: Raster<f64>,
    /// Fitted coefficients, intercept first
    pub coefficients: Vec<f64>,
    /// Robust residual scale of the coarse fit
    pub scale: f64,
    /// Root mean square error of the coarse fit
    pub rmse: f64,
    /// Reweighting iterations performed
    pub iterations: usize,
    /// Coarse-grid residuals (observed - fitted).
    /// `None` unless residual correction was requested.
    pub residuals: Option<Raster<f64>>,
}

/// Downscale a coarse response raster to the grid of fine covariates.
///
/// # Algorithm
/// 1. Block-aggregate each covariate onto the response grid
/// 2. Fit `response = β₀ + Σ βᵢ·covariateᵢ` by Huber IRLS over the coarse
///    cells where the response and every aggregated covariate are valid
/// 3. Apply the fitted model at each fine pixel
/// 4. Optionally add bilinearly resampled coarse residuals
///
/// # Arguments
/// * `response` - Coarse-resolution response raster
/// * `covariates` - Fine-resolution covariate rasters sharing one grid
/// * `params` - Robust-fit and residual-correction options
///
/// # Errors
/// Fails when no covariates are given, the covariates disagree in shape,
/// transform or CRS, the covariate grid is not finer than the response,
/// fewer valid coarse samples exist than `n_covariates + 2`, or the
/// design is singular (collinear/constant covariates).
pub fn downscale(
    response: &Raster<f64>,
    covariates: &[Raster<f64>],
    params: DownscaleParams,
) -> Result<DownscaleResult> {
    validate_inputs(response, covariates, &params)?;

    let fine = &covariates[0];
    let (c_rows, c_cols) = response.shape();

    // Step 1: covariates at the coarse scale
    let coarse_covs: Vec<Raster<f64>> = covariates
        .iter()
        .map(|cov| aggregate_mean(cov, response))
        .collect::<Result<_>>()?;

    // Step 2: paired samples over valid coarse cells
    let mut cells: Vec<(usize, usize)> = Vec::new();
    let mut predictors: Vec<Vec<f64>> = Vec::new();
    let mut observed: Vec<f64> = Vec::new();

    for row in 0..c_rows {
        for col in 0..c_cols {
            let y = unsafe { response.get_unchecked(row, col) };
            if response.is_nodata(y) {
                continue;
            }

            let mut x_row = Vec::with_capacity(coarse_covs.len());
            for cov in &coarse_covs {
                let v = unsafe { cov.get_unchecked(row, col) };
                if v.is_nan() {
                    break;
                }
                x_row.push(v);
            }
            if x_row.len() != coarse_covs.len() {
                continue;
            }

            cells.push((row, col));
            predictors.push(x_row);
            observed.push(y);
        }
    }

    let needed = covariates.len() + 2;
    if observed.len() < needed {
        return Err(Error::InsufficientSamples {
            needed,
            got: observed.len(),
        });
    }

    let fit = huber_irls(
        &predictors,
        &observed,
        params.tuning_constant,
        params.max_iterations,
        params.tolerance,
    )?;

    let rmse = (fit.residuals.iter().map(|r| r * r).sum::<f64>() / fit.residuals.len() as f64)
        .sqrt();

    // Coarse residual surface, only when the correction needs it
    let residual_raster = if params.residual_correction {
        let mut grid = response.with_same_meta::<f64>(c_rows, c_cols);
        grid.set_nodata(Some(f64::NAN));
        grid.data_mut().fill(f64::NAN);
        for (&(row, col), &r) in cells.iter().zip(fit.residuals.iter()) {
            unsafe { grid.set_unchecked(row, col, r) };
        }
        Some(grid)
    } else {
        None
    };

    // Steps 3-4: prediction on the fine grid
    let (f_rows, f_cols) = fine.shape();
    let beta = &fit.coefficients;
    let residual_ref = residual_raster.as_ref();

    let data: Vec<f64> = (0..f_rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; f_cols];
            for (col, cell) in row_data.iter_mut().enumerate() {
                let mut pred = beta[0];
                let mut valid = true;

                for (cov, b) in covariates.iter().zip(beta[1..].iter()) {
                    let v = unsafe { cov.get_unchecked(row, col) };
                    if cov.is_nodata(v) {
                        valid = false;
                        break;
                    }
                    pred += b * v;
                }
                if !valid {
                    continue;
                }

                if let Some(residuals) = residual_ref {
                    let (x, y) = fine.pixel_to_geo(col, row);
                    let r = bilinear_sample(residuals, x, y);
                    if r.is_finite() {
                        pred += r;
                    }
                }

                *cell = pred;
            }
            row_data
        })
        .collect();

    let mut downscaled = fine.with_same_meta::<f64>(f_rows, f_cols);
    downscaled.set_nodata(Some(f64::NAN));
    *downscaled.data_mut() = Array2::from_shape_vec((f_rows, f_cols), data)
        .map_err(|e| Error::Other(e.to_string()))?;

    Ok(DownscaleResult {
        downscaled,
        coefficients: fit.coefficients,
        scale: fit.scale,
        rmse,
        iterations: fit.iterations,
        residuals: residual_raster,
    })
}

fn validate_inputs(
    response: &Raster<f64>,
    covariates: &[Raster<f64>],
    params: &DownscaleParams,
) -> Result<()> {
    if covariates.is_empty() {
        return Err(Error::Algorithm(
            "at least one covariate raster is required".into(),
        ));
    }
    if params.tuning_constant <= 0.0 {
        return Err(Error::InvalidParameter {
            name: "tuning_constant",
            value: params.tuning_constant.to_string(),
            reason: "must be positive".into(),
        });
    }
    if params.max_iterations == 0 {
        return Err(Error::InvalidParameter {
            name: "max_iterations",
            value: "0".into(),
            reason: "must allow at least one iteration".into(),
        });
    }
    if params.tolerance <= 0.0 {
        return Err(Error::InvalidParameter {
            name: "tolerance",
            value: params.tolerance.to_string(),
            reason: "must be positive".into(),
        });
    }

    let fine = &covariates[0];
    for cov in &covariates[1..] {
        if cov.shape() != fine.shape() {
            return Err(Error::ShapeMismatch {
                er: fine.rows(),
                ec: fine.cols(),
                ar: cov.rows(),
                ac: cov.cols(),
            });
        }
        if !cov.transform().approx_eq(fine.transform(), 1e-9) {
            return Err(Error::TransformMismatch(
                "covariate rasters must share one grid".into(),
            ));
        }
    }

    if fine.cell_size() >= response.cell_size() {
        return Err(Error::TransformMismatch(format!(
            "covariate cell size {} must be finer than response cell size {}",
            fine.cell_size(),
            response.cell_size()
        )));
    }

    if let Some(resp_crs) = response.crs() {
        for cov in covariates {
            if let Some(cov_crs) = cov.crs() {
                if !resp_crs.is_equivalent(cov_crs) {
                    return Err(Error::CrsMismatch(
                        resp_crs.to_string(),
                        cov_crs.to_string(),
                    ));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrastat_core::GeoTransform;

    /// Fine 20x20 covariate at cell size 1, coarse 10x10 response grid at
    /// cell size 2, aligned at the origin.
    fn fine_covariate() -> Raster<f64> {
        let mut cov: Raster<f64> = Raster::new(20, 20);
        cov.set_transform(GeoTransform::new(0.0, 20.0, 1.0, -1.0));
        for row in 0..20 {
            for col in 0..20 {
                // Smooth surface with structure in both directions
                let v = (col as f64 * 0.7 + row as f64 * 0.3)
                    + (col as f64 / 4.0).sin() * 2.0;
                cov.set(row, col, v).unwrap();
            }
        }
        cov
    }

    fn coarse_template() -> Raster<f64> {
        let mut r: Raster<f64> = Raster::new(10, 10);
        r.set_transform(GeoTransform::new(0.0, 20.0, 2.0, -2.0));
        r.set_nodata(Some(f64::NAN));
        r
    }

    /// Response generated exactly as `intercept + slope * aggregated(cov)`
    fn linear_response(cov: &Raster<f64>, intercept: f64, slope: f64) -> Raster<f64> {
        let template = coarse_template();
        let agg = aggregate_mean(cov, &template).unwrap();
        let mut response = template;
        for row in 0..10 {
            for col in 0..10 {
                let v = agg.get(row, col).unwrap();
                response.set(row, col, intercept + slope * v).unwrap();
            }
        }
        response
    }

    #[test]
    fn test_exact_linear_relation_recovered() {
        let cov = fine_covariate();
        let response = linear_response(&cov, 3.0, 2.0);

        let result = downscale(&response, &[cov.clone()], DownscaleParams::default()).unwrap();

        assert!(
            (result.coefficients[0] - 3.0).abs() < 1e-8,
            "intercept: expected 3.0, got {:.6}",
            result.coefficients[0]
        );
        assert!(
            (result.coefficients[1] - 2.0).abs() < 1e-8,
            "slope: expected 2.0, got {:.6}",
            result.coefficients[1]
        );
        assert!(result.rmse < 1e-8, "Perfect fit should have ~0 RMSE");

        // Fine prediction is the model applied to the fine pixels
        let expected = 3.0 + 2.0 * cov.get(7, 13).unwrap();
        let got = result.downscaled.get(7, 13).unwrap();
        assert!(
            (got - expected).abs() < 1e-8,
            "Expected {}, got {}",
            expected,
            got
        );
    }

    #[test]
    fn test_output_grid_matches_covariates() {
        let cov = fine_covariate();
        let response = linear_response(&cov, 1.0, 0.5);

        let result = downscale(&response, &[cov.clone()], DownscaleParams::default()).unwrap();
        assert_eq!(result.downscaled.shape(), cov.shape());
        assert_eq!(result.downscaled.transform(), cov.transform());
    }

    #[test]
    fn test_outlier_cells_downweighted() {
        let cov = fine_covariate();
        let mut clean = linear_response(&cov, 3.0, 2.0);
        // Contaminate a few coarse cells with gross errors
        for (row, col) in [(1, 1), (4, 7), (8, 3)] {
            let v = clean.get(row, col).unwrap();
            clean.set(row, col, v + 60.0).unwrap();
        }

        let robust = downscale(&clean, &[cov.clone()], DownscaleParams::default()).unwrap();
        let ols = downscale(
            &clean,
            &[cov.clone()],
            DownscaleParams {
                tuning_constant: 1e9,
                ..Default::default()
            },
        )
        .unwrap();

        let robust_err = (robust.coefficients[1] - 2.0).abs();
        let ols_err = (ols.coefficients[1] - 2.0).abs();
        assert!(
            robust_err <= ols_err,
            "Huber slope error {} should not exceed OLS error {}",
            robust_err,
            ols_err
        );
        assert!(
            robust_err < 0.1,
            "Huber slope should stay near 2, got {:.4}",
            robust.coefficients[1]
        );
    }

    #[test]
    fn test_residual_correction_restores_anomaly() {
        let cov = fine_covariate();
        let mut response = linear_response(&cov, 3.0, 2.0);
        // A local anomaly the covariate cannot explain
        let anomaly_cell = (5, 5);
        let base = response.get(anomaly_cell.0, anomaly_cell.1).unwrap();
        response.set(anomaly_cell.0, anomaly_cell.1, base + 4.0).unwrap();

        let result = downscale(
            &response,
            &[cov.clone()],
            DownscaleParams {
                residual_correction: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(result.residuals.is_some());

        // Aggregating the corrected fine prediction back to the coarse grid
        // should land near the observed anomaly value.
        let back = aggregate_mean(&result.downscaled, &response).unwrap();
        let restored = back.get(anomaly_cell.0, anomaly_cell.1).unwrap();
        let observed = response.get(anomaly_cell.0, anomaly_cell.1).unwrap();
        // Bilinear resampling spreads a one-cell residual into its
        // neighbors, so only part of the 4.0 anomaly returns to the cell.
        assert!(
            (restored - observed).abs() < 2.5,
            "Residual correction should recover most of the anomaly: observed {}, got {}",
            observed,
            restored
        );

        // Without correction the anomaly is smoothed away entirely
        let plain = downscale(&response, &[cov], DownscaleParams::default()).unwrap();
        let back_plain = aggregate_mean(&plain.downscaled, &response).unwrap();
        let missed = back_plain.get(anomaly_cell.0, anomaly_cell.1).unwrap();
        assert!(
            (restored - observed).abs() < (missed - observed).abs(),
            "Correction should beat the uncorrected prediction"
        );
    }

    #[test]
    fn test_two_covariates_recovered() {
        let cov_a = fine_covariate();
        let mut cov_b: Raster<f64> = Raster::new(20, 20);
        cov_b.set_transform(GeoTransform::new(0.0, 20.0, 1.0, -1.0));
        for row in 0..20 {
            for col in 0..20 {
                cov_b
                    .set(row, col, (row as f64 * 0.9 - col as f64 * 0.2).cos() * 5.0)
                    .unwrap();
            }
        }

        let template = coarse_template();
        let agg_a = aggregate_mean(&cov_a, &template).unwrap();
        let agg_b = aggregate_mean(&cov_b, &template).unwrap();
        let mut response = template;
        for row in 0..10 {
            for col in 0..10 {
                let v = 1.0 + 2.0 * agg_a.get(row, col).unwrap()
                    - 3.0 * agg_b.get(row, col).unwrap();
                response.set(row, col, v).unwrap();
            }
        }

        let result = downscale(
            &response,
            &[cov_a, cov_b],
            DownscaleParams::default(),
        )
        .unwrap();

        assert!((result.coefficients[0] - 1.0).abs() < 1e-7);
        assert!((result.coefficients[1] - 2.0).abs() < 1e-7);
        assert!((result.coefficients[2] + 3.0).abs() < 1e-7);
    }

    #[test]
    fn test_nodata_cells_excluded_and_propagated() {
        let mut cov = fine_covariate();
        cov.set_nodata(Some(-9999.0));
        cov.set(0, 0, -9999.0).unwrap();

        let mut response = linear_response(&cov, 3.0, 2.0);
        response.set(9, 9, f64::NAN).unwrap();

        let result = downscale(&response, &[cov], DownscaleParams::default()).unwrap();

        // Fine pixel under covariate nodata is NaN
        assert!(result.downscaled.get(0, 0).unwrap().is_nan());
        assert!(!result.downscaled.get(10, 10).unwrap().is_nan());
    }

    #[test]
    fn test_validation_errors() {
        let cov = fine_covariate();
        let response = linear_response(&cov, 3.0, 2.0);

        // No covariates
        assert!(downscale(&response, &[], DownscaleParams::default()).is_err());

        // Covariate not finer than response
        assert!(downscale(&response, &[response.clone()], DownscaleParams::default()).is_err());

        // Mismatched covariate shapes
        let mut other: Raster<f64> = Raster::new(15, 20);
        other.set_transform(GeoTransform::new(0.0, 20.0, 1.0, -1.0));
        assert!(
            downscale(&response, &[cov.clone(), other], DownscaleParams::default()).is_err()
        );

        // Collinear covariates
        let mut doubled = cov.clone();
        for row in 0..20 {
            for col in 0..20 {
                let v = cov.get(row, col).unwrap();
                doubled.set(row, col, 2.0 * v).unwrap();
            }
        }
        assert!(
            downscale(&response, &[cov.clone(), doubled], DownscaleParams::default()).is_err()
        );

        // Bad parameters
        assert!(downscale(
            &response,
            &[cov.clone()],
            DownscaleParams {
                tuning_constant: -1.0,
                ..Default::default()
            }
        )
        .is_err());
        assert!(downscale(
            &response,
            &[cov],
            DownscaleParams {
                max_iterations: 0,
                ..Default::default()
            }
        )
        .is_err());
    }

    #[test]
    fn test_crs_mismatch_rejected() {
        use terrastat_core::Crs;

        let mut cov = fine_covariate();
        cov.set_crs(Some(Crs::from_epsg(32719)));
        let mut response = linear_response(&cov, 1.0, 1.0);
        response.set_crs(Some(Crs::wgs84()));

        assert!(downscale(&response, &[cov], DownscaleParams::default()).is_err());
    }
}
