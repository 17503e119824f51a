//! Base spectral indices
//!
//! Building blocks for the senescence-weighted index: the generic
//! normalized difference, NDSVI for senescent material, and MSAVI2 as the
//! soil-adjusted greenness index.

use super::{build_output, check_dimensions, is_nodata_f64};
use crate::maybe_rayon::*;
use terrastat_core::raster::Raster;
use terrastat_core::Result;

/// Compute the normalized difference between two bands:
///
/// `(band_a - band_b) / (band_a + band_b)`
///
/// Result is in the range [-1, 1]. Pixels where the denominator is zero
/// or either band is nodata are set to NaN.
pub fn normalized_difference(band_a: &Raster<f64>, band_b: &Raster<f64>) -> Result<Raster<f64>> {
    check_dimensions(band_a, band_b)?;

    let (rows, cols) = band_a.shape();
    let nodata_a = band_a.nodata();
    let nodata_b = band_b.nodata();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for col in 0..cols {
                let a = unsafe { band_a.get_unchecked(row, col) };
                let b = unsafe { band_b.get_unchecked(row, col) };

                if is_nodata_f64(a, nodata_a) || is_nodata_f64(b, nodata_b) {
                    continue;
                }

                let sum = a + b;
                if sum.abs() < 1e-10 {
                    continue; // Avoid division by zero
                }

                row_data[col] = (a - b) / sum;
            }
            row_data
        })
        .collect();

    build_output(band_a, rows, cols, data)
}

/// Normalized Difference Senescent Vegetation Index (Qi et al., 2002)
///
/// `NDSVI = (SWIR - Red) / (SWIR + Red)`
///
/// Senescent (dry, non-photosynthetic) vegetation reflects strongly in the
/// shortwave infrared, so higher values indicate more senescent material.
/// Green canopy and water tend toward zero or negative values.
///
/// # Arguments
/// * `swir` - Shortwave infrared band (e.g., Landsat B6, Sentinel-2 B11)
/// * `red` - Red band
pub fn ndsvi(swir: &Raster<f64>, red: &Raster<f64>) -> Result<Raster<f64>> {
    normalized_difference(swir, red)
}

/// Modified Soil Adjusted Vegetation Index (Qi et al., 1994)
///
/// `MSAVI2 = (2·NIR + 1 - sqrt((2·NIR + 1)² - 8·(NIR - Red))) / 2`
///
/// Self-adjusting variant of SAVI: the soil correction factor is derived
/// from the data itself, so no L parameter is needed. Values fall in
/// [-1, 1]; pixels where the discriminant is negative are set to NaN.
///
/// # Arguments
/// * `nir` - Near-infrared band
/// * `red` - Red band
pub fn msavi2(nir: &Raster<f64>, red: &Raster<f64>) -> Result<Raster<f64>> {
    check_dimensions(nir, red)?;

    let (rows, cols) = nir.shape();
    let nodata_nir = nir.nodata();
    let nodata_red = red.nodata();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for col in 0..cols {
                let n = unsafe { nir.get_unchecked(row, col) };
                let r = unsafe { red.get_unchecked(row, col) };

                if is_nodata_f64(n, nodata_nir) || is_nodata_f64(r, nodata_red) {
                    continue;
                }

                let term = 2.0 * n + 1.0;
                let disc = term * term - 8.0 * (n - r);
                if disc < 0.0 {
                    continue;
                }

                row_data[col] = (term - disc.sqrt()) / 2.0;
            }
            row_data
        })
        .collect();

    build_output(nir, rows, cols, data)
}
