//! Senescence-weighted vegetation index

use super::{build_output, msavi2, ndsvi};
use crate::maybe_rayon::*;
use terrastat_core::raster::Raster;
use terrastat_core::{Error, Result};

/// Parameters for the senescence-weighted vegetation index
#[derive(Debug, Clone)]
pub struct SwviParams {
    /// NDSVI value below which a pixel is treated as fully green and the
    /// index is left unweighted. Must lie in [-1, 1]. Default: 0.0
    pub senescence_threshold: f64,
    /// Strength of the senescence down-weighting, in [0, 1]. At 0 the
    /// output equals MSAVI2; at 1 a fully senescent pixel (NDSVI = 1)
    /// is zeroed. Default: 0.5
    pub weight_factor: f64,
}

impl Default for SwviParams {
    fn default() -> Self {
        Self {
            senescence_threshold: 0.0,
            weight_factor: 0.5,
        }
    }
}

/// Senescence-weighted vegetation index
///
/// Down-weights MSAVI2 where the shortwave infrared indicates senescent
/// (dry, non-photosynthetic) vegetation, so that standing dead material
/// does not inflate greenness estimates. Per pixel:
///
/// ```text
/// w    = clamp(NDSVI, 0, 1),  w = 0 where NDSVI < threshold
/// SWVI = MSAVI2 · (1 - f·w)
/// ```
///
/// where `f` is the weight factor. The output stays within the MSAVI2
/// range [-1, 1]; fully green pixels pass through unchanged.
///
/// # Arguments
/// * `red` - Red band
/// * `nir` - Near-infrared band
/// * `swir` - Shortwave infrared band
/// * `params` - Threshold and weighting strength
///
/// # Errors
/// Fails if band dimensions disagree or parameters are out of range.
pub fn swvi(
    red: &Raster<f64>,
    nir: &Raster<f64>,
    swir: &Raster<f64>,
    params: SwviParams,
) -> Result<Raster<f64>> {
    if !(0.0..=1.0).contains(&params.weight_factor) {
        return Err(Error::InvalidParameter {
            name: "weight_factor",
            value: params.weight_factor.to_string(),
            reason: "must lie in [0, 1]".into(),
        });
    }
    if !(-1.0..=1.0).contains(&params.senescence_threshold) {
        return Err(Error::InvalidParameter {
            name: "senescence_threshold",
            value: params.senescence_threshold.to_string(),
            reason: "must lie in [-1, 1]".into(),
        });
    }

    // Dimension checks happen inside the base indices; both are computed
    // against `red`, so all three bands are cross-checked.
    let base = msavi2(nir, red)?;
    let senescence = ndsvi(swir, red)?;

    let (rows, cols) = base.shape();
    let f = params.weight_factor;
    let threshold = params.senescence_threshold;

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for col in 0..cols {
                let index = unsafe { base.get_unchecked(row, col) };
                let sen = unsafe { senescence.get_unchecked(row, col) };

                if index.is_nan() || sen.is_nan() {
                    continue;
                }

                let w = if sen < threshold {
                    0.0
                } else {
                    sen.clamp(0.0, 1.0)
                };

                row_data[col] = index * (1.0 - f * w);
            }
            row_data
        })
        .collect();

    build_output(&base, rows, cols, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrastat_core::GeoTransform;

    fn make_band(rows: usize, cols: usize, value: f64) -> Raster<f64> {
        let mut r = Raster::filled(rows, cols, value);
        r.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
        r
    }

    #[test]
    fn test_green_canopy_unweighted() {
        // SWIR < red: NDSVI negative, weight zero, SWVI == MSAVI2
        let red = make_band(5, 5, 0.08);
        let nir = make_band(5, 5, 0.55);
        let swir = make_band(5, 5, 0.05);

        let weighted = swvi(&red, &nir, &swir, SwviParams::default()).unwrap();
        let base = msavi2(&nir, &red).unwrap();

        let w = weighted.get(2, 2).unwrap();
        let b = base.get(2, 2).unwrap();
        assert!(
            (w - b).abs() < 1e-12,
            "Green canopy should be unweighted: swvi={}, msavi2={}",
            w,
            b
        );
    }

    #[test]
    fn test_senescent_pixel_downweighted() {
        // SWIR well above red: senescent signal, index reduced
        let red = make_band(5, 5, 0.20);
        let nir = make_band(5, 5, 0.40);
        let swir = make_band(5, 5, 0.50);

        let weighted = swvi(&red, &nir, &swir, SwviParams::default()).unwrap();
        let base = msavi2(&nir, &red).unwrap();

        let w = weighted.get(2, 2).unwrap();
        let b = base.get(2, 2).unwrap();
        assert!(
            w < b,
            "Senescent pixel should be down-weighted: swvi={}, msavi2={}",
            w,
            b
        );

        // Exact value: w = ndsvi = 0.3/0.7, swvi = msavi2 * (1 - 0.5*w)
        let sen = (0.50 - 0.20) / (0.50 + 0.20);
        let expected = b * (1.0 - 0.5 * sen);
        assert!(
            (w - expected).abs() < 1e-12,
            "Expected {}, got {}",
            expected,
            w
        );
    }

    #[test]
    fn test_output_in_msavi2_range() {
        // Sweep a few reflectance combinations; output stays in [-1, 1]
        for (r, n, s) in [
            (0.05, 0.60, 0.04),
            (0.20, 0.40, 0.50),
            (0.30, 0.32, 0.45),
            (0.15, 0.15, 0.15),
        ] {
            let red = make_band(3, 3, r);
            let nir = make_band(3, 3, n);
            let swir = make_band(3, 3, s);

            let result = swvi(&red, &nir, &swir, SwviParams::default()).unwrap();
            let val = result.get(1, 1).unwrap();
            assert!(
                (-1.0..=1.0).contains(&val),
                "SWVI out of range for ({}, {}, {}): {}",
                r,
                n,
                s,
                val
            );
        }
    }

    #[test]
    fn test_weight_factor_zero_is_identity() {
        let red = make_band(4, 4, 0.2);
        let nir = make_band(4, 4, 0.4);
        let swir = make_band(4, 4, 0.6);

        let params = SwviParams {
            weight_factor: 0.0,
            ..Default::default()
        };
        let weighted = swvi(&red, &nir, &swir, params).unwrap();
        let base = msavi2(&nir, &red).unwrap();

        assert!((weighted.get(1, 1).unwrap() - base.get(1, 1).unwrap()).abs() < 1e-12);
    }

    #[test]
    fn test_threshold_masks_weak_senescence() {
        let red = make_band(4, 4, 0.20);
        let nir = make_band(4, 4, 0.40);
        let swir = make_band(4, 4, 0.25); // NDSVI = 0.05/0.45 ≈ 0.11

        let params = SwviParams {
            senescence_threshold: 0.2,
            ..Default::default()
        };
        let weighted = swvi(&red, &nir, &swir, params).unwrap();
        let base = msavi2(&nir, &red).unwrap();

        // Below threshold: treated as green
        assert!((weighted.get(0, 0).unwrap() - base.get(0, 0).unwrap()).abs() < 1e-12);
    }

    #[test]
    fn test_nodata_propagates() {
        let mut red = make_band(4, 4, 0.2);
        red.set_nodata(Some(-9999.0));
        red.set(1, 2, -9999.0).unwrap();

        let nir = make_band(4, 4, 0.4);
        let swir = make_band(4, 4, 0.5);

        let result = swvi(&red, &nir, &swir, SwviParams::default()).unwrap();
        assert!(result.get(1, 2).unwrap().is_nan());
        assert!(!result.get(0, 0).unwrap().is_nan());
    }

    #[test]
    fn test_invalid_params_rejected() {
        let red = make_band(3, 3, 0.2);
        let nir = make_band(3, 3, 0.4);
        let swir = make_band(3, 3, 0.5);

        let bad_weight = SwviParams {
            weight_factor: 1.5,
            ..Default::default()
        };
        assert!(swvi(&red, &nir, &swir, bad_weight).is_err());

        let bad_threshold = SwviParams {
            senescence_threshold: 2.0,
            ..Default::default()
        };
        assert!(swvi(&red, &nir, &swir, bad_threshold).is_err());
    }

    #[test]
    fn test_band_size_mismatch() {
        let red = make_band(3, 3, 0.2);
        let nir = make_band(3, 3, 0.4);
        let swir = make_band(3, 4, 0.5);

        assert!(swvi(&red, &nir, &swir, SwviParams::default()).is_err());
    }
}
