//! Grid resampling primitives
//!
//! Small building blocks for moving values between grids of different
//! resolution: block-mean aggregation onto a coarser template grid, and
//! bilinear sampling of a raster at arbitrary geographic coordinates.
//! Both respect no-data cells.

use crate::error::{Error, Result};
use crate::raster::Raster;

/// Aggregate a fine raster onto the grid of a coarse template.
///
/// Each template cell receives the mean of the valid fine cells whose
/// centers fall inside it. Template cells covered by no valid fine cell
/// are NaN in the output. The output carries the template's transform
/// and CRS, with NaN as its no-data value; the template's cell values
/// are never read.
///
/// # Errors
/// Returns an error if either raster is empty or if the template grid is
/// not coarser than the fine grid.
pub fn aggregate_mean(fine: &Raster<f64>, template: &Raster<f64>) -> Result<Raster<f64>> {
    if fine.is_empty() || template.is_empty() {
        return Err(Error::InvalidDimensions { rows: 0, cols: 0 });
    }
    if template.cell_size() <= fine.cell_size() {
        return Err(Error::TransformMismatch(format!(
            "template cell size {} must exceed fine cell size {}",
            template.cell_size(),
            fine.cell_size()
        )));
    }

    let (t_rows, t_cols) = template.shape();
    let mut sums = vec![0.0f64; t_rows * t_cols];
    let mut counts = vec![0u32; t_rows * t_cols];

    let (f_rows, f_cols) = fine.shape();
    for row in 0..f_rows {
        for col in 0..f_cols {
            let v = unsafe { fine.get_unchecked(row, col) };
            if fine.is_nodata(v) {
                continue;
            }

            let (x, y) = fine.pixel_to_geo(col, row);
            let (tc, tr) = template.geo_to_pixel(x, y);
            if !tc.is_finite() || !tr.is_finite() {
                continue;
            }

            let tc = tc.floor();
            let tr = tr.floor();
            if tc < 0.0 || tr < 0.0 {
                continue;
            }
            let (tc, tr) = (tc as usize, tr as usize);
            if tr >= t_rows || tc >= t_cols {
                continue;
            }

            sums[tr * t_cols + tc] += v;
            counts[tr * t_cols + tc] += 1;
        }
    }

    let data: Vec<f64> = sums
        .iter()
        .zip(counts.iter())
        .map(|(&s, &n)| if n > 0 { s / n as f64 } else { f64::NAN })
        .collect();

    let mut output = template.with_same_meta::<f64>(t_rows, t_cols);
    *output.data_mut() = ndarray::Array2::from_shape_vec((t_rows, t_cols), data)
        .map_err(|e| Error::Other(e.to_string()))?;
    output.set_nodata(Some(f64::NAN));

    Ok(output)
}

/// Sample a raster at a geographic point by bilinear interpolation.
///
/// Interpolates between the four surrounding pixel centers, clamping at
/// the raster edge. No-data neighbors are excluded and the remaining
/// weights renormalized; returns NaN when the point falls outside the
/// raster or all four neighbors are no-data.
pub fn bilinear_sample(raster: &Raster<f64>, x: f64, y: f64) -> f64 {
    let (rows, cols) = raster.shape();
    if rows == 0 || cols == 0 {
        return f64::NAN;
    }

    let (col_f, row_f) = raster.geo_to_pixel(x, y);
    if !col_f.is_finite() || !row_f.is_finite() {
        return f64::NAN;
    }
    if col_f < 0.0 || row_f < 0.0 || col_f > cols as f64 || row_f > rows as f64 {
        return f64::NAN;
    }

    // Shift to center-based coordinates so integer values land on centers.
    let cf = (col_f - 0.5).clamp(0.0, (cols - 1) as f64);
    let rf = (row_f - 0.5).clamp(0.0, (rows - 1) as f64);

    let c0 = (cf.floor() as usize).min(cols.saturating_sub(2));
    let r0 = (rf.floor() as usize).min(rows.saturating_sub(2));
    let c1 = (c0 + 1).min(cols - 1);
    let r1 = (r0 + 1).min(rows - 1);

    let tx = (cf - c0 as f64).clamp(0.0, 1.0);
    let ty = (rf - r0 as f64).clamp(0.0, 1.0);

    let corners = [
        (r0, c0, (1.0 - tx) * (1.0 - ty)),
        (r0, c1, tx * (1.0 - ty)),
        (r1, c0, (1.0 - tx) * ty),
        (r1, c1, tx * ty),
    ];

    let mut sum = 0.0;
    let mut weight = 0.0;
    for (r, c, w) in corners {
        let v = unsafe { raster.get_unchecked(r, c) };
        if raster.is_nodata(v) {
            continue;
        }
        sum += w * v;
        weight += w;
    }

    if weight > 0.0 {
        sum / weight
    } else {
        f64::NAN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GeoTransform;
    use approx::assert_relative_eq;

    /// 6x6 fine grid at cell size 1 aligned with a 3x3 coarse grid at cell size 2.
    fn aligned_pair() -> (Raster<f64>, Raster<f64>) {
        let mut fine: Raster<f64> = Raster::new(6, 6);
        fine.set_transform(GeoTransform::new(0.0, 6.0, 1.0, -1.0));
        for row in 0..6 {
            for col in 0..6 {
                fine.set(row, col, (row * 6 + col) as f64).unwrap();
            }
        }

        let mut coarse: Raster<f64> = Raster::new(3, 3);
        coarse.set_transform(GeoTransform::new(0.0, 6.0, 2.0, -2.0));

        (fine, coarse)
    }

    #[test]
    fn test_aggregate_mean_blocks() {
        let (fine, coarse) = aligned_pair();
        let agg = aggregate_mean(&fine, &coarse).unwrap();

        assert_eq!(agg.shape(), (3, 3));
        // Top-left block covers fine cells (0,0),(0,1),(1,0),(1,1) = 0,1,6,7
        assert_relative_eq!(agg.get(0, 0).unwrap(), 3.5, epsilon = 1e-12);
        // Bottom-right block: 28,29,34,35
        assert_relative_eq!(agg.get(2, 2).unwrap(), 31.5, epsilon = 1e-12);
    }

    #[test]
    fn test_aggregate_mean_skips_nodata() {
        let (mut fine, coarse) = aligned_pair();
        fine.set_nodata(Some(-9999.0));
        // Knock out 3 of the 4 fine cells in the top-left block
        fine.set(0, 0, -9999.0).unwrap();
        fine.set(0, 1, -9999.0).unwrap();
        fine.set(1, 0, -9999.0).unwrap();

        let agg = aggregate_mean(&fine, &coarse).unwrap();
        // Only cell (1,1) = 7 remains
        assert_relative_eq!(agg.get(0, 0).unwrap(), 7.0, epsilon = 1e-12);
    }

    #[test]
    fn test_aggregate_mean_empty_block_is_nan() {
        let (mut fine, coarse) = aligned_pair();
        fine.set_nodata(Some(-9999.0));
        for row in 0..2 {
            for col in 0..2 {
                fine.set(row, col, -9999.0).unwrap();
            }
        }

        let agg = aggregate_mean(&fine, &coarse).unwrap();
        assert!(agg.get(0, 0).unwrap().is_nan());
        assert!(!agg.get(1, 1).unwrap().is_nan());
    }

    #[test]
    fn test_aggregate_rejects_finer_template() {
        let (fine, _) = aligned_pair();
        let result = aggregate_mean(&fine, &fine.clone());
        assert!(result.is_err());
    }

    #[test]
    fn test_bilinear_at_centers_and_midpoints() {
        let mut r: Raster<f64> = Raster::new(2, 2);
        r.set_transform(GeoTransform::new(0.0, 2.0, 1.0, -1.0));
        r.set(0, 0, 0.0).unwrap();
        r.set(0, 1, 10.0).unwrap();
        r.set(1, 0, 20.0).unwrap();
        r.set(1, 1, 30.0).unwrap();

        // Exactly at the center of pixel (0,0)
        assert_relative_eq!(bilinear_sample(&r, 0.5, 1.5), 0.0, epsilon = 1e-12);
        // Midpoint of all four centers
        assert_relative_eq!(bilinear_sample(&r, 1.0, 1.0), 15.0, epsilon = 1e-12);
    }

    #[test]
    fn test_bilinear_outside_is_nan() {
        let mut r: Raster<f64> = Raster::new(2, 2);
        r.set_transform(GeoTransform::new(0.0, 2.0, 1.0, -1.0));
        assert!(bilinear_sample(&r, -1.0, 1.0).is_nan());
        assert!(bilinear_sample(&r, 1.0, 5.0).is_nan());
    }

    #[test]
    fn test_bilinear_renormalizes_over_valid() {
        let mut r: Raster<f64> = Raster::new(2, 2);
        r.set_transform(GeoTransform::new(0.0, 2.0, 1.0, -1.0));
        r.set(0, 0, f64::NAN).unwrap();
        r.set(0, 1, 8.0).unwrap();
        r.set(1, 0, 8.0).unwrap();
        r.set(1, 1, 8.0).unwrap();

        // All valid neighbors agree, so the renormalized value must be 8
        assert_relative_eq!(bilinear_sample(&r, 1.0, 1.0), 8.0, epsilon = 1e-12);
    }
}
