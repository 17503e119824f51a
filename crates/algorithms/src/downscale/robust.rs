//! Huber M-estimation by iteratively reweighted least squares
//!
//! Reference:
//! Huber, P.J. (1964). Robust estimation of a location parameter.
//! Annals of Mathematical Statistics.

use terrastat_core::{Error, Result};

/// Fitted robust regression
#[derive(Debug, Clone)]
pub(crate) struct RobustFit {
    /// Coefficients, intercept first
    pub coefficients: Vec<f64>,
    /// Robust residual scale (MAD / 0.6745)
    pub scale: f64,
    /// Number of reweighted refits performed
    pub iterations: usize,
    /// Final residuals, in sample order
    pub residuals: Vec<f64>,
}

/// Fit `y = β₀ + β₁·x₁ + ... + βₚ·xₚ` with Huber weights.
///
/// `predictors` holds one row per sample (without the intercept column).
/// Starts from the least-squares solution and reweights until the largest
/// coefficient change drops below `tolerance` or `max_iterations` refits
/// have run. A scale collapsing to zero (perfect fit) stops early.
pub(crate) fn huber_irls(
    predictors: &[Vec<f64>],
    response: &[f64],
    tuning: f64,
    max_iterations: usize,
    tolerance: f64,
) -> Result<RobustFit> {
    let n = response.len();
    if n == 0 || predictors.len() != n {
        return Err(Error::Algorithm(
            "regression needs matching, non-empty predictor/response sets".into(),
        ));
    }
    let p = predictors[0].len();
    if predictors.iter().any(|row| row.len() != p) {
        return Err(Error::Algorithm("ragged predictor matrix".into()));
    }
    if n < p + 2 {
        return Err(Error::InsufficientSamples { needed: p + 2, got: n });
    }

    let mut weights = vec![1.0f64; n];
    let mut beta = weighted_least_squares(predictors, response, &weights)?;
    let mut iterations = 0;
    let mut scale;

    loop {
        let residuals = residuals_for(predictors, response, &beta);
        scale = mad_scale(&residuals);

        // Perfect (or numerically perfect) fit: nothing left to reweight.
        if scale < 1e-10 {
            break;
        }
        if iterations >= max_iterations {
            break;
        }

        for (w, r) in weights.iter_mut().zip(residuals.iter()) {
            let u = r.abs() / scale;
            *w = if u <= tuning { 1.0 } else { tuning / u };
        }

        let next = weighted_least_squares(predictors, response, &weights)?;
        iterations += 1;

        let delta = beta
            .iter()
            .zip(next.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f64, f64::max);
        beta = next;

        if delta < tolerance {
            break;
        }
    }

    let residuals = residuals_for(predictors, response, &beta);

    Ok(RobustFit {
        coefficients: beta,
        scale,
        iterations,
        residuals,
    })
}

fn residuals_for(predictors: &[Vec<f64>], response: &[f64], beta: &[f64]) -> Vec<f64> {
    predictors
        .iter()
        .zip(response.iter())
        .map(|(row, &y)| {
            let mut fitted = beta[0];
            for (b, x) in beta[1..].iter().zip(row.iter()) {
                fitted += b * x;
            }
            y - fitted
        })
        .collect()
}

/// Robust residual scale: median absolute residual / 0.6745
fn mad_scale(residuals: &[f64]) -> f64 {
    let mut abs: Vec<f64> = residuals.iter().map(|r| r.abs()).collect();
    median_in_place(&mut abs) / 0.6745
}

fn median_in_place(values: &mut [f64]) -> f64 {
    let n = values.len();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

/// Solve the weighted normal equations `(XᵀWX)β = XᵀWy` by Gaussian
/// elimination with partial pivoting, with an implicit intercept column.
fn weighted_least_squares(
    predictors: &[Vec<f64>],
    response: &[f64],
    weights: &[f64],
) -> Result<Vec<f64>> {
    let p = predictors[0].len();
    let dim = p + 1;

    let mut mat = vec![0.0f64; dim * dim];
    let mut rhs = vec![0.0f64; dim];

    for ((row, &y), &w) in predictors.iter().zip(response.iter()).zip(weights.iter()) {
        // x₀ = 1 (intercept), x₁.. = predictors
        for j in 0..dim {
            let xj = if j == 0 { 1.0 } else { row[j - 1] };
            rhs[j] += w * xj * y;
            for l in j..dim {
                let xl = if l == 0 { 1.0 } else { row[l - 1] };
                mat[j * dim + l] += w * xj * xl;
            }
        }
    }
    // Mirror the upper triangle
    for j in 0..dim {
        for l in 0..j {
            mat[j * dim + l] = mat[l * dim + j];
        }
    }

    // Forward elimination with partial pivoting
    for col in 0..dim {
        let mut max_val = mat[col * dim + col].abs();
        let mut max_row = col;
        for row in (col + 1)..dim {
            let val = mat[row * dim + col].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }

        if max_val < 1e-12 {
            return Err(Error::Algorithm(
                "singular design matrix (collinear or constant covariates?)".into(),
            ));
        }

        if max_row != col {
            for j in 0..dim {
                mat.swap(col * dim + j, max_row * dim + j);
            }
            rhs.swap(col, max_row);
        }

        let pivot = mat[col * dim + col];
        for row in (col + 1)..dim {
            let factor = mat[row * dim + col] / pivot;
            mat[row * dim + col] = 0.0;
            for j in (col + 1)..dim {
                mat[row * dim + j] -= factor * mat[col * dim + j];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    // Back substitution
    let mut beta = vec![0.0f64; dim];
    for col in (0..dim).rev() {
        let mut sum = rhs[col];
        for j in (col + 1)..dim {
            sum -= mat[col * dim + j] * beta[j];
        }
        beta[col] = sum / mat[col * dim + col];
    }

    Ok(beta)
}
