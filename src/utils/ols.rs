//! Ordinary Least Squares (OLS) regression utilities.
//!
//! Used by the trend and seasonal transforms to fit per-entity regressions
//! against a time index or a Fourier design matrix.

use crate::error::{PanelError, Result};

/// Fitted OLS model: `y = intercept + sum(coefficients[j] * columns[j])`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct OlsFit {
    /// Intercept term.
    pub intercept: f64,
    /// Regression coefficients (one per regressor column).
    pub coefficients: Vec<f64>,
}

impl OlsFit {
    /// Predict from regressor columns, each of the same length.
    pub fn predict(&self, columns: &[Vec<f64>]) -> Result<Vec<f64>> {
        if columns.len() != self.coefficients.len() {
            return Err(PanelError::InvalidParameter(format!(
                "expected {} regressor columns, got {}",
                self.coefficients.len(),
                columns.len()
            )));
        }
        let n = columns.first().map_or(0, Vec::len);
        let mut predictions = vec![self.intercept; n];
        for (coef, col) in self.coefficients.iter().zip(columns) {
            if col.len() != n {
                return Err(PanelError::InvalidParameter(format!(
                    "regressor length {} does not match {}",
                    col.len(),
                    n
                )));
            }
            for (pred, x) in predictions.iter_mut().zip(col) {
                *pred += coef * x;
            }
        }
        Ok(predictions)
    }

    /// The regression part without the intercept.
    pub fn regression_component(&self, columns: &[Vec<f64>]) -> Result<Vec<f64>> {
        let mut out = self.predict(columns)?;
        for v in out.iter_mut() {
            *v -= self.intercept;
        }
        Ok(out)
    }
}

/// Fit OLS regression with intercept against the given regressor columns.
///
/// Uses Cholesky decomposition to solve the normal equations. A regression
/// with `p` columns needs more than `p + 1` observations.
pub fn ols_fit(y: &[f64], columns: &[Vec<f64>]) -> Result<OlsFit> {
    let n = y.len();
    let k = columns.len();
    let num_params = k + 1;

    if n <= num_params {
        return Err(PanelError::InsufficientData {
            needed: num_params + 1,
            got: n,
        });
    }

    for col in columns {
        if col.len() != n {
            return Err(PanelError::InvalidParameter(format!(
                "regressor length {} does not match series length {}",
                col.len(),
                n
            )));
        }
    }

    // X'X and X'y with design matrix [1, x1, x2, ...]
    let mut xtx = vec![vec![0.0; num_params]; num_params];
    let mut xty = vec![0.0; num_params];

    for obs in 0..n {
        let y_obs = y[obs];
        xtx[0][0] += 1.0;
        for j in 0..k {
            let xj = columns[j][obs];
            xtx[0][j + 1] += xj;
            xtx[j + 1][0] += xj;
        }
        for i in 0..k {
            let xi = columns[i][obs];
            for j in 0..k {
                xtx[i + 1][j + 1] += xi * columns[j][obs];
            }
        }

        xty[0] += y_obs;
        for i in 0..k {
            xty[i + 1] += columns[i][obs] * y_obs;
        }
    }

    // Small ridge on the diagonal for numerical stability
    for i in 0..num_params {
        xtx[i][i] += 1e-8;
    }

    let beta = solve_symmetric(&xtx, &xty).ok_or_else(|| {
        PanelError::ComputationError(
            "OLS regression failed: matrix not positive definite".into(),
        )
    })?;

    Ok(OlsFit {
        intercept: beta[0],
        coefficients: beta[1..].to_vec(),
    })
}

/// Closed-form simple linear regression `y = intercept + slope * x`.
///
/// Returns `(intercept, slope)`. A constant `x` yields slope 0 and the mean
/// of `y` as intercept.
pub fn linear_fit(x: &[f64], y: &[f64]) -> Result<(f64, f64)> {
    if x.len() != y.len() {
        return Err(PanelError::InvalidParameter(format!(
            "x has length {} but y has length {}",
            x.len(),
            y.len()
        )));
    }
    if x.len() < 2 {
        return Err(PanelError::InsufficientData {
            needed: 2,
            got: x.len(),
        });
    }

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let ss_xx: f64 = x.iter().map(|&xi| (xi - mean_x).powi(2)).sum();
    let ss_xy: f64 = x
        .iter()
        .zip(y)
        .map(|(&xi, &yi)| (xi - mean_x) * (yi - mean_y))
        .sum();

    if ss_xx.abs() < 1e-10 {
        return Ok((mean_y, 0.0));
    }

    let slope = ss_xy / ss_xx;
    Ok((mean_y - slope * mean_x, slope))
}

/// Solve symmetric positive definite system using Cholesky decomposition.
///
/// Solves A @ x = b where A is symmetric positive definite.
fn solve_symmetric(a: &[Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    let n = b.len();
    if n == 0 || a.len() != n {
        return None;
    }

    // A = L @ L'
    let mut l = vec![vec![0.0; n]; n];

    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }

            if i == j {
                if sum <= 0.0 {
                    return None;
                }
                l[i][j] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }

    // L @ y = b
    let mut y = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i][j] * y[j];
        }
        y[i] = sum / l[i][i];
    }

    // L' @ x = y
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum -= l[j][i] * x[j];
        }
        x[i] = sum / l[i][i];
    }

    Some(x)
}
