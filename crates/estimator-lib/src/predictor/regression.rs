//! Ordinary least squares regression
//!
//! Columns are centred and scaled, the normal equations are solved through a
//! Jacobi eigen-decomposition and near-zero eigenvalues are dropped. That
//! gives the minimum-norm solution when columns are constant or collinear,
//! which happens regularly with boolean features on small datasets.

use crate::error::{EstimatorError, Result};
use crate::schema::FEATURE_COUNT;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use tracing::debug;

/// Eigenvalues below this fraction of the largest are treated as zero
const EIGEN_RELATIVE_TOLERANCE: f64 = 1e-10;

const MAX_JACOBI_SWEEPS: usize = 100;

/// Fitted linear coefficients
#[derive(Debug, Clone, PartialEq)]
pub struct LinearFit {
    pub coefficients: [f64; FEATURE_COUNT],
    pub intercept: f64,
}

impl LinearFit {
    /// `intercept + dot(coefficients, x)`
    pub fn predict(&self, x: &[f64; FEATURE_COUNT]) -> f64 {
        linear_combination(self.intercept, &self.coefficients, x)
    }
}

/// Evaluate `intercept + dot(coefficients, x)` in fixed column order
pub fn linear_combination(
    intercept: f64,
    coefficients: &[f64; FEATURE_COUNT],
    x: &[f64; FEATURE_COUNT],
) -> f64 {
    intercept + ArrayView1::from(&coefficients[..]).dot(&ArrayView1::from(&x[..]))
}

fn design_matrix(x: &[[f64; FEATURE_COUNT]]) -> Array2<f64> {
    Array2::from_shape_fn((x.len(), FEATURE_COUNT), |(i, j)| x[i][j])
}

/// Fit OLS with an intercept term
pub fn fit(x: &[[f64; FEATURE_COUNT]], y: &[f64]) -> Result<LinearFit> {
    if x.is_empty() {
        return Err(EstimatorError::InsufficientData(
            "regression needs at least one row".to_string(),
        ));
    }
    if x.len() != y.len() {
        return Err(EstimatorError::Validation(format!(
            "feature matrix has {} rows but label vector has {}",
            x.len(),
            y.len()
        )));
    }

    let design = design_matrix(x);
    let labels = ArrayView1::from(y);
    if design.iter().chain(labels.iter()).any(|v| !v.is_finite()) {
        return Err(EstimatorError::Validation(
            "training data contains non-finite values".to_string(),
        ));
    }

    let x_mean = design
        .mean_axis(Axis(0))
        .ok_or_else(|| EstimatorError::InsufficientData("empty design matrix".to_string()))?;
    let y_mean = labels
        .mean()
        .ok_or_else(|| EstimatorError::InsufficientData("empty label vector".to_string()))?;

    // Centred scatter matrix and cross products
    let centred = &design - &x_mean;
    let scatter = centred.t().dot(&centred);
    let cross = centred.t().dot(&(&labels - y_mean));

    // Scale to unit diagonal; constant columns keep a zero coefficient
    let inv_scale = scatter
        .diag()
        .mapv(|d| if d > 0.0 { 1.0 / d.sqrt() } else { 0.0 });
    let corr = &scatter
        * &inv_scale.view().insert_axis(Axis(1))
        * &inv_scale.view().insert_axis(Axis(0));
    let rhs = &cross * &inv_scale;

    let gamma = pseudo_inverse_solve(corr.view(), rhs.view());
    let scaled = &gamma * &inv_scale;
    let intercept = y_mean - scaled.dot(&x_mean);

    if !intercept.is_finite() || scaled.iter().any(|c| !c.is_finite()) {
        return Err(EstimatorError::Validation(
            "regression produced non-finite coefficients".to_string(),
        ));
    }

    let mut coefficients = [0.0f64; FEATURE_COUNT];
    for (slot, c) in coefficients.iter_mut().zip(scaled.iter()) {
        *slot = *c;
    }
    Ok(LinearFit {
        coefficients,
        intercept,
    })
}

/// Coefficient of determination; `None` when the labels have no variance
pub fn r_squared(fit: &LinearFit, x: &[[f64; FEATURE_COUNT]], y: &[f64]) -> Option<f64> {
    if x.is_empty() || x.len() != y.len() {
        return None;
    }
    let labels = ArrayView1::from(y);
    let y_mean = labels.mean()?;
    let ss_tot = labels.mapv(|v| (v - y_mean).powi(2)).sum();
    if ss_tot <= 0.0 || !ss_tot.is_finite() {
        return None;
    }
    let predicted = design_matrix(x).dot(&ArrayView1::from(&fit.coefficients[..])) + fit.intercept;
    let ss_res = (&labels - &predicted).mapv(|r| r * r).sum();
    let r2 = 1.0 - ss_res / ss_tot;
    r2.is_finite().then_some(r2)
}

/// Solve `a * x = b` for symmetric positive semi-definite `a`
fn pseudo_inverse_solve(a: ArrayView2<f64>, b: ArrayView1<f64>) -> Array1<f64> {
    let (eigenvalues, eigenvectors) = symmetric_eigen(a.to_owned());
    let largest = eigenvalues.fold(0.0f64, |m, &v| m.max(v));
    let tolerance = largest * EIGEN_RELATIVE_TOLERANCE;

    let mut solution = Array1::<f64>::zeros(b.len());
    let mut dropped = 0usize;
    for (lambda, vector) in eigenvalues.iter().zip(eigenvectors.axis_iter(Axis(1))) {
        if *lambda <= tolerance {
            dropped += 1;
            continue;
        }
        solution.scaled_add(vector.dot(&b) / lambda, &vector);
    }
    if dropped > 0 {
        debug!(dropped, "Rank-deficient design matrix, using minimum-norm solution");
    }
    solution
}

/// Cyclic Jacobi eigen-decomposition; eigenvectors are returned as columns
fn symmetric_eigen(mut a: Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let n = a.nrows();
    let mut v = Array2::<f64>::eye(n);

    for _ in 0..MAX_JACOBI_SWEEPS {
        let total = a.mapv(|x| x * x).sum();
        let diagonal = a.diag().mapv(|x| x * x).sum();
        if total - diagonal <= f64::EPSILON * f64::EPSILON * total {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq == 0.0 {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let akp = a[[k, p]];
                    let akq = a[[k, q]];
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[[p, k]];
                    let aqk = a[[q, k]];
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    (a.diag().to_owned(), v)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRUE_INTERCEPT: f64 = 10_000.0;
    const TRUE_COEF: [f64; FEATURE_COUNT] =
        [1000.0, 500.0, 250.0, 3000.0, 4000.0, 1500.0, 7000.0, 2000.0, -1000.0];

    /// Deterministic pseudo-random design covering every column
    fn design(n: usize) -> Vec<[f64; FEATURE_COUNT]> {
        let mut state: u64 = 42;
        let mut next = move |modulo: u64| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (state >> 33) % modulo
        };
        (0..n)
            .map(|_| {
                [
                    30.0 + next(170) as f64,
                    1.0 + next(15) as f64 * 0.5,
                    1.0 + next(5) as f64,
                    1.0 + next(3) as f64,
                    next(2) as f64,
                    next(2) as f64,
                    next(2) as f64,
                    next(2) as f64,
                    1.0 + next(8) as f64,
                ]
            })
            .collect()
    }

    #[test]
    fn test_recovers_exact_linear_relation() {
        let x = design(200);
        let y: Vec<f64> = x
            .iter()
            .map(|row| linear_combination(TRUE_INTERCEPT, &TRUE_COEF, row))
            .collect();
        let fitted = fit(&x, &y).unwrap();

        for (got, want) in fitted.coefficients.iter().zip(TRUE_COEF.iter()) {
            assert!((got - want).abs() < 1e-6, "coef {} vs {}", got, want);
        }
        assert!((fitted.intercept - TRUE_INTERCEPT).abs() < 1e-4);
        let r2 = r_squared(&fitted, &x, &y).unwrap();
        assert!((r2 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_constant_column_gets_zero_coefficient() {
        let mut x = design(100);
        for row in x.iter_mut() {
            row[6] = 0.0;
        }
        let y: Vec<f64> = x
            .iter()
            .map(|row| linear_combination(TRUE_INTERCEPT, &TRUE_COEF, row))
            .collect();
        let fitted = fit(&x, &y).unwrap();
        assert_eq!(fitted.coefficients[6], 0.0);
        assert!((fitted.coefficients[0] - TRUE_COEF[0]).abs() < 1e-6);
        assert!((fitted.intercept - TRUE_INTERCEPT).abs() < 1e-4);
    }

    #[test]
    fn test_duplicated_column_splits_weight() {
        let mut x = design(100);
        for row in x.iter_mut() {
            row[5] = row[4];
        }
        let y: Vec<f64> = x.iter().map(|row| 100.0 + 10.0 * row[4]).collect();
        let fitted = fit(&x, &y).unwrap();
        assert!((fitted.coefficients[4] - 5.0).abs() < 1e-6);
        assert!((fitted.coefficients[5] - 5.0).abs() < 1e-6);
        for row in &x {
            assert!((fitted.predict(row) - (100.0 + 10.0 * row[4])).abs() < 1e-6);
        }
    }

    #[test]
    fn test_single_row_predicts_its_label() {
        let x = vec![[75.0, 3.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 4.0]];
        let fitted = fit(&x, &[200_000.0]).unwrap();
        assert_eq!(fitted.coefficients, [0.0; FEATURE_COUNT]);
        assert_eq!(fitted.predict(&x[0]), 200_000.0);
        assert!(r_squared(&fitted, &x, &[200_000.0]).is_none());
    }

    #[test]
    fn test_empty_and_mismatched_input() {
        assert!(matches!(
            fit(&[], &[]),
            Err(EstimatorError::InsufficientData(_))
        ));
        let x = design(3);
        assert!(matches!(
            fit(&x, &[1.0, 2.0]),
            Err(EstimatorError::Validation(_))
        ));
    }

    #[test]
    fn test_noisy_fit_has_partial_r_squared() {
        let x = design(300);
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let noise = if i % 2 == 0 { 20_000.0 } else { -20_000.0 };
                linear_combination(TRUE_INTERCEPT, &TRUE_COEF, row) + noise
            })
            .collect();
        let fitted = fit(&x, &y).unwrap();
        let r2 = r_squared(&fitted, &x, &y).unwrap();
        assert!(r2 > 0.5 && r2 < 1.0, "r2 was {}", r2);
    }

    #[test]
    fn test_non_finite_training_data_rejected() {
        let x = design(20);
        let mut y: Vec<f64> = x
            .iter()
            .map(|row| linear_combination(TRUE_INTERCEPT, &TRUE_COEF, row))
            .collect();
        y[3] = f64::INFINITY;
        assert!(matches!(fit(&x, &y), Err(EstimatorError::Validation(_))));
    }

    #[test]
    fn test_eigen_decomposition_reconstructs_matrix() {
        let a = Array2::from_shape_fn((FEATURE_COUNT, FEATURE_COUNT), |(i, j)| {
            1.0 / (1.0 + i as f64 + j as f64)
        });
        let (values, vectors) = symmetric_eigen(a.clone());
        let rebuilt = vectors.dot(&Array2::from_diag(&values)).dot(&vectors.t());
        for (got, want) in rebuilt.iter().zip(a.iter()) {
            assert!((got - want).abs() < 1e-12);
        }
    }
}
