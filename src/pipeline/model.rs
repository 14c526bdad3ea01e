//! Binomial model on WoE-encoded features
//!
//! The default engine is logistic regression fit by iteratively reweighted
//! least squares. Every encoded feature enters the model; there is no
//! feature selection.

use faer::prelude::SolverCore;
use faer::{Mat, Side};
use polars::prelude::*;
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};

use super::binning::{WoeEncodedDataset, WOE_SUFFIX};
use crate::error::{Result, ScorecardError};

/// Smallest IRLS weight, keeps X'WX positive definite near 0/1 fits
const MIN_WEIGHT: f64 = 1e-10;

/// Probability clamp used for log-likelihoods
const PROB_EPS: f64 = 1e-15;

/// A fitted binomial model with diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct Model {
    pub features: Vec<String>,
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    /// Covariance of (intercept, coefficients...)
    pub covariance: Vec<Vec<f64>>,
    /// Standard errors, intercept first
    pub std_errors: Vec<f64>,
    pub z_values: Vec<f64>,
    pub p_values: Vec<f64>,
    /// Variance inflation factor per feature
    pub vif: Vec<f64>,
    pub log_likelihood: f64,
    pub aic: f64,
    pub null_deviance: f64,
    pub residual_deviance: f64,
    pub iterations: usize,
    pub n_obs: usize,
}

impl Model {
    /// Log-odds for one row of WoE values
    pub fn linear_predictor(&self, row: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(row)
                .map(|(b, x)| b * x)
                .sum::<f64>()
    }

    /// Predicted bad probability for every row of an encoded dataset
    pub fn predict(&self, encoded: &WoeEncodedDataset) -> Result<Vec<f64>> {
        if encoded.features() != self.features.as_slice() {
            return Err(ScorecardError::InputShape(format!(
                "dataset '{}' is not encoded with the model's features",
                encoded.name()
            )));
        }

        let columns = encoded.columns();
        Ok((0..encoded.height())
            .map(|i| {
                let eta = self.intercept
                    + self
                        .coefficients
                        .iter()
                        .zip(columns)
                        .map(|(b, col)| b * col[i])
                        .sum::<f64>();
                sigmoid(eta)
            })
            .collect())
    }

    /// Coefficient table: term, estimate, std error, z, p and VIF
    pub fn coefficient_frame(&self) -> Result<DataFrame> {
        let mut terms = vec!["(Intercept)".to_string()];
        terms.extend(self.features.iter().map(|f| format!("{}{}", f, WOE_SUFFIX)));

        let mut estimates = vec![self.intercept];
        estimates.extend(&self.coefficients);

        let mut vif = vec![None];
        vif.extend(self.vif.iter().map(|v| Some(*v)));

        Ok(DataFrame::new(vec![
            Column::new("term".into(), terms),
            Column::new("estimate".into(), estimates),
            Column::new("std_error".into(), self.std_errors.clone()),
            Column::new("z_value".into(), self.z_values.clone()),
            Column::new("p_value".into(), self.p_values.clone()),
            Column::new("vif".into(), vif),
        ])?)
    }

    /// Fit statistics as a two-column table
    pub fn diagnostics_frame(&self) -> Result<DataFrame> {
        let rows: Vec<(&str, f64)> = vec![
            ("observations", self.n_obs as f64),
            ("parameters", (self.features.len() + 1) as f64),
            ("log_likelihood", self.log_likelihood),
            ("aic", self.aic),
            ("null_deviance", self.null_deviance),
            ("residual_deviance", self.residual_deviance),
            ("iterations", self.iterations as f64),
        ];
        Ok(DataFrame::new(vec![
            Column::new(
                "statistic".into(),
                rows.iter().map(|(k, _)| k.to_string()).collect::<Vec<_>>(),
            ),
            Column::new(
                "value".into(),
                rows.iter().map(|(_, v)| *v).collect::<Vec<_>>(),
            ),
        ])?)
    }
}

/// Fits a [`Model`] from the reference dataset's encoded features
pub trait RegressionEngine: Sync {
    fn fit(&self, encoded: &WoeEncodedDataset) -> Result<Model>;
}

/// Logistic regression by iteratively reweighted least squares
#[derive(Debug, Clone)]
pub struct IrlsLogistic {
    pub max_iterations: usize,
    /// Convergence threshold on the largest absolute coefficient change
    pub tolerance: f64,
}

impl Default for IrlsLogistic {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            tolerance: 1e-8,
        }
    }
}

impl RegressionEngine for IrlsLogistic {
    fn fit(&self, encoded: &WoeEncodedDataset) -> Result<Model> {
        let n = encoded.height();
        let p = encoded.features().len();
        let y: Vec<f64> = encoded.labels().iter().map(|&l| l as f64).collect();

        if n <= p + 1 {
            return Err(ScorecardError::FitConvergence(format!(
                "{} rows are not enough to fit {} parameters",
                n,
                p + 1
            )));
        }
        let bad = y.iter().sum::<f64>();
        if bad == 0.0 || bad == n as f64 {
            return Err(ScorecardError::FitConvergence(
                "the label is constant in the training data".to_string(),
            ));
        }
        for (feature, column) in encoded.features().iter().zip(encoded.columns()) {
            let first = column[0];
            if column.iter().all(|v| (v - first).abs() < 1e-12) {
                return Err(ScorecardError::FitConvergence(format!(
                    "feature '{}' has a single WoE value and is collinear with the intercept",
                    feature
                )));
            }
        }

        let x = design_matrix(encoded);
        let mean = bad / n as f64;
        let mut beta = vec![0.0; p + 1];
        beta[0] = (mean / (1.0 - mean)).ln();

        let mut iterations = 0;
        let mut converged = false;
        while iterations < self.max_iterations {
            iterations += 1;
            let mu = fitted(&x, &beta);
            let (hessian, gradient) = normal_equations(&x, &y, &mu);
            let inverse = invert(&hessian)?;

            let mut max_change = 0.0f64;
            for j in 0..=p {
                let step: f64 = (0..=p).map(|k| inverse[(j, k)] * gradient[k]).sum();
                beta[j] += step;
                max_change = max_change.max(step.abs());
            }
            if !max_change.is_finite() {
                return Err(ScorecardError::FitConvergence(
                    "coefficients diverged".to_string(),
                ));
            }
            if max_change < self.tolerance {
                converged = true;
                break;
            }
        }
        if !converged {
            return Err(ScorecardError::FitConvergence(format!(
                "no convergence after {} iterations",
                self.max_iterations
            )));
        }

        let mu = fitted(&x, &beta);
        let (hessian, _) = normal_equations(&x, &y, &mu);
        let covariance = invert(&hessian)?;

        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| ScorecardError::FitConvergence(e.to_string()))?;
        let std_errors: Vec<f64> = (0..=p).map(|j| covariance[(j, j)].max(0.0).sqrt()).collect();
        let z_values: Vec<f64> = beta
            .iter()
            .zip(&std_errors)
            .map(|(b, se)| if *se > 0.0 { b / se } else { f64::NAN })
            .collect();
        let p_values: Vec<f64> = z_values
            .iter()
            .map(|z| 2.0 * (1.0 - normal.cdf(z.abs())))
            .collect();

        let log_likelihood = log_likelihood(&y, &mu);
        let null_ll = log_likelihood_const(&y, mean);

        Ok(Model {
            features: encoded.features().to_vec(),
            intercept: beta[0],
            coefficients: beta[1..].to_vec(),
            covariance: (0..=p)
                .map(|i| (0..=p).map(|j| covariance[(i, j)]).collect())
                .collect(),
            std_errors,
            z_values,
            p_values,
            vif: variance_inflation(encoded)?,
            log_likelihood,
            aic: -2.0 * log_likelihood + 2.0 * (p + 1) as f64,
            null_deviance: -2.0 * null_ll,
            residual_deviance: -2.0 * log_likelihood,
            iterations,
            n_obs: n,
        })
    }
}

pub fn sigmoid(eta: f64) -> f64 {
    if eta >= 0.0 {
        1.0 / (1.0 + (-eta).exp())
    } else {
        let e = eta.exp();
        e / (1.0 + e)
    }
}

/// Intercept column followed by the WoE columns
fn design_matrix(encoded: &WoeEncodedDataset) -> Mat<f64> {
    let n = encoded.height();
    let p = encoded.features().len();
    let mut x = Mat::<f64>::zeros(n, p + 1);
    for i in 0..n {
        x[(i, 0)] = 1.0;
    }
    for (j, column) in encoded.columns().iter().enumerate() {
        for (i, &v) in column.iter().enumerate() {
            x[(i, j + 1)] = v;
        }
    }
    x
}

fn fitted(x: &Mat<f64>, beta: &[f64]) -> Vec<f64> {
    (0..x.nrows())
        .map(|i| {
            let eta: f64 = beta.iter().enumerate().map(|(j, b)| b * x[(i, j)]).sum();
            sigmoid(eta)
        })
        .collect()
}

/// X'WX and X'(y - mu)
fn normal_equations(x: &Mat<f64>, y: &[f64], mu: &[f64]) -> (Mat<f64>, Vec<f64>) {
    let k = x.ncols();
    let mut hessian = Mat::<f64>::zeros(k, k);
    let mut gradient = vec![0.0; k];

    for i in 0..x.nrows() {
        let w = (mu[i] * (1.0 - mu[i])).max(MIN_WEIGHT);
        let r = y[i] - mu[i];
        for a in 0..k {
            let xa = x[(i, a)];
            gradient[a] += xa * r;
            for b in a..k {
                hessian[(a, b)] += w * xa * x[(i, b)];
            }
        }
    }
    for a in 0..k {
        for b in 0..a {
            hessian[(a, b)] = hessian[(b, a)];
        }
    }
    (hessian, gradient)
}

/// Inverse of a symmetric positive definite matrix
fn invert(m: &Mat<f64>) -> Result<Mat<f64>> {
    let chol = m.cholesky(Side::Lower).map_err(|_| {
        ScorecardError::FitConvergence("design matrix is singular".to_string())
    })?;
    Ok(chol.inverse())
}

fn log_likelihood(y: &[f64], mu: &[f64]) -> f64 {
    y.iter()
        .zip(mu)
        .map(|(yi, m)| {
            let m = m.clamp(PROB_EPS, 1.0 - PROB_EPS);
            yi * m.ln() + (1.0 - yi) * (1.0 - m).ln()
        })
        .sum()
}

fn log_likelihood_const(y: &[f64], mean: f64) -> f64 {
    let m = mean.clamp(PROB_EPS, 1.0 - PROB_EPS);
    y.iter()
        .map(|yi| yi * m.ln() + (1.0 - yi) * (1.0 - m).ln())
        .sum()
}

/// VIF of each feature from an OLS regression on the other features
fn variance_inflation(encoded: &WoeEncodedDataset) -> Result<Vec<f64>> {
    let columns = encoded.columns();
    let p = columns.len();
    if p < 2 {
        return Ok(vec![1.0; p]);
    }
    let n = encoded.height();

    (0..p)
        .map(|target| {
            let others: Vec<&Vec<f64>> = columns
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != target)
                .map(|(_, c)| c)
                .collect();
            let k = others.len() + 1;

            let mut xtx = Mat::<f64>::zeros(k, k);
            let mut xty = vec![0.0; k];
            let y = &columns[target];
            for i in 0..n {
                let row: Vec<f64> = std::iter::once(1.0)
                    .chain(others.iter().map(|c| c[i]))
                    .collect();
                for a in 0..k {
                    xty[a] += row[a] * y[i];
                    for b in 0..k {
                        xtx[(a, b)] += row[a] * row[b];
                    }
                }
            }

            // Perfect collinearity makes X'X singular
            let Ok(chol) = xtx.cholesky(Side::Lower) else {
                return Ok(f64::INFINITY);
            };
            let inverse = chol.inverse();
            let coef: Vec<f64> = (0..k)
                .map(|a| (0..k).map(|b| inverse[(a, b)] * xty[b]).sum())
                .collect();

            let y_mean = y.iter().sum::<f64>() / n as f64;
            let mut sse = 0.0;
            let mut sst = 0.0;
            for i in 0..n {
                let pred = coef[0]
                    + others
                        .iter()
                        .enumerate()
                        .map(|(j, c)| coef[j + 1] * c[i])
                        .sum::<f64>();
                sse += (y[i] - pred).powi(2);
                sst += (y[i] - y_mean).powi(2);
            }
            if sst == 0.0 {
                return Ok(f64::INFINITY);
            }
            let r2 = 1.0 - sse / sst;
            Ok(if r2 >= 1.0 { f64::INFINITY } else { 1.0 / (1.0 - r2) })
        })
        .collect()
}
