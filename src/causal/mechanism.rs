//! Per-node causal mechanisms.
//!
//! Every draw takes a uniform `u` in `[0, 1)` instead of an RNG so callers can
//! feed the same noise to mechanisms fitted on different samples. Both
//! mechanisms read `u` as a quantile of sorted observations, which couples
//! draws monotonically across fits.

use crate::error::{AssistantError, Result};

/// Relative ridge added to the diagonal of the normal equations.
const RIDGE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct EmpiricalDistribution {
    sorted: Vec<f64>,
}

impl EmpiricalDistribution {
    pub fn fit(values: &[f64]) -> Result<Self> {
        if values.is_empty() {
            return Err(AssistantError::CausalModelFault(
                "cannot fit a distribution to an empty sample".to_string(),
            ));
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(AssistantError::CausalModelFault(format!(
                "non-finite observation {}",
                bad
            )));
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        Ok(Self { sorted })
    }

    pub fn quantile(&self, u: f64) -> f64 {
        let n = self.sorted.len();
        let idx = ((u.clamp(0.0, 1.0) * n as f64) as usize).min(n - 1);
        self.sorted[idx]
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    pub fn mean(&self) -> f64 {
        self.sorted.iter().sum::<f64>() / self.sorted.len() as f64
    }
}

/// `y = intercept + coefficients . parents + noise`, noise drawn from the
/// empirical residuals.
#[derive(Debug, Clone, PartialEq)]
pub struct AdditiveNoiseModel {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    noise: EmpiricalDistribution,
}

impl AdditiveNoiseModel {
    /// `parents` holds one column per parent, each as long as `target`.
    pub fn fit(parents: &[&[f64]], target: &[f64]) -> Result<Self> {
        let n = target.len();
        if n == 0 {
            return Err(AssistantError::CausalModelFault(
                "cannot fit a mechanism to an empty sample".to_string(),
            ));
        }
        if let Some(short) = parents.iter().position(|p| p.len() != n) {
            return Err(AssistantError::CausalModelFault(format!(
                "parent column {} has {} rows, expected {}",
                short,
                parents[short].len(),
                n
            )));
        }

        let (intercept, coefficients) = ridge_ols(parents, target)?;
        let residuals: Vec<f64> = (0..n)
            .map(|row| {
                let fitted = intercept
                    + coefficients
                        .iter()
                        .zip(parents)
                        .map(|(b, column)| b * column[row])
                        .sum::<f64>();
                target[row] - fitted
            })
            .collect();

        Ok(Self {
            intercept,
            coefficients,
            noise: EmpiricalDistribution::fit(&residuals)?,
        })
    }

    pub fn predict(&self, parent_values: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(parent_values)
                .map(|(b, x)| b * x)
                .sum::<f64>()
    }

    pub fn draw(&self, parent_values: &[f64], u: f64) -> f64 {
        self.predict(parent_values) + self.noise.quantile(u)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mechanism {
    /// Root node: resample observed values.
    Empirical(EmpiricalDistribution),
    /// Non-root node: linear in its parents plus additive noise.
    Additive(AdditiveNoiseModel),
}

impl Mechanism {
    /// Fit the mechanism kind implied by the node's parent count.
    pub fn fit(parents: &[&[f64]], target: &[f64]) -> Result<Self> {
        if parents.is_empty() {
            Ok(Mechanism::Empirical(EmpiricalDistribution::fit(target)?))
        } else {
            Ok(Mechanism::Additive(AdditiveNoiseModel::fit(parents, target)?))
        }
    }

    pub fn draw(&self, parent_values: &[f64], u: f64) -> f64 {
        match self {
            Mechanism::Empirical(dist) => dist.quantile(u),
            Mechanism::Additive(model) => model.draw(parent_values, u),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Mechanism::Empirical(_) => "empirical",
            Mechanism::Additive(_) => "additive-noise",
        }
    }
}

/// Least squares on centred data with a small ridge, so constant or
/// collinear parents still give a finite solution.
fn ridge_ols(columns: &[&[f64]], y: &[f64]) -> Result<(f64, Vec<f64>)> {
    let n = y.len() as f64;
    let k = columns.len();
    let y_mean = y.iter().sum::<f64>() / n;
    let means: Vec<f64> = columns.iter().map(|c| c.iter().sum::<f64>() / n).collect();

    let mut gram = vec![vec![0.0; k]; k];
    let mut rhs = vec![0.0; k];
    for i in 0..k {
        for j in i..k {
            let s: f64 = columns[i]
                .iter()
                .zip(columns[j])
                .map(|(a, b)| (a - means[i]) * (b - means[j]))
                .sum();
            gram[i][j] = s;
            gram[j][i] = s;
        }
        rhs[i] = columns[i]
            .iter()
            .zip(y)
            .map(|(a, b)| (a - means[i]) * (b - y_mean))
            .sum();
    }
    for (i, row) in gram.iter_mut().enumerate() {
        row[i] += RIDGE * row[i].abs().max(1.0);
    }

    let coefficients = solve(gram, rhs)?;
    let intercept = y_mean
        - coefficients
            .iter()
            .zip(&means)
            .map(|(b, m)| b * m)
            .sum::<f64>();

    if !intercept.is_finite() || coefficients.iter().any(|b| !b.is_finite()) {
        return Err(AssistantError::CausalModelFault(
            "least-squares fit did not converge".to_string(),
        ));
    }
    Ok((intercept, coefficients))
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>> {
    let k = b.len();
    for col in 0..k {
        let pivot = (col..k)
            .max_by(|&r1, &r2| a[r1][col].abs().total_cmp(&a[r2][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < f64::EPSILON {
            return Err(AssistantError::CausalModelFault(
                "singular normal equations".to_string(),
            ));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..k {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            let pivot_row = a[col].clone();
            for (c, value) in pivot_row.iter().enumerate().skip(col) {
                a[row][c] -= factor * value;
            }
            let pivot_b = b[col];
            b[row] -= factor * pivot_b;
        }
    }

    let mut x = vec![0.0; k];
    for row in (0..k).rev() {
        let tail: f64 = (row + 1..k).map(|c| a[row][c] * x[c]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}
