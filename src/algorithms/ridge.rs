// src/algorithms/ridge.rs

use ndarray::{Array1, Array2, ArrayView1};

use crate::core::{LabelExplanation, LimeError, PerturbationMatrix, Result};
use crate::traits::{FeatureSelection, SurrogateFitter};

/// Weighted ridge regression, the default local surrogate.
///
/// Solves `(X'WX + alpha*I) beta = X'Wy` with an unpenalized intercept
/// column, where W holds the kernel sample weights. The normal equations
/// are solved by an in-crate Cholesky factorization, or through
/// ndarray-linalg when the `linalg` feature is enabled.
#[derive(Debug, Clone, Copy)]
pub struct RidgeSurrogate {
    pub alpha: f64,
}

impl Default for RidgeSurrogate {
    fn default() -> Self {
        RidgeSurrogate { alpha: 1.0 }
    }
}

impl RidgeSurrogate {
    pub fn new(alpha: f64) -> Self {
        RidgeSurrogate { alpha }
    }

    /// Fit intercept + coefficients over the selected feature columns.
    fn solve(
        &self,
        data: &PerturbationMatrix,
        target: ArrayView1<f64>,
        sample_weights: ArrayView1<f64>,
        selected: &[usize],
    ) -> Result<(f64, Vec<f64>)> {
        let n_samples = data.nrows();
        let dim = selected.len() + 1; // intercept column first

        let mut xtwx = Array2::<f64>::zeros((dim, dim));
        let mut xtwy = Array1::<f64>::zeros(dim);
        let mut xrow = vec![0.0; dim];
        for r in 0..n_samples {
            let w = sample_weights[r];
            xrow[0] = 1.0;
            for (k, &feature) in selected.iter().enumerate() {
                xrow[k + 1] = data[[r, feature]];
            }
            for i in 0..dim {
                xtwy[i] += w * xrow[i] * target[r];
                for j in 0..dim {
                    xtwx[[i, j]] += w * xrow[i] * xrow[j];
                }
            }
        }
        for i in 1..dim {
            xtwx[[i, i]] += self.alpha;
        }

        let beta = solve_symmetric(xtwx, xtwy)?;
        Ok((beta[0], beta.iter().skip(1).copied().collect()))
    }

    fn highest_weights(
        &self,
        data: &PerturbationMatrix,
        target: ArrayView1<f64>,
        sample_weights: ArrayView1<f64>,
        num_features: usize,
    ) -> Result<Vec<usize>> {
        let all: Vec<usize> = (0..data.ncols()).collect();
        let (_, coefficients) = self.solve(data, target, sample_weights, &all)?;
        let mut ranked: Vec<(usize, f64)> = all.into_iter().zip(coefficients).collect();
        ranked.sort_by(|a, b| {
            b.1.abs()
                .partial_cmp(&a.1.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(num_features);
        Ok(ranked.into_iter().map(|(feature, _)| feature).collect())
    }

    fn forward_selection(
        &self,
        data: &PerturbationMatrix,
        target: ArrayView1<f64>,
        sample_weights: ArrayView1<f64>,
        num_features: usize,
    ) -> Result<Vec<usize>> {
        let mut selected: Vec<usize> = Vec::new();
        let limit = num_features.min(data.ncols());
        while selected.len() < limit {
            let mut best: Option<(usize, f64)> = None;
            for candidate in 0..data.ncols() {
                if selected.contains(&candidate) {
                    continue;
                }
                let mut trial = selected.clone();
                trial.push(candidate);
                let (intercept, coefficients) =
                    self.solve(data, target, sample_weights, &trial)?;
                let sse = weighted_sse(data, target, sample_weights, &trial, intercept, &coefficients);
                if best.map_or(true, |(_, best_sse)| sse < best_sse) {
                    best = Some((candidate, sse));
                }
            }
            match best {
                Some((candidate, _)) => selected.push(candidate),
                None => break,
            }
        }
        Ok(selected)
    }
}

fn weighted_sse(
    data: &PerturbationMatrix,
    target: ArrayView1<f64>,
    sample_weights: ArrayView1<f64>,
    selected: &[usize],
    intercept: f64,
    coefficients: &[f64],
) -> f64 {
    let mut sse = 0.0;
    for r in 0..data.nrows() {
        let mut prediction = intercept;
        for (k, &feature) in selected.iter().enumerate() {
            prediction += coefficients[k] * data[[r, feature]];
        }
        let residual = target[r] - prediction;
        sse += sample_weights[r] * residual * residual;
    }
    sse
}

/// Solve `A x = b` for a symmetric positive definite A.
#[cfg(not(feature = "linalg"))]
fn solve_symmetric(a: Array2<f64>, b: Array1<f64>) -> Result<Array1<f64>> {
    let n = a.nrows();
    let mut lower = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= lower[[i, k]] * lower[[j, k]];
            }
            if i == j {
                if sum <= 0.0 {
                    return Err(LimeError::InternalError(
                        "Normal-equation matrix is not positive definite; \
                         check the sample weights."
                            .to_string(),
                    ));
                }
                lower[[i, j]] = sum.sqrt();
            } else {
                lower[[i, j]] = sum / lower[[j, j]];
            }
        }
    }

    // Forward solve L z = b, then back solve L' x = z.
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= lower[[i, k]] * z[k];
        }
        z[i] = sum / lower[[i, i]];
    }
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = z[i];
        for k in (i + 1)..n {
            sum -= lower[[k, i]] * x[k];
        }
        x[i] = sum / lower[[i, i]];
    }
    Ok(x)
}

#[cfg(feature = "linalg")]
fn solve_symmetric(a: Array2<f64>, b: Array1<f64>) -> Result<Array1<f64>> {
    use ndarray_linalg::Solve;
    a.solve_into(b)
        .map_err(|e| LimeError::InternalError(format!("Normal-equation solve failed: {}", e)))
}

impl SurrogateFitter for RidgeSurrogate {
    fn fit(
        &self,
        data: &PerturbationMatrix,
        target: ArrayView1<f64>,
        sample_weights: ArrayView1<f64>,
        _label: usize,
        num_features: usize,
        feature_selection: FeatureSelection,
    ) -> Result<LabelExplanation> {
        let n_samples = data.nrows();
        if n_samples == 0 || data.ncols() == 0 {
            return Err(LimeError::InvalidInput(
                "Cannot fit a surrogate on an empty perturbation matrix.".to_string(),
            ));
        }
        if target.len() != n_samples || sample_weights.len() != n_samples {
            return Err(LimeError::ShapeMismatch(format!(
                "Perturbation matrix has {} rows but target has {} and weights {}.",
                n_samples,
                target.len(),
                sample_weights.len()
            )));
        }

        let selected = match feature_selection {
            FeatureSelection::None => (0..data.ncols()).collect(),
            FeatureSelection::Auto => {
                if data.ncols() <= num_features {
                    (0..data.ncols()).collect()
                } else {
                    self.highest_weights(data, target, sample_weights, num_features)?
                }
            }
            FeatureSelection::HighestWeights => {
                self.highest_weights(data, target, sample_weights, num_features)?
            }
            FeatureSelection::ForwardSelection => {
                self.forward_selection(data, target, sample_weights, num_features)?
            }
            FeatureSelection::LassoPath => {
                return Err(LimeError::InvalidInput(
                    "LassoPath is not provided by the built-in ridge fitter; \
                     supply a custom SurrogateFitter."
                        .to_string(),
                ));
            }
        };

        let (intercept, coefficients) = self.solve(data, target, sample_weights, &selected)?;

        // Local fidelity as weighted R^2 over the neighborhood.
        let weight_sum: f64 = sample_weights.iter().sum();
        let weighted_mean = if weight_sum > 0.0 {
            sample_weights
                .iter()
                .zip(target.iter())
                .map(|(&w, &y)| w * y)
                .sum::<f64>()
                / weight_sum
        } else {
            0.0
        };
        let ss_res = weighted_sse(data, target, sample_weights, &selected, intercept, &coefficients);
        let ss_tot: f64 = sample_weights
            .iter()
            .zip(target.iter())
            .map(|(&w, &y)| w * (y - weighted_mean) * (y - weighted_mean))
            .sum();
        let score = if ss_tot == 0.0 {
            if ss_res == 0.0 {
                1.0
            } else {
                0.0
            }
        } else {
            1.0 - ss_res / ss_tot
        };

        // Surrogate prediction at the unperturbed reference sample (row 0).
        let mut local_pred = intercept;
        for (k, &feature) in selected.iter().enumerate() {
            local_pred += coefficients[k] * data[[0, feature]];
        }

        let mut feature_weights: Vec<(usize, f64)> =
            selected.into_iter().zip(coefficients).collect();
        feature_weights.sort_by(|a, b| {
            b.1.abs()
                .partial_cmp(&a.1.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(LabelExplanation {
            intercept,
            feature_weights,
            score,
            local_pred,
        })
    }
}
