// src/algorithms/neighborhood.rs

use ndarray::Array1;
use rand::Rng;
use rand_distr::{Bernoulli, Distribution};

use crate::core::{
    DistanceVector, Image, LimeError, PerturbationMatrix, PredictionMatrix, Result,
};
use crate::traits::ClassifierModel;

/// Draw the binary neighborhood matrix, `num_samples x n_features`.
///
/// Every entry is an independent Bernoulli(0.5) draw from the supplied RNG;
/// row 0 is then forced to all ones so the unperturbed image is always
/// sample 0, the anchor the distance weighter and the surrogate regression
/// rely on. No side effects beyond consuming RNG state.
pub fn sample_perturbations<R: Rng + ?Sized>(
    rng: &mut R,
    num_samples: usize,
    n_features: usize,
) -> Result<PerturbationMatrix> {
    if num_samples == 0 {
        return Err(LimeError::InvalidInput(
            "num_samples must be at least 1.".to_string(),
        ));
    }
    if n_features == 0 {
        return Err(LimeError::InvalidInput(
            "n_features must be at least 1.".to_string(),
        ));
    }

    let coin = Bernoulli::new(0.5)
        .map_err(|e| LimeError::InternalError(format!("Bernoulli setup failed: {}", e)))?;
    let mut data = PerturbationMatrix::zeros((num_samples, n_features));
    for value in data.iter_mut() {
        *value = if coin.sample(rng) { 1.0 } else { 0.0 };
    }
    data.row_mut(0).fill(1.0);
    Ok(data)
}

/// Distance metric used to compare perturbation rows against row 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
}

impl Default for DistanceMetric {
    fn default() -> Self {
        DistanceMetric::Cosine
    }
}

/// Distance of every sample row from the reference row 0.
///
/// The self-distance at index 0 is the metric's exact identity value (0 for
/// both cosine and euclidean).
pub fn distances_to_reference(data: &PerturbationMatrix, metric: DistanceMetric) -> DistanceVector {
    let reference = data.row(0);
    let ref_sq = reference.dot(&reference);
    let mut out = Array1::zeros(data.nrows());
    for (i, row) in data.rows().into_iter().enumerate() {
        out[i] = match metric {
            DistanceMetric::Cosine => {
                let dot = row.dot(&reference);
                // sqrt of the product keeps identical rows at exactly 0.
                let denominator = (row.dot(&row) * ref_sq).sqrt();
                if denominator == 0.0 {
                    if dot == 0.0 && row.dot(&row) == ref_sq {
                        0.0
                    } else {
                        1.0
                    }
                } else {
                    1.0 - dot / denominator
                }
            }
            DistanceMetric::Euclidean => {
                let mut sum_sq = 0.0;
                for (a, b) in row.iter().zip(reference.iter()) {
                    let diff = a - b;
                    sum_sq += diff * diff;
                }
                sum_sq.sqrt()
            }
        };
    }
    out
}

/// Convert distances to similarity weights with the exponential kernel
/// `sqrt(exp(-(d / kernel_width)^2))`.
///
/// Samples close to the reference get weights near 1; influence decays
/// smoothly with distance rather than through a hard cutoff.
pub fn kernel_weights(distances: &DistanceVector, kernel_width: f64) -> Array1<f64> {
    distances.mapv(|d| (-(d * d) / (kernel_width * kernel_width)).exp().sqrt())
}

/// Feeds rendered images to the classifier in fixed-size batches.
///
/// Classifier invocation is assumed expensive, so calls are amortized over
/// `batch_size` images plus one final partial batch. Batching must be
/// invisible in the output: prediction row i always corresponds to input
/// image i, whatever the batch boundaries. Batches are all-or-nothing; a
/// failed classifier call aborts the whole run.
#[derive(Debug, Clone, Copy)]
pub struct BatchedClassifierDriver {
    batch_size: usize,
}

impl BatchedClassifierDriver {
    pub fn new(batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(LimeError::InvalidInput(
                "batch_size must be at least 1.".to_string(),
            ));
        }
        Ok(BatchedClassifierDriver { batch_size })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Run the classifier over `images` and concatenate the outputs in
    /// input order.
    pub fn predict_ordered<C: ClassifierModel + ?Sized>(
        &self,
        classifier: &C,
        images: &[Image],
    ) -> Result<PredictionMatrix> {
        if images.is_empty() {
            return Err(LimeError::InvalidInput(
                "Cannot classify an empty set of images.".to_string(),
            ));
        }

        let mut rows: Vec<f64> = Vec::new();
        let mut n_classes: Option<usize> = None;
        for chunk in images.chunks(self.batch_size) {
            let predictions = classifier.predict(chunk)?;
            if predictions.nrows() != chunk.len() {
                return Err(LimeError::ModelPredictionError(format!(
                    "Classifier returned {} rows for a batch of {} images.",
                    predictions.nrows(),
                    chunk.len()
                )));
            }
            match n_classes {
                None => n_classes = Some(predictions.ncols()),
                Some(n) if n != predictions.ncols() => {
                    return Err(LimeError::ModelPredictionError(format!(
                        "Classifier changed class count across batches: {} then {}.",
                        n,
                        predictions.ncols()
                    )));
                }
                Some(_) => {}
            }
            rows.extend(predictions.iter().copied());
        }

        let n_classes = n_classes
            .ok_or_else(|| LimeError::InternalError("No batches were classified.".to_string()))?;
        Ok(PredictionMatrix::from_shape_vec(
            (images.len(), n_classes),
            rows,
        )?)
    }
}
