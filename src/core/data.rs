// src/core/data.rs
use std::collections::HashMap;
use std::fmt;

use ndarray::{Array1, Array2, Array3};

use crate::core::errors::{LimeError, Result};

/// A 3-channel image, height x width x 3.
/// We use `f64` pixels for flexibility with various classifier pipelines.
pub type Image = Array3<f64>;

/// Superpixel label map, same height/width as the image it segments.
/// The distinct IDs must form the contiguous range `0..n_features`, since
/// perturbation-matrix columns index superpixels by ID.
pub type SegmentationMap = Array2<usize>;

/// Binary neighborhood matrix, `num_samples x n_features`. Row 0 is always
/// all ones (the unperturbed reference sample).
pub type PerturbationMatrix = Array2<f64>;

/// Classifier outputs, `num_samples x n_classes`, row-aligned with the
/// perturbation matrix: row i is the prediction for the render of row i.
pub type PredictionMatrix = Array2<f64>;

/// Per-sample distance of each perturbation row from row 0.
pub type DistanceVector = Array1<f64>;

/// The fitted surrogate output for one label.
#[derive(Debug, Clone)]
pub struct LabelExplanation {
    /// Intercept of the local linear model.
    pub intercept: f64,
    /// (superpixel ID, weight) pairs, sorted by descending absolute weight.
    pub feature_weights: Vec<(usize, f64)>,
    /// Local fidelity score of the surrogate (weighted R^2).
    pub score: f64,
    /// The surrogate's prediction at the unperturbed reference sample.
    pub local_pred: f64,
}

/// A local explanation of one classifier decision on one image.
///
/// Holds the per-label surrogate fits produced by
/// [`LimeImageExplainer::explain_instance`](crate::algorithms::LimeImageExplainer::explain_instance)
/// and exposes the visualization mask generator. Immutable after
/// construction.
#[derive(Debug, Clone)]
pub struct ImageExplanation {
    image: Image,
    segments: SegmentationMap,
    /// Labels ordered by descending reference-sample probability, filled in
    /// when `top_labels` was requested; empty otherwise.
    pub top_labels: Vec<usize>,
    explanations: HashMap<usize, LabelExplanation>,
}

impl ImageExplanation {
    pub(crate) fn new(
        image: Image,
        segments: SegmentationMap,
        top_labels: Vec<usize>,
        explanations: HashMap<usize, LabelExplanation>,
    ) -> Self {
        ImageExplanation {
            image,
            segments,
            top_labels,
            explanations,
        }
    }

    /// The image this explanation was produced for.
    pub fn image(&self) -> &Image {
        &self.image
    }

    /// The superpixel map the interpretable features are defined over.
    pub fn segments(&self) -> &SegmentationMap {
        &self.segments
    }

    /// Labels that were actually fit, in arbitrary order.
    pub fn labels(&self) -> Vec<usize> {
        self.explanations.keys().copied().collect()
    }

    /// Look up the surrogate fit for one label.
    ///
    /// Fails with `MissingLabel` if the label was never explained.
    pub fn label_explanation(&self, label: usize) -> Result<&LabelExplanation> {
        self.explanations
            .get(&label)
            .ok_or(LimeError::MissingLabel(label))
    }

    /// Build a visualization image and superpixel mask for one label.
    ///
    /// If `positive_only` is true, up to `num_features` superpixels with a
    /// positive weight strictly above `min_weight` are painted (in
    /// descending-weight order) into a blanked (`hide_rest`) or original
    /// background, and marked `1` in the mask.
    ///
    /// Otherwise the top `num_features` superpixels by absolute weight are
    /// walked, skipping any below `min_weight`; positive contributions are
    /// marked `2` in the mask with the red channel of the region saturated
    /// to the image's global maximum, negative ones are marked `1` with the
    /// blue channel saturated.
    ///
    /// Fails with `MissingLabel` if `label` was never explained.
    pub fn get_image_and_mask(
        &self,
        label: usize,
        positive_only: bool,
        hide_rest: bool,
        num_features: usize,
        min_weight: f64,
    ) -> Result<(Image, Array2<u8>)> {
        let exp = self.label_explanation(label)?;
        let (height, width) = self.segments.dim();
        let mut mask = Array2::<u8>::zeros((height, width));
        let mut temp = if hide_rest {
            Image::zeros(self.image.raw_dim())
        } else {
            self.image.clone()
        };

        if positive_only {
            let selected: Vec<usize> = exp
                .feature_weights
                .iter()
                .filter(|&&(_, weight)| weight > 0.0 && weight > min_weight)
                .take(num_features)
                .map(|&(feature, _)| feature)
                .collect();
            for feature in selected {
                for i in 0..height {
                    for j in 0..width {
                        if self.segments[[i, j]] == feature {
                            mask[[i, j]] = 1;
                            for c in 0..3 {
                                temp[[i, j, c]] = self.image[[i, j, c]];
                            }
                        }
                    }
                }
            }
            return Ok((temp, mask));
        }

        let max_pixel = self.image.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        for &(feature, weight) in exp.feature_weights.iter().take(num_features) {
            if weight.abs() < min_weight {
                continue;
            }
            // Red for positive contributions, blue for negative.
            let (mask_value, channel) = if weight < 0.0 { (1u8, 2) } else { (2u8, 0) };
            for i in 0..height {
                for j in 0..width {
                    if self.segments[[i, j]] == feature {
                        mask[[i, j]] = mask_value;
                        for c in 0..3 {
                            temp[[i, j, c]] = self.image[[i, j, c]];
                        }
                        temp[[i, j, channel]] = max_pixel;
                    }
                }
            }
        }
        Ok((temp, mask))
    }
}

impl fmt::Display for ImageExplanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ImageExplanation:")?;
        let mut labels = self.labels();
        labels.sort_unstable();
        for label in labels {
            let exp = &self.explanations[&label];
            writeln!(
                f,
                "  Label {}: intercept {:.4}, score {:.4}, local pred {:.4}",
                label, exp.intercept, exp.score, exp.local_pred
            )?;
            for (feature, weight) in exp.feature_weights.iter().take(10) {
                writeln!(f, "    Superpixel {}: {:.4}", feature, weight)?;
            }
            if exp.feature_weights.len() > 10 {
                writeln!(f, "    ...")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    // 4x4 image split into 4 quadrant superpixels.
    fn quadrant_explanation(weights: Vec<(usize, f64)>) -> ImageExplanation {
        let image = Image::from_elem((4, 4, 3), 100.0);
        let mut segments = Array2::<usize>::zeros((4, 4));
        for i in 0..4 {
            for j in 0..4 {
                segments[[i, j]] = (i / 2) * 2 + (j / 2);
            }
        }
        let mut explanations = HashMap::new();
        explanations.insert(
            0,
            LabelExplanation {
                intercept: 0.1,
                feature_weights: weights,
                score: 0.9,
                local_pred: 0.8,
            },
        );
        ImageExplanation::new(image, segments, vec![], explanations)
    }

    #[test]
    fn missing_label_lookup_fails() {
        let exp = quadrant_explanation(vec![(0, 0.5)]);
        assert!(exp.label_explanation(0).is_ok());
        match exp.label_explanation(3) {
            Err(LimeError::MissingLabel(3)) => {}
            other => panic!("expected MissingLabel(3), got {:?}", other),
        }
        match exp.get_image_and_mask(7, true, false, 5, 0.0) {
            Err(LimeError::MissingLabel(7)) => {}
            other => panic!("expected MissingLabel(7), got {:?}", other),
        }
    }

    #[test]
    fn positive_only_respects_num_features_and_min_weight() {
        let exp = quadrant_explanation(vec![(0, 0.9), (1, 0.5), (2, 0.05), (3, -0.7)]);
        // min_weight 0.1 excludes superpixel 2; num_features 1 keeps only
        // the strongest positive superpixel.
        let (_, mask) = exp.get_image_and_mask(0, true, true, 1, 0.1).unwrap();
        let marked: Vec<usize> = (0..4)
            .filter(|&f| {
                mask.indexed_iter()
                    .any(|((i, j), &v)| v == 1 && exp.segments()[[i, j]] == f)
            })
            .collect();
        assert_eq!(marked, vec![0]);
        // The negative superpixel never shows up in positive_only mode.
        let (_, mask) = exp.get_image_and_mask(0, true, true, 4, 0.0).unwrap();
        for ((i, j), &v) in mask.indexed_iter() {
            if exp.segments()[[i, j]] == 3 {
                assert_eq!(v, 0);
            }
        }
    }

    #[test]
    fn positive_only_hide_rest_blanks_background() {
        let exp = quadrant_explanation(vec![(0, 0.9), (3, -0.7)]);
        let (temp, mask) = exp.get_image_and_mask(0, true, true, 5, 0.0).unwrap();
        for ((i, j), &v) in mask.indexed_iter() {
            for c in 0..3 {
                if v == 1 {
                    assert_eq!(temp[[i, j, c]], 100.0);
                } else {
                    assert_eq!(temp[[i, j, c]], 0.0);
                }
            }
        }
    }

    #[test]
    fn dual_polarity_marks_and_saturates_channels() {
        let exp = quadrant_explanation(vec![(0, 0.9), (3, -0.7), (1, 0.01)]);
        let (temp, mask) = exp.get_image_and_mask(0, false, false, 2, 0.05).unwrap();
        // Quadrant 0 (top-left): positive -> mask 2, red channel saturated.
        assert_eq!(mask[[0, 0]], 2);
        assert_eq!(temp[[0, 0, 0]], 100.0); // global max of a flat image
        // Quadrant 3 (bottom-right): negative -> mask 1, blue channel saturated.
        assert_eq!(mask[[3, 3]], 1);
        assert_eq!(temp[[3, 3, 2]], 100.0);
        // Quadrant 1 fell below min_weight and is untouched.
        assert_eq!(mask[[0, 3]], 0);
    }
}
