// src/traits.rs

use ndarray::{Array3, Array4, ArrayView1};

use crate::core::{
    Image, LabelExplanation, PerturbationMatrix, PredictionMatrix, Result, SegmentationMap,
};

/// The opaque classifier under explanation.
///
/// Takes a batch of rendered images and returns one row of class
/// probabilities per image, in input order. Must accept arbitrary batch
/// sizes, including 1: the batched driver chooses batch boundaries freely
/// and the diagnostic side channel issues single-image calls.
pub trait ClassifierModel {
    fn predict(&self, images: &[Image]) -> Result<PredictionMatrix>;
}

impl<F> ClassifierModel for F
where
    F: Fn(&[Image]) -> Result<PredictionMatrix>,
{
    fn predict(&self, images: &[Image]) -> Result<PredictionMatrix> {
        self(images)
    }
}

/// Maps an image to a superpixel label map.
///
/// Segmentation is an external collaborator; the crate only validates its
/// output. `random_seed` is drawn from the explainer's RNG when the caller
/// did not pin one, so seed-sensitive algorithms (e.g. quickshift) stay
/// reproducible under an explainer seed. Seed-insensitive implementations
/// are free to ignore it.
pub trait SegmentationProvider {
    fn segment(&self, image: &Image, random_seed: u64) -> Result<SegmentationMap>;
}

impl<F> SegmentationProvider for F
where
    F: Fn(&Image, u64) -> Result<SegmentationMap>,
{
    fn segment(&self, image: &Image, random_seed: u64) -> Result<SegmentationMap> {
        self(image, random_seed)
    }
}

/// Parameters for wiring an external quickshift-style segmenter.
///
/// The crate does not implement quickshift itself; this struct carries the
/// conventional defaults for callers that do.
#[derive(Debug, Clone, Copy)]
pub struct QuickshiftParams {
    pub kernel_size: f64,
    pub max_dist: f64,
    pub ratio: f64,
}

impl Default for QuickshiftParams {
    fn default() -> Self {
        QuickshiftParams {
            kernel_size: 4.0,
            max_dist: 200.0,
            ratio: 0.2,
        }
    }
}

/// A generative model that synthesizes plausible content for occluded
/// regions.
///
/// Operates in normalized CHW space, the native layout of the torch-style
/// models this mirrors. `reference` is the normalized 3 x h x w original;
/// `keep_masks` is batch x 3 x h x w with 1 where the original pixel is
/// kept and 0 where content must be generated. Invoked once per batch.
/// Returns a batch of normalized CHW images; compositing with the keep
/// masks is the renderer's job.
pub trait InpaintModel {
    fn generate_background(
        &self,
        reference: &Array3<f64>,
        keep_masks: &Array4<f64>,
    ) -> Result<Array4<f64>>;
}

/// Fits the local surrogate model for one label.
///
/// `data` is the full perturbation matrix, `target` the prediction column
/// for `label`, and `sample_weights` the kernel weights already derived
/// from the distance vector. Returns the intercept, the (superpixel,
/// weight) list sorted by descending absolute weight, the local fidelity
/// score, and the surrogate's prediction at the reference sample.
pub trait SurrogateFitter {
    fn fit(
        &self,
        data: &PerturbationMatrix,
        target: ArrayView1<f64>,
        sample_weights: ArrayView1<f64>,
        label: usize,
        num_features: usize,
        feature_selection: FeatureSelection,
    ) -> Result<LabelExplanation>;
}

/// Feature selection strategy handed through to the surrogate fitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureSelection {
    /// Use all features when few enough, otherwise fall back to
    /// `HighestWeights`.
    Auto,
    /// Keep every feature.
    None,
    /// Pre-fit on all features and keep the top `num_features` by absolute
    /// coefficient.
    HighestWeights,
    /// Greedy forward selection by weighted residual improvement.
    ForwardSelection,
    /// Lasso regularization path. Not provided by the built-in ridge
    /// fitter; callers supply their own `SurrogateFitter` for it.
    LassoPath,
}

/// Optional diagnostic observer, called once per rendered neighborhood
/// sample with a dedicated single-image prediction.
///
/// This is a side channel for callers that want to dump or inspect
/// intermediate renders; it never feeds the primary ordered prediction
/// stream.
pub trait RenderObserver {
    fn on_render(&mut self, sample_index: usize, image: &Image, prediction: ArrayView1<f64>);
}
