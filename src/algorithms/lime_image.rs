// src/algorithms/lime_image.rs

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::algorithms::neighborhood::{
    distances_to_reference, kernel_weights, sample_perturbations, BatchedClassifierDriver,
    DistanceMetric,
};
use crate::algorithms::occlusion::{
    occluded_pixels, ConstantFillRenderer, InpaintRenderer, OcclusionRenderer, RenderScene,
};
use crate::algorithms::ridge::RidgeSurrogate;
use crate::core::{
    Image, ImageExplanation, LimeError, PerturbationMatrix, PredictionMatrix, Result,
    SegmentationMap,
};
use crate::traits::{
    ClassifierModel, FeatureSelection, InpaintModel, RenderObserver, SegmentationProvider,
    SurrogateFitter,
};
use crate::utils::{ensure_rgb, Normalization};

/// Configuration for the image explainer.
#[derive(Debug, Clone)]
pub struct LimeConfig {
    /// Width of the exponential distance kernel.
    pub kernel_width: f64,
    /// Feature selection strategy handed to the surrogate fitter.
    pub feature_selection: FeatureSelection,
    /// Seed for the explainer-owned RNG. `None` seeds from entropy; pin it
    /// for reproducible explanations.
    pub random_seed: Option<u64>,
}

impl Default for LimeConfig {
    fn default() -> Self {
        LimeConfig {
            kernel_width: 0.25,
            feature_selection: FeatureSelection::Auto,
            random_seed: None,
        }
    }
}

/// How occluded superpixels are filled when rendering perturbed variants.
pub enum OcclusionStrategy<'a> {
    /// Substitute pixels from the precomputed fudged image.
    ConstantFill,
    /// Synthesize plausible content with a generative inpainting model.
    Inpaint {
        model: &'a dyn InpaintModel,
        normalization: Normalization,
    },
}

impl Default for OcclusionStrategy<'_> {
    fn default() -> Self {
        OcclusionStrategy::ConstantFill
    }
}

/// Per-call options for [`LimeImageExplainer::explain_instance`].
pub struct ExplainOptions<'a> {
    /// Labels to explain. Ignored when `top_labels` is set.
    pub labels: Vec<usize>,
    /// Explain the K labels with the highest reference-sample probability
    /// instead of `labels`.
    pub top_labels: Option<usize>,
    /// Constant fill color for occluded superpixels. `None` uses the
    /// ImageNet-mean gray.
    pub hide_color: Option<[f64; 3]>,
    /// Maximum number of superpixels in each explanation.
    pub num_features: usize,
    /// Size of the perturbation neighborhood.
    pub num_samples: usize,
    /// Classifier (and inpainting) calls are batched to this size.
    pub batch_size: usize,
    pub distance_metric: DistanceMetric,
    /// Seed forwarded to the segmentation provider. `None` draws one in
    /// 0..1000 from the explainer RNG.
    pub segmentation_seed: Option<u64>,
    pub occlusion: OcclusionStrategy<'a>,
    /// Optional diagnostic callback, invoked once per rendered sample.
    pub observer: Option<&'a mut dyn RenderObserver>,
}

impl Default for ExplainOptions<'_> {
    fn default() -> Self {
        ExplainOptions {
            labels: vec![1],
            top_labels: Some(5),
            hide_color: None,
            num_features: 100_000,
            num_samples: 1000,
            batch_size: 10,
            distance_metric: DistanceMetric::Cosine,
            segmentation_seed: None,
            occlusion: OcclusionStrategy::ConstantFill,
            observer: None,
        }
    }
}

/// Explains predictions of an opaque image classifier.
///
/// One instance owns one RNG; a single `explain_instance` call consumes it
/// sequentially (segmentation seed draw first, then the neighborhood
/// sampling), so explanations are reproducible under a pinned
/// `random_seed`. `explain_instance` takes `&mut self`, which keeps the RNG
/// from being shared across concurrent explanation requests.
pub struct LimeImageExplainer {
    fitter: Box<dyn SurrogateFitter>,
    kernel_width: f64,
    feature_selection: FeatureSelection,
    rng: StdRng,
}

impl LimeImageExplainer {
    /// Create an explainer. `fitter` defaults to weighted ridge regression
    /// when `None`.
    pub fn new(fitter: Option<Box<dyn SurrogateFitter>>, config: Option<LimeConfig>) -> Self {
        let config = config.unwrap_or_default();
        let rng = match config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        LimeImageExplainer {
            fitter: fitter.unwrap_or_else(|| Box::new(RidgeSurrogate::default())),
            kernel_width: config.kernel_width,
            feature_selection: config.feature_selection,
            rng,
        }
    }

    /// Generate a local explanation for one image.
    ///
    /// Builds a perturbation neighborhood around the image, renders each
    /// sample under the selected occlusion strategy, drives the classifier
    /// over the renders in batches, weights each sample by its kernel
    /// similarity to the unperturbed reference, and fits one surrogate per
    /// requested label.
    pub fn explain_instance<C, S>(
        &mut self,
        image: &Image,
        classifier: &C,
        segmentation: &S,
        mut options: ExplainOptions<'_>,
    ) -> Result<ImageExplanation>
    where
        C: ClassifierModel + ?Sized,
        S: SegmentationProvider + ?Sized,
    {
        let image = ensure_rgb(image)?;

        // The segmentation seed draw comes before sampling; both consume
        // the explainer RNG in a fixed order.
        let seed = match options.segmentation_seed {
            Some(seed) => seed,
            None => self.rng.gen_range(0..1000),
        };
        let segments = segmentation.segment(&image, seed)?;
        let n_features = validate_segments(&image, &segments)?;

        let fudged = build_fudged_image(&image, options.hide_color);

        let data = sample_perturbations(&mut self.rng, options.num_samples, n_features)?;

        let driver = BatchedClassifierDriver::new(options.batch_size)?;
        let scene = RenderScene {
            image: &image,
            fudged: &fudged,
        };
        let rendered = match &options.occlusion {
            OcclusionStrategy::ConstantFill => render_rows(
                &ConstantFillRenderer,
                &scene,
                &segments,
                &data,
                options.batch_size,
            )?,
            OcclusionStrategy::Inpaint {
                model,
                normalization,
            } => {
                let renderer = InpaintRenderer::new(*model, *normalization);
                render_rows(&renderer, &scene, &segments, &data, options.batch_size)?
            }
        };

        // Diagnostic side channel: one dedicated single-image classifier
        // call per render. Never feeds the primary prediction stream.
        if let Some(observer) = options.observer.as_mut() {
            for (index, render) in rendered.iter().enumerate() {
                let prediction = classifier.predict(std::slice::from_ref(render))?;
                observer.on_render(index, render, prediction.row(0));
            }
        }

        let predictions = driver.predict_ordered(classifier, &rendered)?;

        let distances = distances_to_reference(&data, options.distance_metric);
        let weights = kernel_weights(&distances, self.kernel_width);

        let mut labels_to_fit = options.labels.clone();
        let mut top_labels = Vec::new();
        if let Some(k) = options.top_labels {
            top_labels = top_labels_by_probability(&predictions, k);
            labels_to_fit = top_labels.clone();
        }

        let mut explanations = HashMap::new();
        for &label in &labels_to_fit {
            if label >= predictions.ncols() {
                return Err(LimeError::InvalidInput(format!(
                    "Label {} is out of range for {} classes.",
                    label,
                    predictions.ncols()
                )));
            }
            let fit = self.fitter.fit(
                &data,
                predictions.column(label),
                weights.view(),
                label,
                options.num_features,
                self.feature_selection,
            )?;
            explanations.insert(label, fit);
        }

        Ok(ImageExplanation::new(image, segments, top_labels, explanations))
    }
}

/// Check the label map against the image and count interpretable features.
/// IDs must cover the contiguous range `0..n_features`.
fn validate_segments(image: &Image, segments: &SegmentationMap) -> Result<usize> {
    let (height, width, _) = image.dim();
    if segments.dim() != (height, width) {
        return Err(LimeError::ShapeMismatch(format!(
            "Segmentation map is {:?} but the image is {}x{}.",
            segments.dim(),
            height,
            width
        )));
    }
    let max_id = match segments.iter().copied().max() {
        Some(max_id) => max_id,
        None => {
            return Err(LimeError::InvalidSegmentation(
                "Segmentation map is empty.".to_string(),
            ))
        }
    };
    let n_features = max_id + 1;
    let mut seen = vec![false; n_features];
    for &segment in segments.iter() {
        seen[segment] = true;
    }
    if seen.iter().any(|&present| !present) {
        return Err(LimeError::InvalidSegmentation(
            "Superpixel IDs must form a contiguous range starting at 0.".to_string(),
        ));
    }
    Ok(n_features)
}

/// The constant-fill replacement image, computed once per request.
fn build_fudged_image(image: &Image, hide_color: Option<[f64; 3]>) -> Image {
    let fill = hide_color.unwrap_or([255.0 * 0.485, 255.0 * 0.456, 255.0 * 0.406]);
    let mut fudged = Image::zeros(image.raw_dim());
    for ((_, _, c), value) in fudged.indexed_iter_mut() {
        *value = fill[c];
    }
    fudged
}

/// Render every perturbation row, in row order, chunked to `batch_size`
/// so the inpainting strategy can amortize its model calls.
fn render_rows<R: OcclusionRenderer + ?Sized>(
    renderer: &R,
    scene: &RenderScene,
    segments: &SegmentationMap,
    data: &PerturbationMatrix,
    batch_size: usize,
) -> Result<Vec<Image>> {
    let mut masks = Vec::with_capacity(data.nrows());
    for row in data.rows() {
        masks.push(occluded_pixels(segments, row)?);
    }
    let mut rendered = Vec::with_capacity(masks.len());
    for chunk in masks.chunks(batch_size) {
        rendered.extend(renderer.render_batch(scene, chunk)?);
    }
    Ok(rendered)
}

/// The K labels with the highest reference-sample probability, descending.
fn top_labels_by_probability(predictions: &PredictionMatrix, k: usize) -> Vec<usize> {
    let reference = predictions.row(0);
    let mut indices: Vec<usize> = (0..reference.len()).collect();
    indices.sort_by(|&a, &b| {
        reference[b]
            .partial_cmp(&reference[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    indices.truncate(k);
    indices
}
