// src/lib.rs

//! `lime_rs` is a Rust crate for LIME (Local Interpretable Model-agnostic
//! Explanations) on image classifiers: it explains one decision of an
//! opaque classifier by approximating its behavior near one image with a
//! sparse weighted linear model over superpixel regions.
//!
//! The engine turns the image into many partially-occluded variants
//! (constant-fill substitution or generative inpainting), drives the
//! classifier over them in batches, weights each variant by its kernel
//! similarity to the unperturbed image, and fits a local surrogate per
//! label. Segmentation, the classifier, the inpainting model, and (if
//! desired) the surrogate fitter are supplied by the caller through the
//! traits in [`traits`].
//!
//! ```ignore
//! use lime_rs::{ExplainOptions, LimeConfig, LimeImageExplainer};
//!
//! let mut explainer = LimeImageExplainer::new(None, Some(LimeConfig {
//!     random_seed: Some(0),
//!     ..LimeConfig::default()
//! }));
//! let explanation = explainer.explain_instance(
//!     &image,
//!     &classifier_fn,
//!     &segmentation_fn,
//!     ExplainOptions { top_labels: Some(5), ..ExplainOptions::default() },
//! )?;
//! let (vis, mask) = explanation.get_image_and_mask(label, true, false, 5, 0.0)?;
//! ```

// Declare the main modules of the crate
pub mod algorithms;
pub mod core;
pub mod traits;
pub mod utils;

// Re-export key components for easier use by library consumers
pub use crate::algorithms::{
    BatchedClassifierDriver, ConstantFillRenderer, DistanceMetric, ExplainOptions,
    InpaintRenderer, LimeConfig, LimeImageExplainer, OcclusionRenderer, OcclusionStrategy,
    RenderScene, RidgeSurrogate,
};
pub use crate::core::{
    DistanceVector, Image, ImageExplanation, LabelExplanation, LimeError, PerturbationMatrix,
    PredictionMatrix, Result, SegmentationMap,
};
pub use crate::traits::{
    ClassifierModel, FeatureSelection, InpaintModel, QuickshiftParams, RenderObserver,
    SegmentationProvider, SurrogateFitter,
};
pub use crate::utils::Normalization;
