pub mod lime_image;
pub mod neighborhood;
pub mod occlusion;
pub mod ridge;

pub use lime_image::{ExplainOptions, LimeConfig, LimeImageExplainer, OcclusionStrategy};
pub use neighborhood::{
    distances_to_reference, kernel_weights, sample_perturbations, BatchedClassifierDriver,
    DistanceMetric,
};
pub use occlusion::{
    occluded_pixels, ConstantFillRenderer, InpaintRenderer, OcclusionRenderer, RenderScene,
};
pub use ridge::RidgeSurrogate;
