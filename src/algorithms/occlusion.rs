// src/algorithms/occlusion.rs

use ndarray::{Array2, Array3, Array4, ArrayView1};

use crate::core::{Image, LimeError, Result, SegmentationMap};
use crate::traits::InpaintModel;
use crate::utils::{chw_to_hwc, hwc_to_chw, Normalization};

/// Boolean pixel mask for one perturbation row: true wherever the pixel's
/// superpixel ID was zeroed (excluded) in that row.
pub fn occluded_pixels(
    segments: &SegmentationMap,
    row: ArrayView1<f64>,
) -> Result<Array2<bool>> {
    let mut mask = Array2::from_elem(segments.raw_dim(), false);
    for ((i, j), &segment) in segments.indexed_iter() {
        if segment >= row.len() {
            return Err(LimeError::InvalidSegmentation(format!(
                "Superpixel ID {} is out of range for {} features.",
                segment,
                row.len()
            )));
        }
        if row[segment] == 0.0 {
            mask[[i, j]] = true;
        }
    }
    Ok(mask)
}

/// The fixed inputs every render of one explanation request shares.
pub struct RenderScene<'a> {
    /// The original image, 0..255 HWC.
    pub image: &'a Image,
    /// The precomputed constant-fill replacement image. Computed once per
    /// explanation request, immutable thereafter.
    pub fudged: &'a Image,
}

/// One of the two occlusion strategies, behind a single interface.
///
/// A render with no occluded pixel must return the original image exactly;
/// in particular the all-ones row 0 always renders to the identity image.
pub trait OcclusionRenderer {
    fn render(&self, scene: &RenderScene, occluded: &Array2<bool>) -> Result<Image>;

    /// Render a batch of masks. The default loops over `render`;
    /// strategies with expensive per-call setup override this to amortize.
    fn render_batch(&self, scene: &RenderScene, occluded: &[Array2<bool>]) -> Result<Vec<Image>> {
        occluded.iter().map(|mask| self.render(scene, mask)).collect()
    }
}

fn check_mask_shape(scene: &RenderScene, occluded: &Array2<bool>) -> Result<()> {
    let (height, width, _) = scene.image.dim();
    if occluded.dim() != (height, width) {
        return Err(LimeError::ShapeMismatch(format!(
            "Occlusion mask is {:?} but the image is {}x{}.",
            occluded.dim(),
            height,
            width
        )));
    }
    Ok(())
}

/// Substitutes the fudged image's pixels wherever a superpixel is occluded.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantFillRenderer;

impl OcclusionRenderer for ConstantFillRenderer {
    fn render(&self, scene: &RenderScene, occluded: &Array2<bool>) -> Result<Image> {
        check_mask_shape(scene, occluded)?;
        if scene.fudged.dim() != scene.image.dim() {
            return Err(LimeError::ShapeMismatch(format!(
                "Fudged image is {:?} but the image is {:?}.",
                scene.fudged.dim(),
                scene.image.dim()
            )));
        }
        if !occluded.iter().any(|&hidden| hidden) {
            return Ok(scene.image.clone());
        }
        let mut rendered = scene.image.clone();
        for ((i, j), &hidden) in occluded.indexed_iter() {
            if hidden {
                for c in 0..3 {
                    rendered[[i, j, c]] = scene.fudged[[i, j, c]];
                }
            }
        }
        Ok(rendered)
    }
}

/// Fills occluded regions through a generative inpainting model.
///
/// Works in the model's normalized CHW space: the keep masks (1 = keep the
/// original pixel) for a whole batch are stacked and handed to the model in
/// one call, the result is composited as
/// `original * keep + inpainted * (1 - keep)`, converted back to HWC
/// (channel-order correction), unnormalized per channel, and rescaled to
/// the 0..255 range.
pub struct InpaintRenderer<'a> {
    model: &'a dyn InpaintModel,
    normalization: Normalization,
}

impl<'a> InpaintRenderer<'a> {
    pub fn new(model: &'a dyn InpaintModel, normalization: Normalization) -> Self {
        InpaintRenderer {
            model,
            normalization,
        }
    }

    fn normalized_reference(&self, image: &Image) -> Array3<f64> {
        let mut chw = hwc_to_chw(&(image / 255.0));
        self.normalization.normalize_chw(&mut chw);
        chw
    }
}

impl<'a> OcclusionRenderer for InpaintRenderer<'a> {
    fn render(&self, scene: &RenderScene, occluded: &Array2<bool>) -> Result<Image> {
        let mut rendered = self.render_batch(scene, std::slice::from_ref(occluded))?;
        Ok(rendered.remove(0))
    }

    fn render_batch(&self, scene: &RenderScene, occluded: &[Array2<bool>]) -> Result<Vec<Image>> {
        for mask in occluded {
            check_mask_shape(scene, mask)?;
        }

        // Masks with nothing occluded render to the identity image and
        // never reach the model; only the rest get batched.
        let generated: Vec<usize> = occluded
            .iter()
            .enumerate()
            .filter(|(_, mask)| mask.iter().any(|&hidden| hidden))
            .map(|(idx, _)| idx)
            .collect();

        let mut rendered: Vec<Option<Image>> = occluded
            .iter()
            .map(|mask| {
                if mask.iter().any(|&hidden| hidden) {
                    None
                } else {
                    Some(scene.image.clone())
                }
            })
            .collect();

        if !generated.is_empty() {
            let reference = self.normalized_reference(scene.image);
            let (_, height, width) = reference.dim();
            let mut keep = Array4::zeros((generated.len(), 3, height, width));
            for (b, &idx) in generated.iter().enumerate() {
                for ((i, j), &hidden) in occluded[idx].indexed_iter() {
                    let keep_value = if hidden { 0.0 } else { 1.0 };
                    for c in 0..3 {
                        keep[[b, c, i, j]] = keep_value;
                    }
                }
            }

            let inpainted = self.model.generate_background(&reference, &keep)?;
            if inpainted.dim() != keep.dim() {
                return Err(LimeError::InpaintingError(format!(
                    "Inpainting model returned shape {:?}, expected {:?}.",
                    inpainted.dim(),
                    keep.dim()
                )));
            }

            for (b, &idx) in generated.iter().enumerate() {
                let mut composite = Array3::zeros((3, height, width));
                for c in 0..3 {
                    for i in 0..height {
                        for j in 0..width {
                            let k = keep[[b, c, i, j]];
                            composite[[c, i, j]] =
                                reference[[c, i, j]] * k + inpainted[[b, c, i, j]] * (1.0 - k);
                        }
                    }
                }
                let mut hwc = chw_to_hwc(&composite);
                self.normalization.unnormalize_hwc(&mut hwc);
                hwc.mapv_inplace(|x| (x * 255.0).clamp(0.0, 255.0));
                rendered[idx] = Some(hwc);
            }
        }

        rendered
            .into_iter()
            .map(|image| {
                image.ok_or_else(|| {
                    LimeError::InternalError("A rendered sample went missing.".to_string())
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2, Array4};

    fn quadrant_segments(size: usize) -> SegmentationMap {
        let mut segments = Array2::<usize>::zeros((size, size));
        let half = size / 2;
        for ((i, j), s) in segments.indexed_iter_mut() {
            *s = (i / half) * 2 + (j / half);
        }
        segments
    }

    #[test]
    fn occluded_pixels_follow_zeroed_features() {
        let segments = quadrant_segments(4);
        let row = array![1.0, 0.0, 1.0, 0.0];
        let mask = occluded_pixels(&segments, row.view()).unwrap();
        // Quadrants 1 (top-right) and 3 (bottom-right) are occluded.
        assert!(!mask[[0, 0]]);
        assert!(mask[[0, 3]]);
        assert!(!mask[[3, 0]]);
        assert!(mask[[3, 3]]);
        assert_eq!(mask.iter().filter(|&&m| m).count(), 8);
    }

    #[test]
    fn out_of_range_superpixel_id_is_invalid() {
        let mut segments = quadrant_segments(4);
        segments[[0, 0]] = 9;
        let row = array![1.0, 1.0, 1.0, 1.0];
        assert!(matches!(
            occluded_pixels(&segments, row.view()),
            Err(LimeError::InvalidSegmentation(_))
        ));
    }

    #[test]
    fn constant_fill_identity_for_all_ones() {
        let image = Image::from_elem((4, 4, 3), 120.0);
        let fudged = Image::from_elem((4, 4, 3), 0.0);
        let scene = RenderScene {
            image: &image,
            fudged: &fudged,
        };
        let mask = Array2::from_elem((4, 4), false);
        let rendered = ConstantFillRenderer.render(&scene, &mask).unwrap();
        assert_eq!(rendered, image);
    }

    #[test]
    fn constant_fill_substitutes_fudged_pixels() {
        let image = Image::from_elem((4, 4, 3), 120.0);
        let fudged = Image::from_elem((4, 4, 3), 7.0);
        let scene = RenderScene {
            image: &image,
            fudged: &fudged,
        };
        let segments = quadrant_segments(4);
        let row = array![0.0, 1.0, 1.0, 1.0];
        let mask = occluded_pixels(&segments, row.view()).unwrap();
        let rendered = ConstantFillRenderer.render(&scene, &mask).unwrap();
        for ((i, j), &hidden) in mask.indexed_iter() {
            for c in 0..3 {
                let expected = if hidden { 7.0 } else { 120.0 };
                assert_eq!(rendered[[i, j, c]], expected);
            }
        }
    }

    #[test]
    fn constant_fill_rejects_mismatched_fudged_shape() {
        let image = Image::from_elem((4, 4, 3), 120.0);
        let fudged = Image::from_elem((2, 2, 3), 0.0);
        let scene = RenderScene {
            image: &image,
            fudged: &fudged,
        };
        let mask = Array2::from_elem((4, 4), false);
        assert!(matches!(
            ConstantFillRenderer.render(&scene, &mask),
            Err(LimeError::ShapeMismatch(_))
        ));
    }

    // Inpainting model that paints every generated pixel with a fixed
    // normalized value.
    struct FlatInpaint(f64);

    impl InpaintModel for FlatInpaint {
        fn generate_background(
            &self,
            _reference: &Array3<f64>,
            keep_masks: &Array4<f64>,
        ) -> Result<Array4<f64>> {
            Ok(Array4::from_elem(keep_masks.raw_dim(), self.0))
        }
    }

    #[test]
    fn inpaint_identity_for_all_ones_is_exact() {
        let image = Image::from_elem((4, 4, 3), 120.0);
        let fudged = Image::from_elem((4, 4, 3), 0.0);
        let scene = RenderScene {
            image: &image,
            fudged: &fudged,
        };
        let model = FlatInpaint(0.0);
        let renderer = InpaintRenderer::new(&model, Normalization::default());
        let mask = Array2::from_elem((4, 4), false);
        let rendered = renderer.render(&scene, &mask).unwrap();
        assert_eq!(rendered, image);
    }

    #[test]
    fn inpaint_composites_and_unnormalizes() {
        let image = Image::from_elem((4, 4, 3), 102.0); // 0.4 once rescaled
        let fudged = Image::from_elem((4, 4, 3), 0.0);
        let scene = RenderScene {
            image: &image,
            fudged: &fudged,
        };
        let model = FlatInpaint(0.0);
        let norm = Normalization::default();
        let renderer = InpaintRenderer::new(&model, norm);

        let segments = quadrant_segments(4);
        let row = array![0.0, 1.0, 1.0, 1.0];
        let mask = occluded_pixels(&segments, row.view()).unwrap();
        let rendered = renderer.render(&scene, &mask).unwrap();

        for ((i, j), &hidden) in mask.indexed_iter() {
            for c in 0..3 {
                // A normalized value of 0 unnormalizes to the channel mean.
                let expected = if hidden { norm.means[c] * 255.0 } else { 102.0 };
                assert_abs_diff_eq!(rendered[[i, j, c]], expected, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn inpaint_batch_preserves_order_and_identity_rows() {
        let image = Image::from_elem((4, 4, 3), 102.0);
        let fudged = Image::from_elem((4, 4, 3), 0.0);
        let scene = RenderScene {
            image: &image,
            fudged: &fudged,
        };
        let model = FlatInpaint(0.0);
        let renderer = InpaintRenderer::new(&model, Normalization::default());

        let segments = quadrant_segments(4);
        let masks = vec![
            occluded_pixels(&segments, array![1.0, 1.0, 1.0, 1.0].view()).unwrap(),
            occluded_pixels(&segments, array![0.0, 1.0, 1.0, 1.0].view()).unwrap(),
            occluded_pixels(&segments, array![1.0, 1.0, 1.0, 1.0].view()).unwrap(),
        ];
        let rendered = renderer.render_batch(&scene, &masks).unwrap();
        assert_eq!(rendered.len(), 3);
        assert_eq!(rendered[0], image);
        assert_eq!(rendered[2], image);
        assert_ne!(rendered[1], image);
    }

    #[test]
    fn inpaint_shape_drift_is_an_error() {
        struct WrongShape;
        impl InpaintModel for WrongShape {
            fn generate_background(
                &self,
                _reference: &Array3<f64>,
                _keep_masks: &Array4<f64>,
            ) -> Result<Array4<f64>> {
                Ok(Array4::zeros((1, 3, 2, 2)))
            }
        }
        let image = Image::from_elem((4, 4, 3), 102.0);
        let fudged = Image::from_elem((4, 4, 3), 0.0);
        let scene = RenderScene {
            image: &image,
            fudged: &fudged,
        };
        let model = WrongShape;
        let renderer = InpaintRenderer::new(&model, Normalization::default());
        let segments = quadrant_segments(4);
        let mask = occluded_pixels(&segments, array![0.0, 1.0, 1.0, 1.0].view()).unwrap();
        assert!(matches!(
            renderer.render(&scene, &mask),
            Err(LimeError::InpaintingError(_))
        ));
    }
}
