// src/utils.rs

use ndarray::{Array2, Array3};

use crate::core::{Image, LimeError, Result};

/// Expand a 2d grayscale array into a 3-channel image by channel
/// replication.
pub fn gray_to_rgb(gray: &Array2<f64>) -> Image {
    let (height, width) = gray.dim();
    let mut rgb = Image::zeros((height, width, 3));
    for ((i, j), &value) in gray.indexed_iter() {
        for c in 0..3 {
            rgb[[i, j, c]] = value;
        }
    }
    rgb
}

/// Coerce an image to 3 channels.
///
/// Single-channel images are replicated across RGB; anything other than 1
/// or 3 channels is a shape error.
pub fn ensure_rgb(image: &Image) -> Result<Image> {
    match image.dim().2 {
        3 => Ok(image.clone()),
        1 => {
            let gray = image.index_axis(ndarray::Axis(2), 0).to_owned();
            Ok(gray_to_rgb(&gray))
        }
        channels => Err(LimeError::ShapeMismatch(format!(
            "Expected a 1- or 3-channel image, got {} channels.",
            channels
        ))),
    }
}

/// Permute a height x width x channel image into channel x height x width.
pub fn hwc_to_chw(image: &Image) -> Array3<f64> {
    image.view().permuted_axes([2, 0, 1]).to_owned()
}

/// Permute a channel x height x width array back to height x width x channel.
pub fn chw_to_hwc(image: &Array3<f64>) -> Image {
    image.view().permuted_axes([1, 2, 0]).to_owned()
}

/// Per-channel mean/std statistics for torch-style input normalization.
///
/// Defaults to the ImageNet statistics the inpainting pipeline was trained
/// against.
#[derive(Debug, Clone, Copy)]
pub struct Normalization {
    pub means: [f64; 3],
    pub stds: [f64; 3],
}

impl Default for Normalization {
    fn default() -> Self {
        Normalization {
            means: [0.485, 0.456, 0.406],
            stds: [0.229, 0.224, 0.225],
        }
    }
}

impl Normalization {
    /// Apply `(x - mean) / std` per channel to a CHW array in 0..1 scale.
    pub fn normalize_chw(&self, chw: &mut Array3<f64>) {
        for (c, mut channel) in chw.outer_iter_mut().enumerate() {
            channel.mapv_inplace(|x| (x - self.means[c]) / self.stds[c]);
        }
    }

    /// Reverse the normalization on an HWC image: `x * std + mean` per
    /// channel, back to 0..1 scale.
    pub fn unnormalize_hwc(&self, hwc: &mut Image) {
        for ((_, _, c), value) in hwc.indexed_iter_mut() {
            *value = *value * self.stds[c] + self.means[c];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn gray_to_rgb_replicates_channels() {
        let gray = array![[0.0, 0.5], [1.0, 0.25]];
        let rgb = gray_to_rgb(&gray);
        assert_eq!(rgb.dim(), (2, 2, 3));
        for c in 0..3 {
            assert_eq!(rgb[[0, 1, c]], 0.5);
            assert_eq!(rgb[[1, 0, c]], 1.0);
        }
    }

    #[test]
    fn ensure_rgb_coerces_and_rejects() {
        let gray = Image::from_elem((2, 2, 1), 0.3);
        let rgb = ensure_rgb(&gray).unwrap();
        assert_eq!(rgb.dim(), (2, 2, 3));
        assert_eq!(rgb[[1, 1, 2]], 0.3);

        let rgb_in = Image::from_elem((2, 2, 3), 0.7);
        assert_eq!(ensure_rgb(&rgb_in).unwrap(), rgb_in);

        let bad = Image::from_elem((2, 2, 4), 0.0);
        assert!(matches!(
            ensure_rgb(&bad),
            Err(crate::core::LimeError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn layout_round_trip() {
        let mut hwc = Image::zeros((2, 3, 3));
        for ((i, j, c), v) in hwc.indexed_iter_mut() {
            *v = (i * 100 + j * 10 + c) as f64;
        }
        let chw = hwc_to_chw(&hwc);
        assert_eq!(chw.dim(), (3, 2, 3));
        assert_eq!(chw[[2, 1, 0]], hwc[[1, 0, 2]]);
        assert_eq!(chw_to_hwc(&chw), hwc);
    }

    #[test]
    fn normalization_round_trip() {
        let norm = Normalization::default();
        let hwc = Image::from_elem((2, 2, 3), 0.5);
        let mut chw = hwc_to_chw(&hwc);
        norm.normalize_chw(&mut chw);
        assert_abs_diff_eq!(chw[[0, 0, 0]], (0.5 - 0.485) / 0.229, epsilon = 1e-12);
        let mut back = chw_to_hwc(&chw);
        norm.unnormalize_hwc(&mut back);
        for v in back.iter() {
            assert_abs_diff_eq!(*v, 0.5, epsilon = 1e-12);
        }
    }
}
