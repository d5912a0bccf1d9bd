//! Blur-and-threshold refinement of binary masks.

use log::debug;
use ndarray::{Array2, ArrayView2};

use crate::error::{LightmapError, Result};
use crate::image::GridImage;
use crate::processing::convolve::convolve2d;
use crate::types::BinaryMask;

pub const DEFAULT_THRESHOLD: f64 = 0.1;

/// Slack for round-off in the convolution sums.
const SUM_TOLERANCE: f64 = 1e-12;

/// Blur kernel with non-negative weights normalized to sum to 1.
#[derive(Clone, Debug, PartialEq)]
pub struct Kernel {
    weights: Array2<f64>,
}

impl Kernel {
    /// Validate and normalize `weights`.
    pub fn new(weights: Array2<f64>) -> Result<Self> {
        let (rows, cols) = weights.dim();
        if rows == 0 || cols == 0 {
            return Err(LightmapError::InvalidKernel("kernel is empty".to_string()));
        }
        if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(LightmapError::InvalidKernel(format!(
                "weight {} is negative or not finite",
                bad
            )));
        }
        let sum = weights.sum();
        if sum <= 0.0 {
            return Err(LightmapError::InvalidKernel("weights sum to zero".to_string()));
        }
        debug!("Kernel {}x{} normalized from sum {}", cols, rows, sum);
        Ok(Kernel {
            weights: weights / sum,
        })
    }

    /// Kernel from the pixels of an image, e.g. a PSF stored as FITS.
    pub fn from_image<I: GridImage>(image: &I) -> Result<Self> {
        Kernel::new(image.pixels().to_owned())
    }

    /// `size` x `size` uniform kernel.
    pub fn boxcar(size: usize) -> Result<Self> {
        Kernel::new(Array2::ones((size, size)))
    }

    /// `size` x `size` Gaussian kernel with standard deviation `sigma` pixels.
    pub fn gaussian(size: usize, sigma: f64) -> Result<Self> {
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(LightmapError::InvalidKernel(format!(
                "sigma {} must be positive",
                sigma
            )));
        }
        let center = (size as f64 - 1.0) / 2.0;
        let two_sigma_sq = 2.0 * sigma * sigma;
        let weights = Array2::from_shape_fn((size, size), |(y, x)| {
            let dy = y as f64 - center;
            let dx = x as f64 - center;
            (-(dx * dx + dy * dy) / two_sigma_sq).exp()
        });
        Kernel::new(weights)
    }

    pub fn weights(&self) -> ArrayView2<'_, f64> {
        self.weights.view()
    }

    /// `(rows, cols)`
    pub fn dim(&self) -> (usize, usize) {
        self.weights.dim()
    }
}

fn check_threshold(threshold: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(LightmapError::InvalidThreshold(threshold))
    }
}

/// Grows a mask with a smooth falloff, then re-binarizes it.
///
/// A pixel is kept when the convolved value is positive and reaches the
/// threshold to within `1e-12`, so round-off in the kernel sums cannot drop
/// a pixel that sits exactly on the threshold (e.g. a fully covered pixel at
/// threshold 1). At threshold 0 any nonzero influence keeps the pixel.
#[derive(Clone, Debug)]
pub struct MaskRefiner {
    kernel: Kernel,
    threshold: f64,
}

impl MaskRefiner {
    pub fn new(kernel: Kernel) -> Self {
        MaskRefiner {
            kernel,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Result<Self> {
        self.threshold = check_threshold(threshold)?;
        Ok(self)
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Convolved, still real-valued mask. Input values > 0 count as 1.
    pub fn smooth(&self, mask: ArrayView2<u8>) -> Result<Array2<f64>> {
        let (mask_height, mask_width) = mask.dim();
        let (kernel_height, kernel_width) = self.kernel.dim();
        if kernel_height > mask_height || kernel_width > mask_width {
            return Err(LightmapError::ShapeMismatch {
                kernel_width,
                kernel_height,
                mask_width,
                mask_height,
            });
        }

        let input = mask.mapv(|v| if v > 0 { 1.0 } else { 0.0 });
        Ok(convolve2d(input.view(), self.kernel.weights()))
    }

    pub fn refine(&self, mask: ArrayView2<u8>) -> Result<BinaryMask> {
        let smoothed = self.smooth(mask)?;
        let threshold = self.threshold;
        Ok(smoothed.mapv(|v| (v > 0.0 && v + SUM_TOLERANCE >= threshold) as u8))
    }
}

/// Normalize `kernel`, convolve `mask` with it and keep pixels at or above `threshold`.
pub fn blur_mask(
    mask: ArrayView2<u8>,
    kernel: ArrayView2<f64>,
    threshold: f64,
) -> Result<BinaryMask> {
    let threshold = check_threshold(threshold)?;
    MaskRefiner::new(Kernel::new(kernel.to_owned())?)
        .with_threshold(threshold)?
        .refine(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn dot(size: usize, at: (usize, usize)) -> BinaryMask {
        let mut mask = Array2::zeros((size, size));
        mask[[at.0, at.1]] = 1;
        mask
    }

    #[test]
    fn test_kernel_is_normalized() {
        let kernel = Kernel::new(array![[1.0, 2.0], [3.0, 4.0]]).unwrap();
        assert!((kernel.weights().sum() - 1.0).abs() < 1e-12);
        assert_eq!(kernel.weights()[[1, 1]], 0.4);

        let gauss = Kernel::gaussian(5, 1.2).unwrap();
        assert!((gauss.weights().sum() - 1.0).abs() < 1e-12);
        assert!(gauss.weights()[[2, 2]] > gauss.weights()[[0, 0]]);
    }

    #[test]
    fn test_invalid_kernels() {
        assert!(matches!(
            Kernel::new(Array2::zeros((3, 3))),
            Err(LightmapError::InvalidKernel(_))
        ));
        assert!(Kernel::new(array![[1.0, -0.5]]).is_err());
        assert!(Kernel::new(array![[1.0, f64::NAN]]).is_err());
        assert!(Kernel::new(Array2::zeros((0, 3))).is_err());
        assert!(Kernel::gaussian(3, 0.0).is_err());
    }

    #[test]
    fn test_threshold_range() {
        let mask = dot(5, (2, 2));
        let k = Array2::ones((3, 3));
        for t in [-0.1, 1.01, f64::NAN] {
            assert!(matches!(
                blur_mask(mask.view(), k.view(), t),
                Err(LightmapError::InvalidThreshold(_))
            ));
        }
        assert!(blur_mask(mask.view(), k.view(), 0.0).is_ok());
        assert!(blur_mask(mask.view(), k.view(), 1.0).is_ok());
    }

    #[test]
    fn test_kernel_larger_than_mask() {
        let mask = dot(3, (1, 1));
        let k = Array2::ones((5, 1));
        assert!(matches!(
            blur_mask(mask.view(), k.view(), 0.1),
            Err(LightmapError::ShapeMismatch {
                kernel_height: 5,
                mask_height: 3,
                ..
            })
        ));
    }

    #[test]
    fn test_blur_grows_a_point() {
        let mask = dot(5, (2, 2));
        let k = Array2::ones((3, 3));

        // Every neighbour gets 1/9 of the point.
        let grown = blur_mask(mask.view(), k.view(), 0.1).unwrap();
        let mut expected = Array2::<u8>::zeros((5, 5));
        expected.slice_mut(ndarray::s![1..4, 1..4]).fill(1);
        assert_eq!(grown, expected);

        // 1/9 < 0.2: nothing survives.
        let gone = blur_mask(mask.view(), k.view(), 0.2).unwrap();
        assert!(gone.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_blur_closes_a_gap() {
        let mut mask = Array2::<u8>::ones((5, 5));
        mask[[2, 2]] = 0;
        let closed = blur_mask(mask.view(), Array2::ones((3, 3)).view(), 0.5).unwrap();
        assert_eq!(closed[[2, 2]], 1);
    }

    #[test]
    fn test_threshold_zero_means_any_influence() {
        let mask = dot(7, (3, 3));
        let refined = blur_mask(mask.view(), Array2::ones((3, 3)).view(), 0.0).unwrap();
        assert_eq!(refined.iter().filter(|&&v| v == 1).count(), 9);
        assert_eq!(refined[[0, 0]], 0);

        // Already-grown masks are stable at threshold 0 once fully influenced.
        let full = Array2::<u8>::ones((4, 4));
        let again = blur_mask(full.view(), Array2::ones((3, 3)).view(), 0.0).unwrap();
        assert_eq!(again, full);
    }

    #[test]
    fn test_threshold_one_keeps_fully_covered_pixels() {
        let mask = Array2::<u8>::ones((5, 5));
        let refined = blur_mask(mask.view(), Array2::ones((3, 3)).view(), 1.0).unwrap();
        // Interior pixels are fully covered; edge pixels see zero padding.
        assert_eq!(refined[[2, 2]], 1);
        assert_eq!(refined[[0, 2]], 0);
    }

    #[test]
    fn test_raising_threshold_never_adds_pixels() {
        let mask = array![
            [0u8, 1, 0, 0, 0, 0],
            [1, 1, 0, 0, 1, 0],
            [0, 0, 0, 1, 1, 0],
            [0, 0, 0, 0, 0, 0],
            [1, 0, 0, 0, 0, 1],
        ];
        let k = Kernel::gaussian(3, 0.8).unwrap();
        let mut previous: Option<BinaryMask> = None;
        for t in [0.0, 0.05, 0.1, 0.2, 0.4, 0.6, 0.8, 1.0] {
            let refined = MaskRefiner::new(k.clone())
                .with_threshold(t)
                .unwrap()
                .refine(mask.view())
                .unwrap();
            assert!(refined.iter().all(|&v| v <= 1));
            if let Some(prev) = &previous {
                assert!(prev.iter().zip(refined.iter()).all(|(&a, &b)| b <= a));
            }
            previous = Some(refined);
        }
    }

    #[test]
    fn test_threshold_tolerance_is_tiny() {
        // A 4x4 boxcar gives 1/16 = 0.0625 per neighbour of a point.
        let mask = dot(9, (4, 4));
        let k = Array2::ones((4, 4));
        let kept = blur_mask(mask.view(), k.view(), 0.0625).unwrap();
        assert_eq!(kept.iter().filter(|&&v| v == 1).count(), 16);
        let dropped = blur_mask(mask.view(), k.view(), 0.0625 + 1e-9).unwrap();
        assert!(dropped.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_refine_does_not_touch_input() {
        let mask = dot(5, (2, 2));
        let before = mask.clone();
        let _ = MaskRefiner::new(Kernel::boxcar(3).unwrap()).refine(mask.view());
        assert_eq!(mask, before);
    }
}
