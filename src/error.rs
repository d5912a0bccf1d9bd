use thiserror::Error;

/// Errors raised by the mask pipeline.
///
/// Out-of-bounds transformed coordinates, collisions and empty keep-sets are
/// not errors and never show up here.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LightmapError {
    /// An image has no usable sky calibration.
    #[error("Missing sky calibration: {0}")]
    MissingCalibration(String),

    /// A grid dimension is missing, non-positive or inconsistent with the pixel data.
    #[error("Invalid grid dimension {axis}={value}")]
    Dimension { axis: &'static str, value: i64 },

    /// Kernel cannot be applied to the mask.
    #[error("Kernel {kernel_width}x{kernel_height} does not fit mask {mask_width}x{mask_height}")]
    ShapeMismatch {
        kernel_width: usize,
        kernel_height: usize,
        mask_width: usize,
        mask_height: usize,
    },

    /// Threshold outside `[0, 1]` (or NaN).
    #[error("Threshold {0} outside [0, 1]")]
    InvalidThreshold(f64),

    /// Kernel weights are negative, non-finite or sum to zero.
    #[error("Invalid kernel: {0}")]
    InvalidKernel(String),
}

impl LightmapError {
    /// True for missing/invalid grid metadata or calibration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            LightmapError::MissingCalibration(_) | LightmapError::Dimension { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, LightmapError>;
