use ndarray::ArrayView2;

use crate::error::{LightmapError, Result};
use crate::formats::{FitsImage, Header};
use crate::types::GridShape;
use crate::wcs::TanWcs;

/// A pixel grid with a sky calibration. Enough to serve as a drizzle destination.
pub trait CalibratedGrid {
    type Calibration: crate::wcs::SkyCalibration;

    fn shape(&self) -> Result<GridShape>;

    fn calibration(&self) -> Result<Self::Calibration>;
}

/// A calibrated grid that also carries pixel values.
pub trait GridImage: CalibratedGrid {
    /// Pixels as `(height, width)`.
    fn pixels(&self) -> ArrayView2<'_, f64>;

    /// Grid shape, checked against the pixel array.
    fn checked_shape(&self) -> Result<GridShape> {
        let shape = self.shape()?;
        let (rows, cols) = self.pixels().dim();
        if cols != shape.width {
            return Err(LightmapError::Dimension {
                axis: "NAXIS1",
                value: cols as i64,
            });
        }
        if rows != shape.height {
            return Err(LightmapError::Dimension {
                axis: "NAXIS2",
                value: rows as i64,
            });
        }
        Ok(shape)
    }
}

impl CalibratedGrid for Header {
    type Calibration = TanWcs;

    fn shape(&self) -> Result<GridShape> {
        Header::shape(self)
    }

    fn calibration(&self) -> Result<TanWcs> {
        TanWcs::from_header(self)
    }
}

impl CalibratedGrid for FitsImage {
    type Calibration = TanWcs;

    fn shape(&self) -> Result<GridShape> {
        self.header.shape()
    }

    fn calibration(&self) -> Result<TanWcs> {
        TanWcs::from_header(&self.header)
    }
}

impl GridImage for FitsImage {
    fn pixels(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }
}
