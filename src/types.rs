use ndarray::Array2;

/// Binary acceptance mask, values restricted to {0, 1}, shape `(height, width)`.
pub type BinaryMask = Array2<u8>;

/// Segmentation map of integer region identifiers, shape `(height, width)`.
pub type SegmentationMap = Array2<i64>;

/// 1-based integer pixel address (FITS convention).
///
/// Coordinates produced by a transform may fall outside the grid they are
/// meant for, hence the signed type.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct PixelCoord {
    pub x: i64,
    pub y: i64,
}

impl PixelCoord {
    pub fn new(x: i64, y: i64) -> Self {
        PixelCoord { x, y }
    }
}

/// Celestial position in degrees.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct SkyCoord {
    pub ra: f64,
    pub dec: f64,
}

/// Pixel grid dimensions. Both axes are at least 1.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct GridShape {
    /// NAXIS1, number of columns.
    pub width: usize,
    /// NAXIS2, number of rows.
    pub height: usize,
}

impl GridShape {
    pub fn new(width: usize, height: usize) -> Self {
        GridShape { width, height }
    }

    /// Shape of this grid as an ndarray `(rows, cols)` pair.
    pub fn dim(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, coord: PixelCoord) -> bool {
        coord.x >= 1
            && coord.y >= 1
            && coord.x <= self.width as i64
            && coord.y <= self.height as i64
    }

    /// Zero-based `[row, col]` index of a coordinate inside this grid.
    pub fn index_of(&self, coord: PixelCoord) -> Option<[usize; 2]> {
        if self.contains(coord) {
            Some([(coord.y - 1) as usize, (coord.x - 1) as usize])
        } else {
            None
        }
    }
}
