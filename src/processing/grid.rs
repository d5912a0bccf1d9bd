use crate::types::{GridShape, PixelCoord};

/// Every 1-based coordinate of `shape`, rows outer and columns inner.
///
/// Index `i` of the result addresses row `i / width`, column `i % width`,
/// the same order as a standard-layout `(height, width)` array.
pub fn pixel_grid(shape: GridShape) -> Vec<PixelCoord> {
    let mut coords = Vec::with_capacity(shape.len());
    for y in 1..=shape.height as i64 {
        for x in 1..=shape.width as i64 {
            coords.push(PixelCoord::new(x, y));
        }
    }
    coords
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_pixel_grid_order() {
        let coords = pixel_grid(GridShape::new(3, 2));
        assert_eq!(
            coords,
            vec![
                PixelCoord::new(1, 1),
                PixelCoord::new(2, 1),
                PixelCoord::new(3, 1),
                PixelCoord::new(1, 2),
                PixelCoord::new(2, 2),
                PixelCoord::new(3, 2),
            ]
        );
    }

    #[test]
    fn test_pixel_grid_covers_each_pixel_once() {
        let shape = GridShape::new(17, 5);
        let coords = pixel_grid(shape);
        assert_eq!(coords.len(), 85);
        let unique: HashSet<_> = coords.iter().copied().collect();
        assert_eq!(unique.len(), 85);
        assert!(coords.iter().all(|&c| shape.contains(c)));
    }
}
