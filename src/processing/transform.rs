use crate::error::Result;
use crate::image::CalibratedGrid;
use crate::processing::grid::pixel_grid;
use crate::types::PixelCoord;
use crate::wcs::SkyCalibration;

/// Nearest-integer rounding used for every transformed coordinate.
///
/// Ties go to the even neighbour. Non-finite input has no pixel.
#[inline]
pub fn round_to_pixel(v: f64) -> Option<i64> {
    if v.is_finite() {
        Some(v.round_ties_even() as i64)
    } else {
        None
    }
}

/// Source pixel batch and where each pixel lands on the destination grid.
///
/// `dest[i]` belongs to `source[i]`. A `None` destination could not be
/// projected; a `Some` destination may still lie outside the grid.
#[derive(Clone, Debug)]
pub struct CoordinateMap {
    pub source: Vec<PixelCoord>,
    pub dest: Vec<Option<PixelCoord>>,
}

/// Map `coords` from the `from` grid to the `to` grid through the sky.
pub fn transform_coords<F, T>(from: &F, to: &T, coords: &[PixelCoord]) -> Vec<Option<PixelCoord>>
where
    F: SkyCalibration + ?Sized,
    T: SkyCalibration + ?Sized,
{
    let sky = from.pixels_to_sky(coords);
    to.sky_to_pixels(&sky)
        .into_iter()
        .map(|p| {
            let (x, y) = p?;
            Some(PixelCoord::new(round_to_pixel(x)?, round_to_pixel(y)?))
        })
        .collect()
}

/// Transform the full pixel grid of `source` onto the grid of `dest`.
pub fn transform_pixel_grid<S, D>(source: &S, dest: &D) -> Result<CoordinateMap>
where
    S: CalibratedGrid,
    D: CalibratedGrid,
{
    let shape = source.shape()?;
    let from = source.calibration()?;
    let to = dest.calibration()?;

    let coords = pixel_grid(shape);
    let mapped = transform_coords(&from, &to, &coords);
    Ok(CoordinateMap {
        source: coords,
        dest: mapped,
    })
}
