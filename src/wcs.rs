//! Sky calibration: pixel <-> celestial conversion.
//!
//! `TanWcs` implements the gnomonic (TAN) projection described by the
//! standard FITS WCS keywords. Pixel coordinates use the FITS 1-based origin:
//! the centre of the first pixel is (1, 1).

use rayon::prelude::*;

use crate::error::{LightmapError, Result};
use crate::formats::Header;
use crate::types::{PixelCoord, SkyCoord};

/// Pixel <-> sky conversion for one image.
///
/// Batch methods keep their output aligned index-for-index with the input.
/// `None` marks a position the projection cannot represent.
pub trait SkyCalibration: Sync {
    fn pixel_to_sky(&self, x: f64, y: f64) -> Option<SkyCoord>;

    fn sky_to_pixel(&self, sky: SkyCoord) -> Option<(f64, f64)>;

    fn pixels_to_sky(&self, batch: &[PixelCoord]) -> Vec<Option<SkyCoord>> {
        batch
            .par_iter()
            .map(|p| self.pixel_to_sky(p.x as f64, p.y as f64))
            .collect()
    }

    fn sky_to_pixels(&self, batch: &[Option<SkyCoord>]) -> Vec<Option<(f64, f64)>> {
        batch
            .par_iter()
            .map(|s| s.and_then(|s| self.sky_to_pixel(s)))
            .collect()
    }
}

/// Forward gnomonic projection of `(ra, dec)` onto the plane tangent at
/// `(ra0, dec0)`. All angles in radians. `None` on or behind the tangent plane.
#[inline]
fn tan_project(ra: f64, dec: f64, ra0: f64, dec0: f64) -> Option<(f64, f64)> {
    let da = ra - ra0;
    let (sin_dec, cos_dec) = dec.sin_cos();
    let (sin_dec0, cos_dec0) = dec0.sin_cos();
    let cos_da = da.cos();

    let denom = sin_dec * sin_dec0 + cos_dec * cos_dec0 * cos_da;
    if denom <= 1e-12 {
        return None;
    }

    let xi = cos_dec * da.sin() / denom;
    let eta = (sin_dec * cos_dec0 - cos_dec * sin_dec0 * cos_da) / denom;
    Some((xi, eta))
}

#[inline]
fn inverse_tan_project(xi: f64, eta: f64, ra0: f64, dec0: f64) -> (f64, f64) {
    let (sin_dec0, cos_dec0) = dec0.sin_cos();
    let rho_sq = xi * xi + eta * eta;
    if rho_sq < 1e-30 {
        return (ra0, dec0);
    }

    let rho = rho_sq.sqrt();
    let (sin_c, cos_c) = rho.atan().sin_cos();

    let dec = (cos_c * sin_dec0 + eta * sin_c * cos_dec0 / rho).asin();
    let ra = ra0 + (xi * sin_c).atan2(rho * cos_dec0 * cos_c - eta * sin_dec0 * sin_c);
    (ra, dec)
}

fn invert_2x2(m: &[[f64; 2]; 2]) -> Option<[[f64; 2]; 2]> {
    let det = m[0][0] * m[1][1] - m[0][1] * m[1][0];
    if !det.is_finite() || det.abs() < 1e-30 {
        return None;
    }
    let inv = 1.0 / det;
    Some([
        [m[1][1] * inv, -m[0][1] * inv],
        [-m[1][0] * inv, m[0][0] * inv],
    ])
}

/// Gnomonic WCS with a linear CD matrix (degrees per pixel).
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct TanWcs {
    crpix: [f64; 2],
    crval: [f64; 2],
    cd: [[f64; 2]; 2],
    cd_inv: [[f64; 2]; 2],
}

impl TanWcs {
    /// `crpix` in 1-based pixels, `crval` (ra, dec) in degrees, `cd` in degrees per pixel.
    pub fn new(crpix: [f64; 2], crval: [f64; 2], cd: [[f64; 2]; 2]) -> Result<Self> {
        let finite = crpix
            .iter()
            .chain(crval.iter())
            .chain(cd.iter().flatten())
            .all(|v| v.is_finite());
        if !finite {
            return Err(LightmapError::MissingCalibration(
                "non-finite WCS parameter".to_string(),
            ));
        }
        let cd_inv = invert_2x2(&cd).ok_or_else(|| {
            LightmapError::MissingCalibration("singular CD matrix".to_string())
        })?;
        Ok(TanWcs {
            crpix,
            crval,
            cd,
            cd_inv,
        })
    }

    /// North-up, east-left grid with square pixels of `scale` degrees.
    pub fn north_up(crpix: [f64; 2], crval: [f64; 2], scale: f64) -> Result<Self> {
        TanWcs::new(crpix, crval, [[-scale, 0.0], [0.0, scale]])
    }

    pub fn from_header(header: &Header) -> Result<Self> {
        for key in ["CTYPE1", "CTYPE2"] {
            let ctype = header
                .get_string(key)
                .ok_or_else(|| missing(key))?
                .to_uppercase();
            if !ctype.ends_with("-TAN") {
                return Err(LightmapError::MissingCalibration(format!(
                    "unsupported projection {}='{}'",
                    key, ctype
                )));
            }
            let latitude_first = key == "CTYPE1"
                && ["DEC-", "GLAT", "ELAT", "SLAT"]
                    .iter()
                    .any(|p| ctype.starts_with(p));
            if latitude_first {
                return Err(LightmapError::MissingCalibration(format!(
                    "latitude on the first axis is not supported ({})",
                    ctype
                )));
            }
        }

        let crpix = [required(header, "CRPIX1")?, required(header, "CRPIX2")?];
        let crval = [required(header, "CRVAL1")?, required(header, "CRVAL2")?];
        let cd = linear_transform(header)?;
        TanWcs::new(crpix, crval, cd)
    }

    pub fn crpix(&self) -> [f64; 2] {
        self.crpix
    }

    pub fn crval(&self) -> [f64; 2] {
        self.crval
    }

    pub fn cd(&self) -> [[f64; 2]; 2] {
        self.cd
    }
}

fn missing(key: &str) -> LightmapError {
    LightmapError::MissingCalibration(format!("{} not found", key))
}

fn required(header: &Header, key: &str) -> Result<f64> {
    header.get_float(key).ok_or_else(|| missing(key))
}

/// CD matrix from CDi_j, else PCi_j scaled by CDELTi, else CDELTi with CROTA2.
fn linear_transform(header: &Header) -> Result<[[f64; 2]; 2]> {
    let keys = |prefix: &str| {
        [
            [format!("{}1_1", prefix), format!("{}1_2", prefix)],
            [format!("{}2_1", prefix), format!("{}2_2", prefix)],
        ]
    };

    let cd_keys = keys("CD");
    if cd_keys.iter().flatten().any(|k| header.contains(k)) {
        let get = |k: &String| header.get_float(k).unwrap_or(0.0);
        return Ok([
            [get(&cd_keys[0][0]), get(&cd_keys[0][1])],
            [get(&cd_keys[1][0]), get(&cd_keys[1][1])],
        ]);
    }

    let cdelt = [required(header, "CDELT1")?, required(header, "CDELT2")?];

    let pc_keys = keys("PC");
    if pc_keys.iter().flatten().any(|k| header.contains(k)) {
        let get = |k: &String, default: f64| header.get_float(k).unwrap_or(default);
        return Ok([
            [
                cdelt[0] * get(&pc_keys[0][0], 1.0),
                cdelt[0] * get(&pc_keys[0][1], 0.0),
            ],
            [
                cdelt[1] * get(&pc_keys[1][0], 0.0),
                cdelt[1] * get(&pc_keys[1][1], 1.0),
            ],
        ]);
    }

    let (sin_r, cos_r) = header
        .get_float("CROTA2")
        .unwrap_or(0.0)
        .to_radians()
        .sin_cos();
    Ok([
        [cdelt[0] * cos_r, -cdelt[1] * sin_r],
        [cdelt[0] * sin_r, cdelt[1] * cos_r],
    ])
}

impl SkyCalibration for TanWcs {
    fn pixel_to_sky(&self, x: f64, y: f64) -> Option<SkyCoord> {
        let dx = x - self.crpix[0];
        let dy = y - self.crpix[1];
        let xi = (self.cd[0][0] * dx + self.cd[0][1] * dy).to_radians();
        let eta = (self.cd[1][0] * dx + self.cd[1][1] * dy).to_radians();

        let (ra, dec) = inverse_tan_project(
            xi,
            eta,
            self.crval[0].to_radians(),
            self.crval[1].to_radians(),
        );
        let sky = SkyCoord {
            ra: ra.to_degrees().rem_euclid(360.0),
            dec: dec.to_degrees(),
        };
        (sky.ra.is_finite() && sky.dec.is_finite()).then_some(sky)
    }

    fn sky_to_pixel(&self, sky: SkyCoord) -> Option<(f64, f64)> {
        let (xi, eta) = tan_project(
            sky.ra.to_radians(),
            sky.dec.to_radians(),
            self.crval[0].to_radians(),
            self.crval[1].to_radians(),
        )?;
        let xi = xi.to_degrees();
        let eta = eta.to_degrees();

        let x = self.crpix[0] + self.cd_inv[0][0] * xi + self.cd_inv[0][1] * eta;
        let y = self.crpix[1] + self.cd_inv[1][0] * xi + self.cd_inv[1][1] * eta;
        (x.is_finite() && y.is_finite()).then_some((x, y))
    }
}
