#![allow(dead_code)]

use std::path::{Path, PathBuf};

use lightmap::{write_image, Bitpix, Header};
use ndarray::Array2;

/// One arcsecond in degrees.
pub const ARCSEC: f64 = 1.0 / 3600.0;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Header of a north-up TAN grid centred on an arbitrary field.
pub fn tan_header(width: usize, height: usize, crpix: [f64; 2], scale: f64) -> Header {
    Header::new()
        .with_int("NAXIS1", width as i64)
        .with_int("NAXIS2", height as i64)
        .with_string("CTYPE1", "RA---TAN")
        .with_string("CTYPE2", "DEC--TAN")
        .with_float("CRPIX1", crpix[0])
        .with_float("CRPIX2", crpix[1])
        .with_float("CRVAL1", 53.16)
        .with_float("CRVAL2", -27.79)
        .with_float("CD1_1", -scale)
        .with_float("CD1_2", 0.0)
        .with_float("CD2_1", 0.0)
        .with_float("CD2_2", scale)
}

/// Write `data` into `dir/name` with a TAN calibration.
pub fn write_calibrated(
    dir: &Path,
    name: &str,
    data: &Array2<f64>,
    crpix: [f64; 2],
    scale: f64,
) -> PathBuf {
    let (height, width) = data.dim();
    let path = dir.join(name);
    write_image(&path, &tan_header(width, height, crpix, scale), data.view(), Bitpix::I16)
        .unwrap();
    path
}

/// Write `data` without any sky calibration.
pub fn write_plain(dir: &Path, name: &str, data: &Array2<f64>, bitpix: Bitpix) -> PathBuf {
    let path = dir.join(name);
    write_image(&path, &Header::new(), data.view(), bitpix).unwrap();
    path
}

pub fn count_set(mask: &Array2<f64>) -> usize {
    mask.iter().filter(|&&v| v == 1.0).count()
}
