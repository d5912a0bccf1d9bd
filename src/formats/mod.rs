pub mod fits;

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use ndarray::{Array2, ArrayView2};

pub use fits::{Bitpix, Card, Header};

/// A FITS primary image: header cards plus `(NAXIS2, NAXIS1)` pixels.
#[derive(Clone, Debug)]
pub struct FitsImage {
    pub header: Header,
    pub data: Array2<f64>,
}

impl FitsImage {
    pub fn new(header: Header, data: Array2<f64>) -> Self {
        FitsImage { header, data }
    }
}

pub fn read_image(path: &Path) -> Result<FitsImage> {
    ensure_fits(path)?;
    let (header, data) = fits::read_fits_image(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(FitsImage { header, data })
}

/// Read only the primary header; enough for a destination grid.
pub fn read_header(path: &Path) -> Result<Header> {
    ensure_fits(path)?;
    fits::read_fits_header(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Create or replace `path` with a new FITS image.
///
/// The image is written to a sibling temporary file which is then renamed
/// over the target, so readers never observe a partially written artifact.
pub fn write_image(
    path: &Path,
    template: &Header,
    data: ArrayView2<f64>,
    bitpix: Bitpix,
) -> Result<()> {
    let tmp = temp_path(path)?;
    if tmp.exists() {
        fs::remove_file(&tmp).context("Failed to remove stale temporary file")?;
    }

    let written = (|| -> Result<()> {
        let file = File::create(&tmp).context("Failed to create output file")?;
        let mut writer = BufWriter::new(file);
        fits::encode_fits(&mut writer, template, data, bitpix)?;
        writer.flush().context("Failed to flush output file")?;
        writer
            .get_ref()
            .sync_all()
            .context("Failed to sync output file")?;
        Ok(())
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    log::debug!("Wrote {}", path.display());
    Ok(())
}

/// Write a binary mask as BITPIX 16 on the grid described by `template`.
pub fn write_mask(path: &Path, template: &Header, mask: ArrayView2<u8>) -> Result<()> {
    let data = mask.mapv(f64::from);
    write_image(path, template, data.view(), Bitpix::I16)
}

fn temp_path(path: &Path) -> Result<PathBuf> {
    let name = match path.file_name() {
        Some(n) => n.to_string_lossy(),
        None => bail!("Output path has no file name: {}", path.display()),
    };
    Ok(path.with_file_name(format!(".{}.tmp", name)))
}

fn ensure_fits(path: &Path) -> Result<()> {
    if is_fits(path) {
        Ok(())
    } else {
        bail!(
            "Unsupported file format: {}",
            path.extension()
                .and_then(|e| e.to_str())
                .unwrap_or("unknown")
        )
    }
}

fn is_fits(path: &Path) -> bool {
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        if ext.eq_ignore_ascii_case("fits")
            || ext.eq_ignore_ascii_case("fit")
            || ext.eq_ignore_ascii_case("fts")
        {
            return true;
        }
    }
    // Check magic bytes: "SIMPLE  ="
    if let Ok(mut f) = File::open(path) {
        let mut buf = [0u8; 9];
        if f.read_exact(&mut buf).is_ok() && &buf == b"SIMPLE  =" {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.fits");
        fs::write(&path, b"stale contents").unwrap();

        let mask = Array2::from_shape_fn((2, 3), |(y, x)| ((x + y) % 2) as u8);
        write_mask(&path, &Header::new().with_string("OBJECT", "test"), mask.view()).unwrap();

        let image = read_image(&path).unwrap();
        assert_eq!(image.data.mapv(|v| v as u8), mask);
        assert_eq!(image.header.get_string("OBJECT").as_deref(), Some("test"));
        assert_eq!(image.header.get_int("BITPIX"), Some(16));
        assert!(!temp_path(&path).unwrap().exists());
    }

    #[test]
    fn test_magic_bytes_detect_fits_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("segmap.dat");
        let data = Array2::<f64>::zeros((1, 1));
        write_image(&path, &Header::new(), data.view(), Bitpix::U8).unwrap();
        assert!(read_header(&path).is_ok());

        let other = dir.path().join("notes.txt");
        fs::write(&other, b"hello").unwrap();
        assert!(read_header(&other).is_err());
    }
}
