mod common;

use common::{count_set, init_logging, write_plain};
use lightmap::{read_image, Bitpix, Kernel, MaskRefiner, SegmapFilter};
use ndarray::{array, Array2};

#[test]
fn test_segmap_selection_is_written() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let seg = array![[0.0, 1.0, 1.0], [0.0, 2.0, 0.0], [3.0, 3.0, 3.0]];
    let input = write_plain(dir.path(), "seg.fits", &seg, Bitpix::I32);
    let output = dir.path().join("mask.fits");

    let selection = SegmapFilter::new([1, 3]).filter(&input, &output).unwrap();
    assert_eq!(selection.mask, array![[0u8, 1, 1], [0, 0, 0], [1, 1, 1]]);
    assert!(selection.refined.is_none());

    let written = read_image(&output).unwrap();
    assert_eq!(written.data, array![[0.0, 1.0, 1.0], [0.0, 0.0, 0.0], [1.0, 1.0, 1.0]]);
}

#[test]
fn test_strict_mask_persisted_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let mut seg = Array2::zeros((7, 7));
    seg[[3, 3]] = 8.0;
    let input = write_plain(dir.path(), "seg.fits", &seg, Bitpix::I16);
    let output = dir.path().join("mask.fits");

    let refiner = MaskRefiner::new(Kernel::boxcar(3).unwrap());
    let selection = SegmapFilter::new([8])
        .with_refiner(refiner)
        .filter(&input, &output)
        .unwrap();

    let refined = selection.refined.as_ref().unwrap();
    assert_eq!(refined.iter().filter(|&&v| v == 1).count(), 9);
    assert_eq!(count_set(&read_image(&output).unwrap().data), 1);
}

#[test]
fn test_persist_refined_writes_refined_mask() {
    let dir = tempfile::tempdir().unwrap();
    let mut seg = Array2::zeros((7, 7));
    seg[[3, 3]] = 8.0;
    let input = write_plain(dir.path(), "seg.fits", &seg, Bitpix::I16);
    let output = dir.path().join("mask.fits");

    let refiner = MaskRefiner::new(Kernel::boxcar(3).unwrap());
    SegmapFilter::new([8])
        .with_refiner(refiner)
        .persist_refined(true)
        .filter(&input, &output)
        .unwrap();

    let written = read_image(&output).unwrap();
    assert_eq!(count_set(&written.data), 9);
    assert_eq!(written.data[[2, 2]], 1.0);
    assert_eq!(written.data[[0, 0]], 0.0);
}

#[test]
fn test_empty_keep_set_writes_blank_mask() {
    let dir = tempfile::tempdir().unwrap();
    let seg = array![[1.0, 2.0], [3.0, 4.0]];
    let input = write_plain(dir.path(), "seg.fits", &seg, Bitpix::U8);
    let output = dir.path().join("mask.fits");

    SegmapFilter::new(Vec::new()).filter(&input, &output).unwrap();
    assert_eq!(count_set(&read_image(&output).unwrap().data), 0);
}

#[test]
fn test_oversized_kernel_aborts_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_plain(dir.path(), "seg.fits", &Array2::ones((2, 2)), Bitpix::U8);
    let output = dir.path().join("mask.fits");

    let refiner = MaskRefiner::new(Kernel::boxcar(5).unwrap());
    let err = SegmapFilter::new([1])
        .with_refiner(refiner)
        .filter(&input, &output)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<lightmap::LightmapError>(),
        Some(lightmap::LightmapError::ShapeMismatch { .. })
    ));
    assert!(!output.exists());
}

#[test]
fn test_kernel_loaded_from_fits() {
    let dir = tempfile::tempdir().unwrap();
    let weights = array![[0.0, 1.0, 0.0], [1.0, 4.0, 1.0], [0.0, 1.0, 0.0]];
    let path = write_plain(dir.path(), "psf.fits", &weights, Bitpix::F64);

    let kernel = lightmap::load_kernel(&path).unwrap();
    assert_eq!(kernel.dim(), (3, 3));
    assert!((kernel.weights()[[1, 1]] - 0.5).abs() < 1e-12);

    let bad = write_plain(dir.path(), "zero.fits", &Array2::zeros((3, 3)), Bitpix::F32);
    assert!(lightmap::load_kernel(&bad).is_err());
}

#[test]
fn test_blank_pixels_are_not_background() {
    let dir = tempfile::tempdir().unwrap();
    let seg = array![[1.0, f64::NAN], [0.0, 2.0]];
    let input = write_plain(dir.path(), "seg.fits", &seg, Bitpix::F32);
    let output = dir.path().join("mask.fits");

    let selection = SegmapFilter::new([0]).filter(&input, &output).unwrap();
    assert_eq!(selection.mask, array![[0u8, 0], [1, 0]]);
    assert_eq!(read_image(&output).unwrap().data, array![[0.0, 0.0], [1.0, 0.0]]);
}
