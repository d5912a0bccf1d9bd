//! Nearest-pixel forward mapping of a mask onto another grid.
//!
//! Each kept source pixel (value > 0) is sent through the sky to the
//! destination grid and sets the pixel it lands on to 1. Several source
//! pixels may land on the same destination pixel (collisions), and some
//! destination pixels may receive nothing (gaps). Neither is an error; the
//! splat is a plain union, so processing order never changes the result.

use log::{debug, info};
use ndarray::Array2;
use rayon::prelude::*;

use crate::error::Result;
use crate::image::{CalibratedGrid, GridImage};
use crate::processing::transform::transform_pixel_grid;
use crate::types::{BinaryMask, GridShape};

/// Counters from one drizzle run.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct DrizzleStats {
    /// Pixels in the source grid.
    pub source_pixels: usize,
    /// Source pixels with a value > 0.
    pub kept: usize,
    /// Kept pixels that landed inside the destination grid.
    pub landed: usize,
    /// Kept pixels dropped because they fell off the destination grid
    /// or could not be projected.
    pub out_of_bounds: usize,
    /// Landed pixels whose destination pixel was already set.
    pub collisions: usize,
}

/// Progress notifications, delivered on the calling thread.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum DrizzleStage {
    Transforming { pixels: usize },
    Splatting { pixels: usize },
    Finished(DrizzleStats),
}

/// Mask on the destination grid plus run statistics.
#[derive(Clone, Debug)]
pub struct DrizzleResult {
    pub mask: BinaryMask,
    pub shape: GridShape,
    pub stats: DrizzleStats,
}

/// Mask drizzler with an optional progress hook.
#[derive(Default)]
pub struct MaskDrizzler<'a> {
    progress: Option<Box<dyn Fn(DrizzleStage) + 'a>>,
}

impl<'a> MaskDrizzler<'a> {
    pub fn new() -> Self {
        MaskDrizzler { progress: None }
    }

    pub fn with_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(DrizzleStage) + 'a,
    {
        self.progress = Some(Box::new(f));
        self
    }

    fn notify(&self, stage: DrizzleStage) {
        if let Some(progress) = &self.progress {
            progress(stage);
        }
    }

    /// Drizzle the kept pixels of `source` onto the grid of `dest`.
    ///
    /// Only the shape and calibration of `dest` are used.
    pub fn run<S, D>(&self, source: &S, dest: &D) -> Result<DrizzleResult>
    where
        S: GridImage,
        D: CalibratedGrid,
    {
        let src_shape = source.checked_shape()?;
        let dst_shape = dest.shape()?;

        info!(
            "Transforming {} source pixels ({}x{} -> {}x{})",
            src_shape.len(),
            src_shape.width,
            src_shape.height,
            dst_shape.width,
            dst_shape.height
        );
        self.notify(DrizzleStage::Transforming {
            pixels: src_shape.len(),
        });
        let map = transform_pixel_grid(source, dest)?;

        info!("Splatting mask onto destination grid");
        self.notify(DrizzleStage::Splatting {
            pixels: map.source.len(),
        });

        let pixels = source.pixels();
        let hits: Vec<Option<[usize; 2]>> = map
            .source
            .par_iter()
            .zip(map.dest.par_iter())
            .filter(|(src, _)| {
                pixels[[(src.y - 1) as usize, (src.x - 1) as usize]] > 0.0
            })
            .map(|(_, dst)| dst.and_then(|d| dst_shape.index_of(d)))
            .collect();

        let mut mask = Array2::<u8>::zeros(dst_shape.dim());
        let mut stats = DrizzleStats {
            source_pixels: map.source.len(),
            kept: hits.len(),
            ..Default::default()
        };
        for idx in hits.into_iter().flatten() {
            stats.landed += 1;
            if mask[idx] == 1 {
                stats.collisions += 1;
            } else {
                mask[idx] = 1;
            }
        }
        stats.out_of_bounds = stats.kept - stats.landed;

        debug!(
            "Drizzle: kept={} landed={} out_of_bounds={} collisions={}",
            stats.kept, stats.landed, stats.out_of_bounds, stats.collisions
        );
        self.notify(DrizzleStage::Finished(stats));

        Ok(DrizzleResult {
            mask,
            shape: dst_shape,
            stats,
        })
    }
}

/// Drizzle `source` onto the grid of `dest` and return the binary mask.
pub fn drizzle_mask<S, D>(source: &S, dest: &D) -> Result<BinaryMask>
where
    S: GridImage,
    D: CalibratedGrid,
{
    MaskDrizzler::new().run(source, dest).map(|r| r.mask)
}
