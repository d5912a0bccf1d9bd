use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use log::info;

use crate::formats::{self, Card, Header};
use crate::processing::drizzle::{DrizzleStats, MaskDrizzler};
use crate::processing::refine::{Kernel, MaskRefiner};
use crate::processing::segmap::{filter_segmap, segmap_from_pixels, SegmapSelection};
use crate::types::BinaryMask;

/// A drizzled mask together with the header of the grid it lives on.
#[derive(Clone, Debug)]
pub struct ProjectedMask {
    pub mask: BinaryMask,
    pub header: Header,
    pub stats: DrizzleStats,
}

/// Reprojects a mask image onto the grid of another image, optionally
/// refining the result.
pub struct MaskProjector {
    refiner: Option<MaskRefiner>,
}

impl MaskProjector {
    pub fn new() -> Self {
        MaskProjector { refiner: None }
    }

    pub fn with_refiner(mut self, refiner: MaskRefiner) -> Self {
        self.refiner = Some(refiner);
        self
    }

    /// Drizzle the mask in `source` onto the grid of `dest` without writing to disk.
    ///
    /// Only the header of `dest` is read.
    pub fn project<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        source: P,
        dest: Q,
    ) -> Result<ProjectedMask> {
        let source = source.as_ref();
        let dest = dest.as_ref();
        let image = formats::read_image(source)?;
        let header = formats::read_header(dest)?;

        let result = MaskDrizzler::new()
            .run(&image, &header)
            .with_context(|| {
                format!(
                    "Failed to drizzle {} onto {}",
                    source.display(),
                    dest.display()
                )
            })?;
        info!(
            "Drizzled {} of {} kept pixels ({} collisions)",
            result.stats.landed, result.stats.kept, result.stats.collisions
        );

        let mask = match &self.refiner {
            Some(refiner) => {
                info!("Refining mask (threshold {})", refiner.threshold());
                refiner.refine(result.mask.view()).context("Mask refinement failed")?
            }
            None => result.mask,
        };

        Ok(ProjectedMask {
            mask,
            header,
            stats: result.stats,
        })
    }

    /// Drizzle and write the mask to `output`, replacing any existing file.
    pub fn project_to_file<P: AsRef<Path>, Q: AsRef<Path>, R: AsRef<Path>>(
        &self,
        source: P,
        dest: Q,
        output: R,
    ) -> Result<ProjectedMask> {
        let projected = self.project(&source, dest)?;

        let mut header = projected.header.clone();
        header.push(Card::history(&format!(
            "lightmap drizzle of {}",
            file_name(source.as_ref())
        )));
        formats::write_mask(output.as_ref(), &header, projected.mask.view())
            .context("Mask save failed")?;
        info!("Wrote {}", output.as_ref().display());

        Ok(projected)
    }
}

impl Default for MaskProjector {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a mask from selected regions of a segmentation map image.
pub struct SegmapFilter {
    ids: HashSet<i64>,
    refiner: Option<MaskRefiner>,
    persist_refined: bool,
}

impl SegmapFilter {
    pub fn new<I: IntoIterator<Item = i64>>(ids: I) -> Self {
        SegmapFilter {
            ids: ids.into_iter().collect(),
            refiner: None,
            persist_refined: false,
        }
    }

    pub fn with_refiner(mut self, refiner: MaskRefiner) -> Self {
        self.refiner = Some(refiner);
        self
    }

    /// Write the refined mask instead of the strict selection.
    ///
    /// Off by default: the strict mask is what gets written even when a
    /// refined mask was computed. Has no effect without a refiner.
    pub fn persist_refined(mut self, persist: bool) -> Self {
        self.persist_refined = persist;
        self
    }

    pub fn ids(&self) -> &HashSet<i64> {
        &self.ids
    }

    /// Select regions from the segmentation map in `segmap` and write the
    /// persisted mask to `output`, keeping the segmap's header.
    pub fn filter<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        segmap: P,
        output: Q,
    ) -> Result<SegmapSelection> {
        let segmap = segmap.as_ref();
        let image = formats::read_image(segmap)?;
        let labels = segmap_from_pixels(image.data.view());

        info!(
            "Selecting {} region(s) from {}",
            self.ids.len(),
            segmap.display()
        );
        let selection = filter_segmap(labels.view(), &self.ids, self.refiner.as_ref())
            .context("Segmap filtering failed")?;

        let mut header = image.header;
        header.push(Card::history(&format!(
            "lightmap segmap selection of {}",
            file_name(segmap)
        )));
        formats::write_mask(
            output.as_ref(),
            &header,
            selection.persisted(self.persist_refined).view(),
        )
        .context("Mask save failed")?;
        info!("Wrote {}", output.as_ref().display());

        Ok(selection)
    }
}

/// Load a convolution kernel stored as a FITS image.
pub fn load_kernel<P: AsRef<Path>>(path: P) -> Result<Kernel> {
    let path = path.as_ref();
    let image = formats::read_image(path)?;
    Kernel::new(image.data).with_context(|| format!("Invalid kernel in {}", path.display()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
