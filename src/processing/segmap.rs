use std::collections::HashSet;

use ndarray::{Array2, ArrayView2, Zip};

use crate::error::Result;
use crate::processing::refine::MaskRefiner;
use crate::types::BinaryMask;

/// A segmentation map element.
pub trait RegionLabel: Sync {
    /// Region identifier, or `None` for a pixel that carries no label.
    fn region_id(&self) -> Option<i64>;
}

impl RegionLabel for i64 {
    fn region_id(&self) -> Option<i64> {
        Some(*self)
    }
}

impl RegionLabel for Option<i64> {
    fn region_id(&self) -> Option<i64> {
        *self
    }
}

/// Region labels from raw pixel values.
///
/// Only exact integers are labels. Blank (NaN), fractional and out-of-range
/// values become `None` and never match any identifier, background included.
pub fn segmap_from_pixels(pixels: ArrayView2<f64>) -> Array2<Option<i64>> {
    pixels.mapv(|v| {
        let integral = v.is_finite() && v == v.trunc();
        let in_range = v >= i64::MIN as f64 && v < i64::MAX as f64;
        (integral && in_range).then_some(v as i64)
    })
}

/// Strict selection: 1 where the identifier is one of `ids`, 0 elsewhere.
pub fn select_ids<L: RegionLabel>(segmap: ArrayView2<L>, ids: &HashSet<i64>) -> BinaryMask {
    let mut mask = BinaryMask::zeros(segmap.dim());
    if ids.is_empty() {
        return mask;
    }
    Zip::from(&mut mask).and(&segmap).par_for_each(|m, label| {
        *m = label.region_id().is_some_and(|id| ids.contains(&id)) as u8
    });
    mask
}

/// Result of filtering a segmentation map.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmapSelection {
    /// Strict selection.
    pub mask: BinaryMask,
    /// Blurred and re-thresholded selection, when a refiner was given.
    pub refined: Option<BinaryMask>,
}

impl SegmapSelection {
    /// Mask to persist. The strict mask is written unless `persist_refined`
    /// is set and a refined mask exists.
    pub fn persisted(&self, persist_refined: bool) -> &BinaryMask {
        match (&self.refined, persist_refined) {
            (Some(refined), true) => refined,
            _ => &self.mask,
        }
    }
}

/// Select the regions `ids` from `segmap`, optionally refining the selection.
///
/// An empty `ids` yields an all-zero mask.
pub fn filter_segmap<L: RegionLabel>(
    segmap: ArrayView2<L>,
    ids: &HashSet<i64>,
    refiner: Option<&MaskRefiner>,
) -> Result<SegmapSelection> {
    let mask = select_ids(segmap, ids);
    let refined = match refiner {
        Some(r) => Some(r.refine(mask.view())?),
        None => None,
    };
    Ok(SegmapSelection { mask, refined })
}
