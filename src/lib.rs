pub mod error;
pub mod formats;
pub mod image;
mod lightmap;
pub mod processing;
pub mod types;
pub mod wcs;

pub use error::LightmapError;
pub use formats::{read_header, read_image, write_image, write_mask, Bitpix, Card, FitsImage, Header};
pub use image::{CalibratedGrid, GridImage};
pub use lightmap::{load_kernel, MaskProjector, ProjectedMask, SegmapFilter};
pub use processing::convolve::convolve2d;
pub use processing::drizzle::{drizzle_mask, DrizzleResult, DrizzleStage, DrizzleStats, MaskDrizzler};
pub use processing::grid::pixel_grid;
pub use processing::refine::{blur_mask, Kernel, MaskRefiner, DEFAULT_THRESHOLD};
pub use processing::segmap::{filter_segmap, segmap_from_pixels, select_ids, RegionLabel, SegmapSelection};
pub use processing::transform::{transform_coords, transform_pixel_grid, CoordinateMap};
pub use types::{BinaryMask, GridShape, PixelCoord, SegmentationMap, SkyCoord};
pub use wcs::{SkyCalibration, TanWcs};
