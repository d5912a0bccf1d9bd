pub mod convolve;
pub mod drizzle;
pub mod grid;
pub mod refine;
pub mod segmap;
pub mod transform;
