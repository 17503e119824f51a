//! Raster data structures and grid operations

mod element;
mod geotransform;
mod grid;
pub mod resample;

pub use element::RasterElement;
pub use geotransform::GeoTransform;
pub use grid::{Raster, RasterStatistics};
pub use resample::{aggregate_mean, bilinear_sample};
