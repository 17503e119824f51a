//! # TerraStat Algorithms
//!
//! Geospatial analysis algorithms for TerraStat.
//!
//! ## Available Algorithm Categories
//!
//! - **downscale**: Coarse-to-fine raster downscaling via robust regression
//! - **imagery**: Vegetation/senescence spectral indices (MSAVI2, NDSVI, SWVI)
//! - **density**: Weighted 2D kernel density estimation onto raster grids

pub mod density;
pub mod downscale;
pub mod imagery;

mod maybe_rayon;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::density::{kde, reference_bandwidth, KdeParams, WeightedPoint};
    pub use crate::downscale::{downscale, DownscaleParams, DownscaleResult};
    pub use crate::imagery::{msavi2, ndsvi, normalized_difference, swvi, SwviParams};
    pub use terrastat_core::prelude::*;
}
