//! # TerraStat Core
//!
//! Container types and grid primitives shared by the TerraStat analysis
//! crates.
//!
//! This crate provides:
//! - [`Raster<T>`]: georeferenced 2D grid
//! - [`GeoTransform`]: affine transformation for georeferencing
//! - [`Crs`]: lightweight coordinate reference system tag
//! - Resampling primitives (block aggregation, bilinear sampling)
//! - Native single-band GeoTIFF I/O

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;

pub use crs::Crs;
pub use error::{Error, Result};
pub use raster::{GeoTransform, Raster, RasterElement};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::Crs;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, Raster, RasterElement};
}
