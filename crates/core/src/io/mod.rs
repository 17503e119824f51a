//! Raster file I/O
//!
//! Single-band GeoTIFF reading and writing via the `tiff` crate.
//! Projection metadata is limited to the affine transform tags; the CRS
//! tag is not round-tripped.

mod native;

pub use native::{read_geotiff, write_geotiff};
