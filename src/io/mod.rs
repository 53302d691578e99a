//! I/O modules for reading DEM tiles and writing mosaics

pub mod gml;
pub mod archive;
pub mod writer;

pub use gml::GmlTileDecoder;
pub use archive::{collect_tile_sources, TileWorkspace};
pub use writer::{write_mask, write_raster};
