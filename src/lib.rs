//! demstitch: mosaic GSI DEM GML tiles into a single elevation raster
//!
//! Tiles are discovered in directories and (nested) ZIP archives, decoded in
//! parallel, placed on a canvas by clustering their geographic corners into
//! row and column bands, hole-filled and corrected for longitude shrinkage.

pub mod types;
pub mod config;
pub mod core;
pub mod io;
pub mod pipeline;

// Re-export main types and functions for easier access
pub use types::{
    BoundingBox, DecodeFailure, ElevationGrid, Mosaic, StitchError, StitchResult, TileRecord,
    ValidityMask, SENTINEL,
};

pub use config::{InterpolationParams, StitchConfig};
pub use core::{BandIndex, HoleInterpolator, IngestionCoordinator, MosaicAssembler, TileDecoder, TileSource};
pub use io::{GmlTileDecoder, TileWorkspace};
pub use pipeline::{OutputTarget, RunSummary, StitchPipeline};
