//! Core stitching stages

pub mod band_index;
pub mod assemble;
pub mod interpolate;
pub mod aspect;
pub mod ingest;

// Re-export main types
pub use band_index::{Band, BandIndex, round_coordinate};
pub use assemble::{MosaicAssembler, AssemblyReport, IrregularTile};
pub use interpolate::{HoleInterpolator, InterpolationReport};
pub use aspect::{AspectCorrector, AspectCorrection, resample_rows};
pub use ingest::{IngestionCoordinator, IngestReport, SizePolicy, TileDecoder, TileSource};
