use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Canonical "missing sample" marker.
///
/// Missing and never-covered pixels are stored as `0.0` so the output doubles as
/// a sea-level background. Validity must be checked against this value, not
/// inferred from magnitude.
pub const SENTINEL: f32 = 0.0;

/// 2D elevation grid (rows x cols), north at row 0, west at column 0
pub type ElevationGrid = Array2<f32>;

/// Per-pixel validity (true where a tile contributed a real sample)
pub type ValidityMask = Array2<bool>;

/// Returns true if the sample is the missing-data sentinel
#[inline]
pub fn is_missing(value: f32) -> bool {
    value == SENTINEL
}

/// Geospatial bounding box in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        Self { min_lon, max_lon, min_lat, max_lat }
    }

    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn lon_span(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// Smallest box containing both `self` and `other`
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_lon: self.min_lon.min(other.min_lon),
            max_lon: self.max_lon.max(other.max_lon),
            min_lat: self.min_lat.min(other.min_lat),
            max_lat: self.max_lat.max(other.max_lat),
        }
    }

    /// Union of every tile's box, or `None` for an empty set
    pub fn covering<'a, I>(tiles: I) -> Option<BoundingBox>
    where
        I: IntoIterator<Item = &'a TileRecord>,
    {
        tiles
            .into_iter()
            .map(|t| *t.bbox())
            .reduce(|acc, b| acc.union(&b))
    }

    fn is_well_formed(&self) -> bool {
        self.min_lat.is_finite()
            && self.max_lat.is_finite()
            && self.min_lon.is_finite()
            && self.max_lon.is_finite()
            && self.min_lat < self.max_lat
            && self.min_lon < self.max_lon
    }
}

/// One decoded elevation tile.
///
/// Immutable after construction. The sample grid is stored as an `Array2`, so
/// `rows * cols == samples.len()` holds by construction.
#[derive(Debug, Clone)]
pub struct TileRecord {
    bbox: BoundingBox,
    samples: ElevationGrid,
    source: PathBuf,
    discovery_index: usize,
    missing_samples: usize,
}

impl TileRecord {
    /// Build a tile from an already-shaped sample grid
    pub fn new(
        bbox: BoundingBox,
        samples: ElevationGrid,
        source: impl Into<PathBuf>,
        discovery_index: usize,
    ) -> StitchResult<Self> {
        if !bbox.is_well_formed() {
            return Err(invalid_bbox(&bbox));
        }
        let (rows, cols) = samples.dim();
        if rows == 0 || cols == 0 {
            return Err(StitchError::InvalidTile(format!(
                "empty sample grid ({}x{})",
                rows, cols
            )));
        }
        let missing_samples = samples.iter().filter(|v| is_missing(**v)).count();

        Ok(Self {
            bbox,
            samples,
            source: source.into(),
            discovery_index,
            missing_samples,
        })
    }

    /// Build a tile from a flat row-major sample vector
    pub fn from_samples(
        bbox: BoundingBox,
        rows: usize,
        cols: usize,
        samples: Vec<f32>,
        source: impl Into<PathBuf>,
        discovery_index: usize,
    ) -> StitchResult<Self> {
        let grid = Array2::from_shape_vec((rows, cols), samples).map_err(|e| {
            StitchError::InvalidTile(format!(
                "sample count does not match {}x{} grid: {}",
                rows, cols, e
            ))
        })?;
        Self::new(bbox, grid, source, discovery_index)
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn lat_min(&self) -> f64 {
        self.bbox.min_lat
    }

    pub fn lat_max(&self) -> f64 {
        self.bbox.max_lat
    }

    pub fn lon_min(&self) -> f64 {
        self.bbox.min_lon
    }

    pub fn lon_max(&self) -> f64 {
        self.bbox.max_lon
    }

    pub fn rows(&self) -> usize {
        self.samples.nrows()
    }

    pub fn cols(&self) -> usize {
        self.samples.ncols()
    }

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.samples.dim()
    }

    pub fn samples(&self) -> &ElevationGrid {
        &self.samples
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Position of the tile in traversal order; used as the stable sort key
    /// for duplicate resolution
    pub fn discovery_index(&self) -> usize {
        self.discovery_index
    }

    pub fn missing_samples(&self) -> usize {
        self.missing_samples
    }

    /// Short display name for log lines
    pub fn name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.source.display().to_string())
    }
}

/// Assembled raster plus its validity mask.
///
/// The mask is snapshotted right after tile placement and is never recomputed
/// from the (possibly interpolated) elevation values.
#[derive(Debug, Clone)]
pub struct Mosaic {
    pub elevation: ElevationGrid,
    pub valid_mask: ValidityMask,
}

impl Mosaic {
    pub fn height(&self) -> usize {
        self.elevation.nrows()
    }

    pub fn width(&self) -> usize {
        self.elevation.ncols()
    }

    /// Pixels currently holding the sentinel
    pub fn missing_count(&self) -> usize {
        count_missing(&self.elevation)
    }

    /// Pixels that received a real sample during assembly
    pub fn valid_count(&self) -> usize {
        self.valid_mask.iter().filter(|v| **v).count()
    }
}

/// Number of sentinel pixels in a grid
pub fn count_missing(grid: &ElevationGrid) -> usize {
    grid.iter().filter(|v| is_missing(**v)).count()
}

/// Per-tile decode failure. Absorbed by the ingestion coordinator and never
/// fatal on its own.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeFailure {
    #[error("malformed tile source: {0}")]
    MalformedSource(String),

    #[error("grid size mismatch: expected {expected_rows}x{expected_cols}, found {rows}x{cols}")]
    SizeMismatch {
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },

    #[error("unreadable tile source: {0}")]
    Unreadable(String),
}

/// Run-level errors
#[derive(Debug, thiserror::Error)]
pub enum StitchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Raster encoding error: {0}")]
    Encode(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid tile: {0}")]
    InvalidTile(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("no DEM tiles found in the given inputs")]
    NoTilesFound,

    #[error("no valid tiles: all {attempted} tile(s) failed to decode")]
    NoValidTiles { attempted: usize },

    #[error("no tiles placed: all {accepted} decoded tile(s) were rejected during assembly")]
    NoTilesPlaced { accepted: usize },
}

impl StitchError {
    /// True for the aggregate "nothing usable" conditions
    pub fn is_empty_result(&self) -> bool {
        matches!(
            self,
            StitchError::NoTilesFound
                | StitchError::NoValidTiles { .. }
                | StitchError::NoTilesPlaced { .. }
        )
    }
}

/// Result type for mosaic operations
pub type StitchResult<T> = Result<T, StitchError>;

fn invalid_bbox(bbox: &BoundingBox) -> StitchError {
    StitchError::InvalidTile(format!(
        "degenerate bounding box: lat [{}, {}], lon [{}, {}]",
        bbox.min_lat, bbox.max_lat, bbox.min_lon, bbox.max_lon
    ))
}
