use crate::types::{StitchError, StitchResult, TileRecord};

/// One row or column of the tile grid.
///
/// Tiles carry no reliable positional index, so bands are derived from their
/// geographic corners: row bands from the north edge (`lat_max`), column bands
/// from the west edge (`lon_min`), both rounded to absorb floating-point jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    /// Rounded corner coordinate shared by every tile in the band
    pub key: f64,
    /// Pixel extent: max `rows` (row band) or max `cols` (column band) of members
    pub size: usize,
    /// Cumulative size of all preceding bands
    pub offset: usize,
    /// Number of tiles assigned to the band
    pub members: usize,
}

/// Which corner a band list is keyed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    /// Keyed by `lat_max`, ordered north to south
    Row,
    /// Keyed by `lon_min`, ordered west to east
    Column,
}

impl Axis {
    fn corner(self, tile: &TileRecord) -> f64 {
        match self {
            Axis::Row => tile.lat_max(),
            Axis::Column => tile.lon_min(),
        }
    }

    fn extent(self, tile: &TileRecord) -> usize {
        match self {
            Axis::Row => tile.rows(),
            Axis::Column => tile.cols(),
        }
    }
}

/// Ordered row and column bands for a tile set
#[derive(Debug, Clone)]
pub struct BandIndex {
    decimals: u32,
    row_bands: Vec<Band>,
    col_bands: Vec<Band>,
}

impl BandIndex {
    /// Cluster the tiles' corners into bands
    pub fn build(tiles: &[TileRecord], decimals: u32) -> StitchResult<Self> {
        if tiles.is_empty() {
            return Err(StitchError::NoValidTiles { attempted: 0 });
        }

        let row_bands = Self::build_axis(tiles, decimals, Axis::Row);
        let col_bands = Self::build_axis(tiles, decimals, Axis::Column);

        log::info!(
            "Band grid: {} row band(s) x {} column band(s) from {} tiles",
            row_bands.len(),
            col_bands.len(),
            tiles.len()
        );
        log::debug!(
            "Row band keys (north->south): {:?}",
            row_bands.iter().map(|b| b.key).collect::<Vec<_>>()
        );
        log::debug!(
            "Column band keys (west->east): {:?}",
            col_bands.iter().map(|b| b.key).collect::<Vec<_>>()
        );

        Ok(Self {
            decimals,
            row_bands,
            col_bands,
        })
    }

    fn build_axis(tiles: &[TileRecord], decimals: u32, axis: Axis) -> Vec<Band> {
        let mut keys: Vec<f64> = tiles
            .iter()
            .map(|t| round_coordinate(axis.corner(t), decimals))
            .collect();
        match axis {
            Axis::Row => keys.sort_by(|a, b| b.total_cmp(a)),
            Axis::Column => keys.sort_by(|a, b| a.total_cmp(b)),
        }
        keys.dedup();

        let mut bands: Vec<Band> = keys
            .into_iter()
            .map(|key| Band {
                key,
                size: 0,
                offset: 0,
                members: 0,
            })
            .collect();

        for tile in tiles {
            let key = round_coordinate(axis.corner(tile), decimals);
            let idx = resolve_band(&bands, key);
            let band = &mut bands[idx];
            band.size = band.size.max(axis.extent(tile));
            band.members += 1;
        }

        let mut offset = 0;
        for band in &mut bands {
            band.offset = offset;
            offset += band.size;
        }

        bands
    }

    /// Row bands, north first
    pub fn row_bands(&self) -> &[Band] {
        &self.row_bands
    }

    /// Column bands, west first
    pub fn col_bands(&self) -> &[Band] {
        &self.col_bands
    }

    /// Canvas height: sum of row band heights
    pub fn height(&self) -> usize {
        self.row_bands.iter().map(|b| b.size).sum()
    }

    /// Canvas width: sum of column band widths
    pub fn width(&self) -> usize {
        self.col_bands.iter().map(|b| b.size).sum()
    }

    /// (row bands, column bands), i.e. (Ty, Tx)
    pub fn grid_dims(&self) -> (usize, usize) {
        (self.row_bands.len(), self.col_bands.len())
    }

    /// Grid cell `(row_index, col_index)` of a tile. Never fails: a key that
    /// is not present falls back to the numerically closest band.
    pub fn locate(&self, tile: &TileRecord) -> (usize, usize) {
        (
            self.row_for(tile.lat_max()),
            self.col_for(tile.lon_min()),
        )
    }

    /// Row band for a north-edge latitude
    pub fn row_for(&self, lat_max: f64) -> usize {
        resolve_band(&self.row_bands, round_coordinate(lat_max, self.decimals))
    }

    /// Column band for a west-edge longitude
    pub fn col_for(&self, lon_min: f64) -> usize {
        resolve_band(&self.col_bands, round_coordinate(lon_min, self.decimals))
    }
}

/// Round a coordinate to `decimals` digits.
///
/// Identical inputs always produce bit-identical keys, so `==` on the result
/// is a valid equivalence test.
pub fn round_coordinate(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}

/// Exact match on an already-rounded key
pub fn exact_band(bands: &[Band], key: f64) -> Option<usize> {
    bands.iter().position(|b| b.key == key)
}

/// Band with the smallest absolute distance to `key`. Ties go to the earlier
/// band. Returns `None` only for an empty band list.
pub fn nearest_band(bands: &[Band], key: f64) -> Option<usize> {
    bands
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (a.key - key).abs().total_cmp(&(b.key - key).abs()))
        .map(|(idx, _)| idx)
}

fn resolve_band(bands: &[Band], key: f64) -> usize {
    if let Some(idx) = exact_band(bands, key) {
        return idx;
    }
    let idx = nearest_band(bands, key).unwrap_or(0);
    log::debug!(
        "Band key {} not found, using nearest band {} (key {})",
        key,
        idx,
        bands.get(idx).map(|b| b.key).unwrap_or(f64::NAN)
    );
    idx
}
