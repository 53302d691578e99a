use crate::core::band_index::BandIndex;
use crate::types::{is_missing, Mosaic, StitchError, StitchResult, TileRecord, SENTINEL};
use ndarray::{s, Array2};
use std::collections::HashSet;
use std::path::PathBuf;

/// A tile dropped because its shape disagrees with the band cell it maps to
#[derive(Debug, Clone, PartialEq)]
pub struct IrregularTile {
    pub source: PathBuf,
    /// (rows, cols) of the tile
    pub shape: (usize, usize),
    /// (height, width) declared by its row/column bands
    pub cell: (usize, usize),
}

/// Outcome of placing tiles on the canvas
#[derive(Debug, Clone, Default)]
pub struct AssemblyReport {
    /// Tiles written to the canvas
    pub placed: usize,
    /// Tiles rejected instead of being partially written
    pub irregular: Vec<IrregularTile>,
    /// Placed tiles that landed on an already occupied cell (last write wins)
    pub overwritten: usize,
}

impl AssemblyReport {
    pub fn skipped_irregular(&self) -> usize {
        self.irregular.len()
    }
}

/// Places tiles into a single canvas using a band index
pub struct MosaicAssembler<'a> {
    index: &'a BandIndex,
}

impl<'a> MosaicAssembler<'a> {
    pub fn new(index: &'a BandIndex) -> Self {
        Self { index }
    }

    /// Build the mosaic and snapshot its validity mask.
    ///
    /// Tiles are written in `discovery_index` order so duplicate cells resolve
    /// the same way no matter how the tile list was produced.
    pub fn assemble(&self, tiles: &[TileRecord]) -> StitchResult<(Mosaic, AssemblyReport)> {
        let height = self.index.height();
        let width = self.index.width();
        log::info!("🧩 Assembling {} tiles into {}x{} canvas", tiles.len(), height, width);

        let mut canvas = Array2::from_elem((height, width), SENTINEL);
        let mut report = AssemblyReport::default();
        let mut occupied: HashSet<(usize, usize)> = HashSet::new();

        let mut ordered: Vec<&TileRecord> = tiles.iter().collect();
        ordered.sort_by_key(|t| t.discovery_index());

        for tile in ordered {
            let (row, col) = self.index.locate(tile);
            let row_band = &self.index.row_bands()[row];
            let col_band = &self.index.col_bands()[col];

            let cell = (row_band.size, col_band.size);
            if tile.shape() != cell {
                log::warn!(
                    "Skip irregular tile size: {} is {}x{}, band cell ({}, {}) is {}x{}",
                    tile.name(),
                    tile.rows(),
                    tile.cols(),
                    row,
                    col,
                    cell.0,
                    cell.1
                );
                report.irregular.push(IrregularTile {
                    source: tile.source().to_path_buf(),
                    shape: tile.shape(),
                    cell,
                });
                continue;
            }

            if !occupied.insert((row, col)) {
                log::debug!(
                    "Tile {} overwrites earlier tile at band cell ({}, {})",
                    tile.name(),
                    row,
                    col
                );
                report.overwritten += 1;
            }

            let y0 = row_band.offset;
            let x0 = col_band.offset;
            canvas
                .slice_mut(s![y0..y0 + cell.0, x0..x0 + cell.1])
                .assign(tile.samples());
            report.placed += 1;
        }

        log::info!("Placed tiles: {}/{}", report.placed, tiles.len());
        if report.overwritten > 0 {
            log::warn!(
                "{} tile(s) overwrote an earlier tile in the same band cell",
                report.overwritten
            );
        }

        if report.placed == 0 {
            return Err(StitchError::NoTilesPlaced {
                accepted: tiles.len(),
            });
        }

        let valid_mask = canvas.mapv(|v| !is_missing(v));
        let mosaic = Mosaic {
            elevation: canvas,
            valid_mask,
        };

        let total = (height * width) as f64;
        log::info!(
            "Canvas coverage: {:.1}% valid, {} missing pixel(s)",
            mosaic.valid_count() as f64 / total * 100.0,
            mosaic.missing_count()
        );

        Ok((mosaic, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;

    fn tile(
        lat: (f64, f64),
        lon: (f64, f64),
        rows: usize,
        cols: usize,
        samples: Vec<f32>,
        discovery_index: usize,
    ) -> TileRecord {
        TileRecord::from_samples(
            BoundingBox::new(lat.0, lat.1, lon.0, lon.1),
            rows,
            cols,
            samples,
            format!("tile_{}.xml", discovery_index),
            discovery_index,
        )
        .unwrap()
    }

    fn assemble(tiles: &[TileRecord]) -> StitchResult<(Mosaic, AssemblyReport)> {
        let index = BandIndex::build(tiles, 10).unwrap();
        MosaicAssembler::new(&index).assemble(tiles)
    }

    #[test]
    fn test_two_tiles_make_three_by_six() {
        let a: Vec<f32> = (1..=9).map(|v| v as f32).collect();
        let b: Vec<f32> = (11..=19).map(|v| v as f32).collect();
        let tiles = vec![
            tile((35.0, 35.1), (135.1, 135.2), 3, 3, b, 1),
            tile((35.0, 35.1), (135.0, 135.1), 3, 3, a, 0),
        ];

        let (mosaic, report) = assemble(&tiles).unwrap();

        assert_eq!(mosaic.elevation.dim(), (3, 6));
        assert_eq!(report.placed, 2);
        assert_eq!(mosaic.elevation.row(0).to_vec(), vec![1.0, 2.0, 3.0, 11.0, 12.0, 13.0]);
        assert_eq!(mosaic.elevation.row(2).to_vec(), vec![7.0, 8.0, 9.0, 17.0, 18.0, 19.0]);
    }

    #[test]
    fn test_canvas_matches_band_sums_with_gaps() {
        // 2x2 grid with the south-east tile missing
        let tiles = vec![
            tile((35.0, 35.1), (135.0, 135.1), 2, 2, vec![1.0; 4], 0),
            tile((35.0, 35.1), (135.1, 135.2), 2, 2, vec![2.0; 4], 1),
            tile((34.9, 35.0), (135.0, 135.1), 2, 2, vec![3.0; 4], 2),
        ];
        let index = BandIndex::build(&tiles, 10).unwrap();
        let (mosaic, _) = MosaicAssembler::new(&index).assemble(&tiles).unwrap();

        assert_eq!(mosaic.height(), index.row_bands().iter().map(|b| b.size).sum::<usize>());
        assert_eq!(mosaic.width(), index.col_bands().iter().map(|b| b.size).sum::<usize>());
        assert_eq!(mosaic.elevation[[3, 3]], SENTINEL);
        assert_eq!(mosaic.elevation[[2, 0]], 3.0);
        assert_eq!(mosaic.missing_count(), 4);
        assert!(!mosaic.valid_mask[[3, 3]]);
        assert!(mosaic.valid_mask[[0, 3]]);
    }

    #[test]
    fn test_assembly_is_idempotent() {
        let tiles = vec![
            tile((35.0, 35.1), (135.0, 135.1), 2, 2, vec![1.0, 2.0, 3.0, 4.0], 0),
            tile((35.0, 35.1), (135.1, 135.2), 2, 2, vec![5.0, 0.0, 7.0, 8.0], 1),
        ];
        let (first, _) = assemble(&tiles).unwrap();
        let (second, _) = assemble(&tiles).unwrap();

        assert_eq!(first.elevation, second.elevation);
        assert_eq!(first.valid_mask, second.valid_mask);
    }

    #[test]
    fn test_duplicate_cell_last_discovered_wins() {
        let tiles = vec![
            tile((35.0, 35.1), (135.0, 135.1), 1, 2, vec![9.0, 9.0], 5),
            tile((35.0, 35.1), (135.0, 135.1), 1, 2, vec![1.0, 1.0], 2),
        ];
        let (mosaic, report) = assemble(&tiles).unwrap();

        assert_eq!(mosaic.elevation.row(0).to_vec(), vec![9.0, 9.0]);
        assert_eq!(report.placed, 2);
        assert_eq!(report.overwritten, 1);
    }

    #[test]
    fn test_irregular_tile_is_skipped_not_partially_written() {
        // Both tiles share one row band; the second is shorter than the band
        let tiles = vec![
            tile((35.0, 35.1), (135.0, 135.1), 3, 2, vec![1.0; 6], 0),
            tile((35.0, 35.1), (135.1, 135.2), 2, 2, vec![7.0; 4], 1),
        ];
        let (mosaic, report) = assemble(&tiles).unwrap();

        assert_eq!(report.placed, 1);
        assert_eq!(report.skipped_irregular(), 1);
        assert_eq!(report.irregular[0].shape, (2, 2));
        assert_eq!(report.irregular[0].cell, (3, 2));
        assert!(mosaic.elevation.slice(s![.., 2..4]).iter().all(|v| *v == SENTINEL));
    }

    #[test]
    fn test_nothing_placed_is_fatal() {
        let tiles = vec![
            tile((35.0, 35.1), (135.0, 135.1), 3, 2, vec![1.0; 6], 0),
            tile((35.0, 35.1), (135.0, 135.1), 2, 3, vec![1.0; 6], 1),
        ];
        // band cell is 3x3, neither tile matches
        assert!(matches!(
            assemble(&tiles),
            Err(StitchError::NoTilesPlaced { accepted: 2 })
        ));
    }

    #[test]
    fn test_mask_marks_sentinel_samples_invalid() {
        let tiles = vec![tile((35.0, 35.1), (135.0, 135.1), 1, 3, vec![4.0, 0.0, 5.0], 0)];
        let (mosaic, _) = assemble(&tiles).unwrap();
        assert_eq!(mosaic.valid_mask.row(0).to_vec(), vec![true, false, true]);
    }
}
