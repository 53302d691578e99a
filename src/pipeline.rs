//! End-to-end stitching run: discover, decode, assemble, fill, correct, write

use crate::config::StitchConfig;
use crate::core::{
    AspectCorrection, AspectCorrector, AssemblyReport, BandIndex, HoleInterpolator,
    IngestReport, IngestionCoordinator, InterpolationReport, MosaicAssembler, SizePolicy,
};
use crate::core::ingest::failed_paths;
use crate::io::{archive, writer, GmlTileDecoder};
use crate::types::{BoundingBox, Mosaic, StitchError, StitchResult, TileRecord};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Where a run writes its artifacts
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTarget {
    pub dir: PathBuf,
    pub base_name: String,
}

impl OutputTarget {
    pub fn new(dir: impl Into<PathBuf>, base_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            base_name: base_name.into(),
        }
    }

    pub fn raster_path(&self) -> PathBuf {
        self.dir.join(format!("{}.tif", self.base_name))
    }

    pub fn mask_path(&self) -> PathBuf {
        self.dir.join(format!("{}_mask.tif", self.base_name))
    }

    pub fn summary_path(&self) -> PathBuf {
        self.dir.join(format!("{}_summary.txt", self.base_name))
    }
}

/// Result of stitching an in-memory tile set
#[derive(Debug, Clone)]
pub struct StitchOutcome {
    /// Final mosaic (after interpolation and aspect correction)
    pub mosaic: Mosaic,
    /// (Ty, Tx) band grid
    pub grid: (usize, usize),
    /// (H, W) of the canvas before aspect correction
    pub assembled_shape: (usize, usize),
    /// Union of the decoded tiles' extents
    pub coverage: BoundingBox,
    pub assembly: AssemblyReport,
    pub interpolation: InterpolationReport,
    pub aspect: AspectCorrection,
}

/// Counters written to the summary artifact
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub tiles_in: usize,
    pub tiles_accepted: usize,
    pub decode_failures: usize,
    pub placed: usize,
    pub skipped_irregular: usize,
    /// (Ty, Tx)
    pub grid: (usize, usize),
    /// (H, W) before aspect correction
    pub shape: (usize, usize),
    /// (H, W) of the written raster
    pub corrected_shape: (usize, usize),
    pub missing_before: usize,
    pub missing_after: usize,
    pub scale: f64,
    pub output: PathBuf,
}

impl RunSummary {
    fn from_run(ingest: &IngestReport, outcome: &StitchOutcome, output: PathBuf) -> Self {
        Self {
            tiles_in: ingest.attempted,
            tiles_accepted: ingest.accepted,
            decode_failures: ingest.skipped(),
            placed: outcome.assembly.placed,
            skipped_irregular: outcome.assembly.skipped_irregular(),
            grid: outcome.grid,
            shape: outcome.assembled_shape,
            corrected_shape: (outcome.mosaic.height(), outcome.mosaic.width()),
            missing_before: outcome.interpolation.missing_before,
            missing_after: outcome.interpolation.missing_after,
            scale: outcome.aspect.applied_scale,
            output,
        }
    }

    /// `key: value` lines
    pub fn to_text(&self) -> String {
        let (ty, tx) = self.grid;
        let (h, w) = self.shape;
        let (ch, cw) = self.corrected_shape;
        let lines = [
            format!("tiles_in: {}", self.tiles_in),
            format!("tiles_accepted: {}", self.tiles_accepted),
            format!("decode_failures: {}", self.decode_failures),
            format!("placed: {}", self.placed),
            format!("skipped_irregular: {}", self.skipped_irregular),
            format!("grid: Tx={}, Ty={}", tx, ty),
            format!("shape: H={}, W={}", h, w),
            format!("corrected_shape: H={}, W={}", ch, cw),
            format!("missing_before: {}", self.missing_before),
            format!("missing_after: {}", self.missing_after),
            format!("scale: {:.6}", self.scale),
            format!("output: {}", self.output.display()),
        ];
        let mut text = lines.join("\n");
        text.push('\n');
        text
    }

    /// Anything dropped along the way
    pub fn is_partial(&self) -> bool {
        self.decode_failures > 0 || self.skipped_irregular > 0
    }
}

/// Orchestrates a full stitching run with one validated configuration
pub struct StitchPipeline {
    config: StitchConfig,
}

impl StitchPipeline {
    pub fn new(config: StitchConfig) -> StitchResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &StitchConfig {
        &self.config
    }

    fn size_policy(&self) -> SizePolicy {
        match (self.config.enforce_standard_size, self.config.standard_size) {
            (false, _) => SizePolicy::Any,
            (true, Some((rows, cols))) => SizePolicy::Fixed(rows, cols),
            (true, None) => SizePolicy::AutoDetect,
        }
    }

    /// Index, assemble, fill and correct already decoded tiles
    pub fn stitch_tiles(&self, tiles: &[TileRecord]) -> StitchResult<StitchOutcome> {
        let index = BandIndex::build(tiles, self.config.rounding_decimals)?;
        let (ty, tx) = index.grid_dims();
        log::info!("Grid: Tx={}, Ty={}", tx, ty);

        let (mut mosaic, assembly) = MosaicAssembler::new(&index).assemble(tiles)?;
        let assembled_shape = (mosaic.height(), mosaic.width());
        log::info!("Mosaic shape: H={}, W={}", assembled_shape.0, assembled_shape.1);

        let interpolation = if self.config.interpolation.enabled {
            HoleInterpolator::new(self.config.interpolation.clone()).fill(&mut mosaic.elevation)
        } else {
            let missing = mosaic.missing_count();
            log::info!("Interpolation disabled, {} missing pixel(s) left as-is", missing);
            InterpolationReport {
                missing_before: missing,
                missing_after: missing,
                ..Default::default()
            }
        };

        let coverage = BoundingBox::covering(tiles.iter()).ok_or_else(|| {
            StitchError::Processing("cannot compute coverage of an empty tile set".to_string())
        })?;

        let (mosaic, aspect) = if self.config.aspect_correction {
            AspectCorrector::apply(&mosaic, &coverage)
        } else {
            let identity = AspectCorrection::identity(mosaic.width());
            (mosaic, identity)
        };

        Ok(StitchOutcome {
            mosaic,
            grid: (ty, tx),
            assembled_shape,
            coverage,
            assembly,
            interpolation,
            aspect,
        })
    }

    /// Full run from input paths to artifacts on disk.
    ///
    /// Nothing is written unless stitching succeeds. The extraction
    /// workspace is removed when this returns, on success or failure.
    pub fn run<P: AsRef<Path>>(&self, inputs: &[P], target: &OutputTarget) -> StitchResult<RunSummary> {
        let workspace = archive::TileWorkspace::new()?;
        let sources = archive::collect_tile_sources(inputs, &workspace)?;
        if sources.is_empty() {
            return Err(StitchError::NoTilesFound);
        }

        let decoder = GmlTileDecoder::new(self.config.missing_threshold, self.config.flip_y);
        let coordinator = IngestionCoordinator::new(decoder, self.config.workers, self.size_policy());
        let (tiles, ingest) = coordinator.ingest(&sources)?;

        let outcome = self.stitch_tiles(&tiles)?;

        std::fs::create_dir_all(&target.dir)?;
        let raster_path = target.raster_path();
        writer::write_raster(&raster_path, &outcome.mosaic.elevation)?;
        if self.config.write_mask {
            writer::write_mask(&target.mask_path(), &outcome.mosaic.valid_mask)?;
        }

        let summary = RunSummary::from_run(&ingest, &outcome, raster_path);
        writer::write_text(&target.summary_path(), &summary.to_text())?;

        if summary.is_partial() {
            log::warn!(
                "⚠️  Partial mosaic: {} tile(s) failed to decode ({} size mismatch), {} irregular tile(s) skipped",
                summary.decode_failures,
                ingest.size_mismatches(),
                summary.skipped_irregular
            );
            log::debug!("Tiles that failed to decode: {:?}", failed_paths(&ingest));
        }
        log::info!(
            "✅ Stitched {} of {} tile(s) into {}",
            summary.placed,
            summary.tiles_in,
            summary.output.display()
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SENTINEL;

    fn tile(lon: (f64, f64), samples: Vec<f32>, idx: usize) -> TileRecord {
        TileRecord::from_samples(
            BoundingBox::new(35.0, 35.1, lon.0, lon.1),
            3,
            3,
            samples,
            format!("tile_{}.xml", idx),
            idx,
        )
        .unwrap()
    }

    fn config() -> StitchConfig {
        StitchConfig {
            workers: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let bad = StitchConfig {
            workers: 0,
            ..Default::default()
        };
        assert!(matches!(StitchPipeline::new(bad), Err(StitchError::InvalidConfig(_))));
    }

    #[test]
    fn test_stitch_without_optional_stages() {
        let mut cfg = config();
        cfg.interpolation.enabled = false;
        cfg.aspect_correction = false;
        let pipeline = StitchPipeline::new(cfg).unwrap();

        let mut a = vec![1.0; 9];
        a[4] = SENTINEL;
        let tiles = vec![tile((135.0, 135.1), a, 0), tile((135.1, 135.2), vec![2.0; 9], 1)];
        let outcome = pipeline.stitch_tiles(&tiles).unwrap();

        assert_eq!(outcome.grid, (1, 2));
        assert_eq!(outcome.assembled_shape, (3, 6));
        assert_eq!((outcome.mosaic.height(), outcome.mosaic.width()), (3, 6));
        assert!(outcome.aspect.is_identity());
        assert_eq!(outcome.interpolation.missing_before, 1);
        assert_eq!(outcome.interpolation.missing_after, 1);
        assert_eq!(outcome.coverage, BoundingBox::new(35.0, 35.1, 135.0, 135.2));
    }

    #[test]
    fn test_aspect_correction_changes_width_only() {
        let pipeline = StitchPipeline::new(config()).unwrap();
        let tiles = vec![tile((135.0, 135.1), vec![1.0; 9], 0), tile((135.1, 135.2), vec![2.0; 9], 1)];
        let outcome = pipeline.stitch_tiles(&tiles).unwrap();

        assert_eq!(outcome.mosaic.height(), 3);
        assert_eq!(outcome.mosaic.width(), outcome.aspect.new_width);
        assert_eq!(outcome.mosaic.valid_mask.dim(), outcome.mosaic.elevation.dim());
    }

    #[test]
    fn test_size_policy_follows_config() {
        let mut cfg = config();
        assert_eq!(StitchPipeline::new(cfg.clone()).unwrap().size_policy(), SizePolicy::AutoDetect);

        cfg.standard_size = Some((225, 150));
        assert_eq!(StitchPipeline::new(cfg.clone()).unwrap().size_policy(), SizePolicy::Fixed(225, 150));

        cfg.enforce_standard_size = false;
        assert_eq!(StitchPipeline::new(cfg).unwrap().size_policy(), SizePolicy::Any);
    }

    #[test]
    fn test_summary_text_keys() {
        let summary = RunSummary {
            tiles_in: 4,
            tiles_accepted: 3,
            decode_failures: 1,
            placed: 3,
            skipped_irregular: 0,
            grid: (2, 2),
            shape: (450, 300),
            corrected_shape: (450, 366),
            missing_before: 225 * 150,
            missing_after: 225 * 150,
            scale: 1.22,
            output: PathBuf::from("out/stitch.tif"),
        };
        let text = summary.to_text();

        assert!(text.contains("tiles_in: 4\n"));
        assert!(text.contains("grid: Tx=2, Ty=2\n"));
        assert!(text.contains("shape: H=450, W=300\n"));
        assert!(text.contains("corrected_shape: H=450, W=366\n"));
        assert!(text.contains("scale: 1.220000\n"));
        assert!(summary.is_partial());
    }
}
