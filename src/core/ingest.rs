//! Concurrent tile decoding with per-tile failure isolation

use crate::types::{DecodeFailure, StitchError, StitchResult, TileRecord};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

/// One tile to decode, numbered in traversal order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileSource {
    pub path: PathBuf,
    pub discovery_index: usize,
}

impl TileSource {
    pub fn new(path: impl Into<PathBuf>, discovery_index: usize) -> Self {
        Self {
            path: path.into(),
            discovery_index,
        }
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Decodes a single tile source into a `TileRecord`.
///
/// `expected` is the run's standard `(rows, cols)`; decoders may use it to
/// bail out early with `DecodeFailure::SizeMismatch`. Implementations must be
/// shareable across the worker pool.
pub trait TileDecoder: Sync {
    fn decode(
        &self,
        source: &TileSource,
        expected: Option<(usize, usize)>,
    ) -> Result<TileRecord, DecodeFailure>;
}

/// How tile grid sizes are policed during ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizePolicy {
    /// Every tile must be exactly (rows, cols)
    Fixed(usize, usize),
    /// The first tile that decodes (in discovery order) sets the size
    AutoDetect,
    /// Accept any size; the assembler's per-band check still applies
    Any,
}

/// Outcome of an ingestion batch
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub attempted: usize,
    pub accepted: usize,
    /// Standard tile size in force for the batch, if any
    pub standard_size: Option<(usize, usize)>,
    pub failures: Vec<(PathBuf, DecodeFailure)>,
}

impl IngestReport {
    pub fn skipped(&self) -> usize {
        self.failures.len()
    }

    /// Failures that were grid size mismatches
    pub fn size_mismatches(&self) -> usize {
        self.failures
            .iter()
            .filter(|(_, f)| matches!(f, DecodeFailure::SizeMismatch { .. }))
            .count()
    }
}

/// Runs tile decoding on a bounded worker pool and keeps the tiles that
/// decoded successfully
pub struct IngestionCoordinator<D: TileDecoder> {
    decoder: D,
    workers: usize,
    size_policy: SizePolicy,
}

impl<D: TileDecoder> IngestionCoordinator<D> {
    pub fn new(decoder: D, workers: usize, size_policy: SizePolicy) -> Self {
        Self {
            decoder,
            workers: workers.max(1),
            size_policy,
        }
    }

    /// Decode every source. Per-tile failures (including panics inside the
    /// decoder) are logged and skipped; only an empty result is an error.
    pub fn ingest(&self, sources: &[TileSource]) -> StitchResult<(Vec<TileRecord>, IngestReport)> {
        log::info!(
            "📥 Decoding {} tile source(s) with {} worker(s)",
            sources.len(),
            self.workers
        );

        let mut report = IngestReport {
            attempted: sources.len(),
            ..Default::default()
        };
        let mut tiles = Vec::with_capacity(sources.len());

        let (expected, remaining) = match self.size_policy {
            SizePolicy::Fixed(rows, cols) => (Some((rows, cols)), sources),
            SizePolicy::Any => (None, sources),
            SizePolicy::AutoDetect => {
                let (detected, consumed) = self.detect_standard_size(sources, &mut tiles, &mut report);
                (detected, &sources[consumed..])
            }
        };
        report.standard_size = expected;
        if let Some((rows, cols)) = expected {
            log::info!("Standard tile size: ({}, {})", rows, cols);
        }

        for (source, outcome) in self.decode_all(remaining, expected)? {
            match outcome {
                Ok(tile) => tiles.push(tile),
                Err(failure) => Self::record_failure(&mut report, source, failure),
            }
        }

        report.accepted = tiles.len();
        if tiles.is_empty() {
            log::error!("No valid tiles out of {} source(s)", report.attempted);
            return Err(StitchError::NoValidTiles {
                attempted: report.attempted,
            });
        }

        if report.skipped() > 0 {
            log::warn!(
                "Decoded {}/{} tiles, skipped {} ({} size mismatch)",
                report.accepted,
                report.attempted,
                report.skipped(),
                report.size_mismatches()
            );
        } else {
            log::info!("✅ Decoded all {} tiles", report.accepted);
        }

        Ok((tiles, report))
    }

    /// Decode sources in order until one succeeds; its shape becomes the
    /// standard. Returns the size and how many sources were consumed.
    fn detect_standard_size(
        &self,
        sources: &[TileSource],
        tiles: &mut Vec<TileRecord>,
        report: &mut IngestReport,
    ) -> (Option<(usize, usize)>, usize) {
        for (consumed, source) in sources.iter().enumerate() {
            match self.decode_isolated(source, None) {
                Ok(tile) => {
                    let shape = tile.shape();
                    log::debug!("Standard tile size taken from {}", source.name());
                    tiles.push(tile);
                    return (Some(shape), consumed + 1);
                }
                Err(failure) => Self::record_failure(report, source, failure),
            }
        }
        (None, sources.len())
    }

    #[cfg(feature = "parallel")]
    fn decode_all<'s>(
        &self,
        sources: &'s [TileSource],
        expected: Option<(usize, usize)>,
    ) -> StitchResult<Vec<(&'s TileSource, Result<TileRecord, DecodeFailure>)>> {
        use rayon::prelude::*;

        if sources.is_empty() {
            return Ok(Vec::new());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("tile-decode-{}", i))
            .build()
            .map_err(|e| StitchError::Processing(format!("Failed to build decode pool: {}", e)))?;

        Ok(pool.install(|| {
            sources
                .par_iter()
                .map(|source| (source, self.decode_isolated(source, expected)))
                .collect()
        }))
    }

    #[cfg(not(feature = "parallel"))]
    fn decode_all<'s>(
        &self,
        sources: &'s [TileSource],
        expected: Option<(usize, usize)>,
    ) -> StitchResult<Vec<(&'s TileSource, Result<TileRecord, DecodeFailure>)>> {
        Ok(sources
            .iter()
            .map(|source| (source, self.decode_isolated(source, expected)))
            .collect())
    }

    /// Decode one source, turning panics into `Unreadable` and enforcing the
    /// expected size even if the decoder ignored it
    fn decode_isolated(
        &self,
        source: &TileSource,
        expected: Option<(usize, usize)>,
    ) -> Result<TileRecord, DecodeFailure> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.decoder.decode(source, expected)))
            .unwrap_or_else(|payload| {
                Err(DecodeFailure::Unreadable(format!(
                    "decoder panicked: {}",
                    panic_message(payload.as_ref())
                )))
            })?;

        if let Some((rows, cols)) = expected {
            if outcome.shape() != (rows, cols) {
                return Err(DecodeFailure::SizeMismatch {
                    expected_rows: rows,
                    expected_cols: cols,
                    rows: outcome.rows(),
                    cols: outcome.cols(),
                });
            }
        }
        Ok(outcome)
    }

    fn record_failure(report: &mut IngestReport, source: &TileSource, failure: DecodeFailure) {
        log::warn!("Skip {}: {}", source.name(), failure);
        report.failures.push((source.path.clone(), failure));
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Paths of the sources that failed, for reporting
pub fn failed_paths(report: &IngestReport) -> Vec<&Path> {
    report.failures.iter().map(|(p, _)| p.as_path()).collect()
}
