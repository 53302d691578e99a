//! Run configuration
//!
//! Every tunable of the pipeline lives here and is passed explicitly into the
//! components that need it.

use crate::types::{StitchError, StitchResult};
use serde::{Deserialize, Serialize};

/// Decimal digits used to cluster tile corners into bands
pub const DEFAULT_ROUNDING_DECIMALS: u32 = 10;

/// Samples at or below this value are treated as missing (GSI uses -9999)
pub const DEFAULT_MISSING_THRESHOLD: f64 = -9990.0;

/// Upper bound on decode workers; decoding is dominated by file I/O
pub const MAX_DEFAULT_WORKERS: usize = 8;

/// Parameters for the randomized hole fill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpolationParams {
    /// Run the fill at all
    pub enabled: bool,
    /// Skip the fill entirely when more pixels than this are missing
    pub cap_pixels: usize,
    /// Probe offsets are drawn from [-radius, radius] on both axes
    pub radius: usize,
    /// Random probes per missing pixel per pass
    pub max_probes: usize,
    /// Maximum number of passes over the missing pixels
    pub max_passes: usize,
    /// Seed for the per-run random generator
    pub seed: u64,
}

impl Default for InterpolationParams {
    fn default() -> Self {
        Self {
            enabled: true,
            cap_pixels: 1_000_000,
            radius: 5,
            max_probes: 20,
            max_passes: 30,
            seed: 0x5eed_d3a1,
        }
    }
}

/// Configuration for one stitching run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StitchConfig {
    /// Coordinate clustering tolerance, in decimal digits
    pub rounding_decimals: u32,
    /// Numeric cutoff at or below which a sample is the sentinel
    pub missing_threshold: f64,
    /// Size of the decode worker pool
    pub workers: usize,
    /// Fixed (rows, cols) every tile must match; auto-detected when `None`
    pub standard_size: Option<(usize, usize)>,
    /// Reject tiles that disagree with the standard size during ingestion
    pub enforce_standard_size: bool,
    /// Reverse row order of every decoded tile
    pub flip_y: bool,
    pub interpolation: InterpolationParams,
    /// Resample the width to compensate for longitude shrinkage
    pub aspect_correction: bool,
    /// Also write the validity mask next to the elevation raster
    pub write_mask: bool,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            rounding_decimals: DEFAULT_ROUNDING_DECIMALS,
            missing_threshold: DEFAULT_MISSING_THRESHOLD,
            workers: default_workers(),
            standard_size: None,
            enforce_standard_size: true,
            flip_y: false,
            interpolation: InterpolationParams::default(),
            aspect_correction: true,
            write_mask: false,
        }
    }
}

impl StitchConfig {
    /// Check option ranges before any work is scheduled
    pub fn validate(&self) -> StitchResult<()> {
        // 10^15 still round-trips typical degree values through f64
        if self.rounding_decimals > 15 {
            return Err(StitchError::InvalidConfig(format!(
                "rounding_decimals must be <= 15, got {}",
                self.rounding_decimals
            )));
        }
        if !self.missing_threshold.is_finite() {
            return Err(StitchError::InvalidConfig(
                "missing_threshold must be finite".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(StitchError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        if let Some((rows, cols)) = self.standard_size {
            if rows == 0 || cols == 0 {
                return Err(StitchError::InvalidConfig(format!(
                    "standard tile size must be positive, got {}x{}",
                    rows, cols
                )));
            }
        }
        if self.interpolation.enabled && self.interpolation.radius == 0 {
            return Err(StitchError::InvalidConfig(
                "interpolation radius must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Available parallelism, capped for I/O-bound decoding
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(MAX_DEFAULT_WORKERS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StitchConfig::default();
        assert_eq!(config.rounding_decimals, 10);
        assert_eq!(config.missing_threshold, -9990.0);
        assert_eq!(config.interpolation.cap_pixels, 1_000_000);
        assert_eq!(config.interpolation.radius, 5);
        assert_eq!(config.interpolation.max_probes, 20);
        assert_eq!(config.interpolation.max_passes, 30);
        assert!(config.workers >= 1 && config.workers <= MAX_DEFAULT_WORKERS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = StitchConfig::default();
        config.workers = 0;
        assert!(config.validate().is_err());

        let mut config = StitchConfig::default();
        config.standard_size = Some((0, 10));
        assert!(config.validate().is_err());

        let mut config = StitchConfig::default();
        config.interpolation.radius = 0;
        assert!(config.validate().is_err());

        // radius is irrelevant once the fill is disabled
        config.interpolation.enabled = false;
        assert!(config.validate().is_ok());
    }
}
