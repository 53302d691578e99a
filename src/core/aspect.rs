use crate::types::{BoundingBox, ElevationGrid, Mosaic, ValidityMask};
use ndarray::{Array2, Axis};

/// Largest width factor accepted; anything above comes from a degenerate bounding box
pub const MAX_ASPECT_SCALE: f64 = 16.0;

/// Horizontal scale derived from a mosaic's geographic span
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AspectCorrection {
    /// (dLat / dLon) / cos(midLat)
    pub raw_scale: f64,
    /// 1 / raw_scale, the factor actually applied to the width
    pub applied_scale: f64,
    pub source_width: usize,
    pub new_width: usize,
}

impl AspectCorrection {
    /// No-op correction for a mosaic of `width` columns
    pub fn identity(width: usize) -> Self {
        Self {
            raw_scale: 1.0,
            applied_scale: 1.0,
            source_width: width,
            new_width: width.max(1),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.new_width == self.source_width
    }
}

/// Corrects for longitude degrees shrinking away from the equator by
/// resampling every row to a new width. Height never changes.
pub struct AspectCorrector;

impl AspectCorrector {
    /// Compute the width correction for an `height x width` mosaic covering
    /// `bbox` (the union of all input tiles).
    ///
    /// The applied factor is the inverse of the raw latitude/longitude pixel
    /// ratio. Changing it changes output dimensions; keep it as is.
    pub fn compute(bbox: &BoundingBox, height: usize, width: usize) -> AspectCorrection {
        let identity = AspectCorrection::identity(width);
        if height == 0 || width == 0 {
            return identity;
        }

        let d_lat = bbox.lat_span() / height as f64;
        let d_lon = bbox.lon_span() / width as f64;
        let mid_lat = (bbox.min_lat + bbox.max_lat) / 2.0;

        let raw_scale = (d_lat / d_lon) * (1.0 / mid_lat.to_radians().cos());
        let applied_scale = 1.0 / raw_scale;

        if !applied_scale.is_finite() || applied_scale <= 0.0 || applied_scale > MAX_ASPECT_SCALE {
            log::warn!(
                "Degenerate aspect scale {} (lat span {}, lon span {}), keeping width {}",
                applied_scale,
                bbox.lat_span(),
                bbox.lon_span(),
                width
            );
            return identity;
        }

        let new_width = ((width as f64 * applied_scale).round() as usize).max(1);
        log::debug!(
            "Aspect: dLat={:.3e} dLon={:.3e} midLat={:.4} raw={:.6} applied={:.6}",
            d_lat,
            d_lon,
            mid_lat,
            raw_scale,
            applied_scale
        );

        AspectCorrection {
            raw_scale,
            applied_scale,
            source_width: width,
            new_width,
        }
    }

    /// Produce a new mosaic with corrected width. The validity mask goes
    /// through the same resampling so data and mask stay pixel-aligned.
    pub fn apply(mosaic: &Mosaic, bbox: &BoundingBox) -> (Mosaic, AspectCorrection) {
        let correction = Self::compute(bbox, mosaic.height(), mosaic.width());
        log::info!(
            "📐 Aspect correction: scale {:.4}, width {} -> {}",
            correction.applied_scale,
            correction.source_width,
            correction.new_width
        );

        let corrected = Mosaic {
            elevation: resample_rows(&mosaic.elevation, correction.new_width),
            valid_mask: resample_mask(&mosaic.valid_mask, correction.new_width),
        };
        (corrected, correction)
    }
}

/// Piecewise-linear resampling of every row to `new_width` samples.
///
/// Source and target positions are evenly spaced over [0, 1] with both
/// endpoints included. Resampling to the current width returns a copy.
pub fn resample_rows(grid: &ElevationGrid, new_width: usize) -> ElevationGrid {
    let (height, width) = grid.dim();
    let new_width = new_width.max(1);
    if new_width == width || width == 0 {
        return grid.clone();
    }

    let taps = linear_taps(width, new_width);
    let mut out = Array2::zeros((height, new_width));
    for (src, mut dst) in grid.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
        for (j, &(i0, i1, frac)) in taps.iter().enumerate() {
            let a = src[i0] as f64;
            let b = src[i1] as f64;
            dst[j] = (a + (b - a) * frac) as f32;
        }
    }
    out
}

/// Resample a validity mask as 0/1 values and threshold at one half
pub fn resample_mask(mask: &ValidityMask, new_width: usize) -> ValidityMask {
    if mask.ncols() == new_width.max(1) {
        return mask.clone();
    }
    let as_float = mask.mapv(|v| if v { 1.0f32 } else { 0.0 });
    resample_rows(&as_float, new_width).mapv(|v| v >= 0.5)
}

/// (left index, right index, fraction) for each target column
fn linear_taps(width: usize, new_width: usize) -> Vec<(usize, usize, f64)> {
    let last = width - 1;
    (0..new_width)
        .map(|j| {
            if new_width == 1 || last == 0 {
                return (0, 0, 0.0);
            }
            // j * (W-1) / (N-1), exact at both endpoints
            let pos = (j * last) as f64 / (new_width - 1) as f64;
            let i0 = (pos.floor() as usize).min(last);
            let i1 = (i0 + 1).min(last);
            (i0, i1, pos - i0 as f64)
        })
        .collect()
}
