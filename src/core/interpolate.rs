//! Randomized hole filling for assembled mosaics
//!
//! Small voids (single missing samples, thin seams between partial tiles) are
//! filled by averaging two randomly probed valid neighbours. The fill is an
//! approximation for visual continuity, not an exact interpolation: large voids
//! are left untouched once the missing-pixel cap is exceeded.

use crate::config::InterpolationParams;
use crate::types::{count_missing, is_missing, ElevationGrid};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Outcome of one interpolation run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterpolationReport {
    pub missing_before: usize,
    pub missing_after: usize,
    pub passes_run: usize,
    /// Pixels assigned a neighbour mean (a mean of exactly 0.0 still reads as missing)
    pub filled: usize,
    /// True when the run was skipped because too many pixels were missing
    pub skipped_over_cap: bool,
}

/// Hole interpolator with an explicit, seeded random source
pub struct HoleInterpolator {
    params: InterpolationParams,
}

impl HoleInterpolator {
    pub fn new(params: InterpolationParams) -> Self {
        Self { params }
    }

    /// Interpolator with default parameters
    pub fn standard() -> Self {
        Self::new(InterpolationParams::default())
    }

    pub fn params(&self) -> &InterpolationParams {
        &self.params
    }

    /// Fill sentinel pixels in place using a generator seeded from the params
    pub fn fill(&self, grid: &mut ElevationGrid) -> InterpolationReport {
        let mut rng = ChaCha8Rng::seed_from_u64(self.params.seed);
        self.fill_with_rng(grid, &mut rng)
    }

    /// Fill sentinel pixels in place.
    ///
    /// Each pass visits the currently missing pixels in row-major order. A pixel
    /// filled earlier in a pass counts as valid for the rest of that pass.
    pub fn fill_with_rng<R: Rng>(
        &self,
        grid: &mut ElevationGrid,
        rng: &mut R,
    ) -> InterpolationReport {
        let missing_before = count_missing(grid);
        let mut report = InterpolationReport {
            missing_before,
            missing_after: missing_before,
            ..Default::default()
        };

        if missing_before == 0 {
            log::debug!("No missing pixels, interpolation not needed");
            return report;
        }
        if missing_before > self.params.cap_pixels {
            log::warn!(
                "Skipping interpolation: {} missing pixels exceeds cap of {}",
                missing_before,
                self.params.cap_pixels
            );
            report.skipped_over_cap = true;
            return report;
        }

        log::info!(
            "Interpolating {} missing pixel(s) (radius={}, probes={}, passes<={})",
            missing_before,
            self.params.radius,
            self.params.max_probes,
            self.params.max_passes
        );

        let (height, width) = grid.dim();
        let radius = self.params.radius as isize;

        for pass in 0..self.params.max_passes {
            let holes: Vec<(usize, usize)> = grid
                .indexed_iter()
                .filter(|(_, v)| is_missing(**v))
                .map(|(idx, _)| idx)
                .collect();
            if holes.is_empty() {
                break;
            }

            let mut filled_this_pass = 0;
            for (y, x) in holes {
                let mut neighbours = [0.0f32; 2];
                let mut found = 0;

                for _ in 0..self.params.max_probes {
                    let dy = rng.gen_range(-radius..=radius);
                    let dx = rng.gen_range(-radius..=radius);
                    if dy == 0 && dx == 0 {
                        continue;
                    }
                    let ny = y as isize + dy;
                    let nx = x as isize + dx;
                    if ny < 0 || nx < 0 || ny >= height as isize || nx >= width as isize {
                        continue;
                    }
                    let value = grid[[ny as usize, nx as usize]];
                    if is_missing(value) {
                        continue;
                    }
                    neighbours[found] = value;
                    found += 1;
                    if found == neighbours.len() {
                        break;
                    }
                }

                if found == neighbours.len() {
                    grid[[y, x]] = (neighbours[0] + neighbours[1]) / 2.0;
                    filled_this_pass += 1;
                }
            }

            report.passes_run += 1;
            report.filled += filled_this_pass;
            log::debug!("Pass {}: filled {} pixel(s)", pass + 1, filled_this_pass);

            if filled_this_pass == 0 {
                break;
            }
        }

        report.missing_after = count_missing(grid);
        log::info!(
            "Interpolation finished after {} pass(es): {} -> {} missing",
            report.passes_run,
            report.missing_before,
            report.missing_after
        );
        report
    }
}
