use anyhow::{Context, Result};
use clap::Parser;
use demstitch::config::{StitchConfig, DEFAULT_MISSING_THRESHOLD, DEFAULT_ROUNDING_DECIMALS};
use demstitch::{OutputTarget, StitchPipeline};
use env_logger::{Builder, Env};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "demstitch",
    version,
    about = "Stitch GSI DEM GML tiles (directories or nested ZIPs) into one elevation raster"
)]
struct Cli {
    /// Input directories or .zip archives
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output base name (default: stitch_YYYYmmdd_HHMM)
    #[arg(long)]
    out: Option<String>,

    /// Output directory (default: next to the first input)
    #[arg(long)]
    outdir: Option<PathBuf>,

    /// Decimal digits used to cluster tile corners into bands
    #[arg(long = "round", default_value_t = DEFAULT_ROUNDING_DECIMALS)]
    round: u32,

    /// Decode workers (default: available cores, at most 8)
    #[arg(long)]
    workers: Option<usize>,

    /// Seed for hole interpolation
    #[arg(long)]
    seed: Option<u64>,

    /// Skip hole interpolation
    #[arg(long)]
    no_interp: bool,

    /// Skip the longitude aspect correction
    #[arg(long)]
    no_aspect: bool,

    /// Skip interpolation when more pixels than this are missing
    #[arg(long)]
    interp_cap: Option<usize>,

    /// Neighbour search radius in pixels
    #[arg(long)]
    interp_radius: Option<usize>,

    /// Random probes per missing pixel per pass
    #[arg(long)]
    interp_probes: Option<usize>,

    /// Maximum interpolation passes
    #[arg(long)]
    interp_passes: Option<usize>,

    /// Samples at or below this value are treated as missing
    #[arg(long, default_value_t = DEFAULT_MISSING_THRESHOLD, allow_negative_numbers = true)]
    missing_threshold: f64,

    /// Standard tile size as ROWSxCOLS (default: taken from the first tile)
    #[arg(long, value_parser = parse_tile_size)]
    tile_size: Option<(usize, usize)>,

    /// Accept tiles of any size
    #[arg(long)]
    no_standard_size: bool,

    /// Reverse the row order of every tile
    #[arg(long)]
    flip_y: bool,

    /// Also write the validity mask
    #[arg(long)]
    write_mask: bool,
}

impl Cli {
    fn to_config(&self) -> StitchConfig {
        let mut config = StitchConfig {
            rounding_decimals: self.round,
            missing_threshold: self.missing_threshold,
            standard_size: self.tile_size,
            enforce_standard_size: !self.no_standard_size,
            flip_y: self.flip_y,
            aspect_correction: !self.no_aspect,
            write_mask: self.write_mask,
            ..Default::default()
        };
        if let Some(workers) = self.workers {
            config.workers = workers;
        }

        let interp = &mut config.interpolation;
        interp.enabled = !self.no_interp;
        if let Some(seed) = self.seed {
            interp.seed = seed;
        }
        if let Some(cap) = self.interp_cap {
            interp.cap_pixels = cap;
        }
        if let Some(radius) = self.interp_radius {
            interp.radius = radius;
        }
        if let Some(probes) = self.interp_probes {
            interp.max_probes = probes;
        }
        if let Some(passes) = self.interp_passes {
            interp.max_passes = passes;
        }
        config
    }

    fn output_target(&self) -> OutputTarget {
        let base_name = self
            .out
            .clone()
            .unwrap_or_else(|| chrono::Local::now().format("stitch_%Y%m%d_%H%M").to_string());
        let dir = self
            .outdir
            .clone()
            .unwrap_or_else(|| default_outdir(&self.inputs[0]));
        OutputTarget::new(dir, base_name)
    }
}

/// Parent of the first input when it is a file, else the input itself
fn default_outdir(first: &Path) -> PathBuf {
    if first.is_file() {
        match first.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    } else {
        first.to_path_buf()
    }
}

fn parse_tile_size(s: &str) -> Result<(usize, usize), String> {
    let (rows, cols) = s
        .split_once(|c| c == 'x' || c == 'X')
        .ok_or_else(|| format!("expected ROWSxCOLS, got '{}'", s))?;
    let rows: usize = rows.trim().parse().map_err(|_| format!("bad row count '{}'", rows))?;
    let cols: usize = cols.trim().parse().map_err(|_| format!("bad column count '{}'", cols))?;
    if rows == 0 || cols == 0 {
        return Err(format!("tile size must be positive, got {}x{}", rows, cols));
    }
    Ok((rows, cols))
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.to_config();
    let target = cli.output_target();

    log::info!("Inputs: {:?}", cli.inputs);
    log::info!("Output: {}", target.raster_path().display());
    log::debug!("Config: {:?}", config);

    let pipeline = StitchPipeline::new(config).context("invalid options")?;
    let summary = pipeline.run(&cli.inputs, &target)?;

    log::info!("Summary written to {}", target.summary_path().display());
    log::info!(
        "placed {} / {} tiles, shape H={}, W={}",
        summary.placed,
        summary.tiles_in,
        summary.corrected_shape.0,
        summary.corrected_shape.1
    );
    Ok(())
}

fn main() -> ExitCode {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_secs();
    builder.init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(1)
        }
    }
}
