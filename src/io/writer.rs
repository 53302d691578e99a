use crate::types::{ElevationGrid, StitchError, StitchResult, ValidityMask};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tiff::encoder::{colortype, TiffEncoder};

/// Write the mosaic as a single-band float32 TIFF.
///
/// The file appears at `path` only once fully written; a failed run never
/// leaves a partial raster behind.
pub fn write_raster(path: &Path, grid: &ElevationGrid) -> StitchResult<()> {
    let (height, width) = dimensions(grid.dim())?;
    let data: Vec<f32> = grid.iter().copied().collect();

    write_atomically(path, |file| {
        let mut encoder = TiffEncoder::new(file).map_err(encode_error)?;
        encoder
            .write_image::<colortype::Gray32Float>(width, height, &data)
            .map_err(encode_error)
    })?;

    log::info!("💾 Wrote {}x{} elevation raster to {}", height, width, path.display());
    Ok(())
}

/// Write a validity mask as an 8-bit TIFF (255 = valid, 0 = missing)
pub fn write_mask(path: &Path, mask: &ValidityMask) -> StitchResult<()> {
    let (height, width) = dimensions(mask.dim())?;
    let data: Vec<u8> = mask.iter().map(|&v| if v { 255 } else { 0 }).collect();

    write_atomically(path, |file| {
        let mut encoder = TiffEncoder::new(file).map_err(encode_error)?;
        encoder
            .write_image::<colortype::Gray8>(width, height, &data)
            .map_err(encode_error)
    })?;

    log::info!("Wrote validity mask to {}", path.display());
    Ok(())
}

/// Write a small text artifact (the run summary)
pub fn write_text(path: &Path, text: &str) -> StitchResult<()> {
    write_atomically(path, |file| {
        file.write_all(text.as_bytes())?;
        Ok(())
    })
}

/// Fill a temp file next to `path`, then rename it into place
fn write_atomically<F>(path: &Path, fill: F) -> StitchResult<()>
where
    F: FnOnce(&mut File) -> StitchResult<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".demstitch-")
        .tempfile_in(dir)?;

    fill(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    persist(tmp, path)
}

fn persist(tmp: NamedTempFile, path: &Path) -> StitchResult<()> {
    tmp.persist(path).map_err(|e| StitchError::Io(e.error))?;
    Ok(())
}

fn dimensions((height, width): (usize, usize)) -> StitchResult<(u32, u32)> {
    if height == 0 || width == 0 {
        return Err(StitchError::Encode(format!("empty raster ({}x{})", height, width)));
    }
    let h = u32::try_from(height).map_err(|_| StitchError::Encode(format!("height {} too large for TIFF", height)))?;
    let w = u32::try_from(width).map_err(|_| StitchError::Encode(format!("width {} too large for TIFF", width)))?;
    Ok((h, w))
}

fn encode_error(e: tiff::TiffError) -> StitchError {
    StitchError::Encode(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tiff::decoder::{Decoder, DecodingResult};

    #[test]
    fn test_raster_round_trips_dimensions_and_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mosaic.tif");
        let grid = array![[1.5f32, 2.5, 0.0], [4.0, 5.0, 6.25]];

        write_raster(&path, &grid).unwrap();

        let mut decoder = Decoder::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(decoder.dimensions().unwrap(), (3, 2));
        match decoder.read_image().unwrap() {
            DecodingResult::F32(values) => assert_eq!(values, vec![1.5, 2.5, 0.0, 4.0, 5.0, 6.25]),
            _ => panic!("expected float32 samples"),
        }
    }

    #[test]
    fn test_mask_is_eight_bit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.tif");
        write_mask(&path, &array![[true, false], [false, true]]).unwrap();

        let mut decoder = Decoder::new(File::open(&path).unwrap()).unwrap();
        match decoder.read_image().unwrap() {
            DecodingResult::U8(values) => assert_eq!(values, vec![255, 0, 0, 255]),
            _ => panic!("expected 8-bit samples"),
        }
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        write_text(&dir.path().join("summary.txt"), "placed: 1\n").unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["summary.txt"]);
    }

    #[test]
    fn test_empty_raster_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.tif");
        let grid = ElevationGrid::zeros((0, 4));

        assert!(matches!(write_raster(&path, &grid), Err(StitchError::Encode(_))));
        assert!(!path.exists());
    }
}
