//! Input discovery: directories, ZIP archives and ZIPs nested inside ZIPs
//!
//! Tile XML found on disk is used in place. ZIP archives are selectively
//! extracted into a run-scoped temporary workspace, so only plausible DEM
//! tiles and inner archives ever touch the disk.

use crate::core::ingest::TileSource;
use crate::types::{StitchError, StitchResult};
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;
use zip::ZipArchive;

/// Bytes inspected when deciding whether an XML file is a DEM tile
pub const HEAD_SNIFF_BYTES: usize = 8 * 1024;

/// Deepest chain of ZIP-in-ZIP that is expanded
pub const MAX_ZIP_NESTING: usize = 8;

const DEM_MARKERS: [&str; 4] = ["<DEM", "ElevationModel", "tupleList", "doubleOrNilReasonTupleList"];

/// Temporary directory owned by one run; removed when dropped
pub struct TileWorkspace {
    root: TempDir,
}

impl TileWorkspace {
    pub fn new() -> StitchResult<Self> {
        let root = tempfile::Builder::new().prefix("demstitch-").tempdir()?;
        log::debug!("Workspace: {}", root.path().display());
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Fresh, uniquely named directory inside the workspace
    fn allocate_dir(&self, label: &str) -> StitchResult<PathBuf> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", label))
            .tempdir_in(self.root.path())?;
        // Removal is left to the workspace root
        Ok(dir.into_path())
    }
}

/// Name-based filter for DEM tile XML (metadata and index files are rejected)
pub fn looks_like_dem_xml_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.ends_with(".xml")
        && !lower.starts_with("fmdid")
        && !lower.contains("metadata")
        && !lower.ends_with("_index.xml")
}

/// Content-based filter over the first bytes of a file
pub fn looks_like_dem_xml_head(head: &[u8]) -> bool {
    let head = &head[..head.len().min(HEAD_SNIFF_BYTES)];
    let text = String::from_utf8_lossy(head);
    DEM_MARKERS.iter().any(|m| text.contains(m))
}

fn is_zip_name(name: &str) -> bool {
    name.to_lowercase().ends_with(".zip")
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn sniff_file(path: &Path) -> std::io::Result<bool> {
    let mut head = Vec::with_capacity(HEAD_SNIFF_BYTES);
    File::open(path)?
        .take(HEAD_SNIFF_BYTES as u64)
        .read_to_end(&mut head)?;
    Ok(looks_like_dem_xml_head(&head))
}

/// What one archive contributed
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Extracted {
    /// DEM XML written to disk, in archive order
    pub xml_files: Vec<PathBuf>,
    /// Inner archives written to disk, in archive order
    pub nested_zips: Vec<PathBuf>,
}

/// Extract plausible tile XML and inner ZIPs from `zip_path` into `dest`.
///
/// Unreadable entries are skipped with a warning. An archive that cannot be
/// opened at all is `StitchError::Archive`.
pub fn extract_zip_selective(zip_path: &Path, dest: &Path) -> StitchResult<Extracted> {
    let mut extracted = Extracted::default();

    let file = File::open(zip_path)
        .map_err(|e| StitchError::Archive(format!("{}: {}", zip_path.display(), e)))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| StitchError::Archive(format!("{}: {}", zip_path.display(), e)))?;

    for i in 0..archive.len() {
        let mut entry = match archive.by_index(i) {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping entry {} of {}: {}", i, zip_path.display(), e);
                continue;
            }
        };
        if entry.is_dir() {
            continue;
        }
        let relative = match entry.enclosed_name() {
            Some(p) => p.to_path_buf(),
            None => {
                log::warn!("Skipping unsafe entry path '{}' in {}", entry.name(), zip_path.display());
                continue;
            }
        };
        let name = file_name_of(&relative);

        let wants_zip = is_zip_name(&name);
        if !wants_zip && !looks_like_dem_xml_name(&name) {
            continue;
        }

        // declared sizes come from the archive itself and are not trusted
        let mut bytes = Vec::new();
        if let Err(e) = entry.read_to_end(&mut bytes) {
            log::warn!("Skipping corrupt entry '{}' in {}: {}", entry.name(), zip_path.display(), e);
            continue;
        }
        if !wants_zip && !looks_like_dem_xml_head(&bytes) {
            log::debug!("Not a DEM tile: {}", entry.name());
            continue;
        }

        let target = dest.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        File::create(&target)?.write_all(&bytes)?;

        if wants_zip {
            extracted.nested_zips.push(target);
        } else {
            extracted.xml_files.push(target);
        }
    }

    log::debug!(
        "{}: {} tile XML, {} nested ZIP(s)",
        zip_path.display(),
        extracted.xml_files.len(),
        extracted.nested_zips.len()
    );
    Ok(extracted)
}

/// Flatten the inputs into an ordered list of tile sources.
///
/// Directory entries are visited sorted by file name and ZIP entries in
/// archive order; a ZIP is fully expanded (including nested archives) at the
/// point it is encountered. The resulting order defines `discovery_index`.
pub fn collect_tile_sources<P: AsRef<Path>>(
    inputs: &[P],
    workspace: &TileWorkspace,
) -> StitchResult<Vec<TileSource>> {
    let mut found: Vec<PathBuf> = Vec::new();

    for input in inputs {
        let input = input.as_ref();
        if input.is_dir() {
            log::info!("📂 Scanning directory {}", input.display());
            for entry in WalkDir::new(input).sort_by_file_name() {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        log::warn!("Skipping unreadable path under {}: {}", input.display(), e);
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                collect_file(entry.path(), workspace, &mut found)?;
            }
        } else if input.is_file() && is_zip_name(&file_name_of(input)) {
            log::info!("📦 Expanding archive {}", input.display());
            expand_zip(input, workspace, &mut found)?;
        } else {
            log::warn!("Unsupported input (not a directory or .zip): {}", input.display());
        }
    }

    log::info!("Found {} candidate tile(s)", found.len());
    Ok(found
        .into_iter()
        .enumerate()
        .map(|(i, path)| TileSource::new(path, i))
        .collect())
}

fn collect_file(path: &Path, workspace: &TileWorkspace, found: &mut Vec<PathBuf>) -> StitchResult<()> {
    let name = file_name_of(path);
    if is_zip_name(&name) {
        return expand_zip(path, workspace, found);
    }
    if !looks_like_dem_xml_name(&name) {
        return Ok(());
    }
    match sniff_file(path) {
        Ok(true) => found.push(path.to_path_buf()),
        Ok(false) => log::debug!("Not a DEM tile: {}", path.display()),
        Err(e) => log::warn!("Cannot read {}: {}", path.display(), e),
    }
    Ok(())
}

/// Expand an archive and everything nested in it, depth first
fn expand_zip(zip_path: &Path, workspace: &TileWorkspace, found: &mut Vec<PathBuf>) -> StitchResult<()> {
    // (archive, nesting depth), front is next
    let mut pending: VecDeque<(PathBuf, usize)> = VecDeque::new();
    pending.push_back((zip_path.to_path_buf(), 0));

    while let Some((archive, depth)) = pending.pop_front() {
        if depth > MAX_ZIP_NESTING {
            log::warn!("Skipping {}: nested deeper than {} archives", archive.display(), MAX_ZIP_NESTING);
            continue;
        }
        let dest = workspace.allocate_dir("zip")?;
        let extracted = match extract_zip_selective(&archive, &dest) {
            Ok(extracted) => extracted,
            Err(StitchError::Archive(msg)) => {
                log::warn!("Skipping unreadable ZIP {}", msg);
                continue;
            }
            Err(e) => return Err(e),
        };
        found.extend(extracted.xml_files);
        // inner archives go first so their tiles follow this archive's tiles
        for (offset, inner) in extracted.nested_zips.into_iter().enumerate() {
            pending.insert(offset, (inner, depth + 1));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    const TILE_XML: &str = "<Dataset><DEM><coverage><gml:tupleList>a,1</gml:tupleList></coverage></DEM></Dataset>";

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = ZipWriter::new(&mut cursor);
            for (name, data) in entries {
                writer.start_file(*name, FileOptions::default()).unwrap();
                writer.write_all(data).unwrap();
            }
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    fn names(sources: &[TileSource]) -> Vec<String> {
        sources.iter().map(|s| s.name()).collect()
    }

    #[test]
    fn test_name_filter() {
        assert!(looks_like_dem_xml_name("FG-GML-5339-45-00-DEM5A-20161001.xml"));
        assert!(looks_like_dem_xml_name("TILE.XML"));
        assert!(!looks_like_dem_xml_name("fmdid15-3101.xml"));
        assert!(!looks_like_dem_xml_name("product_metadata.xml"));
        assert!(!looks_like_dem_xml_name("tiles_index.xml"));
        assert!(!looks_like_dem_xml_name("tile.gml"));
    }

    #[test]
    fn test_head_sniff() {
        assert!(looks_like_dem_xml_head(TILE_XML.as_bytes()));
        assert!(looks_like_dem_xml_head(b"<x><gml:doubleOrNilReasonTupleList>"));
        assert!(!looks_like_dem_xml_head(b"<Dataset><Road/></Dataset>"));

        // marker beyond the sniff window is not seen
        let mut late = vec![b' '; HEAD_SNIFF_BYTES];
        late.extend_from_slice(b"<DEM>");
        assert!(!looks_like_dem_xml_head(&late));
    }

    #[test]
    fn test_directory_walk_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("b.xml"), TILE_XML).unwrap();
        fs::write(dir.path().join("a.xml"), TILE_XML).unwrap();
        fs::write(dir.path().join("sub").join("c.xml"), TILE_XML).unwrap();
        fs::write(dir.path().join("fmdid-1.xml"), TILE_XML).unwrap();
        fs::write(dir.path().join("road.xml"), "<Road/>").unwrap();
        fs::write(dir.path().join("notes.txt"), TILE_XML).unwrap();

        let workspace = TileWorkspace::new().unwrap();
        let sources = collect_tile_sources(&[dir.path()], &workspace).unwrap();

        assert_eq!(names(&sources), vec!["a.xml", "b.xml", "c.xml"]);
        let indices: Vec<usize> = sources.iter().map(|s| s.discovery_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_nested_zip_is_expanded() {
        let inner = zip_bytes(&[
            ("inner_tile.xml", TILE_XML.as_bytes()),
            ("inner_metadata.xml", TILE_XML.as_bytes()),
        ]);
        let outer = zip_bytes(&[
            ("outer_tile.xml", TILE_XML.as_bytes()),
            ("readme.txt", &b"hello"[..]),
            ("nested/inner.zip", &inner[..]),
        ]);

        let dir = tempfile::tempdir().unwrap();
        let outer_path = dir.path().join("outer.zip");
        fs::write(&outer_path, outer).unwrap();

        let workspace = TileWorkspace::new().unwrap();
        let sources = collect_tile_sources(&[&outer_path], &workspace).unwrap();

        assert_eq!(names(&sources), vec!["outer_tile.xml", "inner_tile.xml"]);
        assert!(sources.iter().all(|s| s.path.starts_with(workspace.path())));
    }

    #[test]
    fn test_workspace_removed_on_drop() {
        let workspace = TileWorkspace::new().unwrap();
        let root = workspace.path().to_path_buf();
        let sub = workspace.allocate_dir("zip").unwrap();
        assert!(sub.exists());

        drop(workspace);
        assert!(!root.exists());
        assert!(!sub.exists());
    }

    #[test]
    fn test_corrupt_zip_and_unsupported_inputs_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("broken.zip");
        fs::write(&bad, b"not a zip").unwrap();
        let loose = dir.path().join("loose.xml");
        fs::write(&loose, TILE_XML).unwrap();

        assert!(matches!(
            extract_zip_selective(&bad, dir.path()),
            Err(StitchError::Archive(_))
        ));

        let workspace = TileWorkspace::new().unwrap();
        let sources = collect_tile_sources(&[bad, loose, dir.path().join("missing")], &workspace).unwrap();
        assert!(sources.is_empty());
    }

    #[test]
    fn test_archive_that_cannot_be_opened_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone.zip");
        assert!(matches!(
            extract_zip_selective(&gone, dir.path()),
            Err(StitchError::Archive(_))
        ));

        let workspace = TileWorkspace::new().unwrap();
        let mut found = Vec::new();
        expand_zip(&gone, &workspace, &mut found).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_lying_entry_size_is_not_trusted() {
        let mut bytes = zip_bytes(&[("tile.xml", TILE_XML.as_bytes())]);
        // uncompressed size field of the central directory entry
        let central = bytes
            .windows(4)
            .position(|w| w == [0x50, 0x4b, 0x01, 0x02])
            .unwrap();
        bytes[central + 24..central + 28].copy_from_slice(&0x7fff_ffffu32.to_le_bytes());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lying.zip");
        fs::write(&path, bytes).unwrap();

        let result = extract_zip_selective(&path, &dir.path().join("out"));
        assert!(!matches!(result, Err(StitchError::Io(_))));
    }
}
