#![allow(dead_code)]

use std::io::Write;
use std::path::Path;
use zip::write::FileOptions;
use zip::ZipWriter;

/// Minimal GSI DEM document; `values` are written row-major, north row first
pub fn dem_gml(lat: (f64, f64), lon: (f64, f64), rows: usize, cols: usize, values: &[f32]) -> String {
    let tuples: Vec<String> = values
        .iter()
        .map(|v| {
            if *v == 0.0 {
                "データなし,-9999.".to_string()
            } else {
                format!("地表面,{}", v)
            }
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Dataset xmlns="http://fgd.gsi.go.jp/spec/2008/FGD_GMLSchema" xmlns:gml="http://www.opengis.net/gml/3.2">
<DEM gml:id="DEM001">
<type>5mメッシュ（標高）</type>
<coverage gml:id="DEM001-3">
<gml:boundedBy><gml:Envelope srsName="fguuid:jgd2011.bl">
<gml:lowerCorner>{} {}</gml:lowerCorner>
<gml:upperCorner>{} {}</gml:upperCorner>
</gml:Envelope></gml:boundedBy>
<gml:domainSet><gml:Grid gml:id="DEM001-4" dimension="2"><gml:limits><gml:GridEnvelope>
<gml:low>0 0</gml:low>
<gml:high>{} {}</gml:high>
</gml:GridEnvelope></gml:limits></gml:Grid></gml:domainSet>
<gml:rangeSet><gml:DataBlock>
<gml:tupleList>
{}
</gml:tupleList>
</gml:DataBlock></gml:rangeSet>
<gml:coverageFunction><gml:GridFunction>
<gml:sequenceRule order="+x-y">Linear</gml:sequenceRule>
<gml:startPoint>0 0</gml:startPoint>
</gml:GridFunction></gml:coverageFunction>
</coverage>
</DEM>
</Dataset>
"#,
        lat.0,
        lon.0,
        lat.1,
        lon.1,
        cols - 1,
        rows - 1,
        tuples.join("\n")
    )
}

/// Build a ZIP archive in memory
pub fn zip_bytes(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::new(&mut cursor);
        for (name, data) in entries {
            writer
                .start_file(*name, FileOptions::default())
                .expect("Failed to start zip entry");
            writer.write_all(data).expect("Failed to write zip entry");
        }
        writer.finish().expect("Failed to finish zip");
    }
    cursor.into_inner()
}

pub fn write(path: &Path, bytes: impl AsRef<[u8]>) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create fixture directory");
    }
    std::fs::write(path, bytes).expect("Failed to write fixture");
}

pub fn read_summary(path: &Path) -> Vec<(String, String)> {
    std::fs::read_to_string(path)
        .expect("Failed to read summary")
        .lines()
        .filter_map(|l| l.split_once(": "))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn summary_value(summary: &[(String, String)], key: &str) -> String {
    summary
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.clone())
        .unwrap_or_else(|| panic!("summary has no '{}' line", key))
}
