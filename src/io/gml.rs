use crate::core::ingest::{TileDecoder, TileSource};
use crate::types::{BoundingBox, DecodeFailure, TileRecord, SENTINEL};
use ndarray::{s, Array2};
use quick_xml::events::Event;
use quick_xml::Reader;

/// Tokens GSI uses for "no value"
const MISSING_TOKENS: [&str; 4] = ["", "-9999", "-9999.0", "-9999.00"];

/// Largest grid a tile header may claim. GSI DEM tiles are at most a few
/// thousand samples on a side.
pub const MAX_TILE_SAMPLES: usize = 64 * 1024 * 1024;

/// Raw contents of one DEM GML document
#[derive(Debug, Clone, PartialEq)]
pub struct GmlTile {
    pub bbox: BoundingBox,
    pub rows: usize,
    pub cols: usize,
    /// Grid offset (x, y) of the first value in the tuple list
    pub start_point: (usize, usize),
    /// Row-major samples, already padded/truncated to rows * cols
    pub samples: Vec<f32>,
    /// Samples replaced by the sentinel (missing tokens, values below threshold, padding)
    pub missing: usize,
}

/// Decoder for GSI fundamental geospatial data DEM tiles (GML 3.2)
#[derive(Debug, Clone)]
pub struct GmlTileDecoder {
    missing_threshold: f64,
    flip_y: bool,
}

impl GmlTileDecoder {
    pub fn new(missing_threshold: f64, flip_y: bool) -> Self {
        Self {
            missing_threshold,
            flip_y,
        }
    }
}

impl TileDecoder for GmlTileDecoder {
    fn decode(
        &self,
        source: &TileSource,
        expected: Option<(usize, usize)>,
    ) -> Result<TileRecord, DecodeFailure> {
        let bytes = std::fs::read(&source.path)
            .map_err(|e| DecodeFailure::Unreadable(format!("{}: {}", source.path.display(), e)))?;
        let xml = String::from_utf8_lossy(&bytes);

        let header = parse_header(&xml)?;
        if let Some((rows, cols)) = expected {
            if (header.rows, header.cols) != (rows, cols) {
                return Err(DecodeFailure::SizeMismatch {
                    expected_rows: rows,
                    expected_cols: cols,
                    rows: header.rows,
                    cols: header.cols,
                });
            }
        }

        let tile = header.into_tile(self.missing_threshold, &source.name())?;
        log::debug!(
            "Decoded {}: {}x{} grid, {} missing sample(s)",
            source.name(),
            tile.rows,
            tile.cols,
            tile.missing
        );

        let mut grid = Array2::from_shape_vec((tile.rows, tile.cols), tile.samples)
            .map_err(|e| DecodeFailure::MalformedSource(e.to_string()))?;
        if self.flip_y {
            grid = grid.slice(s![..;-1, ..]).to_owned();
        }

        TileRecord::new(tile.bbox, grid, source.path.clone(), source.discovery_index)
            .map_err(|e| DecodeFailure::MalformedSource(e.to_string()))
    }
}

/// Parse a full DEM document
pub fn parse_gml(xml: &str, missing_threshold: f64) -> Result<GmlTile, DecodeFailure> {
    parse_header(xml)?.into_tile(missing_threshold, "<memory>")
}

/// Fields collected in one pass over the document; the tuple list is kept as
/// text until the grid size has been checked
#[derive(Debug, Default)]
struct GmlHeader {
    lower_corner: Option<String>,
    upper_corner: Option<String>,
    grid_low: Option<String>,
    grid_high: Option<String>,
    start_point: Option<String>,
    tuple_list: Option<String>,
    rows: usize,
    cols: usize,
}

fn parse_header(xml: &str) -> Result<GmlHeader, DecodeFailure> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut header = GmlHeader::default();
    let mut stack: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                stack.push(String::from_utf8_lossy(e.local_name().as_ref()).to_string());
                text.clear();
            }
            Ok(Event::Text(ref e)) => {
                let chunk = e
                    .unescape()
                    .map_err(|err| DecodeFailure::MalformedSource(format!("bad text: {}", err)))?;
                text.push_str(&chunk);
            }
            Ok(Event::CData(ref e)) => {
                text.push_str(&String::from_utf8_lossy(e));
            }
            Ok(Event::End(_)) => {
                if let Some(name) = stack.pop() {
                    header.capture(&name, &stack, &text);
                }
                text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(DecodeFailure::MalformedSource(format!(
                    "XML error at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    let low = parse_pair::<i64>(header.grid_low.as_deref(), "gml:low")?;
    let high = parse_pair::<i64>(header.grid_high.as_deref(), "gml:high")?;
    let extent = |lo: i64, hi: i64| {
        hi.checked_sub(lo)
            .and_then(|d| d.checked_add(1))
            .filter(|&n| n > 0)
            .and_then(|n| usize::try_from(n).ok())
    };
    let (cols, rows) = match (extent(low.0, high.0), extent(low.1, high.1)) {
        (Some(cols), Some(rows)) => (cols, rows),
        _ => {
            return Err(DecodeFailure::MalformedSource(format!(
                "bad grid envelope: low {:?}, high {:?}",
                low, high
            )))
        }
    };
    match rows.checked_mul(cols) {
        Some(total) if total <= MAX_TILE_SAMPLES => {}
        _ => {
            return Err(DecodeFailure::MalformedSource(format!(
                "grid envelope {}x{} exceeds {} samples",
                rows, cols, MAX_TILE_SAMPLES
            )))
        }
    }
    header.rows = rows;
    header.cols = cols;
    Ok(header)
}

impl GmlHeader {
    fn capture(&mut self, name: &str, parents: &[String], text: &str) {
        let parent = parents.last().map(String::as_str);
        let in_envelope = parents.iter().any(|p| p == "boundedBy");
        match (name, parent) {
            // first envelope wins, like a `.//boundedBy/Envelope` lookup
            ("lowerCorner", Some("Envelope")) if in_envelope && self.lower_corner.is_none() => {
                self.lower_corner = Some(text.to_string())
            }
            ("upperCorner", Some("Envelope")) if in_envelope && self.upper_corner.is_none() => {
                self.upper_corner = Some(text.to_string())
            }
            ("low", Some("GridEnvelope")) => self.grid_low = Some(text.to_string()),
            ("high", Some("GridEnvelope")) => self.grid_high = Some(text.to_string()),
            ("startPoint", _) => self.start_point = Some(text.to_string()),
            ("tupleList", _) | ("doubleOrNilReasonTupleList", _) => {
                self.tuple_list = Some(text.to_string())
            }
            _ => {}
        }
    }

    fn into_tile(self, missing_threshold: f64, name: &str) -> Result<GmlTile, DecodeFailure> {
        // GML corners are "lat lon"
        let (lat_min, lon_min) = parse_pair::<f64>(self.lower_corner.as_deref(), "gml:lowerCorner")?;
        let (lat_max, lon_max) = parse_pair::<f64>(self.upper_corner.as_deref(), "gml:upperCorner")?;
        if !(lat_min < lat_max && lon_min < lon_max) {
            return Err(DecodeFailure::MalformedSource(format!(
                "inverted envelope: ({}, {}) - ({}, {})",
                lat_min, lon_min, lat_max, lon_max
            )));
        }

        let start_point = match self.start_point.as_deref() {
            Some(sp) => parse_pair::<usize>(Some(sp), "gml:startPoint")?,
            None => (0, 0),
        };
        if start_point.0 >= self.cols || start_point.1 >= self.rows {
            return Err(DecodeFailure::MalformedSource(format!(
                "start point {:?} outside {}x{} grid",
                start_point, self.rows, self.cols
            )));
        }

        let tuple_list = self
            .tuple_list
            .ok_or_else(|| DecodeFailure::MalformedSource("missing gml:tupleList".to_string()))?;

        let total = self.rows * self.cols;
        let lead = start_point.1 * self.cols + start_point.0;
        let mut samples = vec![SENTINEL; lead];
        samples.reserve(total.saturating_sub(lead));
        let mut missing = lead;

        for line in tuple_list.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match parse_sample(line, missing_threshold) {
                Some(v) => samples.push(v),
                None => {
                    samples.push(SENTINEL);
                    missing += 1;
                }
            }
        }

        let decoded = samples.len() - lead;
        if samples.len() < total {
            let pad = total - samples.len();
            log::debug!(
                "{}: {} value(s) after start point {:?}, padding {} missing sample(s)",
                name,
                decoded,
                start_point,
                pad
            );
            samples.resize(total, SENTINEL);
            missing += pad;
        } else if samples.len() > total {
            log::warn!(
                "{}: {} value(s) exceed the {}x{} grid, truncating",
                name,
                decoded,
                self.rows,
                self.cols
            );
            let dropped_missing = samples[total..].iter().filter(|v| **v == SENTINEL).count();
            samples.truncate(total);
            missing -= dropped_missing.min(missing);
        }

        Ok(GmlTile {
            bbox: BoundingBox::new(lat_min, lat_max, lon_min, lon_max),
            rows: self.rows,
            cols: self.cols,
            start_point,
            samples,
            missing,
        })
    }
}

/// Value of one `type,value` tuple line, or `None` when it is missing
pub fn parse_sample(line: &str, missing_threshold: f64) -> Option<f32> {
    let token = line.rsplit(',').next().unwrap_or("").trim();
    if MISSING_TOKENS.contains(&token) {
        return None;
    }
    match token.parse::<f64>() {
        Ok(v) if v.is_finite() && v > missing_threshold => Some(v as f32),
        _ => None,
    }
}

fn parse_pair<T: std::str::FromStr>(text: Option<&str>, field: &str) -> Result<(T, T), DecodeFailure> {
    let text = text.ok_or_else(|| DecodeFailure::MalformedSource(format!("missing {}", field)))?;
    let mut parts = text.split_whitespace().map(|p| p.parse::<T>());
    match (parts.next(), parts.next()) {
        (Some(Ok(a)), Some(Ok(b))) => Ok((a, b)),
        _ => Err(DecodeFailure::MalformedSource(format!(
            "cannot parse {} from '{}'",
            field, text
        ))),
    }
}
