use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, StringRecord};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Columns the store adds to every table; never treated as fields.
const SYSTEM_COLUMNS: &[&str] = &["", "result", "table", "_start", "_stop", "_time", "_measurement"];

/// One pivoted row: a timestamp plus every numeric field present for it.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRow {
    pub timestamp: DateTime<Utc>,
    values: BTreeMap<String, f64>,
}

impl SeriesRow {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            values: BTreeMap::new(),
        }
    }

    #[cfg(test)]
    pub fn with(mut self, field: &str, value: f64) -> Self {
        self.values.insert(field.to_string(), value);
        self
    }

    pub fn get(&self, field: &str) -> Option<f64> {
        self.values.get(field).copied()
    }
}

/// Non-empty rows sorted ascending by timestamp.  Cheap to clone.
#[derive(Debug, Clone)]
pub struct SeriesFrame {
    rows: Arc<[SeriesRow]>,
}

impl SeriesFrame {
    /// Sorts `rows`; returns `None` when there is nothing to hold.
    pub fn from_rows(mut rows: Vec<SeriesRow>) -> Option<Self> {
        if rows.is_empty() {
            return None;
        }
        rows.sort_by_key(|r| r.timestamp);
        Some(Self { rows: rows.into() })
    }

    pub fn rows(&self) -> &[SeriesRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Shape of a raw query response before it is collapsed to rows / no data.
#[derive(Debug)]
pub enum FrameShape {
    Empty,
    /// More than one schema block came back; nothing reconciles them.
    MultiTable(usize),
    Single(SeriesFrame),
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("data row before any header row")]
    MissingHeader,
    #[error("header has no _time column")]
    MissingTime,
    #[error("store reported a query error: {0}")]
    QueryError(String),
}

struct Block {
    header: StringRecord,
    rows: Vec<StringRecord>,
}

/// Headers lead with the empty annotation column, then fixed names.  Data
/// rows carry `_result` there, so tag values never look like headers.
fn is_header(rec: &StringRecord) -> bool {
    (rec.get(1) == Some("result") && rec.get(2) == Some("table")) || is_error_header(rec)
}

fn is_error_header(rec: &StringRecord) -> bool {
    rec.get(1) == Some("error") && rec.get(2) == Some("reference")
}

/// Parse a header-only (no annotations) Flux CSV response.
pub fn parse_flux_csv(body: &str) -> Result<FrameShape, FrameError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());

    let mut blocks: Vec<Block> = Vec::new();
    for rec in reader.records() {
        let rec = rec?;
        if rec.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        if is_header(&rec) {
            blocks.push(Block {
                header: rec,
                rows: Vec::new(),
            });
            continue;
        }
        let block = blocks.last_mut().ok_or(FrameError::MissingHeader)?;
        block.rows.push(rec);
    }

    // Mid-stream failures arrive as an `error,reference` table.
    if let Some(block) = blocks.iter().find(|b| is_error_header(&b.header)) {
        let msg = block
            .rows
            .first()
            .and_then(|r| r.get(1))
            .unwrap_or("unknown")
            .to_string();
        return Err(FrameError::QueryError(msg));
    }

    let row_count: usize = blocks.iter().map(|b| b.rows.len()).sum();
    if row_count == 0 {
        return Ok(FrameShape::Empty);
    }
    if blocks.len() > 1 {
        return Ok(FrameShape::MultiTable(blocks.len()));
    }

    let block = &blocks[0];
    let time_idx = block
        .header
        .iter()
        .position(|f| f == "_time")
        .ok_or(FrameError::MissingTime)?;
    let field_cols: Vec<(usize, &str)> = block
        .header
        .iter()
        .enumerate()
        .filter(|(_, name)| !SYSTEM_COLUMNS.contains(name))
        .collect();

    let mut rows = Vec::with_capacity(block.rows.len());
    for rec in &block.rows {
        let raw_time = rec.get(time_idx).unwrap_or("");
        let timestamp = match DateTime::parse_from_rfc3339(raw_time.trim()) {
            Ok(t) => t.with_timezone(&Utc),
            Err(e) => {
                tracing::warn!("dropping row with bad _time {raw_time:?}: {e}");
                continue;
            }
        };
        let mut row = SeriesRow::new(timestamp);
        for &(idx, name) in &field_cols {
            // Tag columns (e.g. `symbol`) are strings and fall out here.
            if let Some(v) = rec.get(idx).and_then(|s| s.trim().parse::<f64>().ok()) {
                row.values.insert(name.to_string(), v);
            }
        }
        rows.push(row);
    }

    Ok(match SeriesFrame::from_rows(rows) {
        Some(frame) => FrameShape::Single(frame),
        None => FrameShape::Empty,
    })
}
