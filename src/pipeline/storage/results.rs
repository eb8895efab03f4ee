//! Results table: ordered measurements, persisted as CSV after every change.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::{write_atomic, StorageError};
use crate::models::Measurement;

pub const RESULTS_HEADER: [&str; 5] = [
    "Mito_Label",
    "ROI_Area_px2",
    "Cristae_Count",
    "Line_Length_px",
    "Density_per_1000px2",
];

/// Ordered, label-unique measurement table backed by one CSV file.
#[derive(Debug, Clone)]
pub struct ResultStore {
    path: PathBuf,
    rows: Vec<Measurement>,
}

impl ResultStore {
    /// Empty store that will persist to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            rows: Vec::new(),
        }
    }

    /// Load `path` if it exists, otherwise start empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if path.is_file() {
            Self::load(path)
        } else {
            Ok(Self::new(path))
        }
    }

    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path)?;
        let rows = parse_csv(&text)?;
        tracing::debug!(path = %path.display(), rows = rows.len(), "Results table loaded");
        Ok(Self { path, rows })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, measurement: Measurement) -> Result<(), StorageError> {
        if self.contains(&measurement.label) {
            return Err(StorageError::DuplicateLabel(measurement.label));
        }
        self.rows.push(measurement);
        Ok(())
    }

    /// Remove the most recent row. No-op on an empty store.
    pub fn remove_last(&mut self) -> Option<Measurement> {
        self.rows.pop()
    }

    pub fn persist(&self) -> Result<(), StorageError> {
        write_atomic(&self.path, to_csv(&self.rows).as_bytes())
    }

    /// Write the same table to `destination`; the store itself is untouched.
    pub fn export(&self, destination: &Path) -> Result<(), StorageError> {
        write_atomic(destination, to_csv(&self.rows).as_bytes())?;
        tracing::info!(
            destination = %destination.display(),
            rows = self.rows.len(),
            "Results exported"
        );
        Ok(())
    }

    pub fn rows(&self) -> &[Measurement] {
        &self.rows
    }

    pub fn last(&self) -> Option<&Measurement> {
        self.rows.last()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.rows.iter().any(|m| m.label == label)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ═══════════════════════════════════════════
// CSV codec
// ═══════════════════════════════════════════

pub fn to_csv(rows: &[Measurement]) -> String {
    let mut out = RESULTS_HEADER.join(",");
    out.push('\n');
    for m in rows {
        out.push_str(&format!(
            "{},{},{},{},{}\n",
            quote_field(&m.label),
            m.area_px2,
            m.count,
            m.line_length_px,
            m.density()
        ));
    }
    out
}

pub fn parse_csv(text: &str) -> Result<Vec<Measurement>, StorageError> {
    let records = split_records(text)?;
    let mut records = records.into_iter();

    match records.next() {
        Some((_, header)) if header == RESULTS_HEADER => {}
        Some((line, header)) => {
            return Err(StorageError::MalformedCsv {
                line,
                reason: format!("unexpected header {header:?}"),
            })
        }
        None => return Ok(Vec::new()),
    }

    let mut seen = HashSet::new();
    let mut rows = Vec::new();
    for (line, fields) in records {
        let malformed = |reason: String| StorageError::MalformedCsv { line, reason };
        if fields.len() != RESULTS_HEADER.len() {
            return Err(malformed(format!(
                "expected {} fields, got {}",
                RESULTS_HEADER.len(),
                fields.len()
            )));
        }

        let area: f64 = fields[1]
            .parse()
            .map_err(|e| malformed(format!("{}: {e}", RESULTS_HEADER[1])))?;
        let count: i64 = fields[2]
            .parse()
            .map_err(|e| malformed(format!("{}: {e}", RESULTS_HEADER[2])))?;
        let length: f64 = fields[3]
            .parse()
            .map_err(|e| malformed(format!("{}: {e}", RESULTS_HEADER[3])))?;
        // density column is derived and ignored on load

        let measurement = Measurement::new(&fields[0], area, count, length)
            .map_err(|e| malformed(e.to_string()))?;
        if !seen.insert(measurement.label.clone()) {
            return Err(StorageError::DuplicateLabel(measurement.label));
        }
        rows.push(measurement);
    }
    Ok(rows)
}

fn quote_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Split CSV text into records of fields, honouring quoted fields.
/// Each record carries its 1-based starting line number. Blank lines are dropped.
fn split_records(text: &str) -> Result<Vec<(usize, Vec<String>)>, StorageError> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut record_line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => fields.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                fields.push(std::mem::take(&mut field));
                if !(fields.len() == 1 && fields[0].is_empty()) {
                    records.push((record_line, std::mem::take(&mut fields)));
                }
                fields.clear();
                line += 1;
                record_line = line;
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(StorageError::MalformedCsv {
            line: record_line,
            reason: "unterminated quoted field".into(),
        });
    }
    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        records.push((record_line, fields));
    }
    Ok(records)
}
