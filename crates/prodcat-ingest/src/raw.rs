//! Raw catalog tables.
//!
//! Feature tables have an unnamed leading column holding the row id,
//! followed by `designation`, `description`, `productid` and `imageid`.
//! The training label table has the same leading id column and a
//! `prdtypecode` column.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use csv::StringRecord;
use tracing::{debug, info, warn};

use prodcat_core::{Error, RawRecord, Result, Split};

/// Reader over the raw CSV directory.
pub struct RawDataset {
    raw_dir: PathBuf,
}

impl RawDataset {
    pub fn new(raw_dir: impl AsRef<Path>) -> Self {
        Self {
            raw_dir: raw_dir.as_ref().to_path_buf(),
        }
    }

    /// Load the first `limit` rows of a split (all rows when `None`).
    ///
    /// Training rows are joined with their label by id; a training row with
    /// no label is skipped and logged.
    pub fn load(&self, split: Split, limit: Option<usize>) -> Result<Vec<RawRecord>> {
        let features_path = self.raw_dir.join(split.features_file());
        let mut records = read_features(&features_path, limit)?;

        if let Some(labels_file) = split.labels_file() {
            let labels = read_labels(&self.raw_dir.join(labels_file))?;
            let before = records.len();
            records.retain_mut(|rec| match labels.get(&rec.id) {
                Some(&code) => {
                    rec.prdtypecode = Some(code);
                    true
                }
                None => {
                    warn!("No label for training row id={}, skipping", rec.id);
                    false
                }
            });
            if records.len() < before {
                warn!("{} training rows dropped for missing labels", before - records.len());
            }
        }

        info!("Loaded {} raw {} rows from {}", records.len(), split, features_path.display());
        Ok(records)
    }
}

fn open_reader(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_path(path)
        .map_err(|e| Error::Ingest(format!("Cannot open {}: {}", path.display(), e)))
}

fn column(headers: &StringRecord, name: &str, path: &Path) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| Error::Ingest(format!("{}: missing column `{}`", path.display(), name)))
}

fn parse_i64(record: &StringRecord, idx: usize, name: &str, line: u64) -> Result<i64> {
    let raw = record.get(idx).unwrap_or("").trim();
    // pandas writes integer columns as floats when any value was missing
    raw.parse::<i64>()
        .or_else(|_| raw.parse::<f64>().map(|f| f as i64))
        .map_err(|_| Error::Ingest(format!("line {}: invalid {} `{}`", line, name, raw)))
}

fn optional_text(record: &StringRecord, idx: usize) -> Option<String> {
    record
        .get(idx)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn read_features(path: &Path, limit: Option<usize>) -> Result<Vec<RawRecord>> {
    let mut reader = open_reader(path)?;
    let headers = reader
        .headers()
        .map_err(|e| Error::Ingest(format!("{}: {}", path.display(), e)))?
        .clone();

    let designation = column(&headers, "designation", path)?;
    let description = column(&headers, "description", path)?;
    let productid = column(&headers, "productid", path)?;
    let imageid = column(&headers, "imageid", path)?;

    let mut records = Vec::new();
    for (i, row) in reader.records().enumerate() {
        if limit.is_some_and(|n| records.len() >= n) {
            break;
        }
        let row = row.map_err(|e| Error::Ingest(format!("{}: {}", path.display(), e)))?;
        let line = i as u64 + 2;
        records.push(RawRecord {
            id: parse_i64(&row, 0, "id", line)?,
            designation: optional_text(&row, designation),
            description: optional_text(&row, description),
            imageid: parse_i64(&row, imageid, "imageid", line)?,
            productid: parse_i64(&row, productid, "productid", line)?,
            prdtypecode: None,
        });
    }
    debug!("Read {} rows from {}", records.len(), path.display());
    Ok(records)
}

fn read_labels(path: &Path) -> Result<HashMap<i64, i64>> {
    let mut reader = open_reader(path)?;
    let headers = reader
        .headers()
        .map_err(|e| Error::Ingest(format!("{}: {}", path.display(), e)))?
        .clone();
    let code = column(&headers, "prdtypecode", path)?;

    let mut labels = HashMap::new();
    for (i, row) in reader.records().enumerate() {
        let row = row.map_err(|e| Error::Ingest(format!("{}: {}", path.display(), e)))?;
        let line = i as u64 + 2;
        labels.insert(parse_i64(&row, 0, "id", line)?, parse_i64(&row, code, "prdtypecode", line)?);
    }
    Ok(labels)
}
