//! Batch cleaning: raw tables + image files → corpus collections.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::imaging::load_image;
use crate::raw::RawDataset;
use crate::clean_row;
use prodcat_core::{CleanedDocument, RawRecord, Result, Split};
use prodcat_store::CorpusStore;

/// Outcome of cleaning one split.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SplitReport {
    pub rows_read: usize,
    pub inserted: usize,
    pub missing_images: usize,
    pub unreadable_images: usize,
}

/// Outcome of a full cleaning run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleaningReport {
    pub row_budget: usize,
    pub train: SplitReport,
    pub test: SplitReport,
    pub duration_ms: u64,
}

enum RowOutcome {
    Cleaned(CleanedDocument),
    MissingImage,
    UnreadableImage,
}

/// Cleans raw rows into the train and test collections of a store.
pub struct CorpusCleaner<'a> {
    store: &'a CorpusStore,
    dataset: RawDataset,
    image_root: PathBuf,
}

impl<'a> CorpusCleaner<'a> {
    /// `raw_dir` holds the CSV tables; `image_root` holds `image_train/` and `image_test/`.
    pub fn new(store: &'a CorpusStore, raw_dir: impl AsRef<Path>, image_root: impl AsRef<Path>) -> Self {
        Self {
            store,
            dataset: RawDataset::new(raw_dir),
            image_root: image_root.as_ref().to_path_buf(),
        }
    }

    /// Clean the first `row_budget` rows of each split, then replace both
    /// collections with the result.
    ///
    /// Missing or undecodable image files skip their row; they never abort the run.
    /// A split that fails to load or persist leaves its collection as it was.
    pub fn run(&self, row_budget: usize) -> Result<CleaningReport> {
        let start = std::time::Instant::now();
        info!("Cleaning corpus: row_budget={}", row_budget);

        let (mut train, train_docs) = self.clean_split(Split::Train, row_budget)?;
        let (mut test, test_docs) = self.clean_split(Split::Test, row_budget)?;
        train.inserted = self.store.replace_all(Split::Train.collection(), &train_docs)?;
        test.inserted = self.store.replace_all(Split::Test.collection(), &test_docs)?;

        let report = CleaningReport {
            row_budget,
            train,
            test,
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        info!(
            "Cleaning complete: train={}/{}, test={}/{}, duration={}ms",
            report.train.inserted,
            report.train.rows_read,
            report.test.inserted,
            report.test.rows_read,
            report.duration_ms
        );
        Ok(report)
    }

    fn clean_split(&self, split: Split, row_budget: usize) -> Result<(SplitReport, Vec<CleanedDocument>)> {
        let rows = self.dataset.load(split, Some(row_budget))?;
        let image_dir = self.image_root.join(split.image_dir());

        let outcomes: Vec<RowOutcome> = rows
            .par_iter()
            .map(|row| self.clean_record(row, &image_dir))
            .collect();

        let mut report = SplitReport {
            rows_read: rows.len(),
            ..Default::default()
        };
        let mut docs = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                RowOutcome::Cleaned(doc) => docs.push(doc),
                RowOutcome::MissingImage => report.missing_images += 1,
                RowOutcome::UnreadableImage => report.unreadable_images += 1,
            }
        }

        info!(
            "{}: cleaned {} of {} rows ({} missing images, {} unreadable)",
            split.collection(),
            docs.len(),
            report.rows_read,
            report.missing_images,
            report.unreadable_images
        );
        Ok((report, docs))
    }

    fn clean_record(&self, row: &RawRecord, image_dir: &Path) -> RowOutcome {
        let path = image_dir.join(row.image_file_name());
        if !path.exists() {
            warn!("Image not found: {}", path.display());
            return RowOutcome::MissingImage;
        }

        let cleaned = load_image(&path).and_then(|img| {
            clean_row(row.designation.as_deref(), row.description.as_deref(), &img)
        });
        match cleaned {
            Ok(cleaned) => {
                debug!("Cleaned row id={}", row.id);
                RowOutcome::Cleaned(cleaned.into_document(row.id, row.prdtypecode))
            }
            Err(e) => {
                warn!("Skipping row id={}: {}", row.id, e);
                RowOutcome::UnreadableImage
            }
        }
    }
}
