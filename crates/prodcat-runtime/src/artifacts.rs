//! Trained artifacts on disk.
//!
//! A training run produces four JSON files in the artifact directory. They
//! are first written next to their targets as `*.tmp` and renamed into
//! place only once all four serialized cleanly, so a failed run never
//! leaves a partial set behind.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::metrics::EvaluationMetrics;
use prodcat_core::{Error, Result};
use prodcat_infer::{FeatureLayout, ImageEmbedder, TfidfVectorizer};
use prodcat_model::{EvalRecord, GradientBooster, LabelCodec};

pub const VECTORIZER_FILE: &str = "tfidf_vectorizer.json";
pub const LABEL_ENCODER_FILE: &str = "label_encoder.json";
pub const MODEL_FILE: &str = "gbdt_fusion.json";
pub const METRICS_FILE: &str = "metrics_fusion.json";

/// File locations inside an artifact directory.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    dir: PathBuf,
}

impl ArtifactPaths {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn vectorizer(&self) -> PathBuf {
        self.dir.join(VECTORIZER_FILE)
    }

    pub fn label_encoder(&self) -> PathBuf {
        self.dir.join(LABEL_ENCODER_FILE)
    }

    pub fn model(&self) -> PathBuf {
        self.dir.join(MODEL_FILE)
    }

    pub fn metrics(&self) -> PathBuf {
        self.dir.join(METRICS_FILE)
    }

    /// Fail with the first missing file needed for inference.
    pub fn require_inference_set(&self) -> Result<()> {
        for path in [self.vectorizer(), self.label_encoder(), self.model()] {
            if !path.is_file() {
                return Err(Error::ArtifactsNotFound(path));
            }
        }
        Ok(())
    }
}

/// What the model was trained against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub vectorizer_fingerprint: String,
    pub layout: FeatureLayout,
    pub extractor_id: String,
    pub classes: Vec<i64>,
    pub device: String,
    pub trained_at: DateTime<Utc>,
}

/// Contents of `gbdt_fusion.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub metadata: ModelMetadata,
    pub booster: GradientBooster,
}

impl ModelArtifact {
    pub fn load(path: &Path) -> Result<Self> {
        let artifact: Self = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        if !artifact.booster.is_consistent() {
            return Err(Error::Inference(format!("{}: malformed tree ensemble", path.display())));
        }
        if artifact.booster.num_features() != artifact.metadata.layout.width() {
            return Err(Error::ArtifactMismatch(format!(
                "{}: booster width {} but recorded layout width {}",
                path.display(),
                artifact.booster.num_features(),
                artifact.metadata.layout.width()
            )));
        }
        Ok(artifact)
    }

    /// Check that the vectorizer, codec and extractor are the ones this
    /// model was trained with.
    pub fn check_compatible(
        &self,
        vectorizer: &TfidfVectorizer,
        codec: &LabelCodec,
        embedder: &dyn ImageEmbedder,
    ) -> Result<()> {
        let meta = &self.metadata;
        if meta.vectorizer_fingerprint != vectorizer.fingerprint() {
            return Err(Error::ArtifactMismatch(
                "vectorizer differs from the one the model was trained with".into(),
            ));
        }
        if meta.layout.text_dim != vectorizer.vocabulary_size() {
            return Err(Error::ArtifactMismatch(format!(
                "vectorizer has {} terms, model expects {}",
                vectorizer.vocabulary_size(),
                meta.layout.text_dim
            )));
        }
        if meta.layout.image_dim != embedder.dimension() || meta.extractor_id != embedder.id() {
            return Err(Error::ArtifactMismatch(format!(
                "image extractor {} (dim={}), model was trained with {} (dim={})",
                embedder.id(),
                embedder.dimension(),
                meta.extractor_id,
                meta.layout.image_dim
            )));
        }
        if codec.classes() != meta.classes.as_slice() || codec.len() != self.booster.num_class() {
            return Err(Error::ArtifactMismatch(format!(
                "label encoder has {} classes, model has {}",
                codec.len(),
                self.booster.num_class()
            )));
        }
        Ok(())
    }
}

/// Contents of `metrics_fusion.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsArtifact {
    pub evaluation: EvaluationMetrics,
    pub history: Vec<EvalRecord>,
    pub train_rows: usize,
    pub validation_rows: usize,
}

impl MetricsArtifact {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
    }
}

/// Everything a training run persists.
pub struct TrainedArtifacts<'a> {
    pub vectorizer: &'a TfidfVectorizer,
    pub codec: &'a LabelCodec,
    pub model: &'a ModelArtifact,
    pub metrics: &'a MetricsArtifact,
}

impl TrainedArtifacts<'_> {
    /// Write all four files, replacing any previous set.
    pub fn persist(&self, paths: &ArtifactPaths) -> Result<()> {
        std::fs::create_dir_all(paths.dir())?;

        let targets = [
            paths.vectorizer(),
            paths.label_encoder(),
            paths.model(),
            paths.metrics(),
        ];
        let staged: Vec<PathBuf> = targets.iter().map(|p| p.with_extension("json.tmp")).collect();

        let written = self.stage(&staged);
        if let Err(e) = written {
            discard(&staged);
            return Err(e);
        }

        commit_staged(&staged, &targets)?;
        info!("Artifacts saved to {}", paths.dir().display());
        Ok(())
    }

    fn stage(&self, staged: &[PathBuf]) -> Result<()> {
        self.vectorizer.save(&staged[0])?;
        self.codec.save(&staged[1])?;
        std::fs::write(&staged[2], serde_json::to_string(self.model)?)?;
        std::fs::write(&staged[3], serde_json::to_string_pretty(self.metrics)?)?;
        Ok(())
    }
}

/// Rename each staged file onto its target. On the first failure the
/// remaining staged files are removed and the targets already replaced are
/// logged.
fn commit_staged(staged: &[PathBuf], targets: &[PathBuf]) -> Result<()> {
    for (i, (tmp, target)) in staged.iter().zip(targets).enumerate() {
        if let Err(e) = std::fs::rename(tmp, target) {
            let swapped: Vec<String> = targets[..i].iter().map(|p| p.display().to_string()).collect();
            warn!(
                "Cannot move {} into place: {}. Already replaced: [{}]",
                target.display(),
                e,
                swapped.join(", ")
            );
            discard(&staged[i..]);
            return Err(e.into());
        }
        debug!("Wrote {}", target.display());
    }
    Ok(())
}

fn discard(paths: &[PathBuf]) {
    for path in paths {
        if path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                warn!("Cannot remove staged artifact {}: {}", path.display(), e);
            }
        }
    }
}
