//! Training state machine.
//!
//! One run moves through cleaning, featurization, the stratified split,
//! boosting, evaluation and persistence. Any error moves the run to
//! `Failed` and is reported with the stage it happened in; artifacts are
//! only written in the `Persisting` stage.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::artifacts::{ArtifactPaths, MetricsArtifact, ModelArtifact, ModelMetadata, TrainedArtifacts};
use crate::metrics::evaluate;
use crate::split::stratified_split;
use crate::types::{StageTransition, TrainingReport, TrainingStage};
use prodcat_core::{load_yaml_section, DataPaths, DeviceCapabilities, Error, Result, RolloutSchedule, Split};
use prodcat_infer::{FeatureFuser, ImageEmbedder, TfidfParams, TfidfVectorizer};
use prodcat_ingest::CorpusCleaner;
use prodcat_model::{BoosterParams, ComputeDevice, GradientBooster, LabelCodec};
use prodcat_store::CorpusStore;

/// Trainer settings, read from the `trainer` section of the YAML config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub schedule: RolloutSchedule,
    pub tfidf: TfidfParams,
    pub booster: BoosterParams,
    /// Share of each class held out for validation.
    pub validation_ratio: f64,
    /// Images per embedding call.
    pub batch_size: usize,
    /// Seeds the validation split and the booster.
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            schedule: RolloutSchedule::default(),
            tfidf: TfidfParams::default(),
            booster: BoosterParams::default(),
            validation_ratio: 0.2,
            batch_size: 32,
            seed: 42,
        }
    }
}

impl TrainerConfig {
    /// Load from `config_file`, falling back to defaults when the file or
    /// section is absent.
    pub fn load(config_file: &Path) -> Result<Self> {
        let config: Self = load_yaml_section(config_file, "trainer")?.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.schedule.validate()?;
        self.booster.validate()?;
        if !(0.0..1.0).contains(&self.validation_ratio) {
            return Err(Error::Config(format!(
                "validation_ratio must be in [0, 1), got {}",
                self.validation_ratio
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be positive".into()));
        }
        Ok(())
    }
}

/// Runs one training pipeline over a corpus store.
pub struct Trainer<'a> {
    config: TrainerConfig,
    store: &'a CorpusStore,
    paths: DataPaths,
    embedder: Arc<dyn ImageEmbedder>,
    stage: TrainingStage,
    transitions: Vec<StageTransition>,
    device: Option<ComputeDevice>,
}

impl<'a> Trainer<'a> {
    pub fn new(
        config: TrainerConfig,
        store: &'a CorpusStore,
        paths: DataPaths,
        embedder: Arc<dyn ImageEmbedder>,
    ) -> Self {
        Self {
            config,
            store,
            paths,
            embedder,
            stage: TrainingStage::Idle,
            transitions: Vec::new(),
            device: None,
        }
    }

    /// Use an already selected compute device instead of selecting one on first fit.
    pub fn with_device(mut self, device: ComputeDevice) -> Self {
        self.device = Some(device);
        self
    }

    pub fn stage(&self) -> TrainingStage {
        self.stage
    }

    pub fn transitions(&self) -> &[StageTransition] {
        &self.transitions
    }

    /// Run the full pipeline. A trainer runs once.
    pub fn run(&mut self) -> Result<TrainingReport> {
        if self.stage != TrainingStage::Idle {
            return Err(Error::Training {
                stage: self.stage.to_string(),
                message: "trainer has already run".into(),
            });
        }

        let start = std::time::Instant::now();
        match self.execute() {
            Ok(mut report) => {
                self.advance(TrainingStage::Done)?;
                report.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                info!(
                    "Training complete: accuracy={:.4}, f1={:.4}, duration={}ms",
                    report.accuracy, report.f1, report.duration_ms
                );
                Ok(report)
            }
            Err(e) => {
                let stage = self.stage;
                self.advance(TrainingStage::Failed)?;
                warn!("Training failed during {}: {}", stage, e);
                Err(Error::Training {
                    stage: stage.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }

    fn advance(&mut self, next: TrainingStage) -> Result<()> {
        if !self.stage.can_advance_to(next) {
            return Err(Error::Internal(format!(
                "invalid training transition {} -> {}",
                self.stage, next
            )));
        }
        info!("Training stage: {} -> {}", self.stage, next);
        self.transitions.push(StageTransition {
            from: self.stage,
            to: next,
            at: Utc::now(),
        });
        self.stage = next;
        Ok(())
    }

    fn compute_device(&mut self) -> Result<&ComputeDevice> {
        if self.device.is_none() {
            let threads = DeviceCapabilities::discover().worker_threads();
            self.device = Some(ComputeDevice::select(threads)?);
        }
        self.device
            .as_ref()
            .ok_or_else(|| Error::Internal("compute device not initialised".into()))
    }

    fn execute(&mut self) -> Result<TrainingReport> {
        self.advance(TrainingStage::Cleaning)?;
        let row_budget = self.config.schedule.rows_for_today();
        CorpusCleaner::new(self.store, &self.paths.raw, &self.paths.images).run(row_budget)?;

        self.advance(TrainingStage::Featurizing)?;
        let docs: Vec<_> = self
            .store
            .find_all(Split::Train.collection())?
            .into_iter()
            .filter(|d| d.prdtypecode.is_some())
            .collect();
        if docs.is_empty() {
            return Err(Error::Feature("no labelled training documents".into()));
        }
        let codes: Vec<i64> = docs.iter().filter_map(|d| d.prdtypecode).collect();
        let texts: Vec<String> = docs.iter().map(|d| d.text()).collect();

        let vectorizer = TfidfVectorizer::fit(&texts, self.config.tfidf.clone())?;
        let fuser = FeatureFuser::new(&vectorizer, self.embedder.as_ref()).with_batch_size(self.config.batch_size);
        let layout = fuser.layout();
        let x = fuser.transform(&docs)?;
        let codec = LabelCodec::fit(&codes)?;
        let y = codec.encode_all(&codes)?;
        info!(
            "Featurized {} documents: text_dim={}, image_dim={}, classes={}",
            x.n_rows(),
            layout.text_dim,
            layout.image_dim,
            codec.len()
        );

        self.advance(TrainingStage::Splitting)?;
        let split = stratified_split(&y, self.config.validation_ratio, self.config.seed);
        let x_train = x.select_rows(&split.train);
        let y_train: Vec<u32> = split.train.iter().map(|&i| y[i]).collect();
        let x_valid = x.select_rows(&split.validation);
        let y_valid: Vec<u32> = split.validation.iter().map(|&i| y[i]).collect();
        info!("Split: train={}, validation={}", y_train.len(), y_valid.len());

        self.advance(TrainingStage::Fitting)?;
        let params = BoosterParams {
            seed: self.config.seed,
            ..self.config.booster.clone()
        };
        let num_class = codec.len();
        let (booster, history, device) = {
            let device = self.compute_device()?;
            let (booster, history) = device.install(|| {
                GradientBooster::fit(&x_train, &y_train, num_class, &params, Some((&x_valid, y_valid.as_slice())))
            })?;
            (booster, history, device.device().to_string())
        };

        self.advance(TrainingStage::Evaluating)?;
        let predicted = booster
            .predict(&x_valid)?
            .into_iter()
            .map(|i| codec.decode(i))
            .collect::<Result<Vec<i64>>>()?;
        let truth: Vec<i64> = split.validation.iter().map(|&i| codes[i]).collect();
        let evaluation = evaluate(&truth, &predicted);
        info!("Validation report:\n{}", evaluation);

        self.advance(TrainingStage::Persisting)?;
        let model = ModelArtifact {
            metadata: ModelMetadata {
                vectorizer_fingerprint: vectorizer.fingerprint(),
                layout,
                extractor_id: self.embedder.id(),
                classes: codec.classes().to_vec(),
                device: device.clone(),
                trained_at: Utc::now(),
            },
            booster,
        };
        let metrics = MetricsArtifact {
            evaluation,
            history,
            train_rows: y_train.len(),
            validation_rows: y_valid.len(),
        };
        TrainedArtifacts {
            vectorizer: &vectorizer,
            codec: &codec,
            model: &model,
            metrics: &metrics,
        }
        .persist(&ArtifactPaths::new(&self.paths.models))?;

        Ok(TrainingReport {
            status: "done".into(),
            accuracy: metrics.evaluation.accuracy,
            f1: metrics.evaluation.f1_weighted,
            row_budget,
            train_rows: metrics.train_rows,
            validation_rows: metrics.validation_rows,
            classes: codec.len(),
            device,
            duration_ms: 0,
        })
    }
}
