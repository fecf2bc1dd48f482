//! Prodcat Runtime: the training state machine and the predictor.
//!
//! `Trainer` drives cleaning, featurization, the stratified split, boosting,
//! evaluation and artifact persistence as one run. `Predictor` loads the
//! persisted artifacts and classifies a single listing.

pub mod artifacts;
pub mod metrics;
pub mod predictor;
pub mod split;
pub mod trainer;
pub mod types;

pub use artifacts::{ArtifactPaths, MetricsArtifact, ModelArtifact, ModelMetadata, TrainedArtifacts};
pub use metrics::{evaluate, ClassMetrics, EvaluationMetrics};
pub use predictor::{predict, Predictor, TOP_K};
pub use split::{stratified_split, StratifiedSplit};
pub use trainer::{Trainer, TrainerConfig};
pub use types::*;
