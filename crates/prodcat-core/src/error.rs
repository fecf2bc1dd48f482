//! Error types for prodcat.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate document: collection={collection}, id={id}")]
    DuplicateDocument { collection: String, id: i64 },

    #[error("Ingest error: {0}")]
    Ingest(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Feature error: {0}")]
    Feature(String),

    #[error("Inference error: {0}")]
    Inference(String),

    /// A label code or class index outside the fitted label space.
    #[error("Label mismatch: {0}")]
    LabelMismatch(String),

    #[error("Artifacts not found: {}", .0.display())]
    ArtifactsNotFound(PathBuf),

    /// Vectorizer, model and extractor were not produced by the same run.
    #[error("Artifact mismatch: {0}")]
    ArtifactMismatch(String),

    #[error("Training failed during {stage}: {message}")]
    Training { stage: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
