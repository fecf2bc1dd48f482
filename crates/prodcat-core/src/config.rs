//! Configuration and data directory management.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Paths to all prodcat data directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Raw CSV tables (`data/raw/`).
    pub raw: PathBuf,
    /// Raw product images (`data/raw/images/`).
    pub images: PathBuf,
    /// Corpus database directory (`data/corpus/`).
    pub corpus: PathBuf,
    /// Trained artifacts (`data/models/`).
    pub models: PathBuf,
    /// Image feature extractor (`data/models/resnet50/`).
    pub image_model: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let raw = root.join("raw");
        let models = root.join("models");
        let paths = Self {
            images: raw.join("images"),
            corpus: root.join("corpus"),
            image_model: models.join("resnet50"),
            raw,
            models,
            root,
        };
        paths.ensure_dirs()?;
        Ok(paths)
    }

    fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.raw)?;
        std::fs::create_dir_all(&self.corpus)?;
        std::fs::create_dir_all(&self.models)?;
        Ok(())
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Data directory paths.
    pub data_paths: DataPaths,
    /// Optional YAML overlay (`PRODCAT_CONFIG`, default `conf/prodcat.yaml`).
    pub config_file: PathBuf,
    /// Width of the image embedding (2048 for ResNet-50 features).
    pub embedding_dim: usize,
}

impl PipelineConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let config_file = std::env::var("PRODCAT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("conf/prodcat.yaml"));

        let embedding_dim = std::env::var("PRODCAT_EMBEDDING_DIM")
            .ok()
            .and_then(|d| d.parse().ok())
            .unwrap_or(2048);

        let data_paths = DataPaths::new(data_dir)?;

        Ok(Self {
            data_paths,
            config_file,
            embedding_dim,
        })
    }
}

/// Read one top-level section of a YAML file.
///
/// A missing file or an absent section yields `Ok(None)`; a file that exists
/// but does not parse is a configuration error.
pub fn load_yaml_section<T: DeserializeOwned>(path: &Path, section: &str) -> Result<Option<T>> {
    if !path.exists() {
        debug!("No config file at {}", path.display());
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    let doc: serde_yaml::Value = serde_yaml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

    let Some(value) = doc.get(section) else {
        return Ok(None);
    };

    let parsed = serde_yaml::from_value(value.clone())
        .map_err(|e| Error::Config(format!("Invalid `{}` section in {}: {}", section, path.display(), e)))?;
    info!("Loaded `{}` settings from {}", section, path.display());
    Ok(Some(parsed))
}
