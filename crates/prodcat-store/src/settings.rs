//! Connection settings resolved from an ordered chain of providers.
//!
//! Each provider contributes a partial layer; the first provider that sets a
//! field wins. The conventional chain is explicit parameters, then the
//! `store:` section of the YAML config, then `PRODCAT_DB_*` environment
//! variables, then built-in defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use prodcat_core::{load_yaml_section, Result};

const DEFAULT_DB_DIR: &str = "data/corpus";
const DEFAULT_DB_NAME: &str = "prodcat";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Fully resolved store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Directory holding the database file.
    pub db_dir: PathBuf,
    /// Database name; the file is `{db_dir}/{db_name}.db`.
    pub db_name: String,
    pub busy_timeout_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_dir: PathBuf::from(DEFAULT_DB_DIR),
            db_name: DEFAULT_DB_NAME.to_string(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

/// One layer of settings. Unset fields defer to lower-priority providers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialStoreSettings {
    pub db_dir: Option<PathBuf>,
    pub db_name: Option<String>,
    pub busy_timeout_ms: Option<u64>,
}

impl PartialStoreSettings {
    fn fill_from(&mut self, lower: PartialStoreSettings) {
        if self.db_dir.is_none() {
            self.db_dir = lower.db_dir;
        }
        if self.db_name.is_none() {
            self.db_name = lower.db_name;
        }
        if self.busy_timeout_ms.is_none() {
            self.busy_timeout_ms = lower.busy_timeout_ms;
        }
    }
}

/// A source of store settings.
pub trait SettingsProvider: Send + Sync {
    fn name(&self) -> &str;

    fn load(&self) -> Result<PartialStoreSettings>;
}

/// Values passed directly by the caller.
pub struct ExplicitProvider(pub PartialStoreSettings);

impl SettingsProvider for ExplicitProvider {
    fn name(&self) -> &str {
        "explicit"
    }

    fn load(&self) -> Result<PartialStoreSettings> {
        Ok(self.0.clone())
    }
}

/// The `store:` section of a YAML file. A missing file is an empty layer.
pub struct YamlFileProvider {
    path: PathBuf,
}

impl YamlFileProvider {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl SettingsProvider for YamlFileProvider {
    fn name(&self) -> &str {
        "yaml"
    }

    fn load(&self) -> Result<PartialStoreSettings> {
        Ok(load_yaml_section(&self.path, "store")?.unwrap_or_default())
    }
}

/// `PRODCAT_DB_DIR`, `PRODCAT_DB_NAME`, `PRODCAT_DB_BUSY_TIMEOUT_MS`.
pub struct EnvProvider {
    vars: HashMap<String, String>,
}

impl EnvProvider {
    /// Snapshot the process environment.
    pub fn from_env() -> Self {
        Self {
            vars: std::env::vars()
                .filter(|(k, _)| k.starts_with("PRODCAT_DB_"))
                .collect(),
        }
    }

    pub fn from_vars(vars: HashMap<String, String>) -> Self {
        Self { vars }
    }
}

impl SettingsProvider for EnvProvider {
    fn name(&self) -> &str {
        "env"
    }

    fn load(&self) -> Result<PartialStoreSettings> {
        Ok(PartialStoreSettings {
            db_dir: self.vars.get("PRODCAT_DB_DIR").map(PathBuf::from),
            db_name: self.vars.get("PRODCAT_DB_NAME").cloned(),
            busy_timeout_ms: self
                .vars
                .get("PRODCAT_DB_BUSY_TIMEOUT_MS")
                .and_then(|v| v.parse().ok()),
        })
    }
}

/// Complete fallback layer.
#[derive(Default)]
pub struct DefaultsProvider {
    defaults: StoreSettings,
}

impl DefaultsProvider {
    /// Defaults with the database placed under `db_dir`.
    pub fn with_dir(db_dir: impl AsRef<Path>) -> Self {
        Self {
            defaults: StoreSettings {
                db_dir: db_dir.as_ref().to_path_buf(),
                ..Default::default()
            },
        }
    }
}

impl SettingsProvider for DefaultsProvider {
    fn name(&self) -> &str {
        "defaults"
    }

    fn load(&self) -> Result<PartialStoreSettings> {
        Ok(PartialStoreSettings {
            db_dir: Some(self.defaults.db_dir.clone()),
            db_name: Some(self.defaults.db_name.clone()),
            busy_timeout_ms: Some(self.defaults.busy_timeout_ms),
        })
    }
}

impl StoreSettings {
    /// Resolve settings by querying `providers` in priority order.
    ///
    /// Fields no provider sets take the built-in defaults.
    pub fn resolve(providers: &[Box<dyn SettingsProvider>]) -> Result<Self> {
        let mut merged = PartialStoreSettings::default();
        for provider in providers {
            let layer = provider.load()?;
            debug!("Store settings layer `{}`: {:?}", provider.name(), layer);
            merged.fill_from(layer);
        }

        let defaults = StoreSettings::default();
        Ok(Self {
            db_dir: merged.db_dir.unwrap_or(defaults.db_dir),
            db_name: merged.db_name.unwrap_or(defaults.db_name),
            busy_timeout_ms: merged.busy_timeout_ms.unwrap_or(defaults.busy_timeout_ms),
        })
    }

    /// Explicit > YAML file > environment > defaults rooted at `default_dir`.
    pub fn standard_chain(
        explicit: PartialStoreSettings,
        config_file: impl AsRef<Path>,
        default_dir: impl AsRef<Path>,
    ) -> Vec<Box<dyn SettingsProvider>> {
        vec![
            Box::new(ExplicitProvider(explicit)),
            Box::new(YamlFileProvider::new(config_file)),
            Box::new(EnvProvider::from_env()),
            Box::new(DefaultsProvider::with_dir(default_dir)),
        ]
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_dir.join(format!("{}.db", self.db_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_only() {
        let settings = StoreSettings::resolve(&[]).unwrap();
        assert_eq!(settings, StoreSettings::default());
        assert_eq!(settings.db_path(), PathBuf::from("data/corpus/prodcat.db"));
    }

    #[test]
    fn test_precedence() {
        let dir = TempDir::new().unwrap();
        let yaml = dir.path().join("conf.yaml");
        std::fs::write(&yaml, "store:\n  db_name: from_yaml\n  busy_timeout_ms: 100\n").unwrap();

        let env = HashMap::from([
            ("PRODCAT_DB_NAME".to_string(), "from_env".to_string()),
            ("PRODCAT_DB_DIR".to_string(), "/tmp/env_dir".to_string()),
        ]);

        let providers: Vec<Box<dyn SettingsProvider>> = vec![
            Box::new(ExplicitProvider(PartialStoreSettings {
                busy_timeout_ms: Some(42),
                ..Default::default()
            })),
            Box::new(YamlFileProvider::new(&yaml)),
            Box::new(EnvProvider::from_vars(env)),
            Box::new(DefaultsProvider::default()),
        ];

        let settings = StoreSettings::resolve(&providers).unwrap();
        assert_eq!(settings.busy_timeout_ms, 42);
        assert_eq!(settings.db_name, "from_yaml");
        assert_eq!(settings.db_dir, PathBuf::from("/tmp/env_dir"));
    }

    #[test]
    fn test_missing_yaml_is_empty_layer() {
        let providers: Vec<Box<dyn SettingsProvider>> = vec![
            Box::new(YamlFileProvider::new("/nonexistent/prodcat.yaml")),
            Box::new(DefaultsProvider::with_dir("/srv/corpus")),
        ];
        let settings = StoreSettings::resolve(&providers).unwrap();
        assert_eq!(settings.db_dir, PathBuf::from("/srv/corpus"));
        assert_eq!(settings.db_name, "prodcat");
    }

    #[test]
    fn test_bad_env_number_ignored() {
        let env = HashMap::from([("PRODCAT_DB_BUSY_TIMEOUT_MS".to_string(), "soon".to_string())]);
        let providers: Vec<Box<dyn SettingsProvider>> = vec![Box::new(EnvProvider::from_vars(env))];
        let settings = StoreSettings::resolve(&providers).unwrap();
        assert_eq!(settings.busy_timeout_ms, DEFAULT_BUSY_TIMEOUT_MS);
    }
}
