//! Prodcat Store: SQLite document collections for the cleaned corpus.

pub mod schema;
pub mod settings;
pub mod sqlite;

pub use settings::{
    DefaultsProvider, EnvProvider, ExplicitProvider, PartialStoreSettings, SettingsProvider,
    StoreSettings, YamlFileProvider,
};
pub use sqlite::{CollectionCount, CorpusStore, StoreStatus};
