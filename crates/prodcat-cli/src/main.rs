//! prodcat: multimodal product category classifier.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{Command, USAGE};
use prodcat_core::{DeviceCapabilities, PipelineConfig, Split};
use prodcat_infer::ImageEmbedder;
use prodcat_ingest::CorpusCleaner;
use prodcat_runtime::{ArtifactPaths, MetricsArtifact, Predictor, Trainer, TrainerConfig};
use prodcat_store::{CorpusStore, PartialStoreSettings, StoreSettings, StoreStatus};

fn resolve_data_dir() -> PathBuf {
    std::env::var("PRODCAT_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("{}", message);
            std::process::exit(1);
        }
    };
    if command == Command::Help {
        println!("{}", USAGE);
        return Ok(());
    }

    let data_dir = resolve_data_dir();
    info!("Data directory: {}", data_dir.display());
    let config = PipelineConfig::from_env(&data_dir)
        .with_context(|| format!("cannot prepare data directory {}", data_dir.display()))?;

    let settings = StoreSettings::resolve(&StoreSettings::standard_chain(
        PartialStoreSettings::default(),
        &config.config_file,
        &config.data_paths.corpus,
    ))?;

    match command {
        Command::Clean { rows } => {
            let trainer_config = TrainerConfig::load(&config.config_file)?;
            let row_budget = rows.unwrap_or_else(|| trainer_config.schedule.rows_for_today());
            let paths = &config.data_paths;
            let report = CorpusStore::scoped(&settings, |store| {
                CorpusCleaner::new(store, &paths.raw, &paths.images).run(row_budget)
            })?;
            print_json(&report)?;
        }
        Command::Train => {
            let trainer_config = TrainerConfig::load(&config.config_file)?;
            let embedder = image_embedder(&config);
            let paths = config.data_paths.clone();
            let report = CorpusStore::scoped(&settings, |store| {
                Trainer::new(trainer_config, store, paths, embedder).run()
            })?;
            print_json(&report)?;
        }
        Command::Predict {
            image,
            designation,
            description,
        } => {
            let predictor = Predictor::load(&config.data_paths.models, image_embedder(&config))?;
            let prediction = predictor.predict_image_file(&image, &designation, &description)?;
            print_json(&prediction)?;
        }
        Command::Sample => {
            let predictor = Predictor::load(&config.data_paths.models, image_embedder(&config))?;
            let prediction = CorpusStore::scoped(&settings, |store| {
                let ids = store.ids(Split::Test.collection())?;
                let Some(&id) = ids.choose(&mut rand::thread_rng()) else {
                    return Ok(None);
                };
                match store.get(Split::Test.collection(), id)? {
                    Some(doc) => {
                        info!("Sampled test document id={}: {}", doc.id, doc.designation);
                        predictor.predict_document(&doc).map(Some)
                    }
                    None => Ok(None),
                }
            })?;
            match prediction {
                Some(prediction) => print_json(&prediction)?,
                None => anyhow::bail!(
                    "collection {} is empty; run `prodcat clean` first",
                    Split::Test.collection()
                ),
            }
        }
        Command::Status => {
            let store = CorpusStore::scoped(&settings, |store| store.status())?;
            let status = Status::collect(store, &config.data_paths.models);
            print_status(&status);
        }
        Command::Help => {}
    }

    Ok(())
}

fn image_embedder(config: &PipelineConfig) -> Arc<dyn ImageEmbedder> {
    prodcat_infer::create_image_embedder(&config.data_paths.image_model, config.embedding_dim)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

struct Status {
    store: StoreStatus,
    artifacts: Vec<(PathBuf, bool)>,
    metrics: Option<MetricsArtifact>,
    capabilities: DeviceCapabilities,
}

impl Status {
    fn collect(store: StoreStatus, models_dir: &Path) -> Self {
        let paths = ArtifactPaths::new(models_dir);
        let artifacts = [paths.vectorizer(), paths.label_encoder(), paths.model(), paths.metrics()]
            .into_iter()
            .map(|p| {
                let present = p.is_file();
                (p, present)
            })
            .collect();
        Self {
            store,
            artifacts,
            metrics: MetricsArtifact::load(&paths.metrics()).ok(),
            capabilities: DeviceCapabilities::discover(),
        }
    }
}

fn print_status(status: &Status) {
    println!("=== prodcat status ===");
    println!();
    println!("Corpus:             {}", status.store.db_path.display());
    println!("Size:               {} bytes", status.store.size_bytes);
    for c in &status.store.collections {
        println!("  {:<17} {}", c.collection, c.documents);
    }

    println!();
    println!("Artifacts:");
    for (path, present) in &status.artifacts {
        println!("  {:<40} {}", path.display(), if *present { "present" } else { "missing" });
    }
    if let Some(metrics) = &status.metrics {
        println!(
            "Last validation:    accuracy={:.4} f1={:.4} ({} rows)",
            metrics.evaluation.accuracy, metrics.evaluation.f1_weighted, metrics.validation_rows
        );
    }

    println!();
    let caps = &status.capabilities;
    println!("CPU cores:          {}", caps.cpu_cores);
    println!("RAM:                {} MB", caps.total_ram_bytes / (1024 * 1024));
    println!("GPU detected:       {}", if caps.has_gpu { "yes" } else { "no" });
}
