//! End-to-end: raw tables and images → trained artifacts → predictions.

use std::path::Path;
use std::sync::Arc;

use image::{DynamicImage, Rgb, RgbImage};
use tempfile::TempDir;

use prodcat_core::{DataPaths, Error, RolloutSchedule, Split};
use prodcat_infer::{ChannelStatsEmbedder, ImageEmbedder, NoopImageEmbedder, TfidfParams, TfidfVectorizer};
use prodcat_model::{BoosterParams, ComputeDevice};
use prodcat_runtime::{ArtifactPaths, MetricsArtifact, Predictor, Trainer, TrainerConfig, TrainingStage};
use prodcat_store::{CorpusStore, StoreSettings};

const CLASSES: [(i64, &str, [u8; 3]); 3] = [
    (10, "livre roman poche", [200, 30, 30]),
    (2583, "piscine gonflable jardin", [30, 200, 30]),
    (1300, "drone camera helice", [30, 30, 200]),
];
const ROWS_PER_CLASS: i64 = 6;

fn write_image(dir: &Path, imageid: i64, productid: i64, colour: [u8; 3]) {
    RgbImage::from_pixel(64, 48, Rgb(colour))
        .save(dir.join(format!("image_{}_product_{}.jpg", imageid, productid)))
        .unwrap();
}

/// Write a small labelled catalog: six rows per class plus one row whose
/// image is missing.
fn write_catalog(paths: &DataPaths) {
    let train_images = paths.images.join("image_train");
    let test_images = paths.images.join("image_test");
    std::fs::create_dir_all(&train_images).unwrap();
    std::fs::create_dir_all(&test_images).unwrap();

    let mut features = String::from(",designation,description,productid,imageid\n");
    let mut labels = String::from(",prdtypecode\n");
    let mut id = 0;
    for (code, words, colour) in CLASSES {
        for i in 0..ROWS_PER_CLASS {
            let shade = colour.map(|c| c.saturating_sub((i * 4) as u8));
            features.push_str(&format!("{},<b>{}</b> modele {},,{},{}\n", id, words, i, 1000 + id, 5000 + id));
            labels.push_str(&format!("{},{}\n", id, code));
            write_image(&train_images, 5000 + id, 1000 + id, shade);
            id += 1;
        }
    }
    // no image file for this one
    features.push_str(&format!("{},Livre sans image,,{},{}\n", id, 1000 + id, 5000 + id));
    labels.push_str(&format!("{},10\n", id));

    std::fs::write(paths.raw.join("X_train_update.csv"), features).unwrap();
    std::fs::write(paths.raw.join("Y_train_CVw08PX.csv"), labels).unwrap();

    std::fs::write(
        paths.raw.join("X_test_update.csv"),
        ",designation,description,productid,imageid\n900,Drone pliable,,1900,5900\n",
    )
    .unwrap();
    write_image(&test_images, 5900, 1900, [30, 30, 200]);
}

fn small_config() -> TrainerConfig {
    TrainerConfig {
        schedule: RolloutSchedule {
            floor: 1000,
            ceiling: 1000,
            ..Default::default()
        },
        tfidf: TfidfParams {
            min_df: 1,
            ngram_range: (1, 1),
            ..Default::default()
        },
        booster: BoosterParams {
            num_rounds: 15,
            max_depth: 3,
            subsample: 1.0,
            colsample_bytree: 1.0,
            min_child_weight: 0.1,
            ..Default::default()
        },
        ..Default::default()
    }
}

struct Fixture {
    _dir: TempDir,
    paths: DataPaths,
    store: CorpusStore,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let paths = DataPaths::new(dir.path().join("data")).unwrap();
    let settings = StoreSettings {
        db_dir: paths.corpus.clone(),
        ..Default::default()
    };
    let store = CorpusStore::connect(&settings).unwrap();
    Fixture {
        _dir: dir,
        paths,
        store,
    }
}

fn embedder() -> Arc<dyn ImageEmbedder> {
    Arc::new(ChannelStatsEmbedder)
}

fn train(fx: &Fixture) -> prodcat_runtime::TrainingReport {
    let mut trainer = Trainer::new(small_config(), &fx.store, fx.paths.clone(), embedder());
    let report = trainer.run().unwrap();
    assert_eq!(trainer.stage(), TrainingStage::Done);
    report
}

fn blue_square() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(120, 80, Rgb([35, 35, 190])))
}

#[test]
fn test_train_then_predict() {
    let fx = fixture();
    write_catalog(&fx.paths);

    let mut trainer = Trainer::new(small_config(), &fx.store, fx.paths.clone(), embedder());
    let report = trainer.run().unwrap();

    assert_eq!(report.status, "done");
    assert_eq!(report.classes, 3);
    // the row without an image is skipped, one row per class is held out
    assert_eq!(report.train_rows, 15);
    assert_eq!(report.validation_rows, 3);
    assert!(report.accuracy > 0.99, "accuracy={}", report.accuracy);
    assert!(report.f1 > 0.99, "f1={}", report.f1);

    let stages: Vec<TrainingStage> = trainer.transitions().iter().map(|t| t.to).collect();
    assert_eq!(
        stages,
        vec![
            TrainingStage::Cleaning,
            TrainingStage::Featurizing,
            TrainingStage::Splitting,
            TrainingStage::Fitting,
            TrainingStage::Evaluating,
            TrainingStage::Persisting,
            TrainingStage::Done,
        ]
    );
    assert_eq!(fx.store.count(Split::Train.collection()).unwrap(), 18);
    assert_eq!(fx.store.count(Split::Test.collection()).unwrap(), 1);

    let artifacts = ArtifactPaths::new(&fx.paths.models);
    let metrics = MetricsArtifact::load(&artifacts.metrics()).unwrap();
    assert_eq!(metrics.history.len(), 15);
    assert!(!fx.paths.models.join("gbdt_fusion.json.tmp").exists());

    let predictor = Predictor::load(&fx.paths.models, embedder()).unwrap();
    assert_eq!(predictor.classes(), &[10, 1300, 2583]);

    let prediction = predictor.predict("Drone <i>camera</i> HD", "", &blue_square()).unwrap();
    assert_eq!(prediction.predicted_code, 1300);
    assert_eq!(prediction.category, "Drones et modèles réduits");
    assert_eq!(prediction.top.len(), 3);
    assert_eq!(prediction.top[0].code, 1300);
    assert!(prediction.top.windows(2).all(|w| w[0].probability >= w[1].probability));
    let total: f32 = prediction.top.iter().map(|r| r.probability).sum();
    assert!((total - 1.0).abs() < 1e-4);

    // deterministic
    let again = predictor.predict("Drone <i>camera</i> HD", "", &blue_square()).unwrap();
    assert_eq!(prediction, again);

    // cleaned test documents go through the same path
    let doc = fx.store.get(Split::Test.collection(), 900).unwrap().unwrap();
    assert!(predictor.predict_document(&doc).is_ok());
}

#[test]
fn test_predict_image_file() {
    let fx = fixture();
    write_catalog(&fx.paths);
    train(&fx);

    let path = fx.paths.root.join("upload.png");
    RgbImage::from_pixel(50, 50, Rgb([40, 210, 40])).save(&path).unwrap();

    let red = DynamicImage::ImageRgb8(RgbImage::from_pixel(80, 80, Rgb([205, 30, 30])));
    let prediction = prodcat_runtime::predict(&fx.paths.models, embedder(), "Roman de poche", "", &red).unwrap();
    assert_eq!(prediction.predicted_code, 10);

    let predictor = Predictor::load(&fx.paths.models, embedder()).unwrap();
    let from_file = predictor.predict_image_file(&path, "Piscine gonflable", "").unwrap();
    assert_eq!(from_file.predicted_code, 2583);
    assert!(predictor
        .predict_image_file(&fx.paths.root.join("missing.jpg"), "Piscine", "")
        .is_err());
}

#[test]
fn test_missing_artifact() {
    let fx = fixture();
    write_catalog(&fx.paths);
    train(&fx);

    let artifacts = ArtifactPaths::new(&fx.paths.models);
    std::fs::remove_file(artifacts.model()).unwrap();

    match Predictor::load(&fx.paths.models, embedder()) {
        Err(Error::ArtifactsNotFound(path)) => assert_eq!(path, artifacts.model()),
        Err(e) => panic!("expected ArtifactsNotFound, got {}", e),
        Ok(_) => panic!("expected ArtifactsNotFound"),
    }
}

#[test]
fn test_mismatched_artifacts() {
    let fx = fixture();
    write_catalog(&fx.paths);
    train(&fx);

    // a different image extractor
    let other: Arc<dyn ImageEmbedder> = Arc::new(NoopImageEmbedder::new(6));
    assert!(matches!(
        Predictor::load(&fx.paths.models, other),
        Err(Error::ArtifactMismatch(_))
    ));

    // a vectorizer fitted elsewhere
    let artifacts = ArtifactPaths::new(&fx.paths.models);
    let texts = ["chaise bois", "table bois", "lampe metal"];
    let params = TfidfParams {
        min_df: 1,
        ..Default::default()
    };
    TfidfVectorizer::fit(&texts, params)
        .unwrap()
        .save(&artifacts.vectorizer())
        .unwrap();
    assert!(matches!(
        Predictor::load(&fx.paths.models, embedder()),
        Err(Error::ArtifactMismatch(_))
    ));
}

#[test]
fn test_failed_run_writes_nothing() {
    let fx = fixture();
    // no raw tables at all

    let mut trainer = Trainer::new(small_config(), &fx.store, fx.paths.clone(), embedder())
        .with_device(ComputeDevice::single().unwrap());
    match trainer.run() {
        Err(Error::Training { stage, .. }) => assert_eq!(stage, "cleaning"),
        other => panic!("expected a training error, got {:?}", other.map(|r| r.status)),
    }
    assert_eq!(trainer.stage(), TrainingStage::Failed);
    assert_eq!(std::fs::read_dir(&fx.paths.models).unwrap().count(), 0);

    // a trainer runs once
    assert!(matches!(trainer.run(), Err(Error::Training { .. })));
}

#[test]
fn test_retraining_overwrites() {
    let fx = fixture();
    write_catalog(&fx.paths);
    let first = train(&fx);
    let second = train(&fx);
    assert_eq!(first.train_rows, second.train_rows);

    let files: Vec<String> = std::fs::read_dir(&fx.paths.models)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(files.len(), 4, "{:?}", files);
}

#[test]
fn test_two_row_default_booster() {
    let fx = fixture();
    let train_images = fx.paths.images.join("image_train");
    let test_images = fx.paths.images.join("image_test");
    std::fs::create_dir_all(&train_images).unwrap();
    std::fs::create_dir_all(&test_images).unwrap();

    std::fs::write(
        fx.paths.raw.join("X_train_update.csv"),
        ",designation,description,productid,imageid\n0,livre roman produit,,100,200\n1,jeu video produit,,101,201\n",
    )
    .unwrap();
    std::fs::write(fx.paths.raw.join("Y_train_CVw08PX.csv"), ",prdtypecode\n0,10\n1,40\n").unwrap();
    write_image(&train_images, 200, 100, [200, 30, 30]);
    write_image(&train_images, 201, 101, [30, 30, 200]);
    std::fs::write(
        fx.paths.raw.join("X_test_update.csv"),
        ",designation,description,productid,imageid\n9,jeu video,,109,209\n",
    )
    .unwrap();
    write_image(&test_images, 209, 109, [30, 30, 200]);

    // default booster: eta 0.1, depth 8, 0.8 row and column sampling, 50 rounds
    let config = TrainerConfig {
        tfidf: TfidfParams {
            min_df: 1,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut trainer = Trainer::new(config, &fx.store, fx.paths.clone(), embedder());
    let report = trainer.run().unwrap();
    assert_eq!(report.train_rows, 2);
    assert_eq!(report.validation_rows, 0);
    assert_eq!(report.classes, 2);

    let predictor = Predictor::load(&fx.paths.models, embedder()).unwrap();
    let prediction = predictor.predict("jeu video produit", "", &blue_square()).unwrap();
    assert_eq!(prediction.predicted_code, 40);
    assert_eq!(prediction.top.len(), 2);
    assert_eq!(prediction.top[1].code, 10);
}
