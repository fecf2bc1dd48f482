//! Single-listing inference over persisted artifacts.

use std::path::Path;
use std::sync::Arc;

use image::DynamicImage;
use tracing::{debug, info};

use crate::artifacts::{ArtifactPaths, ModelArtifact};
use crate::types::{Prediction, RankedCategory};
use prodcat_core::{category_or_default, CleanedDocument, Error, Result};
use prodcat_infer::{FeatureFuser, ImageEmbedder, TfidfVectorizer};
use prodcat_ingest::{clean_row, load_image};
use prodcat_model::LabelCodec;

/// Number of ranked categories returned with each prediction.
pub const TOP_K: usize = 3;

/// A loaded vectorizer, label codec and model, ready to classify.
pub struct Predictor {
    vectorizer: TfidfVectorizer,
    codec: LabelCodec,
    model: ModelArtifact,
    embedder: Arc<dyn ImageEmbedder>,
}

impl Predictor {
    /// Load artifacts from `artifact_dir` and check they belong together
    /// and match `embedder`.
    pub fn load(artifact_dir: impl AsRef<Path>, embedder: Arc<dyn ImageEmbedder>) -> Result<Self> {
        let paths = ArtifactPaths::new(artifact_dir);
        paths.require_inference_set()?;

        let vectorizer = TfidfVectorizer::load(&paths.vectorizer())?;
        let codec = LabelCodec::load(&paths.label_encoder())?;
        let model = ModelArtifact::load(&paths.model())?;
        model.check_compatible(&vectorizer, &codec, embedder.as_ref())?;

        info!(
            "Predictor loaded from {}: {} classes, {} rounds, extractor={}",
            paths.dir().display(),
            codec.len(),
            model.booster.num_rounds(),
            model.metadata.extractor_id
        );
        Ok(Self {
            vectorizer,
            codec,
            model,
            embedder,
        })
    }

    pub fn classes(&self) -> &[i64] {
        self.codec.classes()
    }

    /// Clean a raw listing the way training rows were cleaned, then classify it.
    pub fn predict(&self, designation: &str, description: &str, image: &DynamicImage) -> Result<Prediction> {
        let row = clean_row(Some(designation), Some(description), image)?;
        self.predict_document(&row.into_document(0, None))
    }

    /// Classify a listing whose image is read from `image_path`.
    pub fn predict_image_file(&self, image_path: &Path, designation: &str, description: &str) -> Result<Prediction> {
        let image = load_image(image_path)?;
        self.predict(designation, description, &image)
    }

    /// Classify an already cleaned document.
    pub fn predict_document(&self, doc: &CleanedDocument) -> Result<Prediction> {
        let fuser = FeatureFuser::new(&self.vectorizer, self.embedder.as_ref());
        let x = fuser.transform_one(doc)?;
        let probabilities = self
            .model
            .booster
            .predict_proba(&x)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Inference("model returned no probabilities".into()))?;

        let mut ranked: Vec<(usize, f32)> = probabilities.into_iter().enumerate().collect();
        // stable: equal probabilities keep class order, matching arg-max
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let top = ranked
            .into_iter()
            .take(TOP_K)
            .map(|(class, probability)| -> Result<RankedCategory> {
                let code = self.codec.decode(class as u32)?;
                Ok(RankedCategory {
                    code,
                    category: category_or_default(code).to_string(),
                    probability,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let best = top
            .first()
            .ok_or_else(|| Error::Inference("model has no classes".into()))?;
        debug!("Predicted {} ({:.3}) for document id={}", best.code, best.probability, doc.id);
        Ok(Prediction {
            predicted_code: best.code,
            category: best.category.clone(),
            top,
        })
    }
}

/// Load the artifacts in `artifact_dir` and classify one listing.
pub fn predict(
    artifact_dir: impl AsRef<Path>,
    embedder: Arc<dyn ImageEmbedder>,
    designation: &str,
    description: &str,
    image: &DynamicImage,
) -> Result<Prediction> {
    Predictor::load(artifact_dir, embedder)?.predict(designation, description, image)
}
