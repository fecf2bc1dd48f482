//! Prodcat Infer: feature fusion for the product classifier.
//!
//! A listing becomes one sparse row: TF-IDF weights over the fitted
//! vocabulary followed by a dense image embedding. When the `onnx` feature
//! is enabled and the ResNet-50 export is present, `OnnxImageEmbedder`
//! supplies 2048-dim CNN features. Without it, `NoopImageEmbedder` keeps
//! the layout fixed with zero image columns.

pub mod embedder;
pub mod fuser;
pub mod onnx_embedder;
pub mod preprocess;
pub mod sparse;
pub mod tfidf;

pub use embedder::{ChannelStatsEmbedder, ImageEmbedder, NoopImageEmbedder};
pub use fuser::{FeatureFuser, FeatureLayout};
pub use preprocess::{preprocess_image, IMAGENET_MEAN, IMAGENET_STD};
pub use sparse::CsrMatrix;
pub use tfidf::{TfidfParams, TfidfVectorizer};

#[cfg(feature = "onnx")]
pub use onnx_embedder::OnnxImageEmbedder;

use std::path::Path;
use std::sync::Arc;

/// Width of ResNet-50 pooled features.
pub const RESNET50_DIM: usize = 2048;

/// Create the best available image embedder for the given model directory.
///
/// Tries ONNX first (if feature enabled and `model.onnx` present), falls
/// back to a zero embedder of width `fallback_dim`.
pub fn create_image_embedder(model_dir: &Path, fallback_dim: usize) -> Arc<dyn ImageEmbedder> {
    #[cfg(feature = "onnx")]
    {
        match OnnxImageEmbedder::load(model_dir) {
            Ok(embedder) => {
                tracing::info!("Using ONNX image embedder (dim={})", embedder.dimension());
                return Arc::new(embedder);
            }
            Err(e) => {
                tracing::warn!("ONNX image embedder unavailable: {}. Image features will be zero.", e);
            }
        }
    }

    #[cfg(not(feature = "onnx"))]
    {
        let _ = model_dir;
        tracing::warn!("ONNX feature disabled. Image features will be zero.");
    }

    Arc::new(NoopImageEmbedder::new(fallback_dim))
}
