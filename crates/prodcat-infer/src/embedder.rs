//! Image embedding trait and implementations.
//!
//! The `ImageEmbedder` trait abstracts over image feature extraction.
//! Implementations:
//! - `OnnxImageEmbedder`: ResNet-50 without its classification head (requires `onnx`)
//! - `ChannelStatsEmbedder`: per-channel mean and spread, no model needed
//! - `NoopImageEmbedder`: zero vectors, keeps the fused layout fixed

use ndarray::{Array2, Array3, Axis};

use prodcat_core::Result;

/// Trait for image embedding backends.
///
/// Inputs are preprocessed `(3, 224, 224)` tensors; the output has one row
/// per input and `dimension()` columns.
pub trait ImageEmbedder: Send + Sync {
    /// Stable identifier, recorded in trained artifacts.
    fn id(&self) -> String;

    fn dimension(&self) -> usize;

    fn embed_batch(&self, batch: &[Array3<f32>]) -> Result<Array2<f32>>;

    /// Whether a real feature extractor is loaded.
    fn is_available(&self) -> bool {
        true
    }
}

/// Embedder that yields zero vectors.
pub struct NoopImageEmbedder {
    dim: usize,
}

impl NoopImageEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl ImageEmbedder for NoopImageEmbedder {
    fn id(&self) -> String {
        format!("noop:{}", self.dim)
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn embed_batch(&self, batch: &[Array3<f32>]) -> Result<Array2<f32>> {
        Ok(Array2::zeros((batch.len(), self.dim)))
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Mean and standard deviation of each colour channel (6 dims).
///
/// Cheap colour signature for hosts without ONNX Runtime.
pub struct ChannelStatsEmbedder;

impl ImageEmbedder for ChannelStatsEmbedder {
    fn id(&self) -> String {
        "channel-stats:6".to_string()
    }

    fn dimension(&self) -> usize {
        6
    }

    fn embed_batch(&self, batch: &[Array3<f32>]) -> Result<Array2<f32>> {
        let mut out = Array2::zeros((batch.len(), 6));
        for (i, tensor) in batch.iter().enumerate() {
            for (c, channel) in tensor.axis_iter(Axis(0)).enumerate() {
                out[[i, c]] = channel.mean().unwrap_or(0.0);
                out[[i, 3 + c]] = channel.std(0.0);
            }
        }
        Ok(out)
    }
}
