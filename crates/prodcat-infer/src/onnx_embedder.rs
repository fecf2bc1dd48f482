//! ONNX-based image embedding using ResNet-50.
//!
//! Loads a ResNet-50 export whose final fully connected layer was replaced
//! by the identity, so the output is the 2048-dim pooled feature vector.
//! Requires the `onnx` feature.

#[cfg(feature = "onnx")]
mod inner {
    use std::path::Path;
    use std::sync::Arc;

    use ndarray::{Array2, Array3};
    use ort::session::Session;
    use ort::value::Tensor;
    use parking_lot::Mutex;
    use tracing::{debug, info};

    use crate::embedder::ImageEmbedder;
    use crate::RESNET50_DIM;
    use prodcat_core::{Error, Result};

    /// ONNX image embedding engine.
    pub struct OnnxImageEmbedder {
        session: Arc<Mutex<Session>>,
        name: String,
        dimension: usize,
    }

    impl OnnxImageEmbedder {
        /// Load `model_dir/model.onnx`.
        pub fn load(model_dir: &Path) -> std::result::Result<Self, String> {
            let model_path = model_dir.join("model.onnx");
            if !model_path.exists() {
                return Err(format!("Model not found: {}", model_path.display()));
            }

            // With load-dynamic, ORT_DYLIB_PATH must point to libonnxruntime.so
            ort::init().commit();

            let session = Session::builder()
                .map_err(|e| format!("Failed to create session builder: {}", e))?
                .with_intra_threads(4)
                .map_err(|e| format!("Failed to set threads: {}", e))?
                .commit_from_file(&model_path)
                .map_err(|e| format!("Failed to load ONNX model: {}", e))?;

            let name = model_dir
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("model")
                .to_string();

            info!(
                "ONNX image embedder loaded: dim={}, model={}",
                RESNET50_DIM,
                model_path.display()
            );

            Ok(Self {
                session: Arc::new(Mutex::new(session)),
                name,
                dimension: RESNET50_DIM,
            })
        }
    }

    impl ImageEmbedder for OnnxImageEmbedder {
        fn id(&self) -> String {
            format!("onnx:{}:{}", self.name, self.dimension)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn embed_batch(&self, batch: &[Array3<f32>]) -> Result<Array2<f32>> {
            let n = batch.len();
            if n == 0 {
                return Ok(Array2::zeros((0, self.dimension)));
            }
            let (c, h, w) = batch[0].dim();

            let mut data = Vec::with_capacity(n * c * h * w);
            for tensor in batch {
                if tensor.dim() != (c, h, w) {
                    return Err(Error::Inference(format!(
                        "mixed input shapes in batch: {:?} vs {:?}",
                        tensor.dim(),
                        (c, h, w)
                    )));
                }
                data.extend(tensor.iter().copied());
            }

            let input = Tensor::from_array(([n, c, h, w], data))
                .map_err(|e| Error::Inference(format!("Failed to create input tensor: {}", e)))?;

            let mut session = self.session.lock();
            let outputs = session
                .run(ort::inputs![input])
                .map_err(|e| Error::Inference(format!("ONNX inference failed: {}", e)))?;

            // Output is [n, dim] or [n, dim, 1, 1] depending on the export.
            let (shape, values) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| Error::Inference(format!("Failed to extract output tensor: {}", e)))?;
            let dims: Vec<i64> = shape.iter().copied().collect();
            debug!("ONNX output shape {:?}", dims);

            if values.len() != n * self.dimension {
                return Err(Error::Inference(format!(
                    "unexpected output shape {:?} for batch of {} (dim={})",
                    dims, n, self.dimension
                )));
            }

            Array2::from_shape_vec((n, self.dimension), values.to_vec())
                .map_err(|e| Error::Inference(e.to_string()))
        }
    }
}

#[cfg(feature = "onnx")]
pub use inner::OnnxImageEmbedder;
