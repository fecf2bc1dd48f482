//! Text + image feature fusion.
//!
//! Row layout: `[0, text_dim)` TF-IDF weights, `[text_dim, text_dim +
//! image_dim)` image embedding. The width is fixed by the fitted vectorizer
//! and the embedder, whatever the batch size.

use ndarray::{Array2, Array3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::embedder::ImageEmbedder;
use crate::preprocess::preprocess_image;
use crate::sparse::CsrMatrix;
use crate::tfidf::TfidfVectorizer;
use prodcat_core::{CleanedDocument, Error, Result};

/// Images per embedding call.
pub const DEFAULT_BATCH_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureLayout {
    pub text_dim: usize,
    pub image_dim: usize,
}

impl FeatureLayout {
    pub fn width(&self) -> usize {
        self.text_dim + self.image_dim
    }
}

/// Turns cleaned documents into fused sparse rows.
pub struct FeatureFuser<'a> {
    vectorizer: &'a TfidfVectorizer,
    embedder: &'a dyn ImageEmbedder,
    batch_size: usize,
}

impl<'a> FeatureFuser<'a> {
    pub fn new(vectorizer: &'a TfidfVectorizer, embedder: &'a dyn ImageEmbedder) -> Self {
        Self {
            vectorizer,
            embedder,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn layout(&self) -> FeatureLayout {
        FeatureLayout {
            text_dim: self.vectorizer.vocabulary_size(),
            image_dim: self.embedder.dimension(),
        }
    }

    /// Fuse a batch of documents, one row per document in input order.
    pub fn transform(&self, docs: &[CleanedDocument]) -> Result<CsrMatrix> {
        let layout = self.layout();

        let text_rows = docs
            .par_iter()
            .map(|d| self.vectorizer.transform(&d.text()))
            .collect::<Result<Vec<_>>>()?;
        let images = self.embed_images(docs)?;

        let mut matrix = CsrMatrix::new(layout.width());
        for (i, text) in text_rows.into_iter().enumerate() {
            let image = images
                .row(i)
                .iter()
                .enumerate()
                .map(|(j, &v)| (layout.text_dim + j, v))
                .collect::<Vec<_>>();
            matrix.push_row(text.into_iter().chain(image));
        }

        debug!(
            "Fused {} documents: width={}, nnz={}",
            docs.len(),
            matrix.n_cols(),
            matrix.nnz()
        );
        Ok(matrix)
    }

    /// Fuse a single document.
    pub fn transform_one(&self, doc: &CleanedDocument) -> Result<CsrMatrix> {
        self.transform(std::slice::from_ref(doc))
    }

    /// Embeddings for every document, in sequential batches.
    ///
    /// A document whose image cannot be decoded gets a zero row.
    fn embed_images(&self, docs: &[CleanedDocument]) -> Result<Array2<f32>> {
        let dim = self.embedder.dimension();
        let mut out = Array2::<f32>::zeros((docs.len(), dim));

        for (batch_idx, chunk) in docs.chunks(self.batch_size).enumerate() {
            let offset = batch_idx * self.batch_size;

            let tensors: Vec<Option<Array3<f32>>> = chunk
                .par_iter()
                .map(|doc| match preprocess_image(&doc.image_binary) {
                    Ok(t) => Some(t),
                    Err(e) => {
                        warn!("Unreadable image for document id={}: {}", doc.id, e);
                        None
                    }
                })
                .collect();

            let (positions, valid): (Vec<usize>, Vec<Array3<f32>>) = tensors
                .into_iter()
                .enumerate()
                .filter_map(|(i, t)| t.map(|t| (i, t)))
                .unzip();
            if valid.is_empty() {
                continue;
            }

            let embedded = self.embedder.embed_batch(&valid)?;
            if embedded.dim() != (valid.len(), dim) {
                return Err(Error::Inference(format!(
                    "embedder {} returned {:?} for a batch of {} (dim={})",
                    self.embedder.id(),
                    embedded.dim(),
                    valid.len(),
                    dim
                )));
            }
            for (k, &pos) in positions.iter().enumerate() {
                out.row_mut(offset + pos).assign(&embedded.row(k));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::{ChannelStatsEmbedder, NoopImageEmbedder};
    use crate::tfidf::TfidfParams;
    use image::{DynamicImage, Rgb, RgbImage};
    use prodcat_ingest::canonical_image_bytes;

    fn doc(id: i64, text: &str, colour: [u8; 3]) -> CleanedDocument {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb(colour)));
        CleanedDocument {
            id,
            designation: text.to_string(),
            description: String::new(),
            image_binary: canonical_image_bytes(&img).unwrap(),
            prdtypecode: None,
        }
    }

    fn vectorizer() -> TfidfVectorizer {
        let texts = vec!["chaise bois", "chaise metal", "table bois", "table metal"];
        let params = TfidfParams {
            ngram_range: (1, 1),
            ..Default::default()
        };
        TfidfVectorizer::fit(&texts, params).unwrap()
    }

    #[test]
    fn test_width_is_fixed() {
        let v = vectorizer();
        let e = NoopImageEmbedder::new(16);
        let fuser = FeatureFuser::new(&v, &e);
        assert_eq!(fuser.layout().width(), 4 + 16);

        for n in [1, 3] {
            let docs: Vec<_> = (0..n).map(|i| doc(i, "chaise bois", [0, 0, 0])).collect();
            let m = fuser.transform(&docs).unwrap();
            assert_eq!(m.n_rows(), n as usize);
            assert_eq!(m.n_cols(), 20);
        }
    }

    #[test]
    fn test_image_columns_follow_text() {
        let v = vectorizer();
        let fuser = FeatureFuser::new(&v, &ChannelStatsEmbedder).with_batch_size(2);

        let docs = vec![
            doc(1, "chaise bois", [250, 10, 10]),
            doc(2, "table", [10, 250, 10]),
            doc(3, "inconnu", [10, 10, 250]),
        ];
        let m = fuser.transform(&docs).unwrap();

        // red image: channel-0 mean high, channel-1 mean low
        let red = m.dense_row(0);
        assert!(red[4] > red[5]);
        let blue = m.dense_row(2);
        assert!(blue[6] > blue[4]);
        // no known words: no text entries
        assert!((0..4).all(|c| m.get(2, c).is_none()));
        assert!(m.get(0, v.column("chaise").unwrap()).is_some());
    }

    #[test]
    fn test_corrupt_image_gives_zero_row() {
        let v = vectorizer();
        let fuser = FeatureFuser::new(&v, &ChannelStatsEmbedder);

        let mut broken = doc(1, "chaise", [200, 200, 200]);
        broken.image_binary = vec![0xFF, 0xD8, 0x00];
        let good = doc(2, "chaise", [200, 200, 200]);

        let m = fuser.transform(&[broken, good]).unwrap();
        assert!((4..10).all(|c| m.get(0, c).is_none()));
        assert!((4..7).all(|c| m.get(1, c).is_some()));
    }
}
