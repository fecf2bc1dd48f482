//! Prodcat Ingest: text normalization, image canonicalization, raw table
//! loading and the batch cleaning driver that fills the corpus store.

pub mod imaging;
pub mod ingest;
pub mod raw;
pub mod text;

pub use imaging::{canonical_image_bytes, decode_canonical, load_image, load_image_bytes, CANONICAL_SIZE};
pub use ingest::{CleaningReport, CorpusCleaner, SplitReport};
pub use raw::RawDataset;
pub use text::{normalize, normalize_opt, normalize_value};

use image::DynamicImage;
use prodcat_core::{CleanedDocument, Result};

/// A cleaned (designation, description, image) triple, not yet keyed.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedRow {
    pub designation: String,
    pub description: String,
    pub image_binary: Vec<u8>,
}

impl CleanedRow {
    pub fn into_document(self, id: i64, prdtypecode: Option<i64>) -> CleanedDocument {
        CleanedDocument {
            id,
            designation: self.designation,
            description: self.description,
            image_binary: self.image_binary,
            prdtypecode,
        }
    }
}

/// Normalize both text fields and canonicalize the image.
///
/// Shared by the batch cleaner and the single-record inference path, so a
/// listing is cleaned identically in training and serving.
pub fn clean_row(
    designation: Option<&str>,
    description: Option<&str>,
    image: &DynamicImage,
) -> Result<CleanedRow> {
    Ok(CleanedRow {
        designation: normalize_opt(designation),
        description: normalize_opt(description),
        image_binary: canonical_image_bytes(image)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_clean_row() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(500, 120, Luma([200])));
        let row = clean_row(Some("<b>Robe</b> d&#39;&eacute;t&eacute;"), None, &img).unwrap();
        assert_eq!(row.designation, "robe d été");
        assert_eq!(row.description, "");

        let decoded = decode_canonical(&row.image_binary).unwrap();
        assert_eq!(decoded.dimensions(), (CANONICAL_SIZE, CANONICAL_SIZE));

        let doc = row.into_document(12, Some(1920));
        assert_eq!(doc.id, 12);
        assert_eq!(doc.prdtypecode, Some(1920));
    }
}
