//! Bijection between raw product-type codes and dense class indices.

use std::path::Path;

use serde::{Deserialize, Serialize};

use prodcat_core::{Error, Result};

/// Sorted distinct codes; a code's position is its class index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCodec {
    classes: Vec<i64>,
}

impl LabelCodec {
    pub fn fit(labels: &[i64]) -> Result<Self> {
        let mut classes = labels.to_vec();
        classes.sort_unstable();
        classes.dedup();
        if classes.is_empty() {
            return Err(Error::LabelMismatch("cannot fit a codec on no labels".into()));
        }
        Ok(Self { classes })
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    pub fn encode(&self, code: i64) -> Result<u32> {
        self.classes
            .binary_search(&code)
            .map(|i| i as u32)
            .map_err(|_| Error::LabelMismatch(format!("unseen label code {}", code)))
    }

    pub fn encode_all(&self, codes: &[i64]) -> Result<Vec<u32>> {
        codes.iter().map(|&c| self.encode(c)).collect()
    }

    pub fn decode(&self, index: u32) -> Result<i64> {
        self.classes.get(index as usize).copied().ok_or_else(|| {
            Error::LabelMismatch(format!(
                "class index {} outside 0..{}",
                index,
                self.classes.len()
            ))
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let codec: Self = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        if codec.classes.is_empty() || codec.classes.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::LabelMismatch(format!(
                "{}: classes must be non-empty, sorted and distinct",
                path.display()
            )));
        }
        Ok(codec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fit_sorted_dense() {
        let codec = LabelCodec::fit(&[2583, 10, 1280, 10, 2583]).unwrap();
        assert_eq!(codec.classes(), &[10, 1280, 2583]);
        assert_eq!(codec.encode(10).unwrap(), 0);
        assert_eq!(codec.encode(2583).unwrap(), 2);
        assert_eq!(codec.encode_all(&[1280, 10]).unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_decode_inverts_encode() {
        let codec = LabelCodec::fit(&[40, 60, 50]).unwrap();
        for &code in codec.classes() {
            assert_eq!(codec.decode(codec.encode(code).unwrap()).unwrap(), code);
        }
    }

    #[test]
    fn test_mismatches() {
        let codec = LabelCodec::fit(&[40, 60]).unwrap();
        assert!(matches!(codec.encode(9999), Err(Error::LabelMismatch(_))));
        assert!(matches!(codec.decode(2), Err(Error::LabelMismatch(_))));
        assert!(LabelCodec::fit(&[]).is_err());
    }

    #[test]
    fn test_save_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("labels.json");
        let codec = LabelCodec::fit(&[10, 2905]).unwrap();
        codec.save(&path).unwrap();
        assert_eq!(LabelCodec::load(&path).unwrap(), codec);

        std::fs::write(&path, r#"{"classes":[5,5]}"#).unwrap();
        assert!(LabelCodec::load(&path).is_err());
    }
}
