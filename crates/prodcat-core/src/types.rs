//! Shared data types for the classification pipeline.

use serde::{Deserialize, Serialize};

/// Which half of the catalog a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Test,
}

impl Split {
    pub const ALL: [Split; 2] = [Split::Train, Split::Test];

    /// Corpus collection holding the cleaned documents of this split.
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Train => "X_train_cleaned",
            Self::Test => "X_test_cleaned",
        }
    }

    /// Sub-directory of the image root holding this split's images.
    pub fn image_dir(&self) -> &'static str {
        match self {
            Self::Train => "image_train",
            Self::Test => "image_test",
        }
    }

    /// Raw feature table file name.
    pub fn features_file(&self) -> &'static str {
        match self {
            Self::Train => "X_train_update.csv",
            Self::Test => "X_test_update.csv",
        }
    }

    /// Raw label table, present only for the training split.
    pub fn labels_file(&self) -> Option<&'static str> {
        match self {
            Self::Train => Some("Y_train_CVw08PX.csv"),
            Self::Test => None,
        }
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Train => write!(f, "train"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// One row of the raw catalog tables, label joined in for training rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: i64,
    pub designation: Option<String>,
    pub description: Option<String>,
    pub imageid: i64,
    pub productid: i64,
    pub prdtypecode: Option<i64>,
}

impl RawRecord {
    /// File name of the product image, relative to the split's image dir.
    pub fn image_file_name(&self) -> String {
        format!("image_{}_product_{}.jpg", self.imageid, self.productid)
    }
}

/// A normalized row ready for featurization.
///
/// `image_binary` is always a 224x224 RGB JPEG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedDocument {
    pub id: i64,
    pub designation: String,
    pub description: String,
    #[serde(skip)]
    pub image_binary: Vec<u8>,
    pub prdtypecode: Option<i64>,
}

impl CleanedDocument {
    /// Text fed to the vectorizer: designation and description joined by a space.
    pub fn text(&self) -> String {
        format!("{} {}", self.designation, self.description)
    }
}
