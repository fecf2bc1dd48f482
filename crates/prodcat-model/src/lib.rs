//! Prodcat Model: label encoding and the softmax gradient-boosted tree
//! ensemble trained on fused feature vectors.
//!
//! Trees are grown depth-wise on histogram bins. Absent sparse entries are
//! treated as missing: every split learns which side they go to.

pub mod binning;
pub mod booster;
pub mod device;
pub mod label;
pub mod params;
pub mod tree;

pub use booster::{softmax, EvalRecord, GradientBooster};
pub use device::{ComputeDevice, Device};
pub use label::LabelCodec;
pub use params::BoosterParams;
pub use tree::{Node, Tree};
