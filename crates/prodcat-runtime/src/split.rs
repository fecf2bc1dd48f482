//! Stratified train/validation split.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

/// Row indices of each partition, ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StratifiedSplit {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

/// Split rows so every class keeps the same validation ratio.
///
/// Each class's rows are shuffled with a seeded `ChaCha8Rng` and the first
/// `round(n_class * ratio)` go to validation. A class with a single row
/// stays entirely in training.
pub fn stratified_split(labels: &[u32], ratio: f64, seed: u64) -> StratifiedSplit {
    let mut by_class: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(i);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut validation = Vec::new();
    for rows in by_class.values_mut() {
        rows.shuffle(&mut rng);
        let n_valid = ((rows.len() as f64 * ratio).round() as usize).min(rows.len());
        validation.extend_from_slice(&rows[..n_valid]);
        train.extend_from_slice(&rows[n_valid..]);
    }

    train.sort_unstable();
    validation.sort_unstable();
    StratifiedSplit { train, validation }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_class_ratio() {
        // 10 rows of class 0, 5 of class 1, 1 of class 2
        let labels: Vec<u32> = std::iter::repeat(0)
            .take(10)
            .chain(std::iter::repeat(1).take(5))
            .chain(std::iter::once(2))
            .collect();
        let split = stratified_split(&labels, 0.2, 42);

        let count = |rows: &[usize], class: u32| rows.iter().filter(|&&i| labels[i] == class).count();
        assert_eq!(count(&split.validation, 0), 2);
        assert_eq!(count(&split.validation, 1), 1);
        assert_eq!(count(&split.validation, 2), 0);
        assert_eq!(split.train.len() + split.validation.len(), labels.len());
        assert!(split.train.iter().all(|i| !split.validation.contains(i)));
    }

    #[test]
    fn test_seeded() {
        let labels: Vec<u32> = (0..40).map(|i| i % 4).collect();
        assert_eq!(stratified_split(&labels, 0.2, 7), stratified_split(&labels, 0.2, 7));
    }

    #[test]
    fn test_empty() {
        let split = stratified_split(&[], 0.2, 1);
        assert!(split.train.is_empty());
        assert!(split.validation.is_empty());
    }
}
