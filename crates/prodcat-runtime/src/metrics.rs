//! Classification metrics on the validation partition.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use prodcat_core::category_or_default;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub code: i64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub accuracy: f64,
    /// F1 averaged over classes, weighted by support.
    pub f1_weighted: f64,
    pub samples: usize,
    pub per_class: Vec<ClassMetrics>,
}

#[derive(Default)]
struct Counts {
    tp: usize,
    fp: usize,
    fn_: usize,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Compare true and predicted category codes row by row.
///
/// An empty input yields zero accuracy and F1.
pub fn evaluate(truth: &[i64], predicted: &[i64]) -> EvaluationMetrics {
    let n = truth.len().min(predicted.len());
    if n == 0 {
        warn!("Empty evaluation set, reporting zero accuracy and F1");
        return EvaluationMetrics {
            accuracy: 0.0,
            f1_weighted: 0.0,
            samples: 0,
            per_class: Vec::new(),
        };
    }

    let mut counts: BTreeMap<i64, Counts> = BTreeMap::new();
    let mut correct = 0;
    for (&t, &p) in truth.iter().zip(predicted).take(n) {
        if t == p {
            correct += 1;
            counts.entry(t).or_default().tp += 1;
        } else {
            counts.entry(t).or_default().fn_ += 1;
            counts.entry(p).or_default().fp += 1;
        }
    }

    let per_class: Vec<ClassMetrics> = counts
        .into_iter()
        .map(|(code, c)| {
            let precision = ratio(c.tp, c.tp + c.fp);
            let recall = ratio(c.tp, c.tp + c.fn_);
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            ClassMetrics {
                code,
                precision,
                recall,
                f1,
                support: c.tp + c.fn_,
            }
        })
        .collect();

    let f1_weighted = per_class.iter().map(|c| c.f1 * c.support as f64).sum::<f64>() / n as f64;

    EvaluationMetrics {
        accuracy: ratio(correct, n),
        f1_weighted,
        samples: n,
        per_class,
    }
}

impl std::fmt::Display for EvaluationMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{:>6}  {:>9}  {:>6}  {:>6}  {:>7}  category", "code", "precision", "recall", "f1", "support")?;
        for c in &self.per_class {
            writeln!(
                f,
                "{:>6}  {:>9.3}  {:>6.3}  {:>6.3}  {:>7}  {}",
                c.code,
                c.precision,
                c.recall,
                c.f1,
                c.support,
                category_or_default(c.code)
            )?;
        }
        write!(
            f,
            "accuracy={:.4} weighted-f1={:.4} samples={}",
            self.accuracy, self.f1_weighted, self.samples
        )
    }
}
