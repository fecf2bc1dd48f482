//! Softmax gradient boosting over fused sparse features.
//!
//! One tree per class per round. Class margins start at zero and each
//! round adds the output of that round's trees; probabilities are the
//! softmax of the margins.

use std::path::Path;

use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::binning::BinnedMatrix;
use crate::params::BoosterParams;
use crate::tree::{Tree, TreeGrower};
use prodcat_core::{Error, Result};
use prodcat_infer::CsrMatrix;

const MIN_HESSIAN: f32 = 1e-6;
const LOG_EPS: f64 = 1e-15;

/// Multi-class log-loss and error rate after one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRecord {
    pub round: usize,
    pub train_mlogloss: f64,
    pub train_merror: f64,
    pub valid_mlogloss: Option<f64>,
    pub valid_merror: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBooster {
    num_class: usize,
    num_features: usize,
    params: BoosterParams,
    /// `rounds[r][k]` is the tree of class `k` in round `r`.
    rounds: Vec<Vec<Tree>>,
}

/// Numerically stable softmax.
pub fn softmax(margins: &[f32]) -> Vec<f32> {
    let max = margins.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = margins.iter().map(|&m| (m - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) })
        .0
}

impl GradientBooster {
    /// Train on `x` with dense class labels in `0..num_class`.
    ///
    /// When `eval` is given, its log-loss and error are recorded every round.
    pub fn fit(
        x: &CsrMatrix,
        labels: &[u32],
        num_class: usize,
        params: &BoosterParams,
        eval: Option<(&CsrMatrix, &[u32])>,
    ) -> Result<(Self, Vec<EvalRecord>)> {
        params.validate()?;
        check_inputs(x, labels, num_class, "training")?;
        if let Some((ex, ey)) = eval {
            if ex.n_rows() > 0 {
                check_inputs(ex, ey, num_class, "evaluation")?;
            }
            if ex.n_cols() != x.n_cols() {
                return Err(Error::Inference(format!(
                    "evaluation width {} differs from training width {}",
                    ex.n_cols(),
                    x.n_cols()
                )));
            }
        }

        let n = x.n_rows();
        let k_count = num_class;
        let binned = BinnedMatrix::build(x, params.max_bin);
        let n_features = x.n_cols();
        let n_sampled_features = ((n_features as f32 * params.colsample_bytree).round() as usize).clamp(1, n_features.max(1));
        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);

        info!(
            "Boosting: rows={}, features={}, classes={}, rounds={}, depth={}",
            n, n_features, num_class, params.num_rounds, params.max_depth
        );

        let mut model = Self {
            num_class,
            num_features: n_features,
            params: params.clone(),
            rounds: Vec::with_capacity(params.num_rounds),
        };
        let mut margins = vec![0.0f32; n * k_count];
        let mut eval_margins = eval.map(|(ex, _)| vec![0.0f32; ex.n_rows() * k_count]);
        let mut history = Vec::with_capacity(params.num_rounds);

        for round in 0..params.num_rounds {
            let mut rows: Vec<u32> = (0..n as u32)
                .filter(|_| rng.gen::<f32>() < params.subsample)
                .collect();
            if rows.is_empty() {
                rows = (0..n as u32).collect();
            }

            let probs: Vec<f32> = margins.par_chunks(k_count).flat_map_iter(softmax).collect();

            let mut trees = Vec::with_capacity(k_count);
            for k in 0..k_count {
                let (grad, hess): (Vec<f32>, Vec<f32>) = (0..n)
                    .map(|i| {
                        let p = probs[i * k_count + k];
                        let y = if labels[i] as usize == k { 1.0 } else { 0.0 };
                        (p - y, (2.0 * p * (1.0 - p)).max(MIN_HESSIAN))
                    })
                    .unzip();

                let mut features = if n_features == 0 {
                    Vec::new()
                } else {
                    sample(&mut rng, n_features, n_sampled_features).into_vec()
                };
                features.sort_unstable();

                let tree = TreeGrower::new(&binned, &features, params).grow(&grad, &hess, &rows);
                add_tree_output(&mut margins, x, &tree, k, k_count);
                if let (Some(m), Some((ex, _))) = (eval_margins.as_mut(), eval) {
                    add_tree_output(m, ex, &tree, k, k_count);
                }
                trees.push(tree);
            }
            model.rounds.push(trees);

            let (train_mlogloss, train_merror) = evaluate(&margins, labels, k_count);
            let (valid_mlogloss, valid_merror) = match (&eval_margins, eval) {
                (Some(m), Some((_, ey))) if !ey.is_empty() => {
                    let (l, e) = evaluate(m, ey, k_count);
                    (Some(l), Some(e))
                }
                _ => (None, None),
            };
            let record = EvalRecord {
                round,
                train_mlogloss,
                train_merror,
                valid_mlogloss,
                valid_merror,
            };
            debug!("Round {}: {:?}", round, record);
            if round % 10 == 0 || round + 1 == params.num_rounds {
                info!(
                    "[{}] train-mlogloss={:.5} train-merror={:.5} valid-mlogloss={} valid-merror={}",
                    round,
                    train_mlogloss,
                    train_merror,
                    fmt_metric(valid_mlogloss),
                    fmt_metric(valid_merror)
                );
            }
            history.push(record);
        }

        Ok((model, history))
    }

    pub fn num_class(&self) -> usize {
        self.num_class
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn num_rounds(&self) -> usize {
        self.rounds.len()
    }

    /// Class probabilities, one vector of `num_class` per row.
    pub fn predict_proba(&self, x: &CsrMatrix) -> Result<Vec<Vec<f32>>> {
        if x.n_cols() != self.num_features {
            return Err(Error::Inference(format!(
                "input width {} but model expects {}",
                x.n_cols(),
                self.num_features
            )));
        }
        Ok((0..x.n_rows())
            .into_par_iter()
            .map(|i| {
                let (cols, vals) = x.row(i);
                let mut margins = vec![0.0f32; self.num_class];
                for trees in &self.rounds {
                    for (k, tree) in trees.iter().enumerate() {
                        margins[k] += tree.predict_row(cols, vals);
                    }
                }
                softmax(&margins)
            })
            .collect())
    }

    /// Most probable class per row.
    pub fn predict(&self, x: &CsrMatrix) -> Result<Vec<u32>> {
        Ok(self
            .predict_proba(x)?
            .iter()
            .map(|p| argmax(p) as u32)
            .collect())
    }

    /// Every round has one well-formed tree per class.
    pub fn is_consistent(&self) -> bool {
        self.num_class > 0
            && self
                .rounds
                .iter()
                .all(|r| r.len() == self.num_class && r.iter().all(Tree::is_well_formed))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let model: Self = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        if !model.is_consistent() {
            return Err(Error::Inference(format!("{}: malformed tree ensemble", path.display())));
        }
        Ok(model)
    }
}

fn check_inputs(x: &CsrMatrix, labels: &[u32], num_class: usize, what: &str) -> Result<()> {
    if num_class == 0 {
        return Err(Error::Inference("num_class must be positive".into()));
    }
    if x.n_rows() == 0 {
        return Err(Error::Inference(format!("no {} rows", what)));
    }
    if x.n_rows() != labels.len() {
        return Err(Error::Inference(format!(
            "{} rows ({}) and labels ({}) differ",
            what,
            x.n_rows(),
            labels.len()
        )));
    }
    if let Some(&bad) = labels.iter().find(|&&l| l as usize >= num_class) {
        return Err(Error::LabelMismatch(format!(
            "{} label {} outside 0..{}",
            what, bad, num_class
        )));
    }
    Ok(())
}

fn add_tree_output(margins: &mut [f32], x: &CsrMatrix, tree: &Tree, k: usize, k_count: usize) {
    margins
        .par_chunks_mut(k_count)
        .enumerate()
        .for_each(|(i, m)| {
            let (cols, vals) = x.row(i);
            m[k] += tree.predict_row(cols, vals);
        });
}

fn evaluate(margins: &[f32], labels: &[u32], k_count: usize) -> (f64, f64) {
    let (loss, errors) = margins
        .par_chunks(k_count)
        .zip(labels.par_iter())
        .map(|(m, &y)| {
            let p = softmax(m);
            let loss = -f64::from(p[y as usize]).max(LOG_EPS).ln();
            let wrong = if argmax(&p) == y as usize { 0.0 } else { 1.0 };
            (loss, wrong)
        })
        .reduce(|| (0.0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1));
    let n = labels.len().max(1) as f64;
    (loss / n, errors / n)
}

fn fmt_metric(v: Option<f64>) -> String {
    v.map(|v| format!("{:.5}", v)).unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Three classes, each marked by its own feature.
    fn separable(n_per_class: usize) -> (CsrMatrix, Vec<u32>) {
        let mut x = CsrMatrix::new(4);
        let mut y = Vec::new();
        for i in 0..n_per_class {
            let noise = 0.1 + i as f32 * 0.01;
            x.push_row(vec![(0, 1.0), (3, noise)]);
            y.push(0);
            x.push_row(vec![(1, 1.0), (3, noise)]);
            y.push(1);
            x.push_row(vec![(2, 1.0), (3, noise)]);
            y.push(2);
        }
        (x, y)
    }

    fn quick_params() -> BoosterParams {
        BoosterParams {
            num_rounds: 20,
            eta: 0.3,
            max_depth: 3,
            subsample: 1.0,
            colsample_bytree: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_softmax() {
        let p = softmax(&[0.0, 0.0]);
        assert!((p[0] - 0.5).abs() < 1e-6);
        let p = softmax(&[1000.0, 0.0, -1000.0]);
        assert!((p[0] - 1.0).abs() < 1e-6);
        assert!((p.iter().sum::<f32>() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_fits_separable_classes() {
        let (x, y) = separable(10);
        let (model, history) = GradientBooster::fit(&x, &y, 3, &quick_params(), Some((&x, y.as_slice()))).unwrap();

        assert_eq!(model.num_rounds(), 20);
        assert_eq!(model.predict(&x).unwrap(), y);
        assert_eq!(history.len(), 20);
        assert!(history[19].train_mlogloss < history[0].train_mlogloss);
        assert_eq!(history[19].valid_merror, Some(0.0));

        for p in model.predict_proba(&x).unwrap() {
            assert!((p.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_subsampling_is_seeded() {
        let (x, y) = separable(10);
        let params = BoosterParams {
            num_rounds: 5,
            subsample: 0.8,
            colsample_bytree: 0.8,
            ..Default::default()
        };
        let (a, _) = GradientBooster::fit(&x, &y, 3, &params, None).unwrap();
        let (b, _) = GradientBooster::fit(&x, &y, 3, &params, None).unwrap();
        assert_eq!(a.predict_proba(&x).unwrap(), b.predict_proba(&x).unwrap());
    }

    #[test]
    fn test_rejects_bad_input() {
        let (x, y) = separable(2);
        assert!(GradientBooster::fit(&x, &y[..3], 3, &quick_params(), None).is_err());
        assert!(matches!(
            GradientBooster::fit(&x, &y, 2, &quick_params(), None),
            Err(Error::LabelMismatch(_))
        ));

        let (model, _) = GradientBooster::fit(&x, &y, 3, &quick_params(), None).unwrap();
        let narrow = CsrMatrix::new(2);
        assert!(model.predict_proba(&narrow).is_err());
    }

    #[test]
    fn test_save_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        let (x, y) = separable(5);
        let (model, _) = GradientBooster::fit(&x, &y, 3, &quick_params(), None).unwrap();
        model.save(&path).unwrap();

        let loaded = GradientBooster::load(&path).unwrap();
        assert_eq!(loaded.predict_proba(&x).unwrap(), model.predict_proba(&x).unwrap());

        std::fs::write(&path, r#"{"num_class":2,"num_features":1,"params":{},"rounds":[[{"nodes":[{"kind":"leaf","value":0.0}]}]]}"#).unwrap();
        assert!(GradientBooster::load(&path).is_err());
    }
}
