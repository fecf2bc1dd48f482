//! Regression trees and depth-wise histogram growth.

use std::collections::BTreeSet;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::binning::BinnedMatrix;
use crate::params::BoosterParams;

const NONE: u32 = u32::MAX;
const MIN_SPLIT_GAIN: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    /// `value < threshold` goes left; a missing value follows `default_left`.
    Split {
        feature: u32,
        threshold: f32,
        default_left: bool,
        left: u32,
        right: u32,
    },
    Leaf {
        value: f32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn leaf(value: f32) -> Self {
        Self {
            nodes: vec![Node::Leaf { value }],
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    /// Output for one sparse row (`cols` ascending).
    pub fn predict_row(&self, cols: &[u32], vals: &[f32]) -> f32 {
        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    default_left,
                    left,
                    right,
                } => {
                    let go_left = match cols.binary_search(feature) {
                        Ok(k) => vals[k] < *threshold,
                        Err(_) => *default_left,
                    };
                    idx = if go_left { *left } else { *right } as usize;
                }
            }
        }
    }

    /// Every child index in range and greater than its parent's, so walking
    /// from the root always reaches a leaf. Leaf values are finite.
    pub fn is_well_formed(&self) -> bool {
        let n = self.nodes.len();
        !self.nodes.is_empty()
            && self.nodes.iter().enumerate().all(|(i, node)| match node {
                Node::Split { left, right, .. } => [*left, *right]
                    .iter()
                    .all(|&child| (child as usize) > i && (child as usize) < n),
                Node::Leaf { value } => value.is_finite(),
            })
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    gain: f64,
    feature: usize,
    bin: usize,
    threshold: f32,
    default_left: bool,
    left: (f64, f64),
    right: (f64, f64),
}

#[derive(Debug, Clone, Copy)]
struct Open {
    node: usize,
    sum: (f64, f64),
}

/// Grows one tree on binned data.
pub struct TreeGrower<'a> {
    binned: &'a BinnedMatrix,
    features: &'a [usize],
    params: &'a BoosterParams,
}

impl<'a> TreeGrower<'a> {
    /// `features` are the columns this tree may split on.
    pub fn new(binned: &'a BinnedMatrix, features: &'a [usize], params: &'a BoosterParams) -> Self {
        Self {
            binned,
            features,
            params,
        }
    }

    /// Fit a tree to gradients over the sampled `rows`.
    ///
    /// Leaf values are already scaled by the learning rate.
    pub fn grow(&self, grad: &[f32], hess: &[f32], rows: &[u32]) -> Tree {
        let mut position = vec![NONE; self.binned.n_rows];
        let mut root_sum = (0.0f64, 0.0f64);
        for &r in rows {
            position[r as usize] = 0;
            root_sum.0 += f64::from(grad[r as usize]);
            root_sum.1 += f64::from(hess[r as usize]);
        }

        let mut nodes = vec![Node::Leaf { value: 0.0 }];
        let mut frontier = vec![Open { node: 0, sum: root_sum }];

        for _depth in 0..self.params.max_depth {
            if frontier.is_empty() {
                break;
            }
            let best = self.best_splits(&frontier, &position, grad, hess);

            let mut next = Vec::new();
            // child frontier indices (left, right) per split node
            let mut children: Vec<Option<(u32, u32)>> = vec![None; frontier.len()];
            for (p, open) in frontier.iter().enumerate() {
                match best[p] {
                    Some(c) => {
                        let left = nodes.len();
                        nodes.push(Node::Leaf { value: 0.0 });
                        nodes.push(Node::Leaf { value: 0.0 });
                        nodes[open.node] = Node::Split {
                            feature: c.feature as u32,
                            threshold: c.threshold,
                            default_left: c.default_left,
                            left: left as u32,
                            right: left as u32 + 1,
                        };
                        children[p] = Some((next.len() as u32, next.len() as u32 + 1));
                        next.push(Open { node: left, sum: c.left });
                        next.push(Open { node: left + 1, sum: c.right });
                    }
                    None => nodes[open.node] = self.leaf(open.sum),
                }
            }

            if next.is_empty() {
                frontier.clear();
                break;
            }
            position = self.reassign(&position, rows, &best, &children);
            frontier = next;
        }

        for open in &frontier {
            nodes[open.node] = self.leaf(open.sum);
        }
        Tree { nodes }
    }

    fn leaf(&self, (g, h): (f64, f64)) -> Node {
        let weight = -g / (h + f64::from(self.params.lambda));
        Node::Leaf {
            value: (weight * f64::from(self.params.eta)) as f32,
        }
    }

    fn gain_term(&self, (g, h): (f64, f64)) -> f64 {
        g * g / (h + f64::from(self.params.lambda))
    }

    /// Best split per frontier node, searched over features in parallel.
    fn best_splits(
        &self,
        frontier: &[Open],
        position: &[u32],
        grad: &[f32],
        hess: &[f32],
    ) -> Vec<Option<Candidate>> {
        let per_feature: Vec<Vec<Option<Candidate>>> = self
            .features
            .par_iter()
            .map(|&f| self.best_for_feature(f, frontier, position, grad, hess))
            .collect();

        (0..frontier.len())
            .map(|p| {
                per_feature
                    .iter()
                    .filter_map(|cands| cands[p])
                    .fold(None, |best: Option<Candidate>, c| match best {
                        Some(b) if b.gain > c.gain || (b.gain == c.gain && b.feature < c.feature) => Some(b),
                        _ => Some(c),
                    })
            })
            .collect()
    }

    fn best_for_feature(
        &self,
        feature: usize,
        frontier: &[Open],
        position: &[u32],
        grad: &[f32],
        hess: &[f32],
    ) -> Vec<Option<Candidate>> {
        let cuts = self.binned.cuts.cuts(feature);
        let n_bins = cuts.len() + 1;
        let mut hist = vec![(0.0f64, 0.0f64); frontier.len() * n_bins];

        for &(row, bin) in &self.binned.columns[feature] {
            let p = position[row as usize];
            if p == NONE {
                continue;
            }
            let slot = &mut hist[p as usize * n_bins + bin as usize];
            slot.0 += f64::from(grad[row as usize]);
            slot.1 += f64::from(hess[row as usize]);
        }

        let min_child = f64::from(self.params.min_child_weight);
        let gamma = f64::from(self.params.gamma);

        frontier
            .iter()
            .enumerate()
            .map(|(p, open)| {
                let total = open.sum;
                if total.1 < 2.0 * min_child || cuts.is_empty() {
                    return None;
                }
                let bins = &hist[p * n_bins..(p + 1) * n_bins];
                let present = bins
                    .iter()
                    .fold((0.0, 0.0), |acc, b| (acc.0 + b.0, acc.1 + b.1));
                let missing = (total.0 - present.0, total.1 - present.1);
                let parent = self.gain_term(total);

                let mut best: Option<Candidate> = None;
                let mut acc = (0.0f64, 0.0f64);
                for (j, b) in bins[..n_bins - 1].iter().enumerate() {
                    acc.0 += b.0;
                    acc.1 += b.1;
                    for default_left in [true, false] {
                        let left = if default_left {
                            (acc.0 + missing.0, acc.1 + missing.1)
                        } else {
                            acc
                        };
                        let right = (total.0 - left.0, total.1 - left.1);
                        if left.1 < min_child.max(1e-12) || right.1 < min_child.max(1e-12) {
                            continue;
                        }
                        let gain = 0.5 * (self.gain_term(left) + self.gain_term(right) - parent) - gamma;
                        if gain > MIN_SPLIT_GAIN && best.map_or(true, |b| gain > b.gain) {
                            best = Some(Candidate {
                                gain,
                                feature,
                                bin: j,
                                threshold: cuts[j],
                                default_left,
                                left,
                                right,
                            });
                        }
                    }
                }
                best
            })
            .collect()
    }

    /// Route sampled rows of split nodes to their children.
    fn reassign(
        &self,
        position: &[u32],
        rows: &[u32],
        best: &[Option<Candidate>],
        children: &[Option<(u32, u32)>],
    ) -> Vec<u32> {
        let mut next = vec![NONE; position.len()];
        for &r in rows {
            let p = position[r as usize];
            if p == NONE {
                continue;
            }
            if let (Some(c), Some((l, rt))) = (best[p as usize], children[p as usize]) {
                next[r as usize] = if c.default_left { l } else { rt };
            }
        }

        let split_features: BTreeSet<usize> = best.iter().flatten().map(|c| c.feature).collect();
        for f in split_features {
            for &(row, bin) in &self.binned.columns[f] {
                let p = position[row as usize];
                if p == NONE {
                    continue;
                }
                if let (Some(c), Some((l, rt))) = (best[p as usize], children[p as usize]) {
                    if c.feature == f {
                        next[row as usize] = if (bin as usize) <= c.bin { l } else { rt };
                    }
                }
            }
        }
        next
    }
}
