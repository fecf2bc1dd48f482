//! Histogram bins for split finding.
//!
//! Cut points come from each feature's stored (nonzero) values: the
//! minimum, then midpoints between distinct values, or quantiles when there
//! are more distinct values than bins. A value's bin is the number of cuts
//! at or below it, so a split after bin `j` sends `v < cuts[j]` left, which
//! is the same test the fitted tree applies to raw values. Bin 0 never holds
//! a stored value; splitting after it separates missing from present.

use rayon::prelude::*;

use prodcat_infer::CsrMatrix;

/// Per-feature cut points.
#[derive(Debug, Clone)]
pub struct FeatureCuts {
    cuts: Vec<Vec<f32>>,
}

/// Column-major, binned copy of a sparse matrix.
///
/// Only stored entries appear; absent entries are missing values.
#[derive(Debug)]
pub struct BinnedMatrix {
    pub cuts: FeatureCuts,
    /// For each feature, `(row, bin)` of its stored entries, ascending by row.
    pub columns: Vec<Vec<(u32, u16)>>,
    pub n_rows: usize,
}

impl FeatureCuts {
    pub fn n_features(&self) -> usize {
        self.cuts.len()
    }

    pub fn cuts(&self, feature: usize) -> &[f32] {
        &self.cuts[feature]
    }

    /// Number of bins of `feature` (cuts + 1).
    pub fn n_bins(&self, feature: usize) -> usize {
        self.cuts[feature].len() + 1
    }

    pub fn bin(&self, feature: usize, value: f32) -> usize {
        self.cuts[feature].partition_point(|&c| c <= value)
    }
}

impl BinnedMatrix {
    pub fn build(x: &CsrMatrix, max_bin: usize) -> Self {
        let n_features = x.n_cols();
        let mut values: Vec<Vec<(u32, f32)>> = vec![Vec::new(); n_features];
        for i in 0..x.n_rows() {
            let (cols, vals) = x.row(i);
            for (&c, &v) in cols.iter().zip(vals) {
                if v.is_finite() {
                    values[c as usize].push((i as u32, v));
                }
            }
        }

        let per_feature: Vec<(Vec<f32>, Vec<(u32, u16)>)> = values
            .into_par_iter()
            .map(|column| {
                let cuts = feature_cuts(column.iter().map(|&(_, v)| v).collect(), max_bin);
                let binned = column
                    .iter()
                    .map(|&(row, v)| (row, cuts.partition_point(|&c| c <= v) as u16))
                    .collect();
                (cuts, binned)
            })
            .collect();

        let (cuts, columns) = per_feature.into_iter().unzip();
        Self {
            cuts: FeatureCuts { cuts },
            columns,
            n_rows: x.n_rows(),
        }
    }
}

fn feature_cuts(mut values: Vec<f32>, max_bin: usize) -> Vec<f32> {
    values.sort_unstable_by(f32::total_cmp);
    values.dedup();
    let Some(&min) = values.first() else {
        return Vec::new();
    };

    if values.len() < max_bin {
        let mut cuts = Vec::with_capacity(values.len());
        cuts.push(min);
        cuts.extend(values.windows(2).map(|w| w[0] + (w[1] - w[0]) / 2.0));
        return cuts;
    }

    // Quantile cuts over distinct values; cut k is the first value of bin k+1.
    let n = values.len();
    let mut cuts: Vec<f32> = (0..max_bin).map(|k| values[k * n / max_bin]).collect();
    cuts.dedup();
    cuts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midpoint_cuts() {
        assert_eq!(feature_cuts(vec![3.0, 1.0, 1.0, 2.0], 256), vec![1.0, 1.5, 2.5]);
        assert_eq!(feature_cuts(vec![4.0, 4.0], 256), vec![4.0]);
        assert!(feature_cuts(Vec::new(), 256).is_empty());
    }

    #[test]
    fn test_quantile_cuts_bounded() {
        let values: Vec<f32> = (0..1000).map(|i| i as f32).collect();
        let cuts = feature_cuts(values, 16);
        assert_eq!(cuts.len(), 16);
        assert_eq!(cuts[0], 0.0);
        assert!(cuts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_binned_matrix() {
        let mut x = CsrMatrix::new(2);
        x.push_row(vec![(0, 1.0)]);
        x.push_row(vec![(0, 3.0), (1, 5.0)]);
        x.push_row(vec![]);

        let b = BinnedMatrix::build(&x, 256);
        assert_eq!(b.n_rows, 3);
        assert_eq!(b.columns[0], vec![(0, 1), (1, 2)]);
        assert_eq!(b.columns[1], vec![(1, 1)]);
        assert_eq!(b.cuts.cuts(0), &[1.0, 2.0]);
        assert_eq!(b.cuts.n_bins(0), 3);
        assert_eq!(b.cuts.bin(0, 2.0), 2);
        assert_eq!(b.cuts.bin(0, 1.9), 1);
    }
}
