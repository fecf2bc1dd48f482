//! TF-IDF text vectorizer.
//!
//! Fitted once on the training corpus, then applied unchanged at serving
//! time. Columns are the retained n-grams in lexicographic order.

use std::collections::HashMap;
use std::path::Path;

use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use prodcat_core::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TfidfParams {
    /// Keep at most this many terms, the most frequent first.
    pub max_features: usize,
    /// Inclusive n-gram range over tokens.
    pub ngram_range: (usize, usize),
    /// Use `1 + ln(tf)` instead of raw counts.
    pub sublinear_tf: bool,
    /// Drop terms appearing in fewer documents than this.
    pub min_df: usize,
    pub token_pattern: String,
}

impl Default for TfidfParams {
    fn default() -> Self {
        Self {
            max_features: 20000,
            ngram_range: (1, 2),
            sublinear_tf: true,
            min_df: 2,
            token_pattern: r"(?u)\b\w\w+\b".to_string(),
        }
    }
}

/// A fitted TF-IDF vectorizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    params: TfidfParams,
    /// Retained terms, sorted; a term's position is its column.
    terms: Vec<String>,
    idf: Vec<f32>,
    n_documents: usize,
    #[serde(skip)]
    token_re: Option<Regex>,
}

impl TfidfVectorizer {
    /// Learn vocabulary and inverse document frequencies from `texts`.
    pub fn fit<S: AsRef<str> + Sync>(texts: &[S], params: TfidfParams) -> Result<Self> {
        validate(&params)?;
        let token_re = compile(&params.token_pattern)?;

        let per_doc: Vec<HashMap<String, u32>> = texts
            .par_iter()
            .map(|t| count_terms(&token_re, t.as_ref(), params.ngram_range))
            .collect();

        let mut df: HashMap<&str, usize> = HashMap::new();
        let mut total: HashMap<&str, u64> = HashMap::new();
        for counts in &per_doc {
            for (term, &c) in counts {
                *df.entry(term.as_str()).or_default() += 1;
                *total.entry(term.as_str()).or_default() += u64::from(c);
            }
        }

        let mut kept: Vec<(&str, u64)> = total
            .into_iter()
            .filter(|(term, _)| df.get(term).copied().unwrap_or(0) >= params.min_df)
            .collect();
        if kept.len() > params.max_features {
            kept.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
            kept.truncate(params.max_features);
        }

        let mut terms: Vec<String> = kept.into_iter().map(|(t, _)| t.to_string()).collect();
        terms.sort();

        if terms.is_empty() {
            return Err(Error::Feature(format!(
                "empty vocabulary after pruning {} documents (min_df={})",
                texts.len(),
                params.min_df
            )));
        }

        let n = texts.len() as f64;
        let idf = terms
            .iter()
            .map(|t| {
                let d = df.get(t.as_str()).copied().unwrap_or(0) as f64;
                (((1.0 + n) / (1.0 + d)).ln() + 1.0) as f32
            })
            .collect();

        info!(
            "TF-IDF fitted: {} documents, {} terms kept of {} seen",
            texts.len(),
            terms.len(),
            df.len()
        );

        Ok(Self {
            params,
            terms,
            idf,
            n_documents: texts.len(),
            token_re: Some(token_re),
        })
    }

    pub fn vocabulary_size(&self) -> usize {
        self.terms.len()
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn params(&self) -> &TfidfParams {
        &self.params
    }

    /// Column of `term`, if it is in the vocabulary.
    pub fn column(&self, term: &str) -> Option<usize> {
        self.terms.binary_search_by(|t| t.as_str().cmp(term)).ok()
    }

    pub fn idf(&self, term: &str) -> Option<f32> {
        self.column(term).map(|c| self.idf[c])
    }

    /// Sparse L2-normalized TF-IDF row, ascending by column.
    pub fn transform(&self, text: &str) -> Result<Vec<(usize, f32)>> {
        let token_re = match &self.token_re {
            Some(re) => re,
            None => return Err(Error::Feature("vectorizer not initialized".into())),
        };
        let counts = count_terms(token_re, text, self.params.ngram_range);

        let mut row: Vec<(usize, f32)> = counts
            .into_iter()
            .filter_map(|(term, c)| {
                let col = self.column(&term)?;
                let tf = if self.params.sublinear_tf {
                    1.0 + (c as f32).ln()
                } else {
                    c as f32
                };
                Some((col, tf * self.idf[col]))
            })
            .collect();
        row.sort_unstable_by_key(|&(c, _)| c);

        let norm = row.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
        if norm > 0.0 {
            for (_, w) in &mut row {
                *w /= norm;
            }
        }
        Ok(row)
    }

    /// SHA-256 over the vocabulary and idf weights.
    ///
    /// A model records the fingerprint of the vectorizer it was trained on.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (term, idf) in self.terms.iter().zip(&self.idf) {
            hasher.update(term.as_bytes());
            hasher.update([0u8]);
            hasher.update(idf.to_le_bytes());
        }
        hex::encode(hasher.finalize())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        debug!("Saved TF-IDF vectorizer to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let mut vectorizer: Self = serde_json::from_str(&json)?;
        if vectorizer.terms.len() != vectorizer.idf.len() {
            return Err(Error::Feature(format!(
                "{}: {} terms but {} idf weights",
                path.display(),
                vectorizer.terms.len(),
                vectorizer.idf.len()
            )));
        }
        vectorizer.token_re = Some(compile(&vectorizer.params.token_pattern)?);
        Ok(vectorizer)
    }
}

fn validate(params: &TfidfParams) -> Result<()> {
    let (lo, hi) = params.ngram_range;
    if lo == 0 || lo > hi {
        return Err(Error::Config(format!("invalid ngram_range ({}, {})", lo, hi)));
    }
    if params.max_features == 0 {
        return Err(Error::Config("max_features must be positive".into()));
    }
    Ok(())
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::Config(format!("invalid token pattern: {}", e)))
}

fn count_terms(token_re: &Regex, text: &str, (lo, hi): (usize, usize)) -> HashMap<String, u32> {
    let lowered = text.to_lowercase();
    let tokens: Vec<&str> = token_re.find_iter(&lowered).map(|m| m.as_str()).collect();

    let mut counts = HashMap::new();
    for n in lo..=hi {
        for window in tokens.windows(n) {
            *counts.entry(window.join(" ")).or_insert(0) += 1;
        }
    }
    counts
}
