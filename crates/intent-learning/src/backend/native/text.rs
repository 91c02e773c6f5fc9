//! Bag-of-terms text featurizer.
//!
//! Each text becomes a sparse vector over a vocabulary learned at fit time:
//! lowercased word unigrams plus character trigrams of the normalized text
//! (with `<`/`>` boundary markers). Term counts are L2-normalized so short and
//! long phrases weigh the same. Terms unseen during fit are dropped.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Sparse feature row: `(feature index, value)` pairs sorted by index.
pub(crate) type SparseRow = Vec<(usize, f32)>;

static WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{L}\p{N}$]+").expect("Invalid regex: words"));

/// Word and character n-gram featurizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextFeaturizer {
    vocabulary: BTreeMap<String, usize>,
}

impl TextFeaturizer {
    /// Learn the vocabulary of `texts`. Indices follow lexical term order.
    pub fn fit<S: AsRef<str>>(texts: &[S]) -> Self {
        let mut terms: Vec<String> = texts.iter().flat_map(|t| terms_of(t.as_ref())).collect();
        terms.sort();
        terms.dedup();

        let vocabulary = terms
            .into_iter()
            .enumerate()
            .map(|(index, term)| (term, index))
            .collect();

        Self { vocabulary }
    }

    /// Number of features a transformed row can address.
    pub fn dimension(&self) -> usize {
        self.vocabulary.len()
    }

    /// Featurize one text.
    pub(crate) fn transform(&self, text: &str) -> SparseRow {
        let mut counts: BTreeMap<usize, f32> = BTreeMap::new();
        for term in terms_of(text) {
            if let Some(&index) = self.vocabulary.get(&term) {
                *counts.entry(index).or_insert(0.0) += 1.0;
            }
        }

        let norm = counts.values().map(|v| v * v).sum::<f32>().sqrt();
        if norm == 0.0 {
            return Vec::new();
        }
        counts.into_iter().map(|(i, v)| (i, v / norm)).collect()
    }
}

fn terms_of(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = WORDS.find_iter(&lowered).map(|m| m.as_str()).collect();

    let mut terms: Vec<String> = words.iter().map(|w| format!("w:{w}")).collect();

    let normalized: Vec<char> = std::iter::once('<')
        .chain(words.join(" ").chars())
        .chain(std::iter::once('>'))
        .collect();
    terms.extend(
        normalized
            .windows(3)
            .map(|gram| format!("c:{}", gram.iter().collect::<String>())),
    );

    terms
}
