// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lexical recall channel: Okapi BM25 over the whole in-memory corpus.
//!
//! The index is derived from the corpus and never persisted. Every `add`
//! rebuilds it from scratch, and loading a namespace re-adds the corpus.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use async_trait::async_trait;
use jieba_rs::Jieba;
use tracing::debug;

use mnemo_core::MnemoError;

use crate::channel::RecallChannel;
use crate::types::Language;

/// Term-frequency saturation.
const K1: f64 = 1.5;
/// Document-length normalization.
const B: f64 = 0.75;

static JIEBA: LazyLock<Jieba> = LazyLock::new(Jieba::new);

/// Split `text` into index terms.
///
/// Chinese text goes through dictionary segmentation; English is split on
/// whitespace, lowercased and stripped of surrounding punctuation.
pub fn tokenize(text: &str, language: Language) -> Vec<String> {
    match language {
        Language::Zh => JIEBA
            .cut(text, false)
            .into_iter()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect(),
        Language::En => text
            .split_whitespace()
            .map(|w| {
                w.trim_matches(|c: char| !c.is_alphanumeric())
                    .to_lowercase()
            })
            .filter(|w| !w.is_empty())
            .collect(),
    }
}

/// Okapi BM25 scorer over a tokenized corpus.
#[derive(Debug, Clone)]
pub struct Bm25 {
    doc_freqs: Vec<HashMap<String, usize>>,
    doc_len: Vec<usize>,
    avgdl: f64,
    idf: HashMap<String, f64>,
}

impl Bm25 {
    pub fn new(corpus: &[Vec<String>]) -> Self {
        let mut doc_freqs = Vec::with_capacity(corpus.len());
        let mut doc_len = Vec::with_capacity(corpus.len());
        let mut containing: HashMap<String, usize> = HashMap::new();
        let mut total_len = 0usize;

        for doc in corpus {
            let mut freqs: HashMap<String, usize> = HashMap::new();
            for term in doc {
                *freqs.entry(term.clone()).or_insert(0) += 1;
            }
            for term in freqs.keys() {
                *containing.entry(term.clone()).or_insert(0) += 1;
            }
            total_len += doc.len();
            doc_len.push(doc.len());
            doc_freqs.push(freqs);
        }

        let n = corpus.len() as f64;
        let avgdl = if corpus.is_empty() {
            0.0
        } else {
            total_len as f64 / n
        };

        // ln(1 + ...) keeps idf positive even for terms in every document,
        // so any overlap outscores no overlap.
        let idf: HashMap<String, f64> = containing
            .into_iter()
            .map(|(term, count)| {
                let count = count as f64;
                (term, (1.0 + (n - count + 0.5) / (count + 0.5)).ln())
            })
            .collect();

        Self {
            doc_freqs,
            doc_len,
            avgdl,
            idf,
        }
    }

    pub fn len(&self) -> usize {
        self.doc_len.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_len.is_empty()
    }

    /// Score every document against `query`.
    pub fn scores(&self, query: &[String]) -> Vec<f64> {
        let mut scores = vec![0.0; self.len()];
        if self.avgdl <= 0.0 {
            return scores;
        }
        for term in query {
            let Some(idf) = self.idf.get(term) else {
                continue;
            };
            for (i, freqs) in self.doc_freqs.iter().enumerate() {
                let tf = freqs.get(term).copied().unwrap_or(0) as f64;
                if tf == 0.0 {
                    continue;
                }
                let norm = 1.0 - B + B * self.doc_len[i] as f64 / self.avgdl;
                scores[i] += idf * (tf * (K1 + 1.0)) / (tf + K1 * norm);
            }
        }
        scores
    }

    /// Indices of the `n` best documents, best first. Ties keep corpus order,
    /// and zero-score documents are returned when fewer than `n` match.
    pub fn top_n(&self, query: &[String], n: usize) -> Vec<usize> {
        let scores = self.scores(query);
        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
        order.truncate(n);
        order
    }
}

/// BM25 recall channel.
#[derive(Debug)]
pub struct LexicalRetriever {
    language: Language,
    bm25: Option<Bm25>,
}

impl LexicalRetriever {
    pub fn new(language: Language) -> Self {
        Self {
            language,
            bm25: None,
        }
    }
}

#[async_trait]
impl RecallChannel for LexicalRetriever {
    fn name(&self) -> &'static str {
        "lexical"
    }

    async fn add(
        &mut self,
        new_texts: &[String],
        corpus: &BTreeMap<usize, String>,
    ) -> Result<(), MnemoError> {
        let tokenized: Vec<Vec<String>> = corpus
            .values()
            .chain(new_texts.iter())
            .map(|t| tokenize(t, self.language))
            .collect();
        let bm25 = Bm25::new(&tokenized);
        debug!(documents = bm25.len(), "lexical index rebuilt");
        self.bm25 = Some(bm25);
        Ok(())
    }

    async fn retrieval(
        &self,
        query: &str,
        corpus: &BTreeMap<usize, String>,
        top_k: usize,
    ) -> Result<Vec<String>, MnemoError> {
        let Some(bm25) = &self.bm25 else {
            return Ok(Vec::new());
        };
        let terms = tokenize(query, self.language);
        if terms.is_empty() || bm25.is_empty() {
            return Ok(Vec::new());
        }
        Ok(bm25
            .top_n(&terms, top_k)
            .into_iter()
            .filter_map(|i| corpus.get(&i).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(texts: &[&str]) -> BTreeMap<usize, String> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| (i, t.to_string()))
            .collect()
    }

    #[test]
    fn english_tokenizer_strips_punctuation() {
        assert_eq!(
            tokenize("A cat sat on a mat.", Language::En),
            vec!["a", "cat", "sat", "on", "a", "mat"]
        );
        assert!(tokenize("  ...  ", Language::En).is_empty());
    }

    #[test]
    fn chinese_tokenizer_segments_words() {
        let tokens = tokenize("我喜欢猫", Language::Zh);
        assert!(tokens.len() >= 2, "expected segmentation, got {tokens:?}");
        assert!(tokens.iter().all(|t| !t.trim().is_empty()));
    }

    #[test]
    fn terms_in_most_documents_still_score() {
        let docs: Vec<Vec<String>> = ["a cat sat", "a dog ran", "a cat ate"]
            .iter()
            .map(|t| tokenize(t, Language::En))
            .collect();
        let bm25 = Bm25::new(&docs);
        let scores = bm25.scores(&["cat".to_string()]);
        assert!(scores[0] > 0.0);
        assert_eq!(scores[1], 0.0);
        assert!(scores[2] > 0.0);
    }

    #[test]
    fn empty_corpus_scores_nothing() {
        let bm25 = Bm25::new(&[]);
        assert!(bm25.top_n(&["x".to_string()], 3).is_empty());
    }

    #[tokio::test]
    async fn ranks_matching_documents_first() {
        let docs = corpus(&["A cat sat on a mat.", "Dogs bark at night.", "A cat likes milk."]);
        let mut channel = LexicalRetriever::new(Language::En);
        let texts: Vec<String> = docs.values().cloned().collect();
        channel.add(&texts, &BTreeMap::new()).await.unwrap();

        let hits = channel.retrieval("cat", &docs, 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.contains("cat")));
    }

    #[tokio::test]
    async fn add_rebuilds_over_existing_and_new() {
        let mut docs = corpus(&["alpha beta"]);
        let mut channel = LexicalRetriever::new(Language::En);
        channel.add(&["alpha beta".to_string()], &BTreeMap::new()).await.unwrap();
        channel.add(&["gamma delta".to_string()], &docs).await.unwrap();
        docs.insert(1, "gamma delta".to_string());

        let hits = channel.retrieval("gamma", &docs, 1).await.unwrap();
        assert_eq!(hits, vec!["gamma delta".to_string()]);
    }

    #[test]
    fn overlap_beats_corpus_order_in_tiny_corpus() {
        let docs: Vec<Vec<String>> = ["hello there", "hello world"]
            .iter()
            .map(|t| tokenize(t, Language::En))
            .collect();
        let bm25 = Bm25::new(&docs);
        assert_eq!(bm25.top_n(&["world".to_string()], 1), vec![1]);

        let scores = bm25.scores(&["hello".to_string()]);
        assert!(scores.iter().all(|s| *s > 0.0));
    }

    #[tokio::test]
    async fn unbuilt_channel_returns_nothing() {
        let channel = LexicalRetriever::new(Language::Zh);
        assert!(channel.retrieval("猫", &BTreeMap::new(), 3).await.unwrap().is_empty());
    }
}
