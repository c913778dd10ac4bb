//! Nearest-neighbor keyword search over a second embedded catalog.
//!
//! Independent of tag recommendation: it carries its own embedding model and
//! its own snapshot, and its load failure only disables this endpoint. Unlike
//! catalog search there is no similarity threshold; callers always get the
//! raw top-k, ranked from 1.

use crate::recommend::catalog::{cosine_similarity, l2_norm};
use crate::recommend::embeddings::{EmbeddingError, TextEncoder};

/// Default embedding model for keyword search
pub const DEFAULT_KEYWORD_MODEL: &str = "multilingual-e5-small";

/// One ranked keyword search result.
#[derive(Debug, Clone)]
pub struct KeywordHit {
    pub keyword_id: u64,
    pub score: f32,
    /// 1-based position in the result list
    pub rank: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum KeywordSearchError {
    #[error("Keyword search service is not ready")]
    NotReady,

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
}

/// Read-only keyword catalog: ids in one array, embeddings in one
/// contiguous row-major matrix. Results carry ids only, so the snapshot
/// texts are not retained.
pub struct KeywordIndex {
    ids: Vec<u64>,
    matrix: Vec<f32>,
    norms: Vec<f32>,
    dimensions: usize,
}

impl KeywordIndex {
    pub fn build(entries: Vec<(u64, String, Vec<f32>)>, dimensions: usize) -> Self {
        let mut ids = Vec::with_capacity(entries.len());
        let mut matrix = Vec::with_capacity(entries.len() * dimensions);
        let mut norms = Vec::with_capacity(entries.len());

        for (id, _text, embedding) in entries {
            ids.push(id);
            norms.push(l2_norm(&embedding));
            matrix.extend_from_slice(&embedding);
        }

        Self {
            ids,
            matrix,
            norms,
            dimensions,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Raw top-k cosine scan, descending, ties in catalog order.
    fn search(&self, query: &[f32], top_k: usize) -> Vec<KeywordHit> {
        let query_norm = l2_norm(query);
        if query_norm < f32::EPSILON {
            return vec![];
        }

        let mut scored: Vec<(usize, f32)> = (0..self.ids.len())
            .map(|row| {
                let vector = &self.matrix[row * self.dimensions..(row + 1) * self.dimensions];
                (row, cosine_similarity(query, query_norm, vector, self.norms[row]))
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        scored
            .into_iter()
            .enumerate()
            .map(|(i, (row, score))| KeywordHit {
                keyword_id: self.ids[row],
                score,
                rank: i + 1,
            })
            .collect()
    }
}

/// Keyword search service: its own encoder over its own index.
pub struct KeywordSearchService {
    model: Box<dyn TextEncoder>,
    index: KeywordIndex,
}

impl KeywordSearchService {
    pub fn new(model: Box<dyn TextEncoder>, index: KeywordIndex) -> Self {
        Self { model, index }
    }

    pub fn is_ready(&self) -> bool {
        !self.index.is_empty()
    }

    pub fn index(&self) -> &KeywordIndex {
        &self.index
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<KeywordHit>, KeywordSearchError> {
        if !self.is_ready() {
            return Err(KeywordSearchError::NotReady);
        }
        if query.trim().is_empty() {
            return Ok(vec![]);
        }

        let embedding = self.model.encode(query)?;
        let hits = self.index.search(&embedding, top_k);
        log::debug!("keyword search '{}' -> {} hits", query, hits.len());
        Ok(hits)
    }
}
