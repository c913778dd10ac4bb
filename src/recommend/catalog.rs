//! In-memory tag catalog with cosine similarity search.
//!
//! The catalog is built once at startup from a snapshot and never mutated:
//! tag ids and texts live in parallel arrays, embeddings in one contiguous
//! row-major matrix so the bulk similarity scan stays cache-friendly. An
//! id -> row map gives O(1) lookup by tag id.

use rayon::prelude::*;
use std::collections::HashMap;

/// A single tag with its display text and embedding row.
#[derive(Debug, Clone)]
pub struct Tag {
    pub id: u64,
    pub text: String,
}

/// A scored catalog hit.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: u64,
    pub text: String,
    pub score: f32,
}

/// Errors from catalog construction and search.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Duplicate tag id {0} in catalog")]
    DuplicateId(u64),
}

/// Read-only tag catalog. Safe to share across requests without locking.
pub struct TagCatalog {
    tags: Vec<Tag>,
    /// Row-major matrix, `tags.len() * dimensions` floats
    matrix: Vec<f32>,
    /// Precomputed L2 norms, one per row
    norms: Vec<f32>,
    dimensions: usize,
    by_id: HashMap<u64, usize>,
}

/// How many of the top-k rows are actually inspected against the threshold.
const INSPECT_CAP: usize = 5;

impl TagCatalog {
    /// Build a catalog from `(id, text, embedding)` triples.
    ///
    /// Entry order is preserved; it defines tie-break order in search.
    pub fn build(entries: Vec<(u64, String, Vec<f32>)>, dimensions: usize) -> Result<Self, CatalogError> {
        let mut tags = Vec::with_capacity(entries.len());
        let mut matrix = Vec::with_capacity(entries.len() * dimensions);
        let mut norms = Vec::with_capacity(entries.len());
        let mut by_id = HashMap::with_capacity(entries.len());

        for (row, (id, text, embedding)) in entries.into_iter().enumerate() {
            if embedding.len() != dimensions {
                return Err(CatalogError::DimensionMismatch {
                    expected: dimensions,
                    got: embedding.len(),
                });
            }
            if by_id.insert(id, row).is_some() {
                return Err(CatalogError::DuplicateId(id));
            }
            norms.push(l2_norm(&embedding));
            matrix.extend_from_slice(&embedding);
            tags.push(Tag { id, text });
        }

        Ok(Self {
            tags,
            matrix,
            norms,
            dimensions,
            by_id,
        })
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Look up a tag by id.
    pub fn get(&self, id: u64) -> Option<&Tag> {
        self.by_id.get(&id).map(|&row| &self.tags[row])
    }

    /// Embedding row for a tag id.
    pub fn vector(&self, id: u64) -> Option<&[f32]> {
        self.by_id
            .get(&id)
            .map(|&row| &self.matrix[row * self.dimensions..(row + 1) * self.dimensions])
    }

    /// Top-k cosine similarity search with threshold filtering.
    ///
    /// Scores every row, keeps the `top_k` best (descending, ties broken by
    /// catalog order), then inspects at most the first 5 of those and returns
    /// the ones at or above `threshold`.
    pub fn search(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<SearchHit>, CatalogError> {
        if query.len() != self.dimensions {
            return Err(CatalogError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let query_norm = l2_norm(query);
        if query_norm < f32::EPSILON {
            return Ok(vec![]);
        }

        let mut scored: Vec<(usize, f32)> = (0..self.tags.len())
            .into_par_iter()
            .map(|row| {
                let vector = &self.matrix[row * self.dimensions..(row + 1) * self.dimensions];
                (row, cosine_similarity(query, query_norm, vector, self.norms[row]))
            })
            .collect();

        // stable sort: equal scores keep catalog order
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .take(INSPECT_CAP)
            .filter(|&(_, score)| score >= threshold)
            .map(|(row, score)| SearchHit {
                id: self.tags[row].id,
                text: self.tags[row].text.clone(),
                score,
            })
            .collect())
    }
}

/// L2 norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity with both norms precomputed.
pub fn cosine_similarity(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
    if a_norm < f32::EPSILON || b_norm < f32::EPSILON {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    dot / (a_norm * b_norm)
}
