//! HTTP-level integration tests. The full router runs against an
//! `AppContext` assembled by hand with a deterministic stub encoder, so no
//! model download or snapshot files are involved.


use crate::app::AppContext;
use crate::config::Config;
use crate::keyword_search::{KeywordIndex, KeywordSearchService};
use crate::recommend::embeddings::{EmbeddingError, TextEncoder};
use crate::recommend::{KeywordClusterIndex, Recommender, TagCatalog};
use std::collections::HashMap;
use std::sync::Arc;

/// Known texts map to fixed vectors, anything else encodes to the zero
/// vector (which matches nothing).
pub struct StubEncoder {
    map: HashMap<String, Vec<f32>>,
    dims: usize,
}

impl StubEncoder {
    pub fn new(dims: usize, pairs: &[(&str, &[f32])]) -> Box<Self> {
        Box::new(Self {
            map: pairs
                .iter()
                .map(|(t, v)| (t.to_string(), v.to_vec()))
                .collect(),
            dims,
        })
    }
}

impl TextEncoder for StubEncoder {
    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self
            .map
            .get(text)
            .cloned()
            .unwrap_or_else(|| vec![0.0; self.dims]))
    }

    fn name(&self) -> &str {
        "stub"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

pub fn movie_catalog() -> TagCatalog {
    TagCatalog::build(
        vec![
            (1, "액션".to_string(), vec![1.0, 0.0]),
            (2, "드라마".to_string(), vec![0.0, 1.0]),
        ],
        2,
    )
    .unwrap()
}

pub fn romance_clusters() -> KeywordClusterIndex {
    KeywordClusterIndex::build(
        vec![
            (10, 1, "positive".to_string(), "#설렘".to_string(), vec![1.0, 0.0]),
            (11, 1, "positive".to_string(), "#로맨스".to_string(), vec![1.0, 0.0]),
        ],
        2,
    )
}

/// A context with both services ready, backed by stub encoders.
pub fn test_context(
    recommend_pairs: &[(&str, &[f32])],
    keyword_pairs: &[(&str, &[f32])],
) -> Arc<AppContext> {
    let recommender = Recommender::new(
        StubEncoder::new(2, recommend_pairs),
        movie_catalog(),
        Some(romance_clusters()),
        0.3,
    );

    let index = KeywordIndex::build(
        vec![
            (100, "연애".to_string(), vec![1.0, 0.0]),
            (101, "스릴러".to_string(), vec![0.0, 1.0]),
        ],
        2,
    );
    let keyword_search = KeywordSearchService::new(StubEncoder::new(2, keyword_pairs), index);

    Arc::new(AppContext {
        config: Config::default(),
        recommender,
        keyword_search: Some(keyword_search),
        http: reqwest::Client::new(),
    })
}

/// A context where the keyword snapshot failed to load.
pub fn test_context_without_keywords() -> Arc<AppContext> {
    let recommender = Recommender::new(
        StubEncoder::new(2, &[]),
        movie_catalog(),
        None,
        0.3,
    );

    Arc::new(AppContext {
        config: Config::default(),
        recommender,
        keyword_search: None,
        http: reqwest::Client::new(),
    })
}
