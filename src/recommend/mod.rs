//! Tag recommendation core.
//!
//! Turns free-form review text into a ranked, deduplicated set of tag
//! candidates by fusing several similarity signals against pre-embedded
//! catalogs.
//!
//! # Architecture
//!
//! - `embeddings`: fastembed wrapper + the `TextEncoder` capability trait
//! - `preprocess`: summarization, keyword extraction, bigrams
//! - `catalog`: read-only tag catalog with cosine top-k search
//! - `clusters`: keyword cluster index with centroid matching
//! - `storage`: binary snapshot files for all catalogs
//! - `engine`: the two recommendation strategies

pub mod catalog;
pub mod clusters;
pub mod embeddings;
pub mod engine;
pub mod preprocess;
pub mod storage;

pub use catalog::TagCatalog;
pub use clusters::KeywordClusterIndex;
pub use embeddings::{EmbeddingModel, TextEncoder};
pub use engine::{Candidate, RecommendError, Recommender};

/// Default embedding model for tag recommendation (multilingual; the tag
/// catalog is Korean)
pub const DEFAULT_MODEL: &str = "paraphrase-multilingual-minilm-l12-v2";

/// Default minimum cosine similarity for a catalog hit
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.3;
