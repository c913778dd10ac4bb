//! Multi-signal tag recommendation engine.
//!
//! Two strategies over the same collaborators (embedding model, tag catalog,
//! optional cluster index):
//!
//! - **single-pass**: fuses a whole-content signal (×2.0), a bigram signal
//!   (×1.5) and a single-word signal (×1.0). Broader context is trusted
//!   most; single words are the noisiest and are capped hardest.
//! - **dual**: all members of the single best-matching keyword cluster
//!   (×3.0, rank-decayed) followed by direct catalog hits (×2.0). One
//!   coherent cluster beats a grab-bag of unrelated top hits.
//!
//! Candidates are deduplicated by tag text within a request: the first
//! signal to claim a text wins, even if a later signal scores it higher.

use std::collections::HashSet;

use crate::recommend::catalog::{CatalogError, TagCatalog};
use crate::recommend::clusters::KeywordClusterIndex;
use crate::recommend::embeddings::{EmbeddingError, TextEncoder};
use crate::recommend::preprocess;

/// Weight for the whole-content signal
const CONTENT_WEIGHT: f32 = 2.0;
/// Weight for the bigram signal
const BIGRAM_WEIGHT: f32 = 1.5;
/// Weight for the single-word signal
const WORD_WEIGHT: f32 = 1.0;
/// Weight for members of the best-matching cluster
const CLUSTER_WEIGHT: f32 = 3.0;
/// Per-rank score decay inside a cluster
const CLUSTER_RANK_DECAY: f32 = 0.05;
/// Weight for direct catalog hits in the dual strategy
const DIRECT_WEIGHT: f32 = 2.0;

/// How many bigrams are tried, and how many may be accepted
const BIGRAM_TRY: usize = 8;
const BIGRAM_ACCEPT: usize = 4;
/// How many words are tried, and how many may be accepted
const WORD_TRY: usize = 10;
const WORD_ACCEPT: usize = 3;
/// Top-k for whole-content and direct catalog searches
const BROAD_TOP_K: usize = 5;

/// A scored tag candidate produced by one signal.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub tag_id: u64,
    pub tag_text: String,
    pub score: f32,
    /// Which signal produced this candidate
    pub source: String,
}

/// Errors from the recommendation computation.
#[derive(Debug, thiserror::Error)]
pub enum RecommendError {
    #[error("Recommendation service is not ready")]
    NotReady,

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// The recommendation engine. Read-only after construction; shared across
/// requests without locking (the embedding model locks internally).
pub struct Recommender {
    model: Box<dyn TextEncoder>,
    catalog: TagCatalog,
    clusters: Option<KeywordClusterIndex>,
    min_similarity: f32,
}

impl Recommender {
    pub fn new(
        model: Box<dyn TextEncoder>,
        catalog: TagCatalog,
        clusters: Option<KeywordClusterIndex>,
        min_similarity: f32,
    ) -> Self {
        Self {
            model,
            catalog,
            clusters,
            min_similarity,
        }
    }

    pub fn is_ready(&self) -> bool {
        !self.catalog.is_empty()
    }

    pub fn catalog(&self) -> &TagCatalog {
        &self.catalog
    }

    pub fn clusters(&self) -> Option<&KeywordClusterIndex> {
        self.clusters.as_ref()
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn dimensions(&self) -> usize {
        self.model.dimensions()
    }

    /// Embed `query` and return catalog hits at or above the similarity
    /// threshold. Empty or whitespace-only queries yield no hits.
    fn search_catalog(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<crate::recommend::catalog::SearchHit>, RecommendError> {
        if query.trim().is_empty() {
            return Ok(vec![]);
        }
        let embedding = self.model.encode(query)?;
        Ok(self.catalog.search(&embedding, top_k, self.min_similarity)?)
    }

    /// Single-pass strategy: content, bigram and word signals fused by
    /// weighted score.
    pub fn recommend(
        &self,
        _title: &str,
        content: &str,
        count: usize,
        max_content_length: usize,
    ) -> Result<Vec<Candidate>, RecommendError> {
        if !self.is_ready() {
            return Err(RecommendError::NotReady);
        }

        // content only; the title does not participate in scoring
        let content = preprocess::summarize(content, max_content_length);
        let words = preprocess::extract_keywords(&content, max_content_length);
        let word_pairs = preprocess::bigrams(&words);

        let mut candidates: Vec<Candidate> = Vec::new();
        let mut seen = ClaimedTexts::default();

        for hit in self.search_catalog(&content, BROAD_TOP_K)? {
            if seen.claim(&hit.text) {
                candidates.push(Candidate {
                    tag_id: hit.id,
                    tag_text: hit.text,
                    score: hit.score * CONTENT_WEIGHT,
                    source: "content analysis".to_string(),
                });
            }
        }

        let mut accepted = 0;
        for bigram in word_pairs.iter().take(BIGRAM_TRY) {
            if accepted >= BIGRAM_ACCEPT {
                break;
            }
            for hit in self.search_catalog(bigram, 1)? {
                if seen.claim(&hit.text) {
                    candidates.push(Candidate {
                        tag_id: hit.id,
                        tag_text: hit.text,
                        score: hit.score * BIGRAM_WEIGHT,
                        source: format!("bigram:{}", bigram),
                    });
                    accepted += 1;
                    break;
                }
            }
        }

        let mut accepted = 0;
        for word in words.iter().take(WORD_TRY) {
            if accepted >= WORD_ACCEPT {
                break;
            }
            for hit in self.search_catalog(word, 1)? {
                if seen.claim(&hit.text) {
                    candidates.push(Candidate {
                        tag_id: hit.id,
                        tag_text: hit.text,
                        score: hit.score * WORD_WEIGHT,
                        source: format!("word:{}", word),
                    });
                    accepted += 1;
                    break;
                }
            }
        }

        Ok(rank(candidates, count))
    }

    /// Dual strategy: best keyword cluster first, then direct catalog hits.
    pub fn recommend_dual(
        &self,
        _title: &str,
        content: &str,
        count: usize,
        max_content_length: usize,
    ) -> Result<Vec<Candidate>, RecommendError> {
        if !self.is_ready() {
            return Err(RecommendError::NotReady);
        }

        let content = preprocess::summarize(content, max_content_length);
        if content.trim().is_empty() {
            return Ok(vec![]);
        }

        let embedding = self.model.encode(&content)?;

        let mut candidates: Vec<Candidate> = Vec::new();
        let mut seen = ClaimedTexts::default();

        if let Some(clusters) = &self.clusters {
            if let Some(matched) = clusters.best_match(&embedding) {
                if matched.similarity >= self.min_similarity {
                    log::debug!(
                        "top keyword cluster {} (similarity {:.3}, {} members)",
                        matched.cluster.parent_key_id,
                        matched.similarity,
                        matched.cluster.members.len()
                    );
                    for (rank_in_cluster, member) in matched.cluster.members.iter().enumerate() {
                        if seen.claim(&member.tag_text) {
                            let decay = 1.0 - rank_in_cluster as f32 * CLUSTER_RANK_DECAY;
                            candidates.push(Candidate {
                                tag_id: member.tag_id,
                                tag_text: member.tag_text.clone(),
                                score: matched.similarity * decay * CLUSTER_WEIGHT,
                                source: format!("top-keyword:{}", matched.cluster.parent_key_id),
                            });
                        }
                    }
                }
            }
        }

        for hit in self.catalog.search(&embedding, BROAD_TOP_K, self.min_similarity)? {
            if seen.claim(&hit.text) {
                candidates.push(Candidate {
                    tag_id: hit.id,
                    tag_text: hit.text,
                    score: hit.score * DIRECT_WEIGHT,
                    source: "direct".to_string(),
                });
            }
        }

        Ok(rank(candidates, count))
    }
}

/// Per-request dedup by tag text: the first signal to claim a text wins.
#[derive(Default)]
struct ClaimedTexts(HashSet<String>);

impl ClaimedTexts {
    fn claim(&mut self, text: &str) -> bool {
        self.0.insert(text.to_string())
    }
}

/// Stable descending sort by score, truncated to `count`.
fn rank(mut candidates: Vec<Candidate>, count: usize) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    candidates.truncate(count);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommend::embeddings::EmbeddingError;
    use std::collections::HashMap;

    /// Deterministic encoder: known texts map to fixed vectors, anything
    /// else encodes to the zero vector (which matches nothing).
    struct StubEncoder {
        map: HashMap<String, Vec<f32>>,
        dims: usize,
    }

    impl StubEncoder {
        fn new(dims: usize, pairs: &[(&str, &[f32])]) -> Box<Self> {
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

    fn two_tag_catalog() -> TagCatalog {
        TagCatalog::build(
            vec![
                (1, "액션".to_string(), vec![1.0, 0.0]),
                (2, "드라마".to_string(), vec![0.0, 1.0]),
            ],
            2,
        )
        .unwrap()
    }

    fn romance_clusters() -> KeywordClusterIndex {
        // one cluster, centroid [1, 0]
        KeywordClusterIndex::build(
            vec![
                (10, 1, "positive".to_string(), "#설렘".to_string(), vec![1.0, 0.0]),
                (11, 1, "positive".to_string(), "#로맨스".to_string(), vec![1.0, 0.0]),
            ],
            2,
        )
    }

    #[test]
    fn test_dual_cluster_scores_decay_then_direct() {
        // content encodes at cosine 0.8 to the cluster centroid
        let encoder = StubEncoder::new(2, &[("재미있는 사랑 이야기", &[0.8, 0.6])]);
        let rec = Recommender::new(encoder, two_tag_catalog(), Some(romance_clusters()), 0.3);

        let result = rec
            .recommend_dual("제목", "재미있는 사랑 이야기", 10, 500)
            .unwrap();

        // cluster members first: 0.8*1.0*3.0 and 0.8*0.95*3.0
        assert_eq!(result[0].tag_id, 10);
        assert!((result[0].score - 2.4).abs() < 1e-4);
        assert_eq!(result[0].source, "top-keyword:1");
        assert_eq!(result[1].tag_id, 11);
        assert!((result[1].score - 2.28).abs() < 1e-4);

        // then direct hits: 액션 0.8*2.0, 드라마 0.6*2.0
        assert_eq!(result[2].tag_text, "액션");
        assert!((result[2].score - 1.6).abs() < 1e-4);
        assert_eq!(result[2].source, "direct");
        assert_eq!(result[3].tag_text, "드라마");
        assert!((result[3].score - 1.2).abs() < 1e-4);
    }

    #[test]
    fn test_dual_cluster_claims_text_before_direct() {
        // cluster member text collides with a catalog tag text
        let clusters = KeywordClusterIndex::build(
            vec![(10, 1, "positive".to_string(), "#액션".to_string(), vec![1.0, 0.0])],
            2,
        );
        let encoder = StubEncoder::new(2, &[("통쾌한 액션", &[1.0, 0.0])]);
        let rec = Recommender::new(encoder, two_tag_catalog(), Some(clusters), 0.3);

        let result = rec.recommend_dual("", "통쾌한 액션", 10, 500).unwrap();

        let action: Vec<&Candidate> = result.iter().filter(|c| c.tag_text == "액션").collect();
        assert_eq!(action.len(), 1);
        // the cluster signal got there first, even though the direct score
        // weighting differs
        assert_eq!(action[0].source, "top-keyword:1");
    }

    #[test]
    fn test_dual_without_clusters_still_returns_direct() {
        let encoder = StubEncoder::new(2, &[("통쾌한 액션", &[1.0, 0.0])]);
        let rec = Recommender::new(encoder, two_tag_catalog(), None, 0.3);

        let result = rec.recommend_dual("", "통쾌한 액션", 10, 500).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].source, "direct");
        assert_eq!(result[0].tag_text, "액션");
    }

    #[test]
    fn test_dual_cluster_below_threshold_contributes_nothing() {
        // cosine to the centroid is ~0.2, under the 0.3 threshold
        let encoder = StubEncoder::new(2, &[("희미한 인상", &[0.2, 0.98])]);
        let rec = Recommender::new(encoder, two_tag_catalog(), Some(romance_clusters()), 0.3);

        let result = rec.recommend_dual("", "희미한 인상", 10, 500).unwrap();
        assert!(result.iter().all(|c| c.source == "direct"));
    }

    #[test]
    fn test_dual_empty_content_is_empty_not_error() {
        let encoder = StubEncoder::new(2, &[]);
        let rec = Recommender::new(encoder, two_tag_catalog(), Some(romance_clusters()), 0.3);
        assert!(rec.recommend_dual("제목", "", 10, 500).unwrap().is_empty());
        assert!(rec.recommend_dual("제목", "   ", 10, 500).unwrap().is_empty());
    }

    #[test]
    fn test_single_pass_signal_weights_and_sources() {
        // content and its lone bigram encode identically; the word signal
        // pulls in a second tag
        let encoder = StubEncoder::new(
            2,
            &[
                ("액션 영화", &[1.0, 0.0]),
                ("액션", &[0.0, 1.0]),
            ],
        );
        let rec = Recommender::new(encoder, two_tag_catalog(), None, 0.3);

        let result = rec.recommend("", "액션 영화", 10, 500).unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].tag_text, "액션");
        assert_eq!(result[0].source, "content analysis");
        assert!((result[0].score - 2.0).abs() < 1e-4);

        // the bigram hit the same tag text and was discarded; the word
        // signal claimed 드라마 at weight 1.0
        assert_eq!(result[1].tag_text, "드라마");
        assert_eq!(result[1].source, "word:액션");
        assert!((result[1].score - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_single_pass_empty_content_is_empty() {
        let encoder = StubEncoder::new(2, &[]);
        let rec = Recommender::new(encoder, two_tag_catalog(), None, 0.3);
        assert!(rec.recommend("제목", "", 10, 500).unwrap().is_empty());
    }

    #[test]
    fn test_single_pass_truncates_to_count() {
        let encoder = StubEncoder::new(2, &[("액션 영화", &[0.9, 0.5]), ("액션", &[0.0, 1.0])]);
        let rec = Recommender::new(encoder, two_tag_catalog(), None, 0.3);
        let result = rec.recommend("", "액션 영화", 1, 500).unwrap();
        assert_eq!(result.len(), 1);
    }

    // 12 distinct two-syllable words, none of them stopwords, yielding
    // 11 adjacent bigrams
    const CAP_CONTENT: &str = "가나 나다 다라 라마 마바 바사 사아 아자 자차 차카 카타 타파";

    fn one_hot(i: usize) -> Vec<f32> {
        let mut v = vec![0.0; 10];
        v[i] = 1.0;
        v
    }

    fn ten_tag_catalog() -> TagCatalog {
        let tags = ["비밀", "모험", "우정", "희망", "용기", "사랑", "공포", "유머", "감동"];
        TagCatalog::build(
            tags.iter()
                .enumerate()
                .map(|(i, t)| (i as u64 + 1, t.to_string(), one_hot(i)))
                .collect(),
            10,
        )
        .unwrap()
    }

    #[test]
    fn test_single_pass_bigram_and_word_acceptance_caps() {
        // five bigrams and four words each match a distinct tag, but only
        // four bigram hits and three word hits may be accepted; the whole
        // content encodes to zero and contributes nothing
        let dirs: Vec<Vec<f32>> = (0..9).map(one_hot).collect();
        let pairs: Vec<(&str, &[f32])> = vec![
            ("가나 나다", &dirs[0]),
            ("나다 다라", &dirs[1]),
            ("다라 라마", &dirs[2]),
            ("라마 마바", &dirs[3]),
            ("마바 바사", &dirs[4]),
            ("사아", &dirs[5]),
            ("아자", &dirs[6]),
            ("자차", &dirs[7]),
            ("차카", &dirs[8]),
        ];
        let encoder = StubEncoder::new(10, &pairs);
        let rec = Recommender::new(encoder, ten_tag_catalog(), None, 0.3);

        let result = rec.recommend("", CAP_CONTENT, 20, 500).unwrap();

        assert_eq!(result.len(), 7);
        let bigram_sources: Vec<&str> = result
            .iter()
            .filter(|c| c.source.starts_with("bigram:"))
            .map(|c| c.source.as_str())
            .collect();
        assert_eq!(
            bigram_sources,
            vec!["bigram:가나 나다", "bigram:나다 다라", "bigram:다라 라마", "bigram:라마 마바"]
        );
        let word_sources: Vec<&str> = result
            .iter()
            .filter(|c| c.source.starts_with("word:"))
            .map(|c| c.source.as_str())
            .collect();
        // 차카 would match 감동 but the fourth word hit is never accepted
        assert_eq!(word_sources, vec!["word:사아", "word:아자", "word:자차"]);
        for c in &result {
            let expected = if c.source.starts_with("bigram:") { 1.5 } else { 1.0 };
            assert!((c.score - expected).abs() < 1e-4, "{}: {}", c.source, c.score);
        }
    }

    #[test]
    fn test_single_pass_iteration_windows() {
        // the only matchable bigram is the ninth and the only matchable
        // word is the eleventh; neither window reaches them
        let dirs: Vec<Vec<f32>> = (0..2).map(one_hot).collect();
        let pairs: Vec<(&str, &[f32])> =
            vec![("자차 차카", &dirs[0]), ("카타", &dirs[1])];
        let encoder = StubEncoder::new(10, &pairs);
        let rec = Recommender::new(encoder, ten_tag_catalog(), None, 0.3);

        let result = rec.recommend("", CAP_CONTENT, 20, 500).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_not_ready_when_catalog_empty() {
        let encoder = StubEncoder::new(2, &[]);
        let rec = Recommender::new(encoder, TagCatalog::build(vec![], 2).unwrap(), None, 0.3);
        assert!(matches!(rec.recommend("", "내용", 5, 500), Err(RecommendError::NotReady)));
        assert!(matches!(
            rec.recommend_dual("", "내용", 5, 500),
            Err(RecommendError::NotReady)
        ));
    }

    fn candidate(id: u64, text: &str, score: f32, source: &str) -> Candidate {
        Candidate {
            tag_id: id,
            tag_text: text.to_string(),
            score,
            source: source.to_string(),
        }
    }

    #[test]
    fn test_rank_sorts_descending_and_truncates() {
        let ranked = rank(
            vec![
                candidate(1, "가", 0.5, "direct"),
                candidate(2, "나", 0.9, "direct"),
                candidate(3, "다", 0.7, "direct"),
            ],
            2,
        );
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].tag_id, 2);
        assert_eq!(ranked[1].tag_id, 3);
    }

    #[test]
    fn test_rank_is_stable_on_ties() {
        let ranked = rank(
            vec![
                candidate(1, "가", 0.5, "content analysis"),
                candidate(2, "나", 0.5, "direct"),
                candidate(3, "다", 0.5, "word:다"),
            ],
            10,
        );
        let ids: Vec<u64> = ranked.iter().map(|c| c.tag_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_claimed_texts_first_wins() {
        let mut seen = ClaimedTexts::default();
        assert!(seen.claim("액션"));
        assert!(!seen.claim("액션"));
        assert!(seen.claim("드라마"));
    }
}
