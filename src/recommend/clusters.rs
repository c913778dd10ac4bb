//! Keyword cluster index.
//!
//! The cluster snapshot groups tags under a parent keyword. Each cluster
//! carries a centroid (arithmetic mean of its member embeddings, computed
//! once at load) and its members in snapshot order. Member order matters:
//! the dual recommendation strategy decays scores by member rank.

use std::collections::HashMap;

use crate::recommend::catalog::{cosine_similarity, l2_norm};

/// One tag inside a cluster, as read from the snapshot.
#[derive(Debug, Clone)]
pub struct ClusterMember {
    /// Position of this entry in the snapshot
    pub embedding_index: usize,
    pub tag_id: u64,
    /// Display text with any leading `#` sigil stripped
    pub tag_text: String,
    pub sentiment: String,
    pub embedding: Vec<f32>,
}

/// A group of tags sharing a parent keyword.
#[derive(Debug, Clone)]
pub struct KeywordCluster {
    pub parent_key_id: u64,
    /// Members in snapshot order
    pub members: Vec<ClusterMember>,
    pub centroid: Vec<f32>,
}

/// The best-matching cluster for a query embedding.
pub struct ClusterMatch<'a> {
    pub cluster: &'a KeywordCluster,
    pub similarity: f32,
}

/// Read-only cluster index, absent when the optional snapshot failed to load.
pub struct KeywordClusterIndex {
    clusters: Vec<KeywordCluster>,
    centroid_norms: Vec<f32>,
}

impl KeywordClusterIndex {
    /// Group raw snapshot entries by parent key id and compute centroids.
    ///
    /// Entries are `(tag_id, parent_key_id, sentiment, text, embedding)` in
    /// snapshot order; that order is preserved inside each cluster. A
    /// leading `#` is stripped from the member text here.
    pub fn build(
        entries: Vec<(u64, u64, String, String, Vec<f32>)>,
        dimensions: usize,
    ) -> Self {
        let mut order: Vec<u64> = Vec::new();
        let mut grouped: HashMap<u64, Vec<ClusterMember>> = HashMap::new();

        for (index, (tag_id, parent_key_id, sentiment, text, embedding)) in
            entries.into_iter().enumerate()
        {
            let members = grouped.entry(parent_key_id).or_insert_with(|| {
                order.push(parent_key_id);
                Vec::new()
            });
            members.push(ClusterMember {
                embedding_index: index,
                tag_id,
                tag_text: text.strip_prefix('#').unwrap_or(&text).to_string(),
                sentiment,
                embedding,
            });
        }

        let mut clusters = Vec::with_capacity(order.len());
        let mut centroid_norms = Vec::with_capacity(order.len());
        for parent_key_id in order {
            let members = grouped.remove(&parent_key_id).unwrap_or_default();
            let centroid = mean_embedding(&members, dimensions);
            centroid_norms.push(l2_norm(&centroid));
            clusters.push(KeywordCluster {
                parent_key_id,
                members,
                centroid,
            });
        }

        Self {
            clusters,
            centroid_norms,
        }
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Total member count across all clusters.
    pub fn member_count(&self) -> usize {
        self.clusters.iter().map(|c| c.members.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeywordCluster> {
        self.clusters.iter()
    }

    /// Find the single cluster whose centroid is most similar to `query`.
    ///
    /// Returns `None` for an empty index or a zero query. Ties keep the
    /// first cluster encountered.
    pub fn best_match(&self, query: &[f32]) -> Option<ClusterMatch<'_>> {
        let query_norm = l2_norm(query);
        if query_norm < f32::EPSILON {
            return None;
        }

        let mut best: Option<(usize, f32)> = None;
        for (i, cluster) in self.clusters.iter().enumerate() {
            let score =
                cosine_similarity(query, query_norm, &cluster.centroid, self.centroid_norms[i]);
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((i, score)),
            }
        }

        best.map(|(i, similarity)| ClusterMatch {
            cluster: &self.clusters[i],
            similarity,
        })
    }
}

fn mean_embedding(members: &[ClusterMember], dimensions: usize) -> Vec<f32> {
    let mut centroid = vec![0.0f32; dimensions];
    if members.is_empty() {
        return centroid;
    }
    for member in members {
        for (acc, value) in centroid.iter_mut().zip(member.embedding.iter()) {
            *acc += value;
        }
    }
    let count = members.len() as f32;
    for value in centroid.iter_mut() {
        *value /= count;
    }
    centroid
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(
        tag_id: u64,
        parent: u64,
        text: &str,
        embedding: Vec<f32>,
    ) -> (u64, u64, String, String, Vec<f32>) {
        (tag_id, parent, "positive".to_string(), text.to_string(), embedding)
    }

    #[test]
    fn test_grouping_and_centroid() {
        let index = KeywordClusterIndex::build(
            vec![
                entry(10, 1, "#설렘", vec![1.0, 0.0]),
                entry(11, 1, "#로맨스", vec![0.0, 1.0]),
                entry(20, 2, "#긴장감", vec![1.0, 1.0]),
            ],
            2,
        );

        assert_eq!(index.len(), 2);
        assert_eq!(index.member_count(), 3);

        let first = index.iter().next().unwrap();
        assert_eq!(first.parent_key_id, 1);
        assert_eq!(first.centroid, vec![0.5, 0.5]);
        assert_eq!(first.members[0].tag_text, "설렘");
        assert_eq!(first.members[1].tag_text, "로맨스");
    }

    #[test]
    fn test_member_order_preserved_within_cluster() {
        let index = KeywordClusterIndex::build(
            vec![
                entry(3, 1, "#셋", vec![1.0, 0.0]),
                entry(1, 1, "#하나", vec![1.0, 0.0]),
                entry(2, 1, "#둘", vec![1.0, 0.0]),
            ],
            2,
        );
        let cluster = index.iter().next().unwrap();
        let ids: Vec<u64> = cluster.members.iter().map(|m| m.tag_id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
        assert_eq!(cluster.members[1].embedding_index, 1);
    }

    #[test]
    fn test_sigil_only_stripped_when_leading() {
        let index = KeywordClusterIndex::build(
            vec![entry(1, 1, "설렘#두근", vec![1.0, 0.0])],
            2,
        );
        let cluster = index.iter().next().unwrap();
        assert_eq!(cluster.members[0].tag_text, "설렘#두근");
    }

    #[test]
    fn test_best_match_picks_closest_centroid() {
        let index = KeywordClusterIndex::build(
            vec![
                entry(10, 1, "#설렘", vec![1.0, 0.0]),
                entry(20, 2, "#긴장감", vec![0.0, 1.0]),
            ],
            2,
        );

        let matched = index.best_match(&[0.9, 0.1]).unwrap();
        assert_eq!(matched.cluster.parent_key_id, 1);
        assert!(matched.similarity > 0.9);
    }

    #[test]
    fn test_best_match_zero_query() {
        let index = KeywordClusterIndex::build(
            vec![entry(10, 1, "#설렘", vec![1.0, 0.0])],
            2,
        );
        assert!(index.best_match(&[0.0, 0.0]).is_none());
    }

    #[test]
    fn test_best_match_empty_index() {
        let index = KeywordClusterIndex::build(vec![], 2);
        assert!(index.best_match(&[1.0, 0.0]).is_none());
    }
}
