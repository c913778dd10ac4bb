//! Application context and the startup loading sequence.
//!
//! The context is built exactly once at startup and passed to every request
//! handler; there are no ambient globals. Loading is strict about the tag
//! catalog (a bad snapshot kills startup) and lenient about the cluster and
//! keyword snapshots (a bad file only disables that signal or endpoint,
//! logged once, for the process lifetime).

use anyhow::Context;
use std::sync::Arc;

use crate::config::Config;
use crate::keyword_search::{KeywordIndex, KeywordSearchError, KeywordSearchService};
use crate::recommend::embeddings::EmbeddingModel;
use crate::recommend::storage::{ClusterSnapshot, VectorSnapshot};
use crate::recommend::{KeywordClusterIndex, RecommendError, Recommender, TagCatalog};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("service not ready: {0}")]
    NotReady(&'static str),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Recommend(#[from] RecommendError),

    #[error(transparent)]
    KeywordSearch(#[from] KeywordSearchError),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}

/// Shared, read-only application state.
pub struct AppContext {
    pub config: Config,
    pub recommender: Recommender,
    /// Absent when the keyword snapshot failed to load
    pub keyword_search: Option<KeywordSearchService>,
    pub http: reqwest::Client,
}

impl AppContext {
    /// Build the context: load models and snapshots.
    ///
    /// The tag catalog snapshot is mandatory; any failure there is returned
    /// and the caller is expected to abort startup. The cluster and keyword
    /// snapshots degrade to disabled features.
    pub fn init(config: Config) -> anyhow::Result<Arc<Self>> {
        let cache_dir = std::path::PathBuf::from(&config.model_cache_path);

        log::info!("loading embedding model '{}'", config.recommend.model);
        let model = EmbeddingModel::new(&config.recommend.model, cache_dir.clone())
            .context("failed to initialize recommendation embedding model")?;
        let model_id = model.model_id_hash();
        let dimensions = model.dimensions();

        let tag_snapshot = VectorSnapshot::new(config.tag_snapshot_path());
        let tags = tag_snapshot.load(&model_id).with_context(|| {
            format!(
                "failed to load tag catalog snapshot {}",
                tag_snapshot.path().display()
            )
        })?;
        if tags.dimensions != dimensions {
            anyhow::bail!(
                "tag snapshot dimensions {} do not match model dimensions {}",
                tags.dimensions,
                dimensions
            );
        }
        let catalog = TagCatalog::build(tags.entries, tags.dimensions)
            .context("tag catalog snapshot is inconsistent")?;
        log::info!("tag catalog loaded: {} tags, {} dims", catalog.len(), dimensions);

        let clusters = Self::load_clusters(&config, &model_id, dimensions);

        let recommender = Recommender::new(
            Box::new(model),
            catalog,
            clusters,
            config.recommend.min_similarity,
        );

        let keyword_search = Self::load_keyword_search(&config, cache_dir);

        Ok(Arc::new(Self {
            config,
            recommender,
            keyword_search,
            http: reqwest::Client::new(),
        }))
    }

    /// Optional cluster snapshot: failure only disables the cluster signal.
    fn load_clusters(
        config: &Config,
        model_id: &[u8; 32],
        dimensions: usize,
    ) -> Option<KeywordClusterIndex> {
        let snapshot = ClusterSnapshot::new(config.cluster_snapshot_path());
        if !snapshot.exists() {
            log::warn!(
                "cluster snapshot {} not found; cluster signal disabled",
                snapshot.path().display()
            );
            return None;
        }

        match snapshot.load(model_id) {
            Ok(data) if data.dimensions == dimensions => {
                let index = KeywordClusterIndex::build(data.entries, data.dimensions);
                log::info!(
                    "cluster index loaded: {} clusters, {} members",
                    index.len(),
                    index.member_count()
                );
                Some(index)
            }
            Ok(data) => {
                log::warn!(
                    "cluster snapshot dimensions {} do not match model dimensions {}; cluster signal disabled",
                    data.dimensions,
                    dimensions
                );
                None
            }
            Err(err) => {
                log::warn!("failed to load cluster snapshot: {err}; cluster signal disabled");
                None
            }
        }
    }

    /// Optional keyword search: failure only disables its endpoint.
    fn load_keyword_search(
        config: &Config,
        cache_dir: std::path::PathBuf,
    ) -> Option<KeywordSearchService> {
        let snapshot = VectorSnapshot::new(config.keyword_snapshot_path());
        if !snapshot.exists() {
            log::warn!(
                "keyword snapshot {} not found; keyword search disabled",
                snapshot.path().display()
            );
            return None;
        }

        let model = match EmbeddingModel::new(&config.keyword_search.model, cache_dir) {
            Ok(model) => model,
            Err(err) => {
                log::warn!("failed to initialize keyword search model: {err}; keyword search disabled");
                return None;
            }
        };

        match snapshot.load(&model.model_id_hash()) {
            Ok(data) if data.dimensions == model.dimensions() => {
                let index = KeywordIndex::build(data.entries, data.dimensions);
                log::info!("keyword index loaded: {} keywords", index.len());
                Some(KeywordSearchService::new(Box::new(model), index))
            }
            Ok(data) => {
                log::warn!(
                    "keyword snapshot dimensions {} do not match model dimensions {}; keyword search disabled",
                    data.dimensions,
                    model.dimensions()
                );
                None
            }
            Err(err) => {
                log::warn!("failed to load keyword snapshot: {err}; keyword search disabled");
                None
            }
        }
    }
}
