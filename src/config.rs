//! Service configuration.
//!
//! Loaded from `config.yaml` under the base path, with serde defaults for
//! every field so a missing or partial file still yields a working config.
//! A few deployment-specific values can be overridden by environment
//! variables: `TAGREC_DATA_PATH`, `TAGREC_MODEL_CACHE`, `TAGREC_BACKEND_URL`.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::keyword_search::DEFAULT_KEYWORD_MODEL;
use crate::recommend::{DEFAULT_MIN_SIMILARITY, DEFAULT_MODEL};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;

/// Default recommendation count when the request omits one
const DEFAULT_COUNT: usize = 5;
/// Hard cap on the recommendation count
const MAX_COUNT: usize = 20;
/// Default content length before summarization kicks in
const DEFAULT_MAX_CONTENT_LENGTH: usize = 500;
/// Hard cap on keyword search top_k
const MAX_TOP_K: usize = 50;
/// Default keyword search top_k
const DEFAULT_TOP_K: usize = 10;

/// Configuration for the tag recommendation engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecommendConfig {
    /// Embedding model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Minimum cosine similarity for a catalog hit [0.0, 1.0]
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,

    /// Default number of recommendations per request
    #[serde(default = "default_count")]
    pub default_count: usize,

    /// Maximum number of recommendations per request
    #[serde(default = "max_count")]
    pub max_count: usize,

    /// Content length (characters) above which text is summarized
    #[serde(default = "default_max_content_length")]
    pub default_max_content_length: usize,

    /// Tag catalog snapshot file name under the data path
    #[serde(default = "default_tag_snapshot")]
    pub tag_snapshot: String,

    /// Keyword cluster snapshot file name under the data path (optional at
    /// runtime: a missing or unreadable file only disables cluster signals)
    #[serde(default = "default_cluster_snapshot")]
    pub cluster_snapshot: String,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            min_similarity: default_min_similarity(),
            default_count: default_count(),
            max_count: max_count(),
            default_max_content_length: default_max_content_length(),
            tag_snapshot: default_tag_snapshot(),
            cluster_snapshot: default_cluster_snapshot(),
        }
    }
}

/// Configuration for the keyword search service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeywordSearchConfig {
    /// Embedding model name (independent of the recommendation model)
    #[serde(default = "default_keyword_model")]
    pub model: String,

    /// Default result count per query
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Hard cap on result count per query
    #[serde(default = "max_top_k")]
    pub max_top_k: usize,

    /// Keyword snapshot file name under the data path
    #[serde(default = "default_keyword_snapshot")]
    pub keyword_snapshot: String,
}

impl Default for KeywordSearchConfig {
    fn default() -> Self {
        Self {
            model: default_keyword_model(),
            default_top_k: default_top_k(),
            max_top_k: max_top_k(),
            keyword_snapshot: default_keyword_snapshot(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding the snapshot files
    #[serde(default = "default_data_path")]
    pub data_path: String,

    /// Directory for cached embedding models
    #[serde(default = "default_model_cache_path")]
    pub model_cache_path: String,

    /// Base URL of the movie recommendation backend the user-activity
    /// endpoints proxy to; proxying is disabled when unset
    #[serde(default)]
    pub backend_url: Option<String>,

    #[serde(default)]
    pub recommend: RecommendConfig,

    #[serde(default)]
    pub keyword_search: KeywordSearchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_path: default_data_path(),
            model_cache_path: default_model_cache_path(),
            backend_url: None,
            recommend: RecommendConfig::default(),
            keyword_search: KeywordSearchConfig::default(),
        }
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_data_path() -> String {
    "./data".to_string()
}

fn default_model_cache_path() -> String {
    "./models".to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_min_similarity() -> f32 {
    DEFAULT_MIN_SIMILARITY
}

fn default_count() -> usize {
    DEFAULT_COUNT
}

fn max_count() -> usize {
    MAX_COUNT
}

fn default_max_content_length() -> usize {
    DEFAULT_MAX_CONTENT_LENGTH
}

fn default_tag_snapshot() -> String {
    "tag_vectors.bin".to_string()
}

fn default_cluster_snapshot() -> String {
    "tag_clusters.bin".to_string()
}

fn default_keyword_model() -> String {
    DEFAULT_KEYWORD_MODEL.to_string()
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn max_top_k() -> usize {
    MAX_TOP_K
}

fn default_keyword_snapshot() -> String {
    "keyword_vectors.bin".to_string()
}

impl Config {
    /// Load `config.yaml` from `base_path`, creating it with defaults when
    /// missing, then apply environment overrides and validate.
    pub fn load_with(base_path: &str) -> anyhow::Result<Self> {
        let config_path = Path::new(base_path).join("config.yaml");

        if !config_path.exists() {
            std::fs::create_dir_all(base_path)
                .with_context(|| format!("failed to create config directory {}", base_path))?;
            std::fs::write(&config_path, serde_yml::to_string(&Self::default())?)
                .with_context(|| format!("failed to write {}", config_path.display()))?;
        }

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let mut config: Self =
            serde_yml::from_str(&config_str).context("config.yaml is malformed")?;

        // snapshots live next to config.yaml unless the file says otherwise
        if config.data_path == default_data_path() {
            config.data_path = base_path.to_string();
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("TAGREC_DATA_PATH") {
            self.data_path = path;
        }
        if let Ok(path) = std::env::var("TAGREC_MODEL_CACHE") {
            self.model_cache_path = path;
        }
        if let Ok(url) = std::env::var("TAGREC_BACKEND_URL") {
            self.backend_url = Some(url);
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        let rec = &self.recommend;
        if !(0.0..=1.0).contains(&rec.min_similarity) {
            anyhow::bail!(
                "recommend.min_similarity must be between 0.0 and 1.0, got {}",
                rec.min_similarity
            );
        }
        if rec.default_count == 0 || rec.default_count > rec.max_count {
            anyhow::bail!(
                "recommend.default_count must be in 1..={}, got {}",
                rec.max_count,
                rec.default_count
            );
        }
        if rec.default_max_content_length == 0 {
            anyhow::bail!("recommend.default_max_content_length must be greater than 0");
        }

        let kw = &self.keyword_search;
        if kw.default_top_k == 0 || kw.default_top_k > kw.max_top_k {
            anyhow::bail!(
                "keyword_search.default_top_k must be in 1..={}, got {}",
                kw.max_top_k,
                kw.default_top_k
            );
        }

        if let Some(url) = &self.backend_url {
            url::Url::parse(url).with_context(|| format!("backend_url is invalid: {}", url))?;
        }

        Ok(())
    }

    pub fn tag_snapshot_path(&self) -> PathBuf {
        Path::new(&self.data_path).join(&self.recommend.tag_snapshot)
    }

    pub fn cluster_snapshot_path(&self) -> PathBuf {
        Path::new(&self.data_path).join(&self.recommend.cluster_snapshot)
    }

    pub fn keyword_snapshot_path(&self) -> PathBuf {
        Path::new(&self.data_path).join(&self.keyword_search.keyword_snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.recommend.default_count, 5);
        assert_eq!(config.recommend.max_count, 20);
        assert!((config.recommend.min_similarity - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.recommend.default_max_content_length, 500);
        assert_eq!(config.keyword_search.default_top_k, 10);
        assert_eq!(config.keyword_search.max_top_k, 50);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_with(dir.path().to_str().unwrap()).unwrap();
        assert!(dir.path().join("config.yaml").exists());
        assert_eq!(config.port, 8000);
    }

    #[test]
    fn test_data_path_anchored_to_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_with(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(
            config.tag_snapshot_path(),
            dir.path().join("tag_vectors.bin")
        );
    }

    #[test]
    fn test_partial_file_gets_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.yaml"), "port: 9000\n").unwrap();
        let config = Config::load_with(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.recommend.default_count, 5);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.yaml"),
            "recommend:\n  min_similarity: 1.5\n",
        )
        .unwrap();
        assert!(Config::load_with(dir.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn test_invalid_backend_url_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.yaml"), "backend_url: 'not a url'\n").unwrap();
        assert!(Config::load_with(dir.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn test_snapshot_paths() {
        let mut config = Config::default();
        config.data_path = "/srv/tagrec".to_string();
        assert_eq!(
            config.tag_snapshot_path(),
            PathBuf::from("/srv/tagrec/tag_vectors.bin")
        );
    }
}
