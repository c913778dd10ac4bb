//! Builds snapshot files from JSON exports.
//!
//! The service itself never embeds catalog entries; it only loads finished
//! snapshots. This module is the offline half: read a JSON export, embed
//! every text in one batch, write the snapshot atomically.

use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

use crate::config::Config;
use crate::recommend::embeddings::EmbeddingModel;
use crate::recommend::storage::{ClusterEntry, ClusterSnapshot, VectorEntry, VectorSnapshot};
use crate::recommend::TextEncoder;

#[derive(Debug, Deserialize)]
struct TagRecord {
    id: u64,
    text: String,
}

#[derive(Debug, Deserialize)]
struct ClusterRecord {
    tag_id: u64,
    parent_key_id: u64,
    #[serde(default)]
    sentiment: String,
    text: String,
}

fn read_records<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is malformed", path.display()))
}

/// Embed a tag export and write the tag catalog snapshot.
pub fn build_tag_snapshot(config: &Config, input: &Path) -> anyhow::Result<usize> {
    let records: Vec<TagRecord> = read_records(input)?;
    let model = embedding_model(config, &config.recommend.model)?;

    let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
    let embeddings = model.encode_batch(&texts)?;

    let entries: Vec<VectorEntry> = records
        .into_iter()
        .zip(embeddings)
        .map(|(record, embedding)| (record.id, record.text, embedding))
        .collect();

    let snapshot = VectorSnapshot::new(config.tag_snapshot_path());
    snapshot.save(&model.model_id_hash(), model.dimensions(), &entries)?;
    log::info!(
        "wrote {} tag vectors to {}",
        entries.len(),
        snapshot.path().display()
    );
    Ok(entries.len())
}

/// Embed a cluster-member export and write the cluster snapshot.
///
/// Member order in the export is preserved; it drives the rank decay of
/// the dual strategy at serving time.
pub fn build_cluster_snapshot(config: &Config, input: &Path) -> anyhow::Result<usize> {
    let records: Vec<ClusterRecord> = read_records(input)?;
    let model = embedding_model(config, &config.recommend.model)?;

    let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
    let embeddings = model.encode_batch(&texts)?;

    let entries: Vec<ClusterEntry> = records
        .into_iter()
        .zip(embeddings)
        .map(|(record, embedding)| {
            (
                record.tag_id,
                record.parent_key_id,
                record.sentiment,
                record.text,
                embedding,
            )
        })
        .collect();

    let snapshot = ClusterSnapshot::new(config.cluster_snapshot_path());
    snapshot.save(&model.model_id_hash(), model.dimensions(), &entries)?;
    log::info!(
        "wrote {} cluster members to {}",
        entries.len(),
        snapshot.path().display()
    );
    Ok(entries.len())
}

/// Embed a keyword export and write the keyword search snapshot. Uses the
/// keyword search model, not the recommendation model.
pub fn build_keyword_snapshot(config: &Config, input: &Path) -> anyhow::Result<usize> {
    let records: Vec<TagRecord> = read_records(input)?;
    let model = embedding_model(config, &config.keyword_search.model)?;

    let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
    let embeddings = model.encode_batch(&texts)?;

    let entries: Vec<VectorEntry> = records
        .into_iter()
        .zip(embeddings)
        .map(|(record, embedding)| (record.id, record.text, embedding))
        .collect();

    let snapshot = VectorSnapshot::new(config.keyword_snapshot_path());
    snapshot.save(&model.model_id_hash(), model.dimensions(), &entries)?;
    log::info!(
        "wrote {} keyword vectors to {}",
        entries.len(),
        snapshot.path().display()
    );
    Ok(entries.len())
}

fn embedding_model(config: &Config, name: &str) -> anyhow::Result<EmbeddingModel> {
    EmbeddingModel::new(name, std::path::PathBuf::from(&config.model_cache_path))
        .with_context(|| format!("failed to initialize embedding model '{name}'"))
}
