use clap::{Parser, Subcommand};

mod app;
mod config;
mod indexer;
mod keyword_search;
mod recommend;
#[cfg(test)]
mod tests;
mod web;

use config::Config;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Directory holding config.yaml and the snapshot files.
    #[clap(short, long, default_value = "data")]
    pub data: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the recommendation service.
    Serve {},

    /// Build snapshot files from JSON exports.
    Index {
        /// Tag catalog export: `[{"id": 1, "text": "#액션"}, ...]`
        #[clap(long)]
        tags: Option<String>,

        /// Cluster member export:
        /// `[{"tag_id": 10, "parent_key_id": 1, "sentiment": "positive", "text": "#설렘"}, ...]`
        #[clap(long)]
        clusters: Option<String>,

        /// Keyword export, same shape as the tag export
        #[clap(long)]
        keywords: Option<String>,
    },

    /// Print snapshot headers without starting the service.
    Inspect {},
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load_with(&args.data)?;

    match args.command {
        Command::Serve {} => {
            let ctx = app::AppContext::init(config)?;
            web::start_daemon(ctx);
            Ok(())
        }

        Command::Index {
            tags,
            clusters,
            keywords,
        } => {
            if tags.is_none() && clusters.is_none() && keywords.is_none() {
                anyhow::bail!("nothing to index: pass --tags, --clusters or --keywords");
            }
            if let Some(input) = tags {
                indexer::build_tag_snapshot(&config, std::path::Path::new(&input))?;
            }
            if let Some(input) = clusters {
                indexer::build_cluster_snapshot(&config, std::path::Path::new(&input))?;
            }
            if let Some(input) = keywords {
                indexer::build_keyword_snapshot(&config, std::path::Path::new(&input))?;
            }
            Ok(())
        }

        Command::Inspect {} => {
            for (label, path) in [
                ("tags", config.tag_snapshot_path()),
                ("clusters", config.cluster_snapshot_path()),
                ("keywords", config.keyword_snapshot_path()),
            ] {
                match recommend::storage::describe(&path) {
                    Ok(info) => println!(
                        "{label}: {} entries, {} dims, model {}, {} bytes ({})",
                        info.entry_count,
                        info.dimensions,
                        info.model_id_hex,
                        info.file_size,
                        path.display()
                    ),
                    Err(err) => println!("{label}: unreadable ({err}) ({})", path.display()),
                }
            }
            Ok(())
        }
    }
}
