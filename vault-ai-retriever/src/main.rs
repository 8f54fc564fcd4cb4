use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use vault_ai_chunk::ChunkerConfig;
use vault_ai_embed::HashEmbedProvider;
use vault_ai_retriever::retrieval::{
    BuildMode, DedupeMode, Indexer, IndexerConfig, NoteIndex, Retriever, SearchOptions,
};

/// A CLI tool to build and query the vault-ai semantic note index.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Vault root directory
    #[arg(short, long, default_value = ".")]
    vault: PathBuf,

    /// Index database path; defaults to .vault-ai.db inside the vault
    #[arg(long)]
    db: Option<PathBuf>,

    /// Embedding dimension for the hashing provider
    #[arg(long, default_value_t = 256)]
    dimension: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build or update the index
    Index {
        /// Rebuild from scratch instead of diffing against the manifest
        #[arg(long)]
        full: bool,
        /// Maximum concurrent notes
        #[arg(long, default_value_t = 4)]
        max_workers: usize,
        /// Folder names to exclude from the scan (repeatable)
        #[arg(long)]
        exclude: Vec<String>,
        /// Maximum chunk size in bytes
        #[arg(long, default_value_t = 2000)]
        max_chunk_chars: usize,
    },
    /// Search the index
    Search {
        /// Query text
        query: String,
        /// Maximum number of citations
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        /// Minimum similarity score
        #[arg(long, default_value_t = 0.0)]
        min_score: f32,
        /// Return every matching chunk instead of the best per note
        #[arg(long)]
        all_chunks: bool,
        /// Emit citations as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show index statistics
    Stats,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let db_path = args
        .db
        .clone()
        .unwrap_or_else(|| args.vault.join(".vault-ai.db"));

    let index = NoteIndex::open(&db_path).await?;
    let provider = Arc::new(HashEmbedProvider::with_dimension(args.dimension));

    match args.command {
        Commands::Index {
            full,
            max_workers,
            exclude,
            max_chunk_chars,
        } => {
            let config = IndexerConfig::new(&args.vault)
                .with_max_workers(max_workers)
                .with_excluded(exclude)
                .with_chunker(ChunkerConfig::new(max_chunk_chars, 128));
            let indexer = Indexer::new(config, index, provider);

            let mode = if full {
                BuildMode::Full
            } else {
                BuildMode::Incremental
            };
            let report = indexer.build(mode).await?;

            println!(
                "Indexed: {} added, {} changed, {} deleted, {} skipped",
                report.added, report.changed, report.deleted, report.skipped
            );
            for (path, message) in &report.errors {
                eprintln!("  failed: {path}: {message}");
            }
            if report.cancelled {
                println!("Build was cancelled before completion.");
            }
        }
        Commands::Search {
            query,
            limit,
            min_score,
            all_chunks,
            json,
        } => {
            let retriever = Retriever::new(&args.vault, index, provider);
            let options = SearchOptions::default()
                .with_limit(limit)
                .with_min_score(min_score)
                .with_dedupe(if all_chunks {
                    DedupeMode::AllChunks
                } else {
                    DedupeMode::BestPerNote
                });

            let citations = retriever.search(&query, &options).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&citations)?);
            } else if citations.is_empty() {
                println!("No results.");
            } else {
                for citation in citations {
                    let heading = if citation.heading_path.is_empty() {
                        String::from("(top of note)")
                    } else {
                        citation.heading_path.join(" > ")
                    };
                    println!(
                        "{:.3} {} [{heading}]{}",
                        citation.score,
                        citation.note_path,
                        if citation.stale { " (stale)" } else { "" }
                    );
                    for line in citation.excerpt.lines().take(3) {
                        println!("    {line}");
                    }
                }
            }
        }
        Commands::Stats => {
            let stats = index.stats().await?;
            let provider_id = index.recorded_provider().await?;
            println!("Notes:  {}", stats.notes);
            println!("Chunks: {}", stats.chunks);
            println!(
                "Provider: {}",
                provider_id.unwrap_or_else(|| "(none recorded)".into())
            );
        }
    }

    Ok(())
}
