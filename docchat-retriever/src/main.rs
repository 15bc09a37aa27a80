use clap::{Parser, Subcommand};
use docchat_context::{
    Chunker, ChunkingMethod, ChunkingParams, DocumentChunker, StrategyChunker, TextFileChunker,
};
use docchat_embed::{EmbedConfig, ProviderKind, create_provider};
use docchat_retriever::{
    DocumentWatcher, IngestHandler, Ingestor, Metadata, SqliteVectorDatabase, VectorStore,
    WatcherConfig, infer_topic,
};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Index course documents into topic collections and query them.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// SQLite database holding every collection
    #[arg(long, default_value = "docchat_db/docchat.db")]
    db_path: PathBuf,

    /// Embedding provider: fastembed or hash
    #[arg(long, default_value = "fastembed")]
    embedding_provider: ProviderKind,

    /// fastembed model name
    #[arg(long)]
    embedding_model: Option<String>,

    /// Chunk text and CSV files with a token strategy instead of 1000-character windows
    #[arg(long)]
    chunking: Option<ChunkingMethod>,

    /// Token budget for --chunking
    #[arg(long, default_value_t = 512)]
    chunk_size: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch a directory and keep the database in sync with it
    Watch {
        /// Directory to watch; subdirectories become topics
        #[arg(long, default_value = "Docs")]
        watch_dir: PathBuf,
        /// Empty every collection before watching
        #[arg(long)]
        flush_database: bool,
        /// Index the files already in the watch directory
        #[arg(long)]
        embed_existing: bool,
        /// Quiet period before a changed file is re-indexed
        #[arg(long, default_value_t = 1000)]
        debounce_ms: u64,
    },
    /// Index a single file
    Add {
        file: PathBuf,
        /// Topic collection to add to (default collection when omitted)
        #[arg(long)]
        topic: Option<String>,
    },
    /// Find the chunks closest to a query
    Query {
        text: String,
        /// Topic collections to search; repeat for several
        #[arg(long)]
        topic: Vec<String>,
        /// Maximum number of results
        #[arg(short, default_value_t = 5)]
        k: usize,
        /// Results per topic when several topics are searched
        #[arg(long)]
        per_topic: Option<usize>,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Show document counts
    Stats {
        /// Limit to one collection
        #[arg(long)]
        collection: Option<String>,
    },
    /// List collection names
    Collections,
    /// Delete all documents in one collection, or in every collection
    Flush {
        #[arg(long)]
        collection: Option<String>,
    },
    /// Print stored documents
    List {
        #[arg(long, default_value = "documents")]
        collection: String,
        /// Limit number of results
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn document_chunker(args: &Args) -> Arc<dyn DocumentChunker> {
    match args.chunking {
        Some(method) => Arc::new(StrategyChunker::new(
            Chunker::new(),
            method,
            ChunkingParams::default().with_chunk_size(args.chunk_size),
        )),
        None => Arc::new(TextFileChunker::default()),
    }
}

async fn open_store(args: &Args) -> anyhow::Result<Arc<VectorStore>> {
    let mut config = EmbedConfig {
        provider: args.embedding_provider,
        ..EmbedConfig::default()
    };
    if let Some(model) = &args.embedding_model {
        config = config.with_model(model.clone());
    }
    let embedder = create_provider(&config).await?;
    let db = SqliteVectorDatabase::open(&args.db_path, embedder).await?;
    Ok(Arc::new(VectorStore::new(Arc::new(db))))
}

fn truncate(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}

fn describe(metadata: &Metadata) -> String {
    metadata
        .iter()
        .filter(|(key, _)| matches!(key.as_str(), "source_file" | "page" | "chunk_index"))
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(" ")
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let store = open_store(&args).await?;
    let ingestor = Arc::new(Ingestor::new(store.clone(), document_chunker(&args)));

    match args.command {
        Commands::Watch {
            watch_dir,
            flush_database,
            embed_existing,
            debounce_ms,
        } => {
            tokio::fs::create_dir_all(&watch_dir).await?;
            if flush_database {
                ingestor.flush_all().await?;
            }
            if embed_existing {
                ingestor.ingest_directory(&watch_dir).await?;
            } else {
                let existing = Ingestor::supported_files(&watch_dir);
                info!(
                    "{} existing files left as they are (use --embed-existing to index them)",
                    existing.len()
                );
                for path in existing {
                    let topic = infer_topic(&watch_dir, &path)
                        .unwrap_or_else(|| store.default_collection().to_string());
                    info!("  {} (topic: {topic})", path.display());
                }
            }

            let config = WatcherConfig::new(&watch_dir).with_debounce_ms(debounce_ms);
            let root = tokio::fs::canonicalize(&watch_dir).await?;
            let handler = Arc::new(IngestHandler::new(ingestor.clone(), root));
            let watcher = DocumentWatcher::start(config, handler).await?;
            println!("Watching {} (Ctrl+C to stop)", watcher.root().display());

            tokio::signal::ctrl_c().await?;
            watcher.shutdown().await;
            Ok(())
        }
        Commands::Add { file, topic } => {
            let report = ingestor
                .add_file(&file, topic.as_deref(), Metadata::new())
                .await?;
            println!(
                "Added {} chunks from {} to {}",
                report.chunks_added, report.source_file, report.collection
            );
            Ok(())
        }
        Commands::Query {
            text,
            topic,
            k,
            per_topic,
            format,
        } => {
            let results = store.query(&topic, &text, k, per_topic).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
                OutputFormat::Summary => {
                    println!("Found {} results:", results.len());
                    for (rank, hit) in results.iter().enumerate() {
                        println!(
                            "  {}. [{:.4}] {} | {} | {}",
                            rank + 1,
                            hit.distance,
                            hit.collection,
                            describe(&hit.metadata),
                            truncate(&hit.text, 100)
                        );
                    }
                }
            }
            Ok(())
        }
        Commands::Stats { collection } => {
            let collections = match collection {
                Some(name) => vec![name],
                None => store.list_collections().await?,
            };
            let mut total = 0;
            for name in &collections {
                let stats = store.stats(name).await?;
                total += stats.total_documents;
                println!("{name}: {} documents", stats.total_documents);
            }
            println!("Total: {total} documents in {} collections", collections.len());
            Ok(())
        }
        Commands::Collections => {
            for name in store.list_collections().await? {
                println!("{name}");
            }
            Ok(())
        }
        Commands::Flush { collection } => {
            let deleted = match collection {
                Some(name) => store.flush(&name).await?,
                None => ingestor.flush_all().await?,
            };
            println!("Deleted {deleted} documents");
            Ok(())
        }
        Commands::List {
            collection,
            limit,
            format,
        } => {
            let mut documents = store.get_documents(&collection, None).await?;
            documents.truncate(limit);
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&documents)?),
                OutputFormat::Summary => {
                    println!("Showing {} documents from {collection}:", documents.len());
                    for doc in documents {
                        println!(
                            "  {} | {} | {}",
                            doc.id,
                            describe(&doc.metadata),
                            truncate(&doc.text, 80)
                        );
                    }
                }
            }
            Ok(())
        }
    }
}
