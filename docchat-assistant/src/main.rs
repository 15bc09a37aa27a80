use clap::{Parser, Subcommand};
use docchat_assistant::config::AppConfig;
use docchat_assistant::{EvaluatorConfig, RagPipeline, RagQualityEvaluator, create_llm};
use docchat_embed::create_provider;
use docchat_retriever::{
    DocumentWatcher, IngestHandler, Ingestor, SqliteVectorDatabase, VectorStore, WatcherConfig,
};
use std::io::Write;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const FALLBACK_REPLY: &str = "Sorry, something went wrong while answering. Please try again later.";

/// Chat with your course documents.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults to ./docchat.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interactive question answering
    Chat {
        /// Topic collections to search; repeat for several
        #[arg(long)]
        topic: Vec<String>,
        /// Chunks taken from each selected topic
        #[arg(long)]
        results_per_topic: Option<usize>,
    },
    /// Score answers to generated questions with a judge model
    Evaluate {
        /// Documents to sample
        #[arg(long, default_value_t = 5)]
        samples: usize,
        /// Questions per document
        #[arg(long, default_value_t = 2)]
        questions: usize,
        #[arg(long, default_value = "rag_evaluation_results.json")]
        output: PathBuf,
        /// Judge model (the configured model when omitted)
        #[arg(long)]
        model: Option<String>,
        #[arg(long, default_value = "Computer_Architecture")]
        collection: String,
        #[arg(long, default_value_t = 2)]
        results_per_topic: usize,
        /// Seconds to wait before scoring
        #[arg(long, default_value_t = 60)]
        pause_secs: u64,
    },
    /// Keep the database in sync with the configured watch directory
    Watch {
        /// Empty every collection before watching
        #[arg(long)]
        flush_database: bool,
        /// Index the files already in the watch directory
        #[arg(long)]
        embed_existing: bool,
    },
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

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<VectorStore>> {
    let embedder = create_provider(&config.embedding).await?;
    let db = SqliteVectorDatabase::open(&config.store.path, embedder).await?;
    Ok(Arc::new(
        VectorStore::new(Arc::new(db)).with_default_collection(&config.store.default_collection),
    ))
}

fn build_pipeline(config: &AppConfig, store: Arc<VectorStore>) -> anyhow::Result<RagPipeline> {
    let llm = create_llm(&config.llm)?;
    info!("Using {} model {}", llm.provider_name(), llm.model());
    let mut pipeline = RagPipeline::new(store, llm)
        .with_context_limit(config.chat.context_limit)
        .with_history_depth(config.chat.history_depth);
    if let Some(prompt) = &config.chat.system_prompt {
        pipeline = pipeline.with_system_prompt(prompt.clone());
    }
    Ok(pipeline)
}

fn parse_topics(rest: &str) -> Vec<String> {
    rest.split([',', ' '])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

async fn chat(mut pipeline: RagPipeline) -> anyhow::Result<()> {
    println!("Ask a question. Commands: /topics [names], /clear, exit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "exit" | "quit" => break,
            "/clear" => {
                pipeline.clear_history();
                println!("History cleared.");
            }
            _ if line.starts_with("/topics") => {
                let topics = parse_topics(&line["/topics".len()..]);
                if topics.is_empty() {
                    pipeline.clear_selected_topics();
                    println!("Searching the default collection.");
                } else {
                    println!("Searching {}", topics.join(", "));
                    let per_topic = pipeline.results_per_topic();
                    pipeline.set_selected_topics(topics, per_topic);
                }
            }
            question => match pipeline.ask(question).await {
                Ok(answer) => println!("\n{answer}\n"),
                Err(e) => {
                    error!("Failed to answer: {e}");
                    println!("{FALLBACK_REPLY}");
                }
            },
        }
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref()).await?;
    let store = open_store(&config).await?;

    match args.command {
        Commands::Chat {
            topic,
            results_per_topic,
        } => {
            let mut pipeline = build_pipeline(&config, store)?;
            let topics = if topic.is_empty() {
                config.chat.topics.clone()
            } else {
                topic
            };
            let per_topic = results_per_topic.unwrap_or(config.chat.results_per_topic);
            pipeline.set_selected_topics(topics, per_topic);
            chat(pipeline).await
        }
        Commands::Evaluate {
            samples,
            questions,
            output,
            model,
            collection,
            results_per_topic,
            pause_secs,
        } => {
            let pipeline = build_pipeline(&config, store)?;
            let judge_config = match model {
                Some(model) => config.llm.clone().with_model(model),
                None => config.llm.clone(),
            };
            let judge = create_llm(&judge_config)?;
            let evaluator_config = EvaluatorConfig::default()
                .with_num_samples(samples)
                .with_questions_per_document(questions)
                .with_results_per_topic(results_per_topic)
                .with_collection(collection)
                .with_rate_limit_pause(Duration::from_secs(pause_secs));
            let evaluator = RagQualityEvaluator::new(judge, pipeline, evaluator_config);

            let report = evaluator.run_evaluation().await?;
            report.write_to(&output).await?;
            println!(
                "Average score {:.2} over {} questions, results in {}",
                report.summary.average_score,
                report.summary.total_questions,
                output.display()
            );
            Ok(())
        }
        Commands::Watch {
            flush_database,
            embed_existing,
        } => {
            let watch_dir = &config.watcher.watch_dir;
            tokio::fs::create_dir_all(watch_dir).await?;
            let ingestor = Arc::new(Ingestor::new(store, config.chunking.document_chunker()));
            if flush_database {
                ingestor.flush_all().await?;
            }
            if embed_existing {
                ingestor.ingest_directory(watch_dir).await?;
            } else {
                let existing = Ingestor::supported_files(watch_dir);
                info!(
                    "{} existing files left as they are (use --embed-existing to index them)",
                    existing.len()
                );
            }

            let watcher_config =
                WatcherConfig::new(watch_dir).with_debounce_ms(config.watcher.debounce_ms);
            let root = tokio::fs::canonicalize(watch_dir).await?;
            let handler = Arc::new(IngestHandler::new(ingestor, root));
            let watcher = DocumentWatcher::start(watcher_config, handler).await?;
            println!("Watching {} (Ctrl+C to stop)", watcher.root().display());

            tokio::signal::ctrl_c().await?;
            watcher.shutdown().await;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_topics() {
        assert_eq!(parse_topics(" A, B  C"), vec!["A", "B", "C"]);
        assert!(parse_topics("").is_empty());
    }

    #[test]
    fn test_args_parse_evaluate() {
        let args = Args::parse_from([
            "docchat",
            "evaluate",
            "--samples",
            "3",
            "--collection",
            "Networks",
            "--pause-secs",
            "0",
        ]);
        match args.command {
            Commands::Evaluate {
                samples,
                questions,
                collection,
                pause_secs,
                output,
                ..
            } => {
                assert_eq!(samples, 3);
                assert_eq!(questions, 2);
                assert_eq!(collection, "Networks");
                assert_eq!(pause_secs, 0);
                assert_eq!(output, PathBuf::from("rag_evaluation_results.json"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_args_parse_chat_topics() {
        let args = Args::parse_from(["docchat", "chat", "--topic", "A", "--topic", "B"]);
        match args.command {
            Commands::Chat {
                topic,
                results_per_topic,
            } => {
                assert_eq!(topic, vec!["A", "B"]);
                assert_eq!(results_per_topic, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
