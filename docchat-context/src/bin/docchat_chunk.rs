use clap::Parser;
use docchat_context::{Chunker, ChunkingMethod, ChunkingParams, read_document};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Compare every chunking method on one document.
///
/// Writes `{stem}_{method}_chunks.txt` for each method plus a
/// `{stem}_summary.json` comparing them.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input file (txt, pdf or csv)
    input_file: PathBuf,

    /// Directory where the chunk files are written
    output_dir: PathBuf,

    /// Maximum chunk size in tokens
    #[arg(long, default_value_t = 512)]
    chunk_size: usize,

    /// Overlap for sliding window chunking
    #[arg(long, default_value_t = 256)]
    stride: usize,

    /// Number of topics for topic-based chunking
    #[arg(long, default_value_t = 5)]
    num_topics: usize,

    /// HuggingFace tokenizer.json to count tokens with (needs the hf-tokenizers feature)
    #[arg(long)]
    tokenizer: Option<PathBuf>,
}

#[derive(Serialize, Debug, PartialEq)]
struct ChunkStatistics {
    num_chunks: usize,
    avg_chunk_length: f64,
    min_chunk_length: usize,
    max_chunk_length: usize,
    std_dev_length: f64,
}

/// Word-count statistics, rounded to two decimals.
fn chunk_statistics(chunks: &[String]) -> ChunkStatistics {
    let lengths: Vec<usize> = chunks.iter().map(|c| c.split_whitespace().count()).collect();
    if lengths.is_empty() {
        return ChunkStatistics {
            num_chunks: 0,
            avg_chunk_length: 0.0,
            min_chunk_length: 0,
            max_chunk_length: 0,
            std_dev_length: 0.0,
        };
    }

    let n = lengths.len() as f64;
    let mean = lengths.iter().sum::<usize>() as f64 / n;
    let std_dev = if lengths.len() > 1 {
        let variance = lengths
            .iter()
            .map(|&l| (l as f64 - mean).powi(2))
            .sum::<f64>()
            / (n - 1.0);
        variance.sqrt()
    } else {
        0.0
    };

    ChunkStatistics {
        num_chunks: lengths.len(),
        avg_chunk_length: round2(mean),
        min_chunk_length: lengths.iter().copied().min().unwrap_or(0),
        max_chunk_length: lengths.iter().copied().max().unwrap_or(0),
        std_dev_length: round2(std_dev),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn render_chunks(chunks: &[String], stats: &ChunkStatistics) -> anyhow::Result<String> {
    let mut out = String::from("=== Chunk Statistics ===\n");
    let stats = serde_json::to_value(stats)?;
    if let Some(fields) = stats.as_object() {
        for (key, value) in fields {
            writeln!(out, "{key}: {value}")?;
        }
    }
    out.push_str("\n=== Chunks ===\n\n");
    for (i, chunk) in chunks.iter().enumerate() {
        write!(out, "--- Chunk {} ---\n{chunk}\n\n", i + 1)?;
    }
    Ok(out)
}

fn build_chunker(tokenizer: Option<&Path>) -> anyhow::Result<Chunker> {
    match tokenizer {
        None => Ok(Chunker::new()),
        #[cfg(feature = "hf-tokenizers")]
        Some(path) => {
            let tokenizer = docchat_context::nlp::HfTokenizer::from_file(path)?;
            Ok(Chunker::new().with_tokenizer(std::sync::Arc::new(tokenizer)))
        }
        #[cfg(not(feature = "hf-tokenizers"))]
        Some(path) => anyhow::bail!(
            "--tokenizer {} requires the hf-tokenizers feature",
            path.display()
        ),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let text = read_document(&args.input_file)?;
    fs::create_dir_all(&args.output_dir)?;

    let stem = args
        .input_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let params = ChunkingParams::default()
        .with_chunk_size(args.chunk_size)
        .with_stride(args.stride)
        .with_num_topics(args.num_topics);
    let chunker = build_chunker(args.tokenizer.as_deref())?;

    let mut summary = BTreeMap::new();
    for method in ChunkingMethod::ALL {
        tracing::info!("Running {method} chunking");
        let chunks = match chunker.chunk_text(&text, method, &params) {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::error!("{method} chunking failed: {e}");
                continue;
            }
        };
        let stats = chunk_statistics(&chunks);
        let path = args.output_dir.join(format!("{stem}_{method}_chunks.txt"));
        fs::write(&path, render_chunks(&chunks, &stats)?)?;
        tracing::info!("Wrote {} chunks to {}", stats.num_chunks, path.display());
        summary.insert(method.to_string(), stats);
    }

    let summary_path = args.output_dir.join(format!("{stem}_summary.json"));
    fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_use_word_counts() {
        let chunks = vec!["one two three".to_string(), "four".to_string()];
        let stats = chunk_statistics(&chunks);
        assert_eq!(stats.num_chunks, 2);
        assert_eq!(stats.avg_chunk_length, 2.0);
        assert_eq!(stats.min_chunk_length, 1);
        assert_eq!(stats.max_chunk_length, 3);
        assert_eq!(stats.std_dev_length, 1.41);
    }

    #[test]
    fn test_statistics_for_single_and_no_chunks() {
        assert_eq!(chunk_statistics(&["a b".to_string()]).std_dev_length, 0.0);
        assert_eq!(chunk_statistics(&[]).num_chunks, 0);
    }
}
