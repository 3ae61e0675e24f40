use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, BufRead, Read};
use std::path::PathBuf;
use std::sync::Arc;

use ragstore::chunker::normalize_whitespace;
use ragstore::config::State;
use ragstore::{
    CommandGenerator, Embedder, Generator, HashEmbedder, IngestionPipeline, MissingGenerator,
    QueryPipeline, Store,
};

#[derive(Parser)]
#[command(name = "ragstore")]
#[command(version = "0.1")]
#[command(about = "Retrieval-augmented answering over a local vector store", long_about = None)]
struct Cli {
    /// Storage location, overriding `db_path` from config
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk, embed and store a plain-text document (FILE or stdin)
    Ingest {
        file: Option<PathBuf>,
        #[arg(long)]
        source_id: Option<String>,
    },
    /// Answer a question from the stored chunks (QUERY or first stdin line)
    Ask {
        query: Vec<String>,
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// List stored source documents and their chunk counts
    List,
    Config,
}

fn ingest_command(state: &State, file: Option<PathBuf>, source_id: Option<String>) -> Result<()> {
    let raw = match &file {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read '{}'", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let text = normalize_whitespace(&raw);
    if text.is_empty() {
        anyhow::bail!("Failed to extract text from the input.");
    }

    let source_id = source_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(state.dimensions));
    let pipeline = IngestionPipeline::new(embedder, state.chunker);
    let report = pipeline
        .ingest(&text, &source_id, &state.db_path)
        .with_context(|| format!("Failed to ingest into '{}'", state.db_path.display()))?;

    let output = serde_json::json!({
        "message": "File processed and stored successfully.",
        "file": file.map(|p| p.display().to_string()),
        "stored_in": state.db_path.display().to_string(),
        "report": report,
    });
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

/// `-k` overrides `top_k` and is held to the same lower bound.
fn resolve_k(state: &State, k: Option<usize>) -> Result<usize> {
    match k {
        Some(0) => anyhow::bail!("k must be at least 1."),
        Some(k) => Ok(k),
        None => Ok(state.top_k),
    }
}

fn ask_command(state: &State, query: Vec<String>, k: Option<usize>) -> Result<()> {
    let k = resolve_k(state, k)?;
    let query = if query.is_empty() {
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        line.trim().to_string()
    } else {
        query.join(" ")
    };
    if query.is_empty() {
        anyhow::bail!("Query is empty.");
    }

    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(state.dimensions));
    let generator: Arc<dyn Generator> = match state
        .generator_command
        .as_deref()
        .and_then(|c| CommandGenerator::from_command_line(c, state.generator_timeout))
    {
        Some(generator) => Arc::new(generator),
        None => Arc::new(MissingGenerator),
    };
    let pipeline = QueryPipeline::new(embedder, generator, state.top_k);
    let answer = pipeline
        .answer_with_k(&query, &state.db_path, k)
        .with_context(|| format!("Failed to answer from '{}'", state.db_path.display()))?;

    let output = serde_json::json!({
        "query": answer.query,
        "response": answer.response,
        "retrieved_chunks": answer.retrieved,
        "hits": answer.hits,
    });
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

fn list_command(state: &State) -> Result<()> {
    let store = Store::open(&state.db_path)?;
    let output = serde_json::json!({
        "db_path": store.path().display().to_string(),
        "dimension": store.dimension(),
        "record_count": store.count(),
        "sources": store.sources(),
    });
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

fn config_command(state: &State) -> Result<()> {
    state.print_config();
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let mut state = State::new()?;
    if let Some(db_path) = args.db_path {
        state.db_path = db_path;
    }
    ragstore::logging::init(state.verbose);

    match args.command {
        Commands::Ingest { file, source_id } => ingest_command(&state, file, source_id)?,
        Commands::Ask { query, k } => ask_command(&state, query, k)?,
        Commands::List => list_command(&state)?,
        Commands::Config => config_command(&state)?,
    }
    Ok(())
}
