//! Recall CLI - for trying the retrieval pipeline against local documents
//!
//! # Commands
//!
//! ```bash
//! # Split a document and preview the chunks
//! recall chunk docs/voids.md
//!
//! # Index a directory in memory and search it (reranking on by default)
//! recall search docs/ "cashier can't void an order"
//!
//! # Search without loading the cross-encoder
//! recall search docs/ "printer offline" --no-rerank
//!
//! # Print the effective configuration
//! recall config --config recall.toml
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use recall_lib::{
    config::PipelineConfig,
    embed::BgeEmbedder,
    expand::{OllamaConfig, OllamaGenerator, TextGenerator},
    index::EmbeddedIndex,
    ingest::Splitter,
    pipeline::Pipeline,
    rerank::{BgeReranker, RelevanceScorer},
    result::{SearchResult, SearchStatus},
    store::MemoryStore,
};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

type Index = EmbeddedIndex<BgeEmbedder, MemoryStore>;

#[derive(Parser)]
#[command(name = "recall")]
#[command(about = "Retrieval and reranking over a troubleshooting knowledge base")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a document into chunks and preview them
    Chunk {
        /// Input file to split
        input: PathBuf,

        /// Window size in bytes
        #[arg(long, default_value = "2000")]
        size: usize,

        /// Overlap between windows in bytes
        #[arg(long, default_value = "200")]
        overlap: usize,
    },

    /// Index a file or directory in memory and search it
    Search {
        /// File or directory of Markdown/text documents
        corpus: PathBuf,

        /// Query to search for
        query: String,

        #[command(flatten)]
        options: SearchOptions,

        /// Ollama server used for expansion
        #[arg(long)]
        ollama_url: Option<String>,

        /// Ollama model used for expansion
        #[arg(long)]
        ollama_model: Option<String>,
    },

    /// Print the effective configuration as TOML
    Config {
        #[command(flatten)]
        options: SearchOptions,
    },
}

/// Pipeline settings; flags override the config file.
#[derive(Args)]
struct SearchOptions {
    /// TOML file with pipeline settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of results to return
    #[arg(short, long)]
    n: Option<usize>,

    /// Number of candidates to retrieve per query variant
    #[arg(short, long)]
    k: Option<usize>,

    /// Maximum distance for a candidate to count as relevant
    #[arg(long)]
    threshold: Option<f32>,

    /// Enable reranking (two-stage retrieval with cross-encoder)
    #[arg(short, long, conflicts_with = "no_rerank")]
    rerank: bool,

    /// Disable reranking, even if the config file enables it
    #[arg(long)]
    no_rerank: bool,

    /// Enable query expansion through Ollama
    #[arg(short, long)]
    expand: bool,

    /// Add a hypothetical answer as a query variant
    #[arg(long)]
    hyde: bool,

    /// Give up on a search after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
}

impl SearchOptions {
    fn resolve(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(n) = self.n {
            config.return_n = n;
        }
        if let Some(k) = self.k {
            config.retrieve_k = k;
        }
        if let Some(threshold) = self.threshold {
            config.distance_threshold = Some(threshold);
        }
        if self.rerank {
            config.enable_reranking = true;
        }
        if self.no_rerank {
            config.enable_reranking = false;
        }
        if self.expand {
            config.enable_expansion = true;
        }
        if self.hyde {
            config.enable_hyde = true;
        }
        if self.timeout_ms.is_some() {
            config.timeout_ms = self.timeout_ms;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Chunk {
            input,
            size,
            overlap,
        } => {
            let splitter = Splitter::new(size, overlap)?;
            let documents = splitter.load_path(&input)?;

            println!("Split '{}' into {} chunks:\n", input.display(), documents.len());
            for document in &documents {
                println!("--- {} ({}B) ---", document.id, document.text.len());
                let preview: String = document.text.chars().take(200).collect();
                let ellipsis = if document.text.chars().count() > 200 { "..." } else { "" };
                println!("{preview}{ellipsis}\n");
            }
        }

        Commands::Search {
            corpus,
            query,
            options,
            ollama_url,
            ollama_model,
        } => {
            let config = options.resolve()?;

            println!("Loading '{}'...", corpus.display());
            let documents = Splitter::default().load_path(&corpus)?;
            println!("Created {} chunks", documents.len());

            println!("\nLoading BGE model (first run downloads the model)...");
            let index = EmbeddedIndex::new(BgeEmbedder::new()?, MemoryStore::new());
            println!("Indexing {} chunks...", documents.len());
            index.index(&documents)?;
            println!("Done! Index contains {} chunks", index.len());

            let generator = if config.enable_expansion || config.enable_hyde {
                let mut ollama = OllamaConfig::default();
                if let Some(url) = ollama_url {
                    ollama.endpoint = url;
                }
                if let Some(model) = ollama_model {
                    ollama.model = model;
                }
                Some(OllamaGenerator::new(ollama)?)
            } else {
                None
            };

            let reranker = if config.enable_reranking {
                println!("Loading reranker model...");
                Some(BgeReranker::new()?)
            } else {
                None
            };

            println!("\nSearching: '{query}'");
            let pipeline = Pipeline::new(index, config)?;
            let result = match (reranker, generator) {
                (Some(reranker), Some(generator)) => {
                    run(&pipeline.with_reranker(reranker).with_expansion(generator), &query).await
                }
                (Some(reranker), None) => run(&pipeline.with_reranker(reranker), &query).await,
                (None, Some(generator)) => run(&pipeline.with_expansion(generator), &query).await,
                (None, None) => run(&pipeline, &query).await,
            }?;

            print_result(&result);
        }

        Commands::Config { options } => {
            print!("{}", options.resolve()?.to_toml_string()?);
        }
    }

    Ok(())
}

/// Run one search, cancelling it on Ctrl-C.
async fn run<R, G>(pipeline: &Pipeline<Index, R, G>, query: &str) -> Result<SearchResult>
where
    R: RelevanceScorer,
    G: TextGenerator,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    Ok(pipeline.search_cancellable(query, shutdown_rx).await?)
}

fn print_result(result: &SearchResult) {
    if result.variants.len() > 1 {
        println!("Variants searched:");
        for variant in &result.variants {
            println!("  - {variant}");
        }
    }

    println!("\n=== Results ({:?} order) ===\n", result.ranking);
    for (i, candidate) in result.candidates.iter().enumerate() {
        print!(
            "#{} {} [{}, {:.0}% similar, distance {:.4}",
            i + 1,
            candidate.doc_id,
            candidate.band(),
            candidate.similarity_pct(),
            candidate.distance
        );
        match candidate.relevance {
            Some(score) => println!(", score {score:.4}]"),
            None => println!("]"),
        }
        println!("---");
        let preview: String = candidate.text.chars().take(300).collect();
        let ellipsis = if candidate.text.chars().count() > 300 { "..." } else { "" };
        println!("{preview}{ellipsis}\n");
    }

    match result.status() {
        SearchStatus::Found => {}
        SearchStatus::NothingRelevant => println!("Nothing relevant found."),
        SearchStatus::Degraded => println!("No results: search ran in degraded mode."),
    }
    for degradation in &result.degradations {
        println!("warning: {degradation}");
    }
}
