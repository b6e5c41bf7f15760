//! docsum CLI - Command-line interface
//!
//! Usage:
//!   docsum ingest <dir>
//!   docsum query <text> [-k 3]
//!   docsum summarize <path> [--method refine]
//!   docsum evaluate --summaries <file>
//!   docsum run <dir> [--query <text>]

mod context;
mod pipeline;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _};
use clap::{Args, Parser, Subcommand};
use docsum_core::{AppConfig, IndexingSetting, LoggingConfig, SummaryMethod};
use docsum_eval::ReferenceSummaries;
use docsum_parser::{discover_documents, DocumentLoader};
use tracing_subscriber::EnvFilter;

use crate::context::AppContext;
use crate::pipeline::{DocumentSummary, RunReport};

#[derive(Parser)]
#[command(name = "docsum")]
#[command(about = "Index, retrieve and summarize document collections")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level or filter directive (overrides config)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct CorpusArgs {
    /// File or directory of documents
    path: PathBuf,

    /// Extension scanned for when `path` is a directory
    #[arg(long, default_value = "pdf")]
    extension: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed documents into a collection
    Ingest {
        #[command(flatten)]
        corpus: CorpusArgs,

        /// Target collection
        #[arg(long)]
        collection: Option<String>,

        /// Index one vector per chunk instead of per document
        #[arg(long)]
        chunked: bool,
    },
    /// Find the documents closest to a text
    Query {
        /// Query text
        text: String,

        /// Number of results
        #[arg(short, default_value_t = 3)]
        k: usize,

        /// Collection to search
        #[arg(long)]
        collection: Option<String>,
    },
    /// Summarize documents
    Summarize {
        #[command(flatten)]
        corpus: CorpusArgs,

        /// map-reduce or refine
        #[arg(long)]
        method: Option<SummaryMethod>,

        /// Write summaries as JSON to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Score saved summaries against references
    Evaluate {
        /// JSON file written by `summarize --output`
        #[arg(long)]
        summaries: PathBuf,

        /// Reference summaries (overrides config)
        #[arg(long)]
        references: Option<PathBuf>,
    },
    /// Ingest, optionally query, summarize and evaluate in one pass
    Run {
        #[command(flatten)]
        corpus: CorpusArgs,

        #[arg(long)]
        collection: Option<String>,

        #[arg(long)]
        method: Option<SummaryMethod>,

        /// Query to run after indexing
        #[arg(long)]
        query: Option<String>,

        #[arg(short, default_value_t = 3)]
        k: usize,

        #[arg(long)]
        references: Option<PathBuf>,

        /// Write the full report as JSON to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    apply_cli_overrides(cli, &mut config);
    Ok(config)
}

/// Global flags take precedence over file and environment settings
fn apply_cli_overrides(cli: &Cli, config: &mut AppConfig) {
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.json_logs {
        config.logging.json_format = true;
    }
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    if config.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn corpus_paths(corpus: &CorpusArgs) -> anyhow::Result<(PathBuf, Vec<PathBuf>)> {
    let path = &corpus.path;
    if path.is_file() {
        let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
        return Ok((root, vec![path.clone()]));
    }
    let paths = discover_documents(path, &corpus.extension)
        .with_context(|| format!("scanning {}", path.display()))?;
    if paths.is_empty() {
        bail!("no .{} documents under {}", corpus.extension, path.display());
    }
    Ok((path.clone(), paths))
}

fn write_json(path: &Path, value: &impl serde::Serialize) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(path = %path.display(), "output written");
    Ok(())
}

fn references(ctx: &AppContext, explicit: Option<&Path>) -> anyhow::Result<Option<ReferenceSummaries>> {
    let path = explicit.or(ctx.config.evaluation.references_path.as_deref());
    path.map(ReferenceSummaries::from_file)
        .transpose()
        .map_err(Into::into)
}

fn print_skipped(report: &RunReport) {
    for skipped in &report.skipped {
        println!("  skipped [{}] {}: {}", skipped.stage, skipped.path, skipped.reason);
    }
}

fn print_summaries(summaries: &[DocumentSummary]) {
    for item in summaries {
        println!("== {} ({})", item.summary.source_document_id, item.summary.method);
        println!("{}\n", item.summary.text);
    }
}

fn print_scores(report: &RunReport) {
    for eval in &report.evaluations {
        let [r1, r2, rl] = eval.score.fmeasures();
        println!(
            "{}: rouge1={r1:.4} rouge2={r2:.4} rougeL={rl:.4} bert_score={:.4}",
            eval.document_id, eval.score.bert_score
        );
    }
    if let Some(mean) = report.mean_score() {
        let [r1, r2, rl] = mean.fmeasures();
        println!(
            "mean: rouge1={r1:.4} rouge2={r2:.4} rougeL={rl:.4} bert_score={:.4}",
            mean.bert_score
        );
    }
}

async fn query(ctx: &mut AppContext, collection: &str, text: &str, k: usize) -> anyhow::Result<()> {
    let index = ctx.index().await?;
    let hits = index.query(collection, text, k).await?;
    if hits.is_empty() {
        println!("no results in {collection}");
    }
    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.4}] {} {}",
            rank + 1,
            hit.distance,
            hit.document.id,
            hit.document.title
        );
    }
    Ok(())
}

async fn execute(ctx: &mut AppContext, command: Commands) -> anyhow::Result<()> {
    let progress = ctx.progress.clone();
    let default_collection = ctx.config.store.collection.clone();

    match command {
        Commands::Ingest {
            corpus,
            collection,
            chunked,
        } => {
            if chunked {
                ctx.config.store.indexing = IndexingSetting::Chunk;
            }
            let collection = collection.unwrap_or(default_collection);
            let (root, paths) = corpus_paths(&corpus)?;
            let loader = DocumentLoader::new().with_root(root);

            let mut report = RunReport::default();
            let (loaded, skipped) = pipeline::load_documents(&loader, &paths, progress.as_ref());
            report.loaded = loaded.len();
            report.skipped.extend(skipped);

            let index = ctx.index().await?;
            index.open_or_create_collection(&collection).await?;
            let (indexed, skipped) =
                pipeline::index_documents(&index, &collection, &loaded, progress.as_ref()).await;
            report.indexed = indexed;
            report.skipped.extend(skipped);

            println!(
                "indexed {} vectors from {} documents into {collection}",
                report.indexed, report.loaded
            );
            print_skipped(&report);
        }
        Commands::Query {
            text,
            k,
            collection,
        } => {
            let collection = collection.unwrap_or(default_collection);
            query(ctx, &collection, &text, k).await?;
        }
        Commands::Summarize {
            corpus,
            method,
            output,
        } => {
            let method = method.unwrap_or(ctx.config.summarizer.method);
            let (root, paths) = corpus_paths(&corpus)?;
            let loader = DocumentLoader::new().with_root(root);

            let mut report = RunReport::default();
            let (loaded, skipped) = pipeline::load_documents(&loader, &paths, progress.as_ref());
            report.loaded = loaded.len();
            report.skipped.extend(skipped);

            let summarizer = ctx.summarizer()?;
            let chunker = ctx.chunker()?;
            let (summaries, skipped) = pipeline::summarize_documents(
                &summarizer,
                &chunker,
                &loaded,
                method,
                progress.as_ref(),
            )
            .await;
            report.summaries = summaries;
            report.skipped.extend(skipped);

            print_summaries(&report.summaries);
            print_skipped(&report);
            if let Some(output) = output {
                write_json(&output, &report.summaries)?;
            }
        }
        Commands::Evaluate {
            summaries,
            references: reference_path,
        } => {
            let Some(references) = references(ctx, reference_path.as_deref())? else {
                bail!("no reference summaries: pass --references or set evaluation.references_path");
            };
            let content = std::fs::read_to_string(&summaries)
                .with_context(|| format!("reading {}", summaries.display()))?;
            let summaries: Vec<DocumentSummary> = serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", summaries.display()))?;

            let evaluator = ctx.evaluator()?;
            let mut report = RunReport::default();
            let (evaluations, skipped) = pipeline::evaluate_summaries(
                &evaluator,
                &summaries,
                &references,
                progress.as_ref(),
            )
            .await;
            report.evaluations = evaluations;
            report.skipped.extend(skipped);

            print_scores(&report);
            print_skipped(&report);
        }
        Commands::Run {
            corpus,
            collection,
            method,
            query: query_text,
            k,
            references: reference_path,
            output,
        } => {
            let collection = collection.unwrap_or(default_collection);
            let method = method.unwrap_or(ctx.config.summarizer.method);
            let references = references(ctx, reference_path.as_deref())?;
            let (root, paths) = corpus_paths(&corpus)?;
            let loader = DocumentLoader::new().with_root(root);

            let mut report = RunReport::default();
            let (loaded, skipped) = pipeline::load_documents(&loader, &paths, progress.as_ref());
            report.loaded = loaded.len();
            report.skipped.extend(skipped);

            let index = ctx.index().await?;
            index.open_or_create_collection(&collection).await?;
            let (indexed, skipped) =
                pipeline::index_documents(&index, &collection, &loaded, progress.as_ref()).await;
            report.indexed = indexed;
            report.skipped.extend(skipped);

            if let Some(text) = query_text {
                query(ctx, &collection, &text, k).await?;
            }

            let summarizer = ctx.summarizer()?;
            let chunker = ctx.chunker()?;
            let (summaries, skipped) = pipeline::summarize_documents(
                &summarizer,
                &chunker,
                &loaded,
                method,
                progress.as_ref(),
            )
            .await;
            report.summaries = summaries;
            report.skipped.extend(skipped);
            print_summaries(&report.summaries);

            if let Some(references) = references {
                let evaluator = ctx.evaluator()?;
                let (evaluations, skipped) = pipeline::evaluate_summaries(
                    &evaluator,
                    &report.summaries,
                    &references,
                    progress.as_ref(),
                )
                .await;
                report.evaluations = evaluations;
                report.skipped.extend(skipped);
                print_scores(&report);
            }

            println!(
                "loaded {}, indexed {}, summarized {}, evaluated {}, skipped {}",
                report.loaded,
                report.indexed,
                report.summaries.len(),
                report.evaluations.len(),
                report.skipped.len()
            );
            print_skipped(&report);
            if let Some(output) = output {
                write_json(&output, &report)?;
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(&config.logging);
    config.validate()?;

    tracing::debug!(
        backend = ?config.store.backend,
        collection = %config.store.collection,
        llm = ?config.llm.provider,
        "configuration loaded"
    );

    let mut ctx = AppContext::new(config);
    let result = execute(&mut ctx, cli.command).await;
    let closed = ctx.shutdown().await;
    result.and(closed)
}
