use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rustyindex::config::{self, get_config};
use rustyindex::embedding::get_embedding_client;
use rustyindex::generation::OllamaGenerator;
use rustyindex::logging;
use rustyindex::pipeline::{
    BatchController, DocumentInput, DocumentOutcome, DocumentPipeline, PipelineContext,
    PipelineSettings,
};
use rustyindex::raster::PdftoppmRasterizer;
use rustyindex::registry::{DocumentRegistry, SortKey};
use rustyindex::vector_store::LocalVectorStore;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "rustyindex", about = "Checkpointed document indexing pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index one or more documents, reusing any artifacts already on disk.
    Index {
        /// PDF paths or URLs.
        #[arg(required = true)]
        paths: Vec<String>,
        /// Documents processed at once; defaults to BATCH_CONCURRENCY.
        #[arg(long)]
        max_concurrent: Option<usize>,
    },
    /// List registered documents.
    List {
        /// indexed_at, created_at, or doc_name.
        #[arg(long, default_value = "indexed_at")]
        sort_by: SortKey,
    },
    /// Show one record with its artifact sizes.
    Show {
        /// Document identifier.
        doc_id: String,
    },
    /// Print registry statistics.
    Stats,
    /// Delete a document's artifacts and registry entry.
    Delete {
        /// Document identifier.
        doc_id: String,
        /// Also delete the source document.
        #[arg(long)]
        delete_source: bool,
    },
    /// Fold the registry journal into its snapshot.
    Compact,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    config::init_config().context("failed to load configuration")?;
    let config = get_config();
    logging::init_tracing(config);
    let registry = Arc::new(
        DocumentRegistry::open(&config.registry_path).context("failed to open registry")?,
    );

    match cli.command {
        Command::Index {
            paths,
            max_concurrent,
        } => {
            let documents = paths
                .iter()
                .map(|path| {
                    DocumentInput::from_location(path)
                        .with_context(|| format!("cannot derive a document name from '{path}'"))
                })
                .collect::<Result<Vec<_>>>()?;

            let (generation_model, vision_model) = config.models()?;
            let generator =
                OllamaGenerator::new(config.ollama_url.clone(), generation_model, vision_model)?;
            let embedder = get_embedding_client(config)?;
            let ctx = PipelineContext::new(
                PipelineSettings::from_config(config),
                Arc::clone(&registry),
                Arc::new(generator),
                Arc::from(embedder),
                Arc::new(LocalVectorStore::new()),
                Arc::new(PdftoppmRasterizer::new(config.raster_dpi)),
            );
            let metrics = Arc::clone(&ctx.metrics);
            let controller = BatchController::new(Arc::new(DocumentPipeline::new(Arc::new(ctx))));
            let report = controller
                .run_batch(documents, max_concurrent.unwrap_or(config.batch_concurrency))
                .await;

            for outcome in &report.results {
                match outcome {
                    DocumentOutcome::Finished(state) => match &state.error {
                        None => println!(
                            "{}: completed (doc_id {}, ran [{}])",
                            state.doc_name(),
                            state.doc_id.as_deref().unwrap_or("-"),
                            state
                                .executed
                                .iter()
                                .map(|stage| stage.as_str())
                                .collect::<Vec<_>>()
                                .join(", ")
                        ),
                        Some(error) => println!("{}: failed: {error}", state.doc_name()),
                    },
                    DocumentOutcome::Crashed { doc_name, message } => {
                        println!("{doc_name}: crashed: {message}");
                    }
                }
            }
            println!("{}", serde_json::to_string_pretty(&metrics.snapshot())?);
            if report.failed > 0 {
                bail!("{} of {} documents failed", report.failed, report.results.len());
            }
        }
        Command::List { sort_by } => {
            for record in registry.list_all(sort_by) {
                println!(
                    "{}\t{}\t{}\t{}",
                    record.doc_id,
                    record.doc_name,
                    record.doc_type.as_str(),
                    record.indexed_at.as_deref().unwrap_or("-")
                );
            }
        }
        Command::Show { doc_id } => {
            let record = registry
                .get(&doc_id)
                .with_context(|| format!("no document with id {doc_id}"))?;
            let stats = registry.get_file_stats(&doc_id)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Stats => {
            println!("{}", serde_json::to_string_pretty(&registry.get_statistics())?);
        }
        Command::Delete {
            doc_id,
            delete_source,
        } => {
            let report = registry.delete_all_files(&doc_id, delete_source)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.success {
                bail!("some artifacts of {doc_id} could not be deleted");
            }
        }
        Command::Compact => {
            registry.compact()?;
            println!("compacted {}", registry.snapshot_path().display());
        }
    }
    Ok(())
}
