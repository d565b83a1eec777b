//! # knowledge-rag CLI (`krag`)
//!
//! The `krag` binary exercises the knowledge search library from the
//! command line: database initialization, direct item storage, file
//! ingestion, semantic search, context assembly, and item management.
//!
//! ## Usage
//!
//! ```bash
//! krag --config ./config/krag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `krag init` | Create the SQLite database and run schema migrations |
//! | `krag store` | Store a knowledge item from text or a file |
//! | `krag ingest <file>` | Run a file through the processing pipeline |
//! | `krag search "<query>"` | Search a workspace's knowledge items |
//! | `krag context "<query>"` | Assemble model-prompt context for a query |
//! | `krag get <id>` | Show a knowledge item |
//! | `krag delete <id>` | Delete an item from both stores |
//! | `krag suggest <file>` | Suggest collections/tags for a document |

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use knowledge_rag::config::{load_config, Config};
use knowledge_rag::db;
use knowledge_rag::embedding::create_provider;
use knowledge_rag::generate::create_chat;
use knowledge_rag::index::create_index;
use knowledge_rag::ingest::{ingest_file, IngestRequest};
use knowledge_rag::migrate;
use knowledge_rag::models::{
    DocumentFile, ItemKind, KnowledgeItem, NewKnowledgeItem, ProcessOptions,
};
use knowledge_rag::processor::{DocumentProcessor, SuggestionRequest};
use knowledge_rag::rag::{RagService, SearchParams};
use knowledge_rag::store_sqlite::SqliteStore;

/// knowledge-rag CLI — workspace-isolated retrieval-augmented knowledge
/// search with a vector index and relational fallback.
#[derive(Parser)]
#[command(
    name = "krag",
    about = "Workspace-isolated retrieval-augmented knowledge search",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/krag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Store a knowledge item directly from text or a file.
    Store {
        /// Workspace the item belongs to.
        #[arg(long)]
        workspace: String,

        /// Item title.
        #[arg(long)]
        title: String,

        /// Inline content. Mutually exclusive with --file.
        #[arg(long)]
        content: Option<String>,

        /// Read content from this file (plain text).
        #[arg(long)]
        file: Option<PathBuf>,

        /// Optional collection id.
        #[arg(long)]
        collection: Option<String>,

        /// Item kind: document, note, url, or text.
        #[arg(long, default_value = "note")]
        kind: String,

        /// Comma-separated tags.
        #[arg(long)]
        tags: Option<String>,
    },

    /// Run a file through extraction + enrichment and store the result.
    Ingest {
        /// File to ingest (PDF, DOCX, XLSX, HTML, or plain text).
        file: PathBuf,

        /// Workspace the item belongs to.
        #[arg(long)]
        workspace: String,

        /// Optional collection id.
        #[arg(long)]
        collection: Option<String>,

        /// Override the item title (defaults to the file name).
        #[arg(long)]
        title: Option<String>,

        /// Skip summary generation.
        #[arg(long)]
        no_summary: bool,

        /// Skip embedding generation.
        #[arg(long)]
        no_embedding: bool,

        /// Skip keyword extraction.
        #[arg(long)]
        no_keywords: bool,
    },

    /// Search a workspace's knowledge items.
    Search {
        /// Natural-language query.
        query: String,

        /// Workspace to search in.
        #[arg(long)]
        workspace: String,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,

        /// Minimum relevance score (0.0 - 1.0).
        #[arg(long)]
        threshold: Option<f64>,

        /// Restrict to one collection.
        #[arg(long)]
        collection: Option<String>,
    },

    /// Assemble model-prompt context for a query.
    Context {
        /// Natural-language query.
        query: String,

        /// Workspace to search in.
        #[arg(long)]
        workspace: String,
    },

    /// Show a knowledge item.
    Get {
        /// Item id.
        id: String,

        /// Workspace the item belongs to.
        #[arg(long)]
        workspace: String,
    },

    /// Delete a knowledge item from both stores.
    Delete {
        /// Item id.
        id: String,
    },

    /// Suggest collections and tags for a document.
    Suggest {
        /// File to classify.
        file: PathBuf,

        /// Comma-separated existing collection names.
        #[arg(long)]
        collections: Option<String>,

        /// Document title (defaults to the file name).
        #[arg(long)]
        title: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => run_init(&config).await,
        Commands::Store {
            workspace,
            title,
            content,
            file,
            collection,
            kind,
            tags,
        } => run_store(&config, workspace, title, content, file, collection, kind, tags).await,
        Commands::Ingest {
            file,
            workspace,
            collection,
            title,
            no_summary,
            no_embedding,
            no_keywords,
        } => {
            run_ingest(
                &config,
                file,
                workspace,
                collection,
                title,
                ProcessOptions {
                    generate_summary: !no_summary,
                    generate_embedding: !no_embedding,
                    extract_keywords: !no_keywords,
                },
            )
            .await
        }
        Commands::Search {
            query,
            workspace,
            limit,
            threshold,
            collection,
        } => run_search(&config, query, workspace, limit, threshold, collection).await,
        Commands::Context { query, workspace } => run_context(&config, query, workspace).await,
        Commands::Get { id, workspace } => run_get(&config, id, workspace).await,
        Commands::Delete { id } => run_delete(&config, id).await,
        Commands::Suggest {
            file,
            collections,
            title,
        } => run_suggest(&config, file, collections, title).await,
    }
}

async fn build_service(config: &Config) -> Result<RagService> {
    let pool = db::connect(&config.db).await?;
    let store = Arc::new(SqliteStore::new(pool));
    let embeddings = create_provider(&config.embedding)?;
    let index = create_index(&config.index)?;
    Ok(RagService::new(
        embeddings,
        index,
        store,
        config.retrieval.clone(),
    ))
}

fn build_processor(config: &Config) -> Result<DocumentProcessor> {
    let embeddings = create_provider(&config.embedding)?;
    let chat = create_chat(&config.enrichment)?;
    Ok(DocumentProcessor::new(
        embeddings,
        chat,
        &config.embedding,
        config.enrichment.clone(),
    ))
}

fn read_file(path: &PathBuf) -> Result<DocumentFile> {
    let bytes = std::fs::read(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(DocumentFile {
        name,
        content_type: None,
        bytes,
    })
}

fn parse_tags(tags: Option<String>) -> Vec<String> {
    tags.map(|t| {
        t.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

async fn run_init(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db).await?;
    migrate::run_migrations(&pool).await?;
    pool.close().await;
    println!("initialized {}", config.db.path.display());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_store(
    config: &Config,
    workspace: String,
    title: String,
    content: Option<String>,
    file: Option<PathBuf>,
    collection: Option<String>,
    kind: String,
    tags: Option<String>,
) -> Result<()> {
    let kind = ItemKind::parse(&kind)
        .ok_or_else(|| anyhow::anyhow!("unknown kind: {}. Use document, note, url, or text.", kind))?;

    let content = match (content, file) {
        (Some(c), None) => c,
        (None, Some(path)) => String::from_utf8_lossy(&std::fs::read(&path)?).into_owned(),
        (Some(_), Some(_)) => bail!("--content and --file are mutually exclusive"),
        (None, None) => bail!("one of --content or --file is required"),
    };

    let service = build_service(config).await?;
    let mut new_item = NewKnowledgeItem::new(&workspace, kind, &title, &content);
    new_item.collection_id = collection;
    new_item.tags = parse_tags(tags);

    let id = service.store_knowledge_item(new_item).await?;
    println!("stored knowledge item");
    println!("  id: {}", id);
    Ok(())
}

async fn run_ingest(
    config: &Config,
    file: PathBuf,
    workspace: String,
    collection: Option<String>,
    title: Option<String>,
    options: ProcessOptions,
) -> Result<()> {
    let service = build_service(config).await?;
    let processor = build_processor(config)?;
    let payload = read_file(&file)?;

    let request = IngestRequest {
        workspace_id: workspace,
        collection_id: collection,
        kind: ItemKind::Document,
        title,
        options,
    };
    let outcome = ingest_file(&service, &processor, &payload, &request).await?;

    println!("ingest {}", payload.name);
    println!("  id:     {}", outcome.item_id);
    println!("  status: {}", outcome.status.as_str());
    println!("  words:  {}", outcome.word_count);
    Ok(())
}

async fn run_search(
    config: &Config,
    query: String,
    workspace: String,
    limit: Option<usize>,
    threshold: Option<f64>,
    collection: Option<String>,
) -> Result<()> {
    let service = build_service(config).await?;
    let params = SearchParams {
        limit,
        threshold,
        collection_id: collection,
        ..SearchParams::new(&query, &workspace)
    };
    let results = service.search_documents(&params).await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {}",
            i + 1,
            result.relevance_score,
            result.item.title
        );
        println!("    kind: {}", result.item.kind.as_str());
        if let Some(ref collection) = result.item.collection_id {
            println!("    collection: {}", collection);
        }
        println!("    excerpt: \"{}\"", result.snippet.replace('\n', " "));
        println!("    id: {}", result.item.id);
        println!();
    }
    Ok(())
}

async fn run_context(config: &Config, query: String, workspace: String) -> Result<()> {
    let service = build_service(config).await?;
    let context = service.get_rag_context(&query, &workspace).await?;

    println!("--- Sources ({}) ---", context.sources.len());
    for source in &context.sources {
        println!(
            "[{:.2}] {} ({})",
            source.relevance_score, source.item.title, source.item.id
        );
    }
    println!();
    println!("--- Summary ---");
    println!("{}", context.summary);
    Ok(())
}

async fn run_get(config: &Config, id: String, workspace: String) -> Result<()> {
    let service = build_service(config).await?;
    let item = match service.get_knowledge_item(&id, &workspace).await? {
        Some(item) => item,
        None => bail!("knowledge item not found: {}", id),
    };
    print_item(&item);
    Ok(())
}

fn print_item(item: &KnowledgeItem) {
    println!("--- Knowledge Item ---");
    println!("id:         {}", item.id);
    println!("workspace:  {}", item.workspace_id);
    println!("title:      {}", item.title);
    println!("kind:       {}", item.kind.as_str());
    println!("status:     {}", item.status.as_str());
    if let Some(ref collection) = item.collection_id {
        println!("collection: {}", collection);
    }
    if !item.tags.is_empty() {
        println!("tags:       {}", item.tags.join(", "));
    }
    println!("metadata:   {}", item.metadata);
    if let Some(ref summary) = item.summary {
        println!();
        println!("--- Summary ---");
        println!("{}", summary);
    }
    if let Some(ref content) = item.content {
        println!();
        println!("--- Content ---");
        println!("{}", content);
    }
}

async fn run_delete(config: &Config, id: String) -> Result<()> {
    let service = build_service(config).await?;
    service.delete_knowledge_item(&id).await?;
    println!("deleted {}", id);
    Ok(())
}

async fn run_suggest(
    config: &Config,
    file: PathBuf,
    collections: Option<String>,
    title: Option<String>,
) -> Result<()> {
    let processor = build_processor(config)?;
    let payload = read_file(&file)?;
    let content = knowledge_rag::extract::extract_text(&payload)?;

    let request = SuggestionRequest {
        existing_collections: parse_tags(collections),
        title: title.unwrap_or_else(|| payload.name.clone()),
        kind: ItemKind::Document,
    };
    let suggestion = processor.suggest_categories(&content, &request).await;

    println!("suggestion for {}", payload.name);
    println!("  categories: {}", suggestion.categories.join(", "));
    println!("  tags:       {}", suggestion.tags.join(", "));
    println!("  confidence: {:.2}", suggestion.confidence);
    Ok(())
}
