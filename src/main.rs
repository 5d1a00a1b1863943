use clap::{Parser, Subcommand};
use medsearch::Result;
use medsearch::commands::{
    download, embed_collection, ingest, run_search, show_config, show_status, upload,
};
use medsearch::search::SearchMethod;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "medsearch")]
#[command(about = "Hybrid keyword and embedding search over biomedical document collections")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest documents from a JSONL file into a collection
    Ingest {
        /// Target collection name
        collection: String,
        /// Path to a JSONL file of documents with key, body, and optional metadata
        file: PathBuf,
    },
    /// Backfill embeddings for a collection
    Embed {
        /// Collection to embed
        collection: String,
        /// Override the embedding provider (openai, azure, huggingface, ollama)
        #[arg(long)]
        provider: Option<String>,
        /// Override the embedding model
        #[arg(long)]
        model: Option<String>,
    },
    /// Search a collection
    Search {
        /// Collection to search
        collection: String,
        /// Query text
        query: String,
        /// Search method: keyword, embedding, or hybrid
        #[arg(long, default_value = "hybrid")]
        method: String,
        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
        /// Override the embedding provider for the query
        #[arg(long)]
        provider: Option<String>,
        /// Override the embedding model for the query
        #[arg(long)]
        model: Option<String>,
    },
    /// Show collections and their store/index consistency
    Status,
    /// Push the store and a collection's index snapshot to a remote repo
    Upload {
        /// Collection to upload
        collection: String,
        /// Remote repository, e.g. "org/datasets"
        repo: String,
        /// Sync endpoint base URL (falls back to MEDSEARCH_SYNC_ENDPOINT)
        #[arg(long)]
        endpoint: Option<String>,
        /// Mark the uploaded snapshot as publicly visible
        #[arg(long)]
        public: bool,
        /// Commit message attached to the upload
        #[arg(long)]
        message: Option<String>,
    },
    /// Fetch the store and a collection's index snapshot from a remote repo
    Download {
        /// Remote repository, e.g. "org/datasets"
        repo: String,
        /// Collection to download
        collection: String,
        /// Sync endpoint base URL (falls back to MEDSEARCH_SYNC_ENDPOINT)
        #[arg(long)]
        endpoint: Option<String>,
    },
    /// Show the active configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest { collection, file } => {
            ingest(&collection, &file).await?;
        }
        Commands::Embed {
            collection,
            provider,
            model,
        } => {
            embed_collection(&collection, provider.as_deref(), model.as_deref()).await?;
        }
        Commands::Search {
            collection,
            query,
            method,
            limit,
            provider,
            model,
        } => {
            let method: SearchMethod = method.parse()?;
            run_search(
                &collection,
                &query,
                method,
                limit,
                provider.as_deref(),
                model.as_deref(),
            )
            .await?;
        }
        Commands::Status => {
            show_status().await?;
        }
        Commands::Upload {
            collection,
            repo,
            endpoint,
            public,
            message,
        } => {
            upload(
                &collection,
                &repo,
                endpoint.as_deref(),
                !public,
                message.as_deref(),
            )
            .await?;
        }
        Commands::Download {
            repo,
            collection,
            endpoint,
        } => {
            download(&repo, &collection, endpoint.as_deref()).await?;
        }
        Commands::Config => {
            show_config()?;
        }
    }

    Ok(())
}
