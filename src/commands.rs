use anyhow::{Context, Result, anyhow};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use url::Url;

use crate::config::{Config, get_config_dir};
use crate::database::consistency::{check_consistency, reconcile};
use crate::database::sqlite::{Collection, DocumentStore, NewDocument};
use crate::database::vector::VectorStore;
use crate::embeddings::Embedder;
use crate::provider::EnvSnapshot;
use crate::search::{HybridSearcher, SearchMethod};
use crate::sync::{ENV_SYNC_ENDPOINT, ENV_SYNC_TOKEN, SyncClient, UploadOptions};

fn load_config() -> Result<Config> {
    let config_dir = get_config_dir().context("Failed to locate configuration directory")?;
    Config::load(&config_dir)
}

async fn open_store(config: &Config) -> Result<DocumentStore> {
    DocumentStore::new(config.database_path())
        .await
        .context("Failed to open document store")
}

fn index_path(config: &Config, collection: &str) -> PathBuf {
    config.vectors_dir().join(format!("{collection}.vec"))
}

/// Ingest documents from a JSONL file into a collection. Each line is a JSON
/// object with `key`, `body`, and optional `metadata`.
#[inline]
pub async fn ingest(collection: &str, file: &Path) -> Result<()> {
    info!("Ingesting {} into '{}'", file.display(), collection);

    let reader = std::io::BufReader::new(
        std::fs::File::open(file)
            .with_context(|| format!("Failed to open {}", file.display()))?,
    );

    let mut docs = Vec::new();
    for (line_number, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", file.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: NewDocument = serde_json::from_str(&line)
            .with_context(|| format!("Malformed document on line {}", line_number + 1))?;
        docs.push(doc);
    }

    if docs.is_empty() {
        println!("No documents found in {}", file.display());
        return Ok(());
    }

    let config = load_config()?;
    let store = open_store(&config).await?;
    let outcome = store.insert_docs(collection, &docs).await?;
    store.close().await;

    println!("Ingested {} documents into '{}':", docs.len(), collection);
    println!("  Inserted:  {}", outcome.inserted);
    println!("  Updated:   {}", outcome.updated);
    println!("  Unchanged: {}", outcome.unchanged);
    if outcome.inserted + outcome.updated > 0 {
        println!("Run 'medsearch embed {collection}' to index the new content.");
    }

    Ok(())
}

/// Backfill embeddings for a collection: re-embed every document whose body
/// changed since its last embedding, and remove orphaned index entries.
#[inline]
pub async fn embed_collection(
    collection: &str,
    provider: Option<&str>,
    model: Option<&str>,
) -> Result<()> {
    let config = load_config()?;
    let env = EnvSnapshot::capture();
    let embedder = Embedder::from_config(&config, &env, provider, model)
        .context("Failed to construct embedding provider")?;
    embedder.ping().with_context(|| {
        format!("Embedding provider {} is not reachable", embedder.provider_model_key())
    })?;

    let store = open_store(&config).await?;
    let existing = store
        .get_collection(collection)
        .await?
        .ok_or_else(|| anyhow!("Collection not found: {collection}"))?;

    // Dimensionality is fixed by the first embedding and immutable afterwards.
    let dim = match existing.embedding_dimensions {
        Some(dim) => usize::try_from(dim).context("Stored dimensionality out of range")?,
        None => embedder
            .embed_one("dimension probe")
            .context("Failed to probe embedding dimensionality")?
            .len(),
    };

    let mut vectors = VectorStore::new(config.vectors_dir())?;
    vectors.load_index(collection, dim)?;
    store
        .upsert_collection(
            collection,
            None,
            Some(&embedder.provider_model_key()),
            Some(i64::try_from(dim).context("Dimensionality out of range")?),
        )
        .await?;

    let report = reconcile(&store, &mut vectors, &embedder, collection).await?;
    store.close().await;

    println!("{}", report.summary());
    println!("Provider: {}", embedder.provider_model_key());
    Ok(())
}

/// Run a search and print ranked hits.
#[inline]
pub async fn run_search(
    collection: &str,
    query: &str,
    method: SearchMethod,
    limit: Option<usize>,
    provider: Option<&str>,
    model: Option<&str>,
) -> Result<()> {
    let config = load_config()?;
    let env = EnvSnapshot::capture();
    let limit = limit.unwrap_or(config.search.default_limit as usize);

    let store = open_store(&config).await?;
    let existing = store.get_collection(collection).await?;

    // The embedding path needs both a usable provider and an index of known
    // dimensionality; without either, the searcher downgrades to keyword.
    let embedder = match Embedder::from_config(&config, &env, provider, model) {
        Ok(embedder) => Some(embedder),
        Err(e) => {
            warn!("No usable embedding provider: {}", e);
            None
        }
    };

    let mut vectors = VectorStore::new(config.vectors_dir())?;
    let dims = existing.as_ref().and_then(|c| c.embedding_dimensions);
    let embedder = match (embedder, dims) {
        (Some(embedder), Some(dim)) => {
            vectors.load_index(collection, usize::try_from(dim)?)?;
            Some(embedder)
        }
        (Some(_), None) => {
            warn!("Collection '{}' has no embeddings yet", collection);
            None
        }
        (None, _) => None,
    };

    let searcher = HybridSearcher::new(&store, &vectors, embedder.as_ref(), &config.search);
    let outcome = searcher.search(collection, query, method, limit).await?;
    store.close().await;

    if let Some(warning) = &outcome.downgrade {
        println!("Warning: {warning}");
    }
    if outcome.hits.is_empty() {
        println!("No results for '{query}' in '{collection}' ({} search)", outcome.method);
        return Ok(());
    }

    println!(
        "Results for '{query}' in '{collection}' ({} search):",
        outcome.method
    );
    for (rank, hit) in outcome.hits.iter().enumerate() {
        let snippet: String = hit.body.chars().take(96).collect();
        let ellipsis = if hit.body.chars().count() > 96 { "..." } else { "" };
        println!("{:>3}. [{:.4}] {}", rank + 1, hit.score, hit.key);
        println!("     {snippet}{ellipsis}");
    }

    Ok(())
}

/// Print a consistency report for every collection.
#[inline]
pub async fn show_status() -> Result<()> {
    let config = load_config()?;
    let store = open_store(&config).await?;
    let collections = store.list_collections().await?;

    if collections.is_empty() {
        println!("No collections yet. Use 'medsearch ingest <collection> <file>' to add one.");
        store.close().await;
        return Ok(());
    }

    let mut vectors = VectorStore::new(config.vectors_dir())?;
    println!("Collections ({} total):", collections.len());
    for collection in &collections {
        print_collection_status(&store, &mut vectors, collection).await?;
    }
    store.close().await;

    Ok(())
}

async fn print_collection_status(
    store: &DocumentStore,
    vectors: &mut VectorStore,
    collection: &Collection,
) -> Result<()> {
    let count = store.count_documents(&collection.name).await?;
    println!();
    println!("{} (ID: {})", collection.name, collection.id);
    println!("  Documents: {count}");
    if let Some(model) = &collection.embedding_model {
        println!("  Embedding model: {model}");
    }

    match collection.embedding_dimensions {
        Some(dim) => {
            vectors.load_index(&collection.name, usize::try_from(dim)?)?;
            let report = check_consistency(store, vectors, &collection.name).await?;
            println!("  Index entries: {}", report.index_entries);
            if report.is_consistent() {
                println!("  Consistency: ok");
            } else {
                println!(
                    "  Consistency: {} missing, {} stale, {} orphaned (run 'medsearch embed {}')",
                    report.missing_in_index.len(),
                    report.stale_embeddings.len(),
                    report.orphaned_in_index.len(),
                    collection.name
                );
            }
        }
        None => println!("  Index entries: none (not embedded yet)"),
    }

    Ok(())
}

fn sync_client(endpoint: Option<&str>, env: &EnvSnapshot) -> Result<SyncClient> {
    let endpoint = endpoint
        .map(str::to_string)
        .or_else(|| env.get(ENV_SYNC_ENDPOINT).map(str::to_string))
        .ok_or_else(|| {
            anyhow!("No sync endpoint: pass --endpoint or set {ENV_SYNC_ENDPOINT}")
        })?;
    let url = Url::parse(&endpoint)
        .with_context(|| format!("Invalid sync endpoint: {endpoint}"))?;
    let token = env.get(ENV_SYNC_TOKEN).map(str::to_string);

    Ok(SyncClient::new(url, token)?)
}

/// Push the store file and a collection's index snapshot to a remote repo.
#[inline]
pub async fn upload(
    collection: &str,
    repo: &str,
    endpoint: Option<&str>,
    private: bool,
    message: Option<&str>,
) -> Result<()> {
    let config = load_config()?;
    let env = EnvSnapshot::capture();
    let sync = sync_client(endpoint, &env)?;

    let options = UploadOptions {
        commit_message: message
            .map(str::to_string)
            .unwrap_or_else(|| format!("Sync '{collection}' {}", chrono::Utc::now().format("%Y-%m-%d %H:%M"))),
        private,
    };

    let db_path = config.database_path();
    let idx_path = index_path(&config, collection);
    let (collection, repo) = (collection.to_string(), repo.to_string());
    tokio::task::spawn_blocking(move || {
        sync.upload(&repo, &collection, &db_path, &idx_path, &options)
    })
    .await
    .context("Upload task failed")??;

    println!("Upload complete.");
    Ok(())
}

/// Fetch the store file and a collection's index snapshot from a remote repo,
/// overwriting local copies.
#[inline]
pub async fn download(repo: &str, collection: &str, endpoint: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let env = EnvSnapshot::capture();
    let sync = sync_client(endpoint, &env)?;

    let db_path = config.database_path();
    let idx_path = index_path(&config, collection);
    let (collection, repo) = (collection.to_string(), repo.to_string());
    tokio::task::spawn_blocking(move || {
        sync.download(&repo, &collection, &db_path, &idx_path)
    })
    .await
    .context("Download task failed")??;

    println!("Download complete.");
    Ok(())
}

/// Print the active configuration.
#[inline]
pub fn show_config() -> Result<()> {
    let config = load_config()?;

    println!("Configuration directory: {}", config.base_dir.display());
    println!("Store file: {}", config.database_path().display());
    println!("Vector snapshots: {}", config.vectors_dir().display());
    println!();
    println!(
        "Embedding provider: {}",
        config.embedding.provider.as_deref().unwrap_or("(resolved at runtime)")
    );
    println!(
        "Embedding model: {}",
        config.embedding.model.as_deref().unwrap_or("(provider default)")
    );
    println!("Batch size: {}", config.embedding.batch_size);
    println!(
        "Ollama endpoint: {}://{}:{}",
        config.ollama.protocol, config.ollama.host, config.ollama.port
    );
    println!();
    println!("Hybrid weight: {}", config.search.hybrid_weight);
    println!("Default limit: {}", config.search.default_limit);
    if config.search.keyword_only_models.is_empty() {
        println!("Keyword-only models: (none)");
    } else {
        println!(
            "Keyword-only models: {}",
            config.search.keyword_only_models.join(", ")
        );
    }

    Ok(())
}
