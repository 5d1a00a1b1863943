// Remote snapshot sync
// Pushes and pulls the two persistence artifacts (the relational store file
// and a collection's vector index snapshot) to a remote object endpoint over
// plain HTTP. Transfers are whole-file; there is no delta protocol and no
// internal retry, callers re-run a failed sync.


use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::database::sqlite::validate_collection_name;
use crate::embeddings::{DEFAULT_TIMEOUT_SECONDS, build_agent};
use crate::{Result, SearchError};

/// Environment variable naming the default sync endpoint.
pub const ENV_SYNC_ENDPOINT: &str = "MEDSEARCH_SYNC_ENDPOINT";
/// Environment variable holding the bearer token for the sync endpoint.
pub const ENV_SYNC_TOKEN: &str = "MEDSEARCH_SYNC_TOKEN";

const STORE_FILE: &str = "store.db";
const COMMIT_MESSAGE_HEADER: &str = "x-commit-message";
const PRIVATE_HEADER: &str = "x-private";

/// Options attached to an upload.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub commit_message: String,
    pub private: bool,
}

impl Default for UploadOptions {
    #[inline]
    fn default() -> Self {
        Self {
            commit_message: "Sync snapshot".to_string(),
            private: true,
        }
    }
}

/// Client for a remote snapshot repository.
pub struct SyncClient {
    base_url: Url,
    token: Option<String>,
    agent: ureq::Agent,
}

impl SyncClient {
    #[inline]
    pub fn new(base_url: Url, token: Option<String>) -> Result<Self> {
        // Url::join drops the last path segment unless the base ends in '/'.
        let base_url = if base_url.path().ends_with('/') {
            base_url
        } else {
            Url::parse(&format!("{base_url}/"))
                .map_err(|e| SearchError::Sync(format!("Invalid sync endpoint: {e}")))?
        };

        Ok(Self {
            base_url,
            token,
            agent: build_agent(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    fn object_url(&self, repo: &str, collection: &str, file: &str) -> Result<Url> {
        if repo.is_empty() || repo.starts_with('/') || repo.contains("..") {
            return Err(SearchError::Sync(format!("Invalid repository name '{repo}'")));
        }
        validate_collection_name(collection)?;

        self.base_url
            .join(&format!("repos/{repo}/{collection}/{file}"))
            .map_err(|e| SearchError::Sync(format!("Failed to build sync URL: {e}")))
    }

    fn put_file(&self, url: &Url, path: &Path, options: &UploadOptions) -> Result<()> {
        let bytes = std::fs::read(path).map_err(|e| {
            SearchError::Sync(format!("Failed to read {}: {e}", path.display()))
        })?;

        debug!("Uploading {} ({} bytes) to {}", path.display(), bytes.len(), url);

        let mut request = self
            .agent
            .put(url.as_str())
            .header("Content-Type", "application/octet-stream")
            .header(COMMIT_MESSAGE_HEADER, &options.commit_message)
            .header(PRIVATE_HEADER, if options.private { "true" } else { "false" });
        if let Some(token) = &self.token {
            request = request.header("Authorization", &format!("Bearer {token}"));
        }

        request
            .send(&bytes[..])
            .map_err(|e| SearchError::Sync(format!("Upload to {url} failed: {e}")))?;
        Ok(())
    }

    fn get_file(&self, url: &Url) -> std::result::Result<Vec<u8>, ureq::Error> {
        let mut request = self.agent.get(url.as_str());
        if let Some(token) = &self.token {
            request = request.header("Authorization", &format!("Bearer {token}"));
        }

        request
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_vec())
    }

    /// Upload the store file and one collection's index snapshot. The index
    /// file is skipped with a warning when it does not exist locally (the
    /// collection was never embedded).
    #[inline]
    pub fn upload(
        &self,
        repo: &str,
        collection: &str,
        db_path: &Path,
        index_path: &Path,
        options: &UploadOptions,
    ) -> Result<()> {
        let db_url = self.object_url(repo, collection, STORE_FILE)?;
        self.put_file(&db_url, db_path, options)?;

        if index_path.exists() {
            let index_file = index_file_name(index_path)?;
            let index_url = self.object_url(repo, collection, &index_file)?;
            self.put_file(&index_url, index_path, options)?;
        } else {
            warn!(
                "No index snapshot at {}, uploading store only",
                index_path.display()
            );
        }

        info!("Uploaded collection '{}' to {}/{}", collection, repo, collection);
        Ok(())
    }

    /// Download the store file and index snapshot, overwriting local copies.
    /// A missing remote index is tolerated; a missing remote store is an
    /// error.
    #[inline]
    pub fn download(
        &self,
        repo: &str,
        collection: &str,
        db_dest: &Path,
        index_dest: &Path,
    ) -> Result<()> {
        let db_url = self.object_url(repo, collection, STORE_FILE)?;
        let db_bytes = self
            .get_file(&db_url)
            .map_err(|e| SearchError::Sync(format!("Download from {db_url} failed: {e}")))?;
        write_atomic(db_dest, &db_bytes)?;

        let index_file = index_file_name(index_dest)?;
        let index_url = self.object_url(repo, collection, &index_file)?;
        match self.get_file(&index_url) {
            Ok(bytes) => write_atomic(index_dest, &bytes)?,
            Err(ureq::Error::StatusCode(404)) => {
                warn!("No remote index for '{}', store only", collection);
            }
            Err(e) => {
                return Err(SearchError::Sync(format!(
                    "Download from {index_url} failed: {e}"
                )));
            }
        }

        info!(
            "Downloaded collection '{}' from {}/{}",
            collection, repo, collection
        );
        Ok(())
    }
}

fn index_file_name(index_path: &Path) -> Result<String> {
    index_path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            SearchError::Sync(format!(
                "Index path {} has no file name",
                index_path.display()
            ))
        })
}

fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            SearchError::Sync(format!("Failed to create {}: {e}", parent.display()))
        })?;
    }

    let tmp = dest.with_extension("sync.tmp");
    std::fs::write(&tmp, bytes)
        .map_err(|e| SearchError::Sync(format!("Failed to write {}: {e}", tmp.display())))?;
    std::fs::rename(&tmp, dest)
        .map_err(|e| SearchError::Sync(format!("Failed to replace {}: {e}", dest.display())))?;

    debug!("Wrote {} bytes to {}", bytes.len(), dest.display());
    Ok(())
}
