use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, warn};
use url::Url;

use crate::models::HttpResponse;
use crate::network::Network;
use crate::utils::{cache_key, without_query, write_atomic};

use super::{StoreError, StoreResult};

const ENTRY_EXTENSION: &str = "entry";

/// Lookup options, mirroring the subset of request matching the agent needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchOptions {
    /// Match entries whose URL differs from the request only in its query string.
    pub ignore_search: bool,
}

impl MatchOptions {
    pub fn exact() -> Self {
        Self::default()
    }

    pub fn ignoring_search() -> Self {
        Self {
            ignore_search: true,
        }
    }
}

/// Header stored in front of every entry body.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMetadata {
    url: String,
    status: u16,
    content_type: Option<String>,
    size: u64,
    cached_at: DateTime<Utc>,
}

/// One named blob store.
#[derive(Clone)]
pub struct CacheStore {
    name: String,
    dir: PathBuf,
    network: Arc<dyn Network>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("name", &self.name)
            .field("dir", &self.dir)
            .finish()
    }
}

fn digest(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// Entry file layout: one line of JSON metadata, then the raw body.
fn encode_entry(metadata: &EntryMetadata, body: &[u8]) -> Result<Vec<u8>, serde_json::Error> {
    let mut contents = serde_json::to_vec(metadata)?;
    contents.push(b'\n');
    contents.extend_from_slice(body);
    Ok(contents)
}

fn decode_entry(path: &Path, contents: Vec<u8>) -> StoreResult<(EntryMetadata, Bytes)> {
    let corrupt = |reason: String| StoreError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };
    let split = contents
        .iter()
        .position(|b| *b == b'\n')
        .ok_or_else(|| corrupt("missing metadata header".to_string()))?;
    let metadata: EntryMetadata =
        serde_json::from_slice(&contents[..split]).map_err(|e| corrupt(e.to_string()))?;
    let body = Bytes::from(contents).slice(split + 1..);
    if body.len() as u64 != metadata.size {
        return Err(corrupt(format!(
            "expected {} body bytes, found {}",
            metadata.size,
            body.len()
        )));
    }
    Ok((metadata, body))
}

impl CacheStore {
    pub(crate) fn new(name: &str, dir: PathBuf, network: Arc<dyn Network>) -> Self {
        Self {
            name: name.to_string(),
            dir,
            network,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn bucket_dir(&self, url: &Url) -> PathBuf {
        self.dir.join(digest(without_query(url).as_str()))
    }

    fn entry_path(&self, url: &Url) -> PathBuf {
        self.bucket_dir(url)
            .join(format!("{}.{}", digest(cache_key(url).as_str()), ENTRY_EXTENSION))
    }

    /// Read and decode one entry file. Missing files are a miss; corrupt
    /// files are removed in the background and also reported as a miss.
    async fn read_entry(&self, path: &Path) -> StoreResult<Option<(EntryMetadata, Bytes)>> {
        let contents = match fs::read(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(path)(e)),
        };

        match decode_entry(path, contents) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                warn!(store = %self.name, error = %e, "Discarding corrupt cache entry");
                let path = path.to_path_buf();
                tokio::spawn(async move {
                    let _ = fs::remove_file(&path).await;
                });
                Ok(None)
            }
        }
    }

    /// Write `response` under `url`, replacing any previous entry for the same key.
    pub async fn put(&self, url: &Url, response: &HttpResponse) -> StoreResult<()> {
        let key = cache_key(url);
        let metadata = EntryMetadata {
            url: key.to_string(),
            status: response.status,
            content_type: response.content_type.clone(),
            size: response.body.len() as u64,
            cached_at: Utc::now(),
        };
        let path = self.entry_path(&key);
        let contents = encode_entry(&metadata, &response.body).map_err(|e| StoreError::Corrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        write_atomic(&path, &contents)
            .await
            .map_err(StoreError::io(&path))?;
        debug!(store = %self.name, url = %key, bytes = metadata.size, "Cached entry");
        Ok(())
    }

    pub async fn match_url(&self, url: &Url, options: MatchOptions) -> StoreResult<Option<HttpResponse>> {
        let exact = self.entry_path(url);
        if let Some(entry) = self.read_entry(&exact).await? {
            return Ok(Some(Self::into_response(entry)));
        }
        if !options.ignore_search {
            return Ok(None);
        }

        // Any entry sharing the query-less URL qualifies; pick deterministically.
        let bucket = self.bucket_dir(url);
        let mut candidates = match Self::entry_files(&bucket).await {
            Ok(files) => files,
            Err(StoreError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                return Ok(None)
            }
            Err(e) => return Err(e),
        };
        candidates.sort();
        for candidate in candidates {
            if let Some(entry) = self.read_entry(&candidate).await? {
                return Ok(Some(Self::into_response(entry)));
            }
        }
        Ok(None)
    }

    pub async fn contains(&self, url: &Url) -> StoreResult<bool> {
        Ok(self.match_url(url, MatchOptions::exact()).await?.is_some())
    }

    /// Remove the entry stored under `url`. Returns whether one existed.
    pub async fn delete(&self, url: &Url) -> StoreResult<bool> {
        let path = self.entry_path(url);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(&path)(e)),
        }
    }

    /// URLs of every entry in the store, sorted.
    pub async fn keys(&self) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut buckets = match fs::read_dir(&self.dir).await {
            Ok(buckets) => buckets,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(StoreError::io(&self.dir)(e)),
        };
        while let Some(bucket) = buckets
            .next_entry()
            .await
            .map_err(StoreError::io(&self.dir))?
        {
            let path = bucket.path();
            let is_dir = bucket
                .file_type()
                .await
                .map_err(StoreError::io(&path))?
                .is_dir();
            if !is_dir {
                continue;
            }
            for file in Self::entry_files(&path).await? {
                if let Some((metadata, _)) = self.read_entry(&file).await? {
                    keys.push(metadata.url);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Fetch `url` and store it. Non-2xx responses fail and store nothing.
    pub async fn add(&self, url: &Url) -> StoreResult<()> {
        let response = self.fetch_checked(url).await?;
        self.put(url, &response).await
    }

    /// Fetch every URL concurrently and store them only if all succeeded.
    /// Duplicate URLs are fetched once. Returns the number of entries written.
    pub async fn add_all(&self, urls: &[Url]) -> StoreResult<usize> {
        let mut seen = HashSet::new();
        let unique: Vec<&Url> = urls
            .iter()
            .filter(|url| seen.insert(cache_key(url)))
            .collect();

        let responses = try_join_all(unique.iter().map(|url| self.fetch_checked(url))).await?;
        try_join_all(
            unique
                .iter()
                .zip(responses.iter())
                .map(|(url, response)| self.put(url, response)),
        )
        .await?;
        Ok(unique.len())
    }

    async fn fetch_checked(&self, url: &Url) -> StoreResult<HttpResponse> {
        self.network
            .fetch(url)
            .await
            .and_then(HttpResponse::error_for_status)
            .map_err(|source| StoreError::Fetch {
                url: url.to_string(),
                source,
            })
    }

    async fn entry_files(bucket: &Path) -> StoreResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(bucket).await.map_err(StoreError::io(bucket))?;
        while let Some(entry) = entries.next_entry().await.map_err(StoreError::io(bucket))? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION) {
                files.push(path);
            }
        }
        Ok(files)
    }

    fn into_response((metadata, body): (EntryMetadata, Bytes)) -> HttpResponse {
        HttpResponse {
            url: metadata.url,
            status: metadata.status,
            content_type: metadata.content_type,
            body,
        }
    }
}
