use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs;
use tracing::{debug, info, warn};
use url::Url;

use crate::models::HttpResponse;
use crate::network::Network;

use super::{CacheStore, MatchOptions, StoreError, StoreResult};

/// The set of named stores under one root directory.
#[derive(Clone)]
pub struct CacheStorage {
    root: PathBuf,
    network: Arc<dyn Network>,
}

impl CacheStorage {
    pub fn new(root: PathBuf, network: Arc<dyn Network>) -> Self {
        Self { root, network }
    }

    /// Store names can be arbitrary version tokens, so directories are hex-named.
    fn store_dir(&self, name: &str) -> PathBuf {
        self.root.join(hex::encode(name.as_bytes()))
    }

    fn handle(&self, name: &str) -> CacheStore {
        CacheStore::new(name, self.store_dir(name), self.network.clone())
    }

    /// Open the store called `name`, creating it if needed.
    pub async fn open(&self, name: &str) -> StoreResult<CacheStore> {
        let dir = self.store_dir(name);
        fs::create_dir_all(&dir).await.map_err(StoreError::io(&dir))?;
        Ok(self.handle(name))
    }

    pub async fn has(&self, name: &str) -> StoreResult<bool> {
        let dir = self.store_dir(name);
        fs::try_exists(&dir).await.map_err(StoreError::io(&dir))
    }

    /// Names of every existing store, sorted.
    pub async fn keys(&self) -> StoreResult<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(StoreError::io(&self.root)(e)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(StoreError::io(&self.root))?
        {
            let file_name = entry.file_name();
            let decoded = file_name
                .to_str()
                .and_then(|hex_name| hex::decode(hex_name).ok())
                .and_then(|bytes| String::from_utf8(bytes).ok());
            match decoded {
                Some(name) => names.push(name),
                None => debug!(entry = ?file_name, "Ignoring foreign entry in cache root"),
            }
        }
        names.sort();
        Ok(names)
    }

    /// Delete the store called `name` and everything in it.
    pub async fn delete(&self, name: &str) -> StoreResult<bool> {
        let dir = self.store_dir(name);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(&dir)(e)),
        }
    }

    /// Delete every store whose name is not in `keep`. Irreversible: callers
    /// must have settled on `keep` before calling. Returns the deleted names.
    pub async fn delete_stores_except(&self, keep: &[&str]) -> StoreResult<Vec<String>> {
        let mut deleted = Vec::new();
        for name in self.keys().await? {
            if keep.contains(&name.as_str()) {
                continue;
            }
            info!(store = %name, "Deleting stale cache store");
            if self.delete(&name).await? {
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    /// Look `url` up across stores: `preferred` first when given, then the
    /// others in name order. The first hit wins.
    pub async fn match_url(
        &self,
        url: &Url,
        options: MatchOptions,
        preferred: Option<&str>,
    ) -> StoreResult<Option<HttpResponse>> {
        let mut order: Vec<String> = Vec::new();
        if let Some(name) = preferred {
            order.push(name.to_string());
        }
        order.extend(
            self.keys()
                .await?
                .into_iter()
                .filter(|name| Some(name.as_str()) != preferred),
        );

        for name in order {
            match self.handle(&name).match_url(url, options).await {
                Ok(Some(response)) => return Ok(Some(response)),
                Ok(None) => {}
                Err(e) => warn!(store = %name, error = %e, "Cache lookup failed"),
            }
        }
        Ok(None)
    }
}
