//! Manifest loading.
//!
//! The manifest is fetched from the network first. A successfully parsed
//! payload is written to the manifest store so the next start can recover it
//! offline; when the network fails for any reason (transport error, non-2xx
//! status or an unparseable body) the stored copy is used instead.

use std::sync::Arc;

use tracing::{info, warn};
use url::Url;

use crate::cache::{CacheStorage, MatchOptions};
use crate::error::{AgentError, AgentResult};
use crate::models::{HttpResponse, Manifest};
use crate::network::Network;

pub struct ManifestFetcher {
    network: Arc<dyn Network>,
    storage: CacheStorage,
    manifest_url: Url,
    store_name: String,
}

impl ManifestFetcher {
    pub fn new(
        network: Arc<dyn Network>,
        storage: CacheStorage,
        manifest_url: Url,
        store_name: impl Into<String>,
    ) -> Self {
        Self {
            network,
            storage,
            manifest_url,
            store_name: store_name.into(),
        }
    }

    /// Load the manifest, failing with `ManifestUnavailable` only when both
    /// the network and the stored copy fail.
    pub async fn load(&self) -> AgentResult<Manifest> {
        let network_error = match self.fetch_from_network().await {
            Ok(manifest) => {
                info!(generation = %manifest.generation_id, "Loaded manifest from network");
                return Ok(manifest);
            }
            Err(e) => e,
        };

        warn!(url = %self.manifest_url, error = %network_error, "Manifest download failed, trying stored copy");
        match self.load_stored().await {
            Ok(Some(manifest)) => {
                info!(generation = %manifest.generation_id, "Loaded stored manifest");
                Ok(manifest)
            }
            Ok(None) => Err(AgentError::ManifestUnavailable(format!(
                "{} was not cached and could not be downloaded: {}",
                self.manifest_url, network_error
            ))),
            Err(stored_error) => Err(AgentError::ManifestUnavailable(format!(
                "{} could not be downloaded ({}) and the stored copy is unusable ({})",
                self.manifest_url, network_error, stored_error
            ))),
        }
    }

    async fn fetch_from_network(&self) -> AgentResult<Manifest> {
        let response = self
            .network
            .fetch(&self.manifest_url)
            .await
            .and_then(HttpResponse::error_for_status)?;
        let manifest = Manifest::from_slice(&response.body)?;

        // A failed write only costs the offline fallback for the next start.
        if let Err(e) = self.store_copy(&response).await {
            warn!(error = %e, "Failed to store manifest copy");
        }
        Ok(manifest)
    }

    async fn store_copy(&self, response: &HttpResponse) -> AgentResult<()> {
        let store = self.storage.open(&self.store_name).await?;
        store.put(&self.manifest_url, response).await?;
        Ok(())
    }

    async fn load_stored(&self) -> AgentResult<Option<Manifest>> {
        if !self.storage.has(&self.store_name).await? {
            return Ok(None);
        }
        let store = self.storage.open(&self.store_name).await?;
        match store.match_url(&self.manifest_url, MatchOptions::exact()).await? {
            Some(response) => Ok(Some(Manifest::from_slice(&response.body)?)),
            None => Ok(None),
        }
    }
}
