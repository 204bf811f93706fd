//! Bulk download of location image sets.
//!
//! Each selected location known to the manifest becomes one `add_all` on the
//! active generation; locations run concurrently and are awaited together.
//! A location either lands completely or not at all, but locations are
//! independent: one failing does not undo the others.

use futures::future::join_all;
use tracing::{error, info};
use url::Url;

use crate::cache::CacheStore;
use crate::error::{AgentError, AgentResult};
use crate::models::Manifest;
use crate::utils::resolve_all;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefetchReport {
    /// Locations whose image sets are now fully cached.
    pub cached_locations: Vec<String>,
    /// Requested codes the manifest does not know.
    pub skipped_locations: Vec<String>,
    pub files_written: usize,
}

pub struct ImagePrefetcher<'a> {
    manifest: &'a Manifest,
    store: &'a CacheStore,
    origin: &'a Url,
}

impl<'a> ImagePrefetcher<'a> {
    pub fn new(manifest: &'a Manifest, store: &'a CacheStore, origin: &'a Url) -> Self {
        Self {
            manifest,
            store,
            origin,
        }
    }

    /// Cache the image sets for `codes`. Safe to repeat: re-adding a location
    /// rewrites the same entries with the same content.
    pub async fn prefetch(&self, codes: &[String]) -> AgentResult<PrefetchReport> {
        let skipped_locations: Vec<String> = codes
            .iter()
            .filter(|code| !self.manifest.has_location(code))
            .cloned()
            .collect();

        let jobs = self.manifest.image_sets_for(codes).map(|set| async move {
            info!(location = %set.code, files = set.files.len(), "Caching location images");
            let result = async {
                let urls = resolve_all(self.origin, &set.files)?;
                Ok::<_, AgentError>(self.store.add_all(&urls).await?)
            }
            .await;
            (set.code.clone(), result)
        });

        let mut report = PrefetchReport {
            skipped_locations,
            ..PrefetchReport::default()
        };
        let mut failed = Vec::new();
        let mut first_reason = None;
        for (code, result) in join_all(jobs).await {
            match result {
                Ok(written) => {
                    report.files_written += written;
                    if !report.cached_locations.contains(&code) {
                        report.cached_locations.push(code);
                    }
                }
                Err(e) => {
                    error!(location = %code, error = %e, "Failed to cache location images");
                    first_reason.get_or_insert_with(|| e.to_string());
                    if !failed.contains(&code) {
                        failed.push(code);
                    }
                }
            }
        }

        match first_reason {
            Some(reason) => Err(AgentError::PrefetchFailure { failed, reason }),
            None => Ok(report),
        }
    }
}
