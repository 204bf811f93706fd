use thiserror::Error;

use crate::cache::StoreError;
use crate::ledger::LedgerError;
use crate::network::NetworkError;

#[derive(Error, Debug)]
pub enum AgentError {
    /// Neither the network nor the manifest store could provide a manifest.
    #[error("Manifest unavailable: {0}")]
    ManifestUnavailable(String),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(#[from] serde_json::Error),

    /// The durable selection store was never opened.
    #[error("Location ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// At least one location's image set could not be cached.
    #[error("Failed to cache images for {}: {reason}", failed.join(", "))]
    PrefetchFailure { failed: Vec<String>, reason: String },

    #[error("Agent is not ready: {0}")]
    NotReady(String),

    #[error("Agent has stopped")]
    Stopped,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Network(#[from] NetworkError),
}

pub type AgentResult<T> = Result<T, AgentError>;
