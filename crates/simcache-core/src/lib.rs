//! Core library for simcache.
//!
//! simcache keeps a browser-hosted application usable offline. A background
//! agent reconciles a versioned manifest against named blob stores on disk,
//! remembers which locations the user chose to keep offline, bulk-downloads
//! their image sets, and answers intercepted requests from cache first.
//!
//! Modules, leaf-first:
//! - `ledger`: durable location selection records
//! - `manifest`: network-first manifest loading with a cached fallback
//! - `cache`: named blob stores, one per generation plus the manifest store
//! - `prefetch`: bulk population of location image sets
//! - `interceptor`: cache-first request handling with route canonicalization
//! - `broker`: foreground/agent message protocol
//! - `agent`: lifecycle context, startup and event dispatch

pub mod agent;
pub mod broker;
pub mod cache;
pub mod config;
pub mod error;
pub mod interceptor;
pub mod ledger;
pub mod manifest;
pub mod models;
pub mod network;
pub mod prefetch;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_utils;

pub use agent::{Agent, AgentContext, AgentHandle, Phase, StartupReport};
pub use broker::{ClientHandle, MessageBroker};
pub use cache::{CacheStorage, CacheStore, MatchOptions};
pub use config::AgentConfig;
pub use error::{AgentError, AgentResult};
pub use interceptor::{InterceptOutcome, Intercepted, NetworkInterceptor, RouteCanonicalizer};
pub use ledger::{LedgerMode, LocationLedger};
pub use manifest::ManifestFetcher;
pub use models::{AgentReply, ClientMessage, ForegroundAction, HttpResponse, Manifest};
pub use network::{HttpNetwork, Network, NetworkError};
pub use prefetch::{ImagePrefetcher, PrefetchReport};
