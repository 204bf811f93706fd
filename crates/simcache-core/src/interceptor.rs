//! Cache-first handling of intercepted requests.
//!
//! A request is looked up across the stores (active generation first),
//! ignoring query strings. Requests for the dynamic route are first collapsed
//! to the bare route so all their variants share one entry. On a miss the
//! original request goes to the network and a successful response is written
//! into the active generation before being returned. Whatever happens to the
//! cache write, the caller gets the response.

use regex::Regex;
use tracing::{debug, info, warn};
use url::Url;

use crate::agent::{AgentContext, Phase};
use crate::cache::MatchOptions;
use crate::models::HttpResponse;
use crate::network::NetworkError;

/// What happened to an intercepted request besides producing a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterceptOutcome {
    ServedFromCache,
    /// Fetched and written into the active generation.
    Cached,
    /// Fetched while no manifest was loaded; nothing to write into yet.
    CacheWriteSkipped,
    /// Fetched, but writing it into the active generation failed.
    CacheWriteFailed(String),
    /// Fetched with a non-2xx status, which is never cached.
    Uncacheable(u16),
}

#[derive(Debug, Clone)]
pub struct Intercepted {
    pub response: HttpResponse,
    pub outcome: InterceptOutcome,
}

/// Collapses every URL that continues past the route segment to the bare route:
/// `.../sufragio.html?mesa=3` and `.../sufragio.html/x` both become `.../sufragio.html`.
#[derive(Debug, Clone)]
pub struct RouteCanonicalizer {
    pattern: Regex,
}

impl RouteCanonicalizer {
    pub fn new(route: &str) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!(r"^(.*/{})", regex::escape(route)))?;
        Ok(Self { pattern })
    }

    /// The bare route for `url`, or `None` when `url` is not a variant of it.
    pub fn canonicalize(&self, url: &Url) -> Option<Url> {
        let captures = self.pattern.captures(url.as_str())?;
        let bare = captures.get(1)?.as_str();
        if bare == url.as_str() {
            return None;
        }
        Url::parse(bare).ok()
    }
}

pub struct NetworkInterceptor {
    canonicalizer: RouteCanonicalizer,
}

impl NetworkInterceptor {
    pub fn new(canonicalizer: RouteCanonicalizer) -> Self {
        Self { canonicalizer }
    }

    pub fn canonicalizer(&self) -> &RouteCanonicalizer {
        &self.canonicalizer
    }

    pub async fn handle(&self, ctx: &AgentContext, url: &Url) -> Result<Intercepted, NetworkError> {
        // Variants of the dynamic route are stored and looked up under the bare route.
        let lookup = self
            .canonicalizer
            .canonicalize(url)
            .unwrap_or_else(|| url.clone());
        let manifest = ctx.manifest().await;
        let active = manifest.as_ref().map(|m| m.generation_id.as_str());

        match ctx
            .storage()
            .match_url(&lookup, MatchOptions::ignoring_search(), active)
            .await
        {
            Ok(Some(response)) => {
                debug!(url = %url, "Serving from cache");
                return Ok(Intercepted {
                    response,
                    outcome: InterceptOutcome::ServedFromCache,
                });
            }
            Ok(None) => {}
            Err(e) => warn!(url = %url, error = %e, "Cache lookup failed, going to network"),
        }

        let response = ctx.network().fetch(url).await?;

        let outcome = match manifest {
            None => {
                if ctx.config().reinit_on_cold_fetch && ctx.phase() == Phase::Failed {
                    ctx.request_reinit();
                }
                info!(url = %url, "Cache is not ready yet, response not cached");
                InterceptOutcome::CacheWriteSkipped
            }
            Some(_) if !response.is_success() => InterceptOutcome::Uncacheable(response.status),
            Some(manifest) => {
                let written = async {
                    let store = ctx.storage().open(&manifest.generation_id).await?;
                    store.put(&lookup, &response).await
                }
                .await;
                match written {
                    Ok(()) => {
                        info!(url = %url, "Cached new resource");
                        InterceptOutcome::Cached
                    }
                    Err(e) => {
                        warn!(url = %url, error = %e, "Failed to cache response");
                        InterceptOutcome::CacheWriteFailed(e.to_string())
                    }
                }
            }
        };

        Ok(Intercepted { response, outcome })
    }
}
