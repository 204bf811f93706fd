use serde::{Deserialize, Serialize};

#[cfg(feature = "ts")]
use ts_rs::TS;

/// Message posted by the foreground page to the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
#[serde(tag = "command")]
pub enum ClientMessage {
    /// Keep the listed locations available offline.
    #[serde(rename = "CACHE_IMAGES", alias = "CACHEAR_IMAGENES")]
    CacheImages {
        #[serde(default)]
        data: Vec<String>,
    },
}

/// Message posted by the agent back to the client that asked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
#[serde(tag = "command")]
pub enum AgentReply {
    #[serde(rename = "IMAGES_CACHED", alias = "IMAGENES_CACHEADAS")]
    ImagesCached,
    #[serde(rename = "ERROR_CACHEANDO_IMAGENES", alias = "CACHE_ERROR")]
    CacheError { error: String },
}

/// What the foreground page does when a reply arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForegroundAction {
    /// Navigate to a fresh load of the application.
    ReloadApplication,
    /// Re-enable the start control and hide the progress indicator.
    EnableRetry,
}

impl ClientMessage {
    pub fn cache_images<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ClientMessage::CacheImages {
            data: codes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

impl AgentReply {
    pub fn foreground_action(&self) -> ForegroundAction {
        match self {
            AgentReply::ImagesCached => ForegroundAction::ReloadApplication,
            AgentReply::CacheError { .. } => ForegroundAction::EnableRetry,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
