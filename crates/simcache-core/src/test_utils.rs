//! Shared helpers for unit tests: a scripted network and config builders.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use url::Url;

use crate::config::AgentConfig;
use crate::models::HttpResponse;
use crate::network::{Network, NetworkError};

pub const ORIGIN: &str = "http://localhost:8080/";

enum Scripted {
    Body(String),
    Status(u16),
    Failure(String),
}

/// In-memory [`Network`] with scripted replies.
///
/// Unscripted URLs answer 404, like a static file server would.
#[derive(Default)]
pub struct FakeNetwork {
    replies: Mutex<HashMap<String, Scripted>>,
    requests: Mutex<Vec<String>>,
    offline: AtomicBool,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(self, path: &str, body: &str) -> Self {
        self.set_body(path, body);
        self
    }

    pub fn set_body(&self, path: &str, body: &str) {
        self.script(path, Scripted::Body(body.to_string()));
    }

    pub fn set_status(&self, path: &str, status: u16) {
        self.script(path, Scripted::Status(status));
    }

    pub fn set_failure(&self, path: &str, reason: &str) {
        self.script(path, Scripted::Failure(reason.to_string()));
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// How many times `path` was requested.
    pub fn request_count(&self, path: &str) -> usize {
        let url = url(path).to_string();
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|requested| **requested == url)
            .count()
    }

    pub fn total_requests(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn script(&self, path: &str, reply: Scripted) {
        self.replies
            .lock()
            .unwrap()
            .insert(url(path).to_string(), reply);
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn fetch(&self, url: &Url) -> Result<HttpResponse, NetworkError> {
        let key = url.to_string();
        self.requests.lock().unwrap().push(key.clone());
        tokio::task::yield_now().await;

        if self.offline.load(Ordering::SeqCst) {
            return Err(NetworkError::Unavailable(format!("offline: {key}")));
        }

        let replies = self.replies.lock().unwrap();
        match replies.get(&key) {
            Some(Scripted::Body(body)) => Ok(HttpResponse::new(key.as_str(), 200, body.clone())),
            Some(Scripted::Status(status)) => Ok(HttpResponse::new(key.as_str(), *status, "")),
            Some(Scripted::Failure(reason)) => Err(NetworkError::Unavailable(reason.clone())),
            None => Ok(HttpResponse::new(key.as_str(), 404, "not found")),
        }
    }
}

/// Absolute URL for a path under the test origin.
pub fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

pub fn test_config(data_dir: &Path) -> AgentConfig {
    AgentConfig {
        origin: ORIGIN.to_string(),
        data_dir: Some(data_dir.to_path_buf()),
        ..AgentConfig::default()
    }
}

/// Manifest used throughout the scenario tests.
pub const SCENARIO_MANIFEST: &str = r#"{
    "cache": "g1",
    "archivos": ["a.html"],
    "imagenes": [{"codigo": "EJ.1", "archivos": ["e1.png"]}]
}"#;
