//! Foreground/agent messaging.
//!
//! Every connected foreground client gets its own reply channel; replies go
//! only to the client that sent the request. Requests travel through the
//! agent's event loop so they observe the startup phase.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::agent::{AgentContext, AgentEvent};
use crate::error::{AgentError, AgentResult};
use crate::models::{AgentReply, ClientMessage};

pub type ClientId = u64;

pub struct MessageBroker {
    clients: Mutex<HashMap<ClientId, mpsc::UnboundedSender<AgentReply>>>,
    next_id: AtomicU64,
}

impl MessageBroker {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Connect a client whose messages are delivered on `events`.
    pub async fn register(&self, events: mpsc::Sender<AgentEvent>) -> ClientHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.clients.lock().await.insert(id, tx);
        debug!(client = id, "Client connected");
        ClientHandle {
            id,
            events,
            replies: rx,
        }
    }

    /// Deliver `reply` to `client`. Returns false if the client is gone.
    pub async fn post(&self, client: ClientId, reply: AgentReply) -> bool {
        let mut clients = self.clients.lock().await;
        let delivered = match clients.get(&client) {
            Some(tx) => tx.send(reply).is_ok(),
            None => false,
        };
        if !delivered {
            clients.remove(&client);
            warn!(client, "Reply dropped, client disconnected");
        }
        delivered
    }

    pub async fn client_count(&self) -> usize {
        self.clients.lock().await.len()
    }

    /// Run one client request to completion and answer the client.
    pub async fn handle_message(&self, ctx: &AgentContext, client: ClientId, message: ClientMessage) {
        let reply = match message {
            ClientMessage::CacheImages { data } => {
                info!(client, locations = ?data, "Cache request received");
                match ctx.cache_locations(&data).await {
                    Ok(report) => {
                        info!(
                            client,
                            cached = report.cached_locations.len(),
                            skipped = report.skipped_locations.len(),
                            files = report.files_written,
                            "Location images cached"
                        );
                        AgentReply::ImagesCached
                    }
                    Err(e) => {
                        error!(client, error = %e, "Cache request failed");
                        AgentReply::CacheError {
                            error: e.to_string(),
                        }
                    }
                }
            }
        };
        self.post(client, reply).await;
    }
}

impl Default for MessageBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// A connected foreground client.
pub struct ClientHandle {
    id: ClientId,
    events: mpsc::Sender<AgentEvent>,
    replies: mpsc::UnboundedReceiver<AgentReply>,
}

impl ClientHandle {
    pub fn id(&self) -> ClientId {
        self.id
    }

    pub async fn post_message(&self, message: ClientMessage) -> AgentResult<()> {
        self.events
            .send(AgentEvent::Message {
                client: self.id,
                message,
            })
            .await
            .map_err(|_| AgentError::Stopped)
    }

    /// Post a raw JSON message. Unrecognized commands are logged and ignored.
    pub async fn post_raw(&self, raw: &str) -> AgentResult<()> {
        match ClientMessage::parse(raw) {
            Ok(message) => self.post_message(message).await,
            Err(e) => {
                warn!(client = self.id, error = %e, "Ignoring unrecognized message");
                Ok(())
            }
        }
    }

    /// Next reply for this client, or `None` once the agent has stopped.
    pub async fn recv(&mut self) -> Option<AgentReply> {
        self.replies.recv().await
    }

    /// Post `message` and wait for the reply.
    pub async fn request(&mut self, message: ClientMessage) -> AgentResult<AgentReply> {
        self.post_message(message).await?;
        self.recv().await.ok_or(AgentError::Stopped)
    }
}
