//! Data models shared across the agent.
//!
//! - `Manifest`, `LocationImageSet`: the versioned cache descriptor
//! - `ClientMessage`, `AgentReply`: the foreground/agent message protocol
//! - `HttpResponse`: a response from the network or a blob store

pub mod manifest;
pub mod message;
pub mod response;

pub use manifest::{LocationImageSet, Manifest};
pub use message::{AgentReply, ClientMessage, ForegroundAction};
pub use response::HttpResponse;
