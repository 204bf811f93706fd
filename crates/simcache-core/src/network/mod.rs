//! Network access module.
//!
//! This module provides the `Network` trait the agent fetches through and
//! the reqwest-backed `HttpNetwork` used outside of tests.

pub mod client;
pub mod error;

pub use client::{HttpNetwork, Network, DEFAULT_REQUEST_TIMEOUT_SECS};
pub use error::NetworkError;
