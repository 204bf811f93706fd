//! Utility functions for URL handling and file persistence.

pub mod fs;
pub mod url;

// Re-export commonly used functions at module level
pub use self::fs::write_atomic;
pub use self::url::{cache_key, resolve, resolve_all, without_query};
