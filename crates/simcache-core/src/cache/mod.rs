//! Named blob stores for offline access.
//!
//! Every manifest generation gets its own store, named after the manifest's
//! generation id, and one more store holds the manifest itself. Entries map a
//! request URL to the response bytes and never expire individually: a store is
//! kept or deleted as a whole.
//!
//! On disk each store is a directory under the storage root:
//!
//! ```text
//! <root>/<hex(store name)>/<sha256(url without query)>/<sha256(url)>.entry
//! ```
//!
//! Grouping entries by their query-less URL keeps query-insensitive lookups to
//! a single directory read.

pub mod error;
pub mod storage;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use storage::CacheStorage;
pub use store::{CacheStore, MatchOptions};
