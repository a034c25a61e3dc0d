//! Content-addressed blob storage
//!
//! Blobs are keyed by the hex digest of their bytes and placed at
//! `{root}/{key[0:2]}/{key}`. Identical uploads land on the same path, so
//! deduplication is an existence check and no index is kept.

mod content_store;
mod key;
mod types;

pub use content_store::ContentStore;
pub use key::{BlobKey, HashAlgorithm, KeyError, SHARD_PREFIX_LEN};
pub use types::*;
