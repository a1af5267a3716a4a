//! Render cache.
//!
//! The pipeline only depends on [`RenderCache`]; [`MarkupCache`] is the
//! in-process implementation. Configuration lives in the `[cache]` section of
//! `quire.toml`:
//!
//! ```toml
//! [cache]
//! enabled = true
//! max_entries = 64
//! max_bytes = 268435456
//! max_age_secs = 3600
//! ```

mod config;
mod store;

use std::sync::Arc;

use crate::domain::ContentHash;

pub use config::CacheConfig;
pub use store::{CacheEntry, MarkupCache};

/// Content-hash keyed store of produced markup, shared between pipelines.
pub trait RenderCache: Send + Sync {
    fn get(&self, hash: &ContentHash) -> Option<Arc<str>>;

    fn put(&self, hash: ContentHash, markup: String);

    fn clear(&self);

    /// Release memory under pressure. Implementations without a cheap way to
    /// do so may ignore it.
    fn shed(&self) {}
}
