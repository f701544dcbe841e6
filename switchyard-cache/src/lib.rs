//! Query cache adapters for the Switchyard dispatch core.
//!
//! The query bus consults a [`QueryCache`] before invoking a handler. The
//! contract is deliberately small (`get`, `set`, `delete`) so that any
//! key-value store can back it; bulk invalidation is an optional capability
//! an adapter declares through [`QueryCache::supports_prefix_delete`].
//!
//! # Examples
//!
//! ```
//! use switchyard_cache::*;
//! use std::time::Duration;
//!
//! # async fn example() -> CacheResult<()> {
//! let cache = InMemoryQueryCache::new();
//!
//! cache.set("GetUser:42", serde_json::json!({"id": 42}), Duration::from_secs(60)).await?;
//! let value = cache.get("GetUser:42").await?;
//! assert!(value.is_some());
//!
//! // Invalidate every cached GetUser result
//! cache.delete_prefix("GetUser:").await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{CacheError, CacheResult};
pub use memory::InMemoryQueryCache;
pub use traits::QueryCache;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{CacheError, CacheResult};
    pub use crate::memory::InMemoryQueryCache;
    pub use crate::traits::QueryCache;
}
