//! Stale-while-revalidate query client for Switchyard
//!
//! [`SwrClient`] sits in front of any async fetch function and adds:
//!
//! - **Deduplication** - concurrent calls for one key share a single fetch
//! - **Cache windows** - `cache_time` bounds how long a value is served,
//!   `stale_time` when serving it also triggers a background refresh
//! - **Background refresh** - optional per-key refresh timers
//! - **Cancellation** - a [`CancellationToken`](tokio_util::sync::CancellationToken)
//!   ends the call with [`SwrError::Aborted`] and never touches the cache
//! - **Retry** - a fixed number of extra attempts with a constant delay
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use switchyard_swr::*;
//!
//! let client: SwrClient<Vec<Todo>> = SwrClient::new();
//!
//! let options = QueryOptions::new()
//!     .cache_time(Duration::from_secs(60))
//!     .stale_time(Duration::from_secs(5))
//!     .background_refresh(true);
//!
//! let todos = client.query(query_key!["todos"], fetch_todos, options).await;
//!
//! // Later, after a write
//! client.invalidate_queries(query_key!["todos"]);
//! ```

pub mod client;
pub mod error;
pub mod key;
pub mod options;
pub mod result;

pub use client::{CacheStats, SwrClient};
pub use error::SwrError;
pub use key::{KeyPart, QueryKey};
pub use options::{QueryOptions, SwrConfig};
pub use result::QueryResult;

pub use tokio_util::sync::CancellationToken;
