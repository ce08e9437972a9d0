//! In-memory caching primitives for diagate.
//!
//! Two process-wide structures sit between the HTTP layer and the upstream
//! renderer:
//!
//! - [`ResultCache`]: Bounded, time-expiring store of completed results
//! - [`Coalescer`]: At most one in-flight producer per key; concurrent callers
//!   for the same key share its outcome
//!
//! Both are keyed by opaque strings and generic over the stored value, so the
//! crate has no knowledge of diagrams or HTTP.
//!
//! # Example
//!
//! ```
//! use std::time::Instant;
//! use diagate_cache::{CacheSettings, ResultCache};
//!
//! let cache = ResultCache::new(CacheSettings::default());
//! let now = Instant::now();
//! cache.put("key", "value", now);
//! assert_eq!(cache.lookup("key", now), Some("value"));
//! ```

mod coalesce;
mod lock;
mod result;

pub use coalesce::{Coalescer, Flight};
pub use result::{CacheSettings, PruneStats, ResultCache};
