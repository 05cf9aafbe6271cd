//! Panelcache
//!
//! Multi-tier in-memory response cache for the Panelgrid comic
//! aggregation API. Sits between the provider scraping/aggregation
//! pipeline and the HTTP transport:
//!
//! - **L1**: primary tier, consulted first on every lookup.
//! - **L2**: overflow/backstop tier; receives LRU demotions from L1 and
//!   explicit low-priority insertions.
//!
//! Payloads above a size threshold are stored gzip-compressed. A
//! background sweeper purges expired entries on an interval; pattern-
//! and tag-based invalidation handle upstream content changes; a warm
//! queue serializes bulk pre-population. Codec and serialization
//! failures degrade to "no entry found" and never reach the HTTP caller.
//!
//! ## Configuration
//!
//! Cache behavior is controlled via the host's `[cache]` table:
//!
//! ```toml
//! [cache]
//! max_size = 1000
//! default_ttl_secs = 300
//! cleanup_interval_secs = 60
//! enable_compression = true
//! compression_threshold_bytes = 1024
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let cache = Arc::new(ResponseCache::new(CacheConfig::default()));
//! cache.start_sweeper();
//!
//! let state = CacheState { cache: cache.clone(), ttl: None };
//! let app = router.layer(middleware::from_fn_with_state(state, response_cache_layer));
//!
//! // At shutdown:
//! cache.stop_sweeper();
//! ```

mod codec;
mod config;
mod entry;
mod error;
mod keys;
mod lock;
mod middleware;
mod stats;
mod store;
mod sweeper;
pub mod telemetry;
mod warm;

pub use config::{CacheConfig, LogFormat, LoggingConfig};
pub use entry::{CacheEntry, CacheLevel};
pub use error::CacheError;
pub use keys::{VOLATILE_PARAMS, derive_key, digest_key};
pub use middleware::{CACHE_STATUS_HEADER, CacheState, response_cache_layer};
pub use stats::{PerformanceReport, StatsReport, TierReport};
pub use store::{EntryInfo, EntryPage, ResponseCache, SetOptions};
pub use warm::WarmItem;
