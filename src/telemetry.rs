use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::CacheError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingConfig) -> Result<(), CacheError> {
    describe_metrics();

    let default_directive = logging.level.parse().map_err(|err| {
        CacheError::telemetry(format!("invalid log level {:?}: {err}", logging.level))
    })?;
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_directive)
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            CacheError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register descriptions for every metric the cache emits. Idempotent.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "panelcache_hit_total",
            Unit::Count,
            "Total number of cache hits, labelled by the tier that served them."
        );
        describe_counter!(
            "panelcache_miss_total",
            Unit::Count,
            "Total number of cache misses."
        );
        describe_counter!(
            "panelcache_evict_total",
            Unit::Count,
            "Total number of LRU evictions from L1."
        );
        describe_counter!(
            "panelcache_expired_swept_total",
            Unit::Count,
            "Total number of expired entries removed by the sweeper."
        );
        describe_counter!(
            "panelcache_compression_skipped_total",
            Unit::Count,
            "Total number of payloads stored raw after a compression failure."
        );
        describe_histogram!(
            "panelcache_sweep_ms",
            Unit::Milliseconds,
            "Expiry sweep pass latency in milliseconds."
        );
        describe_histogram!(
            "panelcache_warm_ms",
            Unit::Milliseconds,
            "Warm pass latency in milliseconds."
        );
    });
}
