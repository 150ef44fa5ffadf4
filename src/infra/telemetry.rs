use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
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
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "folio_cache_hit_total",
            Unit::Count,
            "Cache reads served from a tier, labelled by freshness state."
        );
        describe_counter!(
            "folio_cache_miss_total",
            Unit::Count,
            "Cache reads that had to wait for a fresh value, labelled by reason."
        );
        describe_counter!(
            "folio_cache_coalesced_total",
            Unit::Count,
            "Callers that joined a production already in flight."
        );
        describe_histogram!(
            "folio_cache_fresh_value_ms",
            Unit::Milliseconds,
            "Latency of fresh value productions in milliseconds."
        );
        describe_counter!(
            "folio_cache_fresh_value_failed_total",
            Unit::Count,
            "Fresh value productions that returned an error."
        );
        describe_counter!(
            "folio_cache_lru_evict_total",
            Unit::Count,
            "In-memory cache evictions due to capacity."
        );
        describe_counter!(
            "folio_cache_lru_expired_total",
            Unit::Count,
            "In-memory cache entries dropped after their lifetime ended."
        );
    });
}
