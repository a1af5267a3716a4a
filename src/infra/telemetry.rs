//! Tracing subscriber installation and the metric catalogue.

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

pub const METRIC_CACHE_HIT: &str = "quire_cache_hit_total";
pub const METRIC_CACHE_MISS: &str = "quire_cache_miss_total";
pub const METRIC_CACHE_EVICT: &str = "quire_cache_evict_total";
pub const METRIC_RENDER_CHUNKS: &str = "quire_render_chunks_total";
pub const METRIC_RENDER_FALLBACK: &str = "quire_render_fallback_total";
pub const METRIC_RENDER_MS: &str = "quire_render_ms";
pub const METRIC_MEMORY_LEVEL: &str = "quire_memory_level";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

const CATALOGUE: &[(&str, MetricKind, Unit, &str)] = &[
    (
        METRIC_CACHE_HIT,
        MetricKind::Counter,
        Unit::Count,
        "Markup cache lookups answered from the cache.",
    ),
    (
        METRIC_CACHE_MISS,
        MetricKind::Counter,
        Unit::Count,
        "Markup cache lookups that found nothing usable, expired entries included.",
    ),
    (
        METRIC_CACHE_EVICT,
        MetricKind::Counter,
        Unit::Count,
        "Markup cache entries dropped by capacity, byte ceiling, age or shedding.",
    ),
    (
        METRIC_RENDER_CHUNKS,
        MetricKind::Counter,
        Unit::Count,
        "Chunks acknowledged by render sinks.",
    ),
    (
        METRIC_RENDER_FALLBACK,
        MetricKind::Counter,
        Unit::Count,
        "Renders that fell back to whole-document delivery.",
    ),
    (
        METRIC_RENDER_MS,
        MetricKind::Histogram,
        Unit::Milliseconds,
        "Wall time of successful renders, cache hits included.",
    ),
    (
        METRIC_MEMORY_LEVEL,
        MetricKind::Gauge,
        Unit::Count,
        "Memory pressure level: 0 normal, 1 warning, 2 critical.",
    ),
];

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays machine-readable.
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
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| InfraError::telemetry(format!("subscriber already installed: {err}")))
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        for &(name, kind, unit, description) in CATALOGUE {
            match kind {
                MetricKind::Counter => describe_counter!(name, unit, description),
                MetricKind::Gauge => describe_gauge!(name, unit, description),
                MetricKind::Histogram => describe_histogram!(name, unit, description),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use tracing::level_filters::LevelFilter;

    use super::*;

    #[test]
    fn catalogue_names_are_unique_and_prefixed() {
        let names: HashSet<&str> = CATALOGUE.iter().map(|(name, ..)| *name).collect();
        assert_eq!(names.len(), CATALOGUE.len());
        assert!(names.iter().all(|name| name.starts_with("quire_")));
        assert!(
            CATALOGUE
                .iter()
                .filter(|(_, kind, ..)| *kind == MetricKind::Counter)
                .all(|(name, ..)| name.ends_with("_total"))
        );
    }

    #[test]
    fn second_install_is_reported() {
        let logging = LoggingSettings {
            level: LevelFilter::WARN,
            format: LogFormat::Compact,
        };
        init(&logging).expect("first install");
        let err = init(&logging).expect_err("second install");
        assert!(matches!(err, InfraError::Telemetry(_)));
    }
}
