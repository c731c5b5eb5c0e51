//! Tracing and metrics bootstrap.
//!
//! Host applications call [`init`] once at startup; every module in this
//! crate emits through the `tracing` and `metrics` facades and works fine
//! without it (events and samples are simply dropped).

use std::str::FromStr;
use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

const DEFAULT_LEVEL: &str = "info";

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Log output settings, embeddable in a host settings file:
///
/// ```toml
/// [telemetry]
/// level = "debug"
/// format = "json"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Compact,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL.to_string(),
            format: LogFormat::Compact,
        }
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log level `{value}`: {message}")]
    InvalidLevel { value: String, message: String },
    #[error("failed to install tracing subscriber: {message}")]
    Install { message: String },
}

impl TelemetryError {
    fn invalid_level(value: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidLevel {
            value: value.into(),
            message: message.into(),
        }
    }

    fn install(message: impl Into<String>) -> Self {
        Self::Install {
            message: message.into(),
        }
    }
}

/// Install a global tracing subscriber using the provided settings.
pub fn init(settings: &TelemetrySettings) -> Result<(), TelemetryError> {
    describe_metrics();

    let level = LevelFilter::from_str(settings.level.as_str())
        .map_err(|err| TelemetryError::invalid_level(settings.level.clone(), err.to_string()))?;

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let fmt_layer = match settings.format {
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
        .map_err(|err| TelemetryError::install(err.to_string()))
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "scorta_cache_hit_total",
            Unit::Count,
            "Total number of typed cache reads that returned a value."
        );
        describe_counter!(
            "scorta_cache_miss_total",
            Unit::Count,
            "Total number of typed cache reads that returned nothing."
        );
        describe_counter!(
            "scorta_cache_write_total",
            Unit::Count,
            "Total number of cache writes through the single write path."
        );
        describe_counter!(
            "scorta_cache_invalidate_total",
            Unit::Count,
            "Total number of cache entries notified by prefix invalidation."
        );
        describe_counter!(
            "scorta_cache_remove_total",
            Unit::Count,
            "Total number of cache entries cleared by prefix removal."
        );
        describe_gauge!(
            "scorta_cache_entries",
            Unit::Count,
            "Current number of allocated cache entry slots."
        );
        describe_histogram!(
            "scorta_query_fetch_ms",
            Unit::Milliseconds,
            "Query fetch latency in milliseconds, labeled by outcome."
        );
        describe_histogram!(
            "scorta_mutation_ms",
            Unit::Milliseconds,
            "Mutation latency in milliseconds, labeled by outcome."
        );
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_default_to_compact_info() {
        let settings = TelemetrySettings::default();
        assert_eq!(settings.level, "info");
        assert_eq!(settings.format, LogFormat::Compact);
    }

    #[test]
    fn settings_deserialize_from_toml() {
        let settings: TelemetrySettings =
            toml::from_str("level = \"debug\"\nformat = \"json\"").expect("valid settings");
        assert_eq!(settings.level, "debug");
        assert_eq!(settings.format, LogFormat::Json);
    }

    #[test]
    fn settings_fill_missing_fields_from_defaults() {
        let settings: TelemetrySettings =
            toml::from_str("format = \"json\"").expect("valid settings");
        assert_eq!(settings.level, "info");
        assert_eq!(settings.format, LogFormat::Json);
    }

    #[test]
    fn init_rejects_an_unknown_level() {
        let settings = TelemetrySettings {
            level: "chatty".to_string(),
            format: LogFormat::Compact,
        };
        let err = init(&settings).expect_err("level should not parse");
        assert!(matches!(err, TelemetryError::InvalidLevel { .. }));
    }
}
