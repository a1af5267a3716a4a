//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::analysis::ComplexityConfig;
use crate::application::render::{
    DEFAULT_PAUSE_RECOVERY_TIMEOUT, DEFAULT_STANDARD_PACING, DEFAULT_STREAMING_PACING,
    StrategyThresholds,
};
use crate::cache::CacheConfig;
use crate::infra::memory::{DEFAULT_SAMPLING_INTERVAL, MemoryThresholds};

pub use cli::{AnalyzeArgs, ChunkArgs, CliArgs, Command, LogOverrides, RenderArgs};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "quire";
const ENV_PREFIX: &str = "QUIRE";

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub render: RenderSettings,
    pub complexity: ComplexityConfig,
    pub memory: MemorySettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub thresholds: StrategyThresholds,
    pub standard_pacing: Duration,
    pub streaming_pacing: Duration,
    pub interactive: bool,
    pub pause_recovery_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct MemorySettings {
    pub sampling_interval: Duration,
    pub thresholds: MemoryThresholds,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub max_entries: usize,
    pub max_bytes: usize,
    pub max_age_secs: Option<u64>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    if let Some(command) = cli.command.as_ref() {
        raw.apply_log_overrides(command.logging());
        if let Command::Render(args) = command
            && args.interactive
        {
            raw.render.interactive = Some(true);
        }
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    render: RawRenderSettings,
    complexity: ComplexityConfig,
    memory: RawMemorySettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_log_overrides(&mut self, overrides: &LogOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            render,
            complexity,
            memory,
            cache,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let render = build_render_settings(render)?;
        complexity
            .validate()
            .map_err(|err| LoadError::invalid("complexity", err.to_string()))?;
        let memory = build_memory_settings(memory)?;
        let cache = build_cache_settings(cache)?;

        Ok(Self {
            logging,
            render,
            complexity,
            memory,
            cache,
        })
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            logging: LoggingSettings {
                level: LevelFilter::INFO,
                format: LogFormat::Compact,
            },
            render: RenderSettings {
                thresholds: StrategyThresholds::default(),
                standard_pacing: DEFAULT_STANDARD_PACING,
                streaming_pacing: DEFAULT_STREAMING_PACING,
                interactive: false,
                pause_recovery_timeout: DEFAULT_PAUSE_RECOVERY_TIMEOUT,
            },
            complexity: ComplexityConfig::default(),
            memory: MemorySettings {
                sampling_interval: DEFAULT_SAMPLING_INTERVAL,
                thresholds: MemoryThresholds::default(),
            },
            cache: {
                let defaults = CacheConfig::default();
                CacheSettings {
                    enabled: defaults.enabled,
                    max_entries: defaults.max_entries,
                    max_bytes: defaults.max_bytes,
                    max_age_secs: defaults.max_age_secs,
                }
            },
        }
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let defaults = StrategyThresholds::default();
    let thresholds = StrategyThresholds {
        direct_limit: render.direct_limit.unwrap_or(defaults.direct_limit),
        standard_limit: render.standard_limit.unwrap_or(defaults.standard_limit),
        adaptive_limit: render.adaptive_limit.unwrap_or(defaults.adaptive_limit),
        max_document_size: render
            .max_document_size
            .unwrap_or(defaults.max_document_size),
        standard_chunk_size: render
            .standard_chunk_size
            .unwrap_or(defaults.standard_chunk_size),
        streaming_buffer_size: render
            .streaming_buffer_size
            .unwrap_or(defaults.streaming_buffer_size),
        adaptive_min_chunk: render
            .adaptive_min_chunk
            .unwrap_or(defaults.adaptive_min_chunk),
        adaptive_max_chunk: render
            .adaptive_max_chunk
            .unwrap_or(defaults.adaptive_max_chunk),
        adaptive_divisor: render.adaptive_divisor.unwrap_or(defaults.adaptive_divisor),
    };
    thresholds
        .validate()
        .map_err(|err| LoadError::invalid("render", err.to_string()))?;

    let standard_pacing = render
        .standard_pacing_ms
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_STANDARD_PACING);
    let streaming_pacing = render
        .streaming_pacing_ms
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_STREAMING_PACING);

    let pause_recovery_timeout = match render.pause_recovery_timeout_ms {
        Some(0) => {
            return Err(LoadError::invalid(
                "render.pause_recovery_timeout_ms",
                "must be greater than zero",
            ));
        }
        Some(ms) => Duration::from_millis(ms),
        None => DEFAULT_PAUSE_RECOVERY_TIMEOUT,
    };

    Ok(RenderSettings {
        thresholds,
        standard_pacing,
        streaming_pacing,
        interactive: render.interactive.unwrap_or(false),
        pause_recovery_timeout,
    })
}

fn build_memory_settings(memory: RawMemorySettings) -> Result<MemorySettings, LoadError> {
    let sampling_interval = match memory.sampling_interval_ms {
        Some(0) => {
            return Err(LoadError::invalid(
                "memory.sampling_interval_ms",
                "must be greater than zero",
            ));
        }
        Some(ms) => Duration::from_millis(ms),
        None => DEFAULT_SAMPLING_INTERVAL,
    };

    let defaults = MemoryThresholds::default();
    let thresholds = MemoryThresholds {
        warning_process_mib: memory
            .warning_process_mib
            .unwrap_or(defaults.warning_process_mib),
        critical_process_mib: memory
            .critical_process_mib
            .unwrap_or(defaults.critical_process_mib),
        warning_system_ratio: memory
            .warning_system_ratio
            .unwrap_or(defaults.warning_system_ratio),
        critical_system_ratio: memory
            .critical_system_ratio
            .unwrap_or(defaults.critical_system_ratio),
    };
    thresholds
        .validate()
        .map_err(|err| LoadError::invalid("memory", err.to_string()))?;

    Ok(MemorySettings {
        sampling_interval,
        thresholds,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let defaults = CacheConfig::default();

    let max_entries = cache.max_entries.unwrap_or(defaults.max_entries);
    if max_entries == 0 {
        return Err(LoadError::invalid(
            "cache.max_entries",
            "must be greater than zero",
        ));
    }

    let max_bytes_value = cache.max_bytes.unwrap_or(defaults.max_bytes as u64);
    if max_bytes_value == 0 {
        return Err(LoadError::invalid(
            "cache.max_bytes",
            "must be greater than zero",
        ));
    }
    let max_bytes = usize::try_from(max_bytes_value).map_err(|_| {
        LoadError::invalid(
            "cache.max_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    // Zero disables expiry.
    let max_age_secs = match cache.max_age_secs {
        Some(0) => None,
        Some(secs) => Some(secs),
        None => defaults.max_age_secs,
    };

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(defaults.enabled),
        max_entries,
        max_bytes,
        max_age_secs,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    direct_limit: Option<usize>,
    standard_limit: Option<usize>,
    adaptive_limit: Option<usize>,
    max_document_size: Option<usize>,
    standard_chunk_size: Option<usize>,
    streaming_buffer_size: Option<usize>,
    adaptive_min_chunk: Option<usize>,
    adaptive_max_chunk: Option<usize>,
    adaptive_divisor: Option<usize>,
    standard_pacing_ms: Option<u64>,
    streaming_pacing_ms: Option<u64>,
    interactive: Option<bool>,
    pause_recovery_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMemorySettings {
    sampling_interval_ms: Option<u64>,
    warning_process_mib: Option<u64>,
    critical_process_mib: Option<u64>,
    warning_system_ratio: Option<f64>,
    critical_system_ratio: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    max_entries: Option<usize>,
    max_bytes: Option<u64>,
    max_age_secs: Option<u64>,
}
