// src/config.rs

//! Manages bridge configuration: loading, validation and resolution of
//! startup-time values such as the memory budget.
//!
//! Invalid values are never fatal. Each one is logged and replaced by its
//! default, so a partially broken file still yields a runnable bridge. Only an
//! unreadable or unparsable file is reported as an error.

use crate::core::subject::SubjectKind;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt::Display;
use std::fs;
use std::path::Path;
use std::time::Duration;
use sysinfo::System;
use tracing::{info, warn};

/// The fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    /// Starts the bridge with debug logging enabled.
    pub debug: bool,
    pub connection: ConnectionConfig,
    pub health: HealthConfig,
    pub scheduler: SchedulerConfig,
    pub cache: CacheConfig,
    pub translation: TranslationConfig,
    pub integrations: Vec<IntegrationConfig>,
    pub metrics: MetricsConfig,
    /// The memory budget in bytes, probed once at load time.
    pub available_memory: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub write_timeout: Duration,
    pub send_queue_capacity: usize,
    pub max_frame_length: usize,
    pub reconnect_delay: Duration,
    pub reconnect_max_delay: Duration,
    pub reconnect_jitter: Duration,
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthConfig {
    pub interval: Duration,
    pub inactivity_threshold: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Pool size hint. Zero selects an automatic size.
    pub threads: usize,
    pub shutdown_grace: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub memory_fraction: f64,
    pub maintenance_interval: Duration,
    pub blocks: TierConfig,
    pub items: TierConfig,
    pub entities: TierConfig,
}

impl CacheConfig {
    pub fn tier(&self, kind: SubjectKind) -> &TierConfig {
        match kind {
            SubjectKind::Block => &self.blocks,
            SubjectKind::Item => &self.items,
            SubjectKind::Entity => &self.entities,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TierConfig {
    pub max_entries: usize,
    pub ttl: Duration,
    /// The estimated footprint of one entry, used to derive capacity.
    pub entry_size_bytes: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranslationConfig {
    /// The identifier served when a translation fails.
    pub fallback: String,
    pub mappings: HashMap<String, String>,
    pub warmup: WarmupConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WarmupConfig {
    #[serde(default = "default_warmup_delay", with = "humantime_serde")]
    pub delay: Duration,
    #[serde(default)]
    pub blocks: Vec<String>,
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default)]
    pub entities: Vec<String>,
}

impl WarmupConfig {
    pub fn subjects(&self, kind: SubjectKind) -> &[String] {
        match kind {
            SubjectKind::Block => &self.blocks,
            SubjectKind::Item => &self.items,
            SubjectKind::Entity => &self.entities,
        }
    }
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            delay: default_warmup_delay(),
            blocks: Vec::new(),
            items: Vec::new(),
            entities: Vec::new(),
        }
    }
}

/// A statically configured integration handler.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IntegrationConfig {
    pub id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub mappings: HashMap<String, String>,
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

// --- Defaults ---

fn default_log_level() -> String {
    "info".to_string()
}
fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    19132
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_write_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_send_queue_capacity() -> usize {
    1024
}
fn default_max_frame_length() -> usize {
    1024 * 1024
}
fn default_reconnect_delay() -> Duration {
    Duration::from_secs(5)
}
fn default_health_interval() -> Duration {
    Duration::from_secs(30)
}
fn default_inactivity_threshold() -> Duration {
    Duration::from_secs(30)
}
fn default_shutdown_grace() -> Duration {
    Duration::from_secs(10)
}
fn default_memory_fraction() -> f64 {
    0.25
}
fn default_maintenance_interval() -> Duration {
    Duration::from_secs(300)
}
fn default_fallback() -> String {
    "minecraft:unknown".to_string()
}
fn default_warmup_delay() -> Duration {
    Duration::from_secs(2)
}
fn default_metrics_port() -> u16 {
    8878
}
fn default_true() -> bool {
    true
}

impl TierConfig {
    /// The primary tier.
    pub fn blocks() -> Self {
        Self {
            max_entries: 8192,
            ttl: Duration::from_secs(2 * 60 * 60),
            entry_size_bytes: 1024,
        }
    }

    pub fn items() -> Self {
        Self {
            max_entries: 4096,
            ttl: Duration::from_secs(60 * 60),
            entry_size_bytes: 2048,
        }
    }

    pub fn entities() -> Self {
        Self {
            max_entries: 1024,
            ttl: Duration::from_secs(60 * 60),
            entry_size_bytes: 2048,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_ms: default_connect_timeout_ms(),
            write_timeout: default_write_timeout(),
            send_queue_capacity: default_send_queue_capacity(),
            max_frame_length: default_max_frame_length(),
            reconnect_delay: default_reconnect_delay(),
            reconnect_max_delay: default_reconnect_delay(),
            reconnect_jitter: Duration::ZERO,
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval: default_health_interval(),
            inactivity_threshold: default_inactivity_threshold(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            shutdown_grace: default_shutdown_grace(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_fraction: default_memory_fraction(),
            maintenance_interval: default_maintenance_interval(),
            blocks: TierConfig::blocks(),
            items: TierConfig::items(),
            entities: TierConfig::entities(),
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            fallback: default_fallback(),
            mappings: HashMap::new(),
            warmup: WarmupConfig::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        RawConfig::default().resolve()
    }
}

// --- Raw representation ---
//
// Every range-checked value is optional and read in a wide type so that an
// out-of-range number becomes a warning instead of a parse error.

#[derive(Deserialize, Default)]
struct RawConfig {
    log_level: Option<String>,
    #[serde(default)]
    debug: bool,
    #[serde(default)]
    connection: RawConnection,
    #[serde(default)]
    health: RawHealth,
    #[serde(default)]
    scheduler: RawScheduler,
    #[serde(default)]
    cache: RawCache,
    #[serde(default)]
    translation: RawTranslation,
    #[serde(default, rename = "integration")]
    integrations: Vec<IntegrationConfig>,
    #[serde(default)]
    metrics: MetricsConfig,
}

#[derive(Deserialize, Default)]
struct RawConnection {
    host: Option<String>,
    port: Option<i64>,
    connect_timeout_ms: Option<i64>,
    #[serde(default, with = "humantime_serde")]
    write_timeout: Option<Duration>,
    send_queue_capacity: Option<i64>,
    max_frame_length: Option<i64>,
    #[serde(default, with = "humantime_serde")]
    reconnect_delay: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    reconnect_max_delay: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    reconnect_jitter: Option<Duration>,
}

#[derive(Deserialize, Default)]
struct RawHealth {
    #[serde(default, with = "humantime_serde")]
    interval: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    inactivity_threshold: Option<Duration>,
}

#[derive(Deserialize, Default)]
struct RawScheduler {
    threads: Option<i64>,
    #[serde(default, with = "humantime_serde")]
    shutdown_grace: Option<Duration>,
}

#[derive(Deserialize, Default)]
struct RawCache {
    memory_fraction: Option<f64>,
    /// Overrides the probed memory budget, in bytes.
    memory_budget_bytes: Option<u64>,
    #[serde(default, with = "humantime_serde")]
    maintenance_interval: Option<Duration>,
    #[serde(default)]
    blocks: RawTier,
    #[serde(default)]
    items: RawTier,
    #[serde(default)]
    entities: RawTier,
}

#[derive(Deserialize, Default)]
struct RawTier {
    max_entries: Option<i64>,
    #[serde(default, with = "humantime_serde")]
    ttl: Option<Duration>,
    entry_size_bytes: Option<i64>,
}

#[derive(Deserialize, Default)]
struct RawTranslation {
    fallback: Option<String>,
    #[serde(default)]
    mappings: HashMap<String, String>,
    #[serde(default)]
    warmup: WarmupConfig,
}

/// Returns `value` if it lies in `[min, max]`, otherwise warns and returns `default`.
fn in_range<T>(field: &str, value: Option<T>, min: T, max: T, default: T) -> T
where
    T: PartialOrd + Display + Copy,
{
    match value {
        None => default,
        Some(v) if v >= min && v <= max => v,
        Some(v) => {
            warn!(
                "Invalid value {} for '{}' (expected {}..={}). Falling back to default {}.",
                v, field, min, max, default
            );
            default
        }
    }
}

/// Returns a non-zero `value`, otherwise warns and returns `default`.
fn non_zero(field: &str, value: Option<Duration>, default: Duration) -> Duration {
    match value {
        None => default,
        Some(v) if !v.is_zero() => v,
        Some(_) => {
            warn!(
                "Invalid value 0s for '{}'. Falling back to default {:?}.",
                field, default
            );
            default
        }
    }
}

fn non_blank(field: &str, value: Option<String>, default: String) -> String {
    match value {
        None => default,
        Some(v) if !v.trim().is_empty() => v,
        Some(_) => {
            warn!(
                "'{}' cannot be empty. Falling back to default '{}'.",
                field, default
            );
            default
        }
    }
}

fn resolve_tier(name: &str, raw: RawTier, default: TierConfig, bounds: (i64, i64)) -> TierConfig {
    let (min, max) = bounds;
    TierConfig {
        max_entries: in_range(
            &format!("cache.{name}.max_entries"),
            raw.max_entries,
            min,
            max,
            default.max_entries as i64,
        ) as usize,
        ttl: non_zero(&format!("cache.{name}.ttl"), raw.ttl, default.ttl),
        entry_size_bytes: in_range(
            &format!("cache.{name}.entry_size_bytes"),
            raw.entry_size_bytes,
            1,
            1 << 20,
            default.entry_size_bytes as i64,
        ) as usize,
    }
}

impl RawConfig {
    fn resolve(self) -> Config {
        let c = self.connection;
        let reconnect_delay = non_zero(
            "connection.reconnect_delay",
            c.reconnect_delay,
            default_reconnect_delay(),
        );
        let mut reconnect_max_delay = c.reconnect_max_delay.unwrap_or(reconnect_delay);
        if reconnect_max_delay < reconnect_delay {
            warn!(
                "'connection.reconnect_max_delay' ({:?}) is below 'connection.reconnect_delay' ({:?}). Using the reconnect delay.",
                reconnect_max_delay, reconnect_delay
            );
            reconnect_max_delay = reconnect_delay;
        }
        let connection = ConnectionConfig {
            host: non_blank("connection.host", c.host, default_host()),
            port: in_range(
                "connection.port",
                c.port,
                1024,
                65535,
                default_port() as i64,
            ) as u16,
            connect_timeout_ms: in_range(
                "connection.connect_timeout_ms",
                c.connect_timeout_ms,
                1000,
                30000,
                default_connect_timeout_ms() as i64,
            ) as u64,
            write_timeout: non_zero(
                "connection.write_timeout",
                c.write_timeout,
                default_write_timeout(),
            ),
            send_queue_capacity: in_range(
                "connection.send_queue_capacity",
                c.send_queue_capacity,
                1,
                1 << 20,
                default_send_queue_capacity() as i64,
            ) as usize,
            max_frame_length: in_range(
                "connection.max_frame_length",
                c.max_frame_length,
                1024,
                16 << 20,
                default_max_frame_length() as i64,
            ) as usize,
            reconnect_delay,
            reconnect_max_delay,
            reconnect_jitter: c.reconnect_jitter.unwrap_or(Duration::ZERO),
        };

        let health = HealthConfig {
            interval: non_zero(
                "health.interval",
                self.health.interval,
                default_health_interval(),
            ),
            inactivity_threshold: non_zero(
                "health.inactivity_threshold",
                self.health.inactivity_threshold,
                default_inactivity_threshold(),
            ),
        };

        let scheduler = SchedulerConfig {
            threads: in_range("scheduler.threads", self.scheduler.threads, 0, 128, 0) as usize,
            shutdown_grace: non_zero(
                "scheduler.shutdown_grace",
                self.scheduler.shutdown_grace,
                default_shutdown_grace(),
            ),
        };

        let rc = self.cache;
        let memory_fraction = match rc.memory_fraction {
            None => default_memory_fraction(),
            Some(f) if f > 0.0 && f <= 1.0 => f,
            Some(f) => {
                warn!(
                    "Invalid value {} for 'cache.memory_fraction' (expected a value in (0, 1]). Falling back to default {}.",
                    f,
                    default_memory_fraction()
                );
                default_memory_fraction()
            }
        };
        let cache = CacheConfig {
            memory_fraction,
            maintenance_interval: non_zero(
                "cache.maintenance_interval",
                rc.maintenance_interval,
                default_maintenance_interval(),
            ),
            blocks: resolve_tier("blocks", rc.blocks, TierConfig::blocks(), (1024, 65536)),
            items: resolve_tier("items", rc.items, TierConfig::items(), (512, 32768)),
            entities: resolve_tier("entities", rc.entities, TierConfig::entities(), (128, 16384)),
        };

        let translation = TranslationConfig {
            fallback: non_blank(
                "translation.fallback",
                self.translation.fallback,
                default_fallback(),
            ),
            mappings: self.translation.mappings,
            warmup: self.translation.warmup,
        };

        let mut metrics = self.metrics;
        if metrics.port == 0 {
            warn!(
                "'metrics.port' cannot be 0. Falling back to default {}.",
                default_metrics_port()
            );
            metrics.port = default_metrics_port();
        }

        let available_memory = match rc.memory_budget_bytes {
            Some(budget) if budget > 0 => {
                info!("Using configured memory budget of {} bytes.", budget);
                budget
            }
            _ => probe_available_memory(),
        };

        Config {
            log_level: non_blank("log_level", self.log_level, default_log_level()),
            debug: self.debug,
            connection,
            health,
            scheduler,
            cache,
            translation,
            integrations: self.integrations,
            metrics,
            available_memory,
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file.
    ///
    /// A missing file yields the defaults with a warning.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(
                "Config file '{}' not found. Using default configuration.",
                path.display()
            );
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{}'", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{}'", path.display()))
    }

    /// Parses and resolves a configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(contents)?;
        Ok(raw.resolve())
    }
}

// Platform-specific module for detecting cgroup memory limits on Linux.
#[cfg(target_os = "linux")]
mod linux_memory {
    use super::*;

    pub fn get_cgroup_memory_limit() -> Option<u64> {
        // Cgroup v2
        if let Ok(limit_str) = fs::read_to_string("/sys/fs/cgroup/memory.max")
            && let Ok(limit) = limit_str.trim().parse::<u64>()
            && limit < u64::MAX / 2
        {
            info!("Detected cgroup v2 memory limit: {} bytes", limit);
            return Some(limit);
        }

        // Cgroup v1
        if let Ok(limit_str) = fs::read_to_string("/sys/fs/cgroup/memory/memory.limit_in_bytes")
            && let Ok(limit) = limit_str.trim().parse::<u64>()
            && limit < u64::MAX / 2
        {
            info!("Detected cgroup v1 memory limit: {} bytes", limit);
            return Some(limit);
        }

        None
    }
}

// Stub module for non-Linux operating systems.
#[cfg(not(target_os = "linux"))]
mod other_os_memory {
    pub fn get_cgroup_memory_limit() -> Option<u64> {
        None
    }
}

/// Probes the memory budget once: the cgroup limit on Linux, else total
/// system memory. This is an approximation of what the process may use.
pub fn probe_available_memory() -> u64 {
    #[cfg(target_os = "linux")]
    let cgroup_limit = linux_memory::get_cgroup_memory_limit();

    #[cfg(not(target_os = "linux"))]
    let cgroup_limit = other_os_memory::get_cgroup_memory_limit();

    if let Some(limit) = cgroup_limit {
        return limit;
    }

    let mut sys = System::new();
    sys.refresh_memory();
    let total_memory = sys.total_memory();
    info!(
        "Could not detect cgroup memory limit. Using total system memory: {} bytes",
        total_memory
    );
    total_memory
}
