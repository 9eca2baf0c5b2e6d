use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parse a policy value. Unset means the default; an unknown value is an error.
fn profiled_env_policy<T>(profile: &str, key: &str) -> Result<T, CoreError>
where
    T: FromStr<Err = CoreError> + Default,
{
    match profiled_env_opt(profile, key) {
        Some(raw) => raw
            .parse()
            .map_err(|CoreError::Config(msg)| CoreError::Config(format!("{key}: {msg}"))),
        None => Ok(T::default()),
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Active profile name (empty = default).
    pub profile: String,
    pub bus: BusConfig,
    pub influx: InfluxConfig,
    pub pipeline: PipelineConfig,
}

impl BridgeConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `BRIDGE_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    ///
    /// Fails on policy values that do not parse; other values are checked by
    /// [`validate`](Self::validate).
    pub fn from_env() -> Result<Self, CoreError> {
        let profile = env_or("BRIDGE_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Result<Self, CoreError> {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Ok(Self {
            profile: p.to_string(),
            bus: BusConfig::from_env_profiled(p),
            influx: InfluxConfig::from_env_profiled(p),
            pipeline: PipelineConfig::from_env_profiled(p)?,
        })
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.bus.validate()?;
        self.influx.validate()?;
        self.pipeline.validate()
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  bus:       endpoint={}, topic_root={}, payload_type={}",
            self.bus.endpoint(),
            self.bus.topic_root,
            self.bus.payload_type
        );
        tracing::info!(
            "  influx:    url={}, database={}, auth={}",
            self.influx.url,
            self.influx.database,
            if self.influx.has_credentials() { "yes" } else { "no" }
        );
        tracing::info!(
            "  pipeline:  capacity={}, workers={}, coercion={}, missing_time={}, write_failure={}",
            self.pipeline.queue_capacity,
            self.pipeline.worker_count,
            self.pipeline.coercion_policy,
            self.pipeline.missing_timestamp_policy,
            self.pipeline.write_failure_policy
        );
    }
}

// ── Bus ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// "tcp" or "ipc".
    pub transport: String,
    pub host: String,
    pub port: u16,
    pub ipc_name: String,
    /// Topics are `{topic_root}/{customer}/...`.
    pub topic_root: String,
    /// Payload object type carrying the MessagePack field map.
    pub payload_type: String,
}

impl BusConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            transport: profiled_env_or(p, "BUS_TRANSPORT", "tcp"),
            host: profiled_env_or(p, "BUS_HOST", "127.0.0.1"),
            port: profiled_env_u16(p, "BUS_PORT", 5556),
            ipc_name: profiled_env_or(p, "BUS_IPC_NAME", "bus-backend"),
            topic_root: profiled_env_or(p, "BUS_TOPIC_ROOT", "hamiltonbackend/sensors"),
            payload_type: profiled_env_or(p, "BUS_PAYLOAD_TYPE", "2.0.11.2"),
        }
    }

    /// ZeroMQ endpoint string, for logging.
    pub fn endpoint(&self) -> String {
        match self.transport.as_str() {
            "ipc" => format!("ipc:///tmp/influx-bridge/{}.sock", self.ipc_name),
            _ => format!("tcp://{}:{}", self.host, self.port),
        }
    }

    /// Topic prefix scoped to one customer: `{topic_root}/{customer}/`.
    pub fn subscription_prefix(&self, customer: &str) -> String {
        format!("{}/{}/", self.topic_root.trim_end_matches('/'), customer)
    }

    fn validate(&self) -> Result<(), CoreError> {
        match self.transport.as_str() {
            "tcp" | "ipc" => {}
            other => {
                return Err(CoreError::Config(format!(
                    "BUS_TRANSPORT must be \"tcp\" or \"ipc\", got {other:?}"
                )))
            }
        }
        if self.payload_type.is_empty() {
            return Err(CoreError::Config("BUS_PAYLOAD_TYPE must not be empty".into()));
        }
        Ok(())
    }
}

// ── InfluxDB ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxConfig {
    pub url: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// InfluxDB 2.x token, sent as `Authorization: Token ...`.
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl InfluxConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_or(p, "INFLUX_URL", "http://localhost:8086"),
            database: profiled_env_or(p, "INFLUX_DATABASE", "hamilton"),
            username: profiled_env_opt(p, "INFLUX_USERNAME"),
            password: profiled_env_opt(p, "INFLUX_PASSWORD"),
            token: profiled_env_opt(p, "INFLUX_TOKEN"),
            timeout_secs: profiled_env_u64(p, "INFLUX_TIMEOUT_SECS", 10),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn has_credentials(&self) -> bool {
        self.username.is_some() || self.token.is_some()
    }

    fn validate(&self) -> Result<(), CoreError> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(CoreError::Config(format!(
                "INFLUX_URL must be an http(s) URL, got {:?}",
                self.url
            )));
        }
        if self.database.is_empty() {
            return Err(CoreError::Config("INFLUX_DATABASE must not be empty".into()));
        }
        if self.timeout_secs == 0 {
            return Err(CoreError::Config("INFLUX_TIMEOUT_SECS must be > 0".into()));
        }
        Ok(())
    }
}

// ── Pipeline ──────────────────────────────────────────────────

/// Default series rewrite: `<prefix>.hamilton/<id>/<suffix>` → `hamilton/<id>`.
pub const DEFAULT_SERIES_PATTERN: &str = r"^.*\.hamilton/([^/]+)/.*$";
pub const DEFAULT_SERIES_REPLACEMENT: &str = "hamilton/$1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of records held by the ingestion queue.
    pub queue_capacity: usize,
    /// Number of concurrent sink writers.
    pub worker_count: usize,
    pub depth_report_interval_secs: u64,
    /// How long workers may keep draining after shutdown is requested.
    pub drain_timeout_secs: u64,
    pub coercion_policy: CoercionPolicy,
    pub missing_timestamp_policy: MissingTimestampPolicy,
    pub write_failure_policy: WriteFailurePolicy,
    pub series_pattern: String,
    pub series_replacement: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 5000,
            worker_count: 100,
            depth_report_interval_secs: 5,
            drain_timeout_secs: 30,
            coercion_policy: CoercionPolicy::default(),
            missing_timestamp_policy: MissingTimestampPolicy::default(),
            write_failure_policy: WriteFailurePolicy::default(),
            series_pattern: DEFAULT_SERIES_PATTERN.to_string(),
            series_replacement: DEFAULT_SERIES_REPLACEMENT.to_string(),
        }
    }
}

impl PipelineConfig {
    fn from_env_profiled(p: &str) -> Result<Self, CoreError> {
        let d = Self::default();
        Ok(Self {
            queue_capacity: profiled_env_usize(p, "QUEUE_CAPACITY", d.queue_capacity),
            worker_count: profiled_env_usize(p, "WORKER_COUNT", d.worker_count),
            depth_report_interval_secs: profiled_env_u64(
                p,
                "DEPTH_REPORT_INTERVAL_SECS",
                d.depth_report_interval_secs,
            ),
            drain_timeout_secs: profiled_env_u64(p, "DRAIN_TIMEOUT_SECS", d.drain_timeout_secs),
            coercion_policy: profiled_env_policy(p, "COERCION_POLICY")?,
            missing_timestamp_policy: profiled_env_policy(p, "MISSING_TIMESTAMP_POLICY")?,
            write_failure_policy: profiled_env_policy(p, "WRITE_FAILURE_POLICY")?,
            series_pattern: profiled_env_or(p, "SERIES_PATTERN", &d.series_pattern),
            series_replacement: profiled_env_or(p, "SERIES_REPLACEMENT", &d.series_replacement),
        })
    }

    pub fn depth_report_interval(&self) -> Duration {
        Duration::from_secs(self.depth_report_interval_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.queue_capacity == 0 {
            return Err(CoreError::Config("QUEUE_CAPACITY must be > 0".into()));
        }
        if self.worker_count == 0 {
            return Err(CoreError::Config("WORKER_COUNT must be > 0".into()));
        }
        if self.depth_report_interval_secs == 0 {
            return Err(CoreError::Config("DEPTH_REPORT_INTERVAL_SECS must be > 0".into()));
        }
        if self.series_pattern.is_empty() {
            return Err(CoreError::Config("SERIES_PATTERN must not be empty".into()));
        }
        Ok(())
    }
}

// ── Policies ──────────────────────────────────────────────────

/// What to do when a payload value cannot be coerced to a float.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoercionPolicy {
    /// Stop the whole pipeline.
    Abort,
    /// Drop the offending field, keep the rest of the record.
    SkipField,
    /// Drop the whole record.
    #[default]
    SkipRecord,
}

/// What to do when a payload has no `time` field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingTimestampPolicy {
    /// Keep the record with a zero timestamp.
    #[default]
    Zero,
    /// Reject the record.
    Reject,
}

/// What a worker does after a failed sink write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteFailurePolicy {
    /// Log the failure and keep draining.
    #[default]
    Continue,
    /// Stop the whole pipeline.
    Abort,
}

impl FromStr for CoercionPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip-field" | "skip_field" => Ok(Self::SkipField),
            "skip-record" | "skip_record" => Ok(Self::SkipRecord),
            other => Err(CoreError::Config(format!("unknown coercion policy: {other}"))),
        }
    }
}

impl FromStr for MissingTimestampPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zero" => Ok(Self::Zero),
            "reject" => Ok(Self::Reject),
            other => Err(CoreError::Config(format!(
                "unknown missing-timestamp policy: {other}"
            ))),
        }
    }
}

impl FromStr for WriteFailurePolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continue" => Ok(Self::Continue),
            "abort" => Ok(Self::Abort),
            other => Err(CoreError::Config(format!(
                "unknown write-failure policy: {other}"
            ))),
        }
    }
}

impl fmt::Display for CoercionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Abort => "abort",
            Self::SkipField => "skip-field",
            Self::SkipRecord => "skip-record",
        })
    }
}

impl fmt::Display for MissingTimestampPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Zero => "zero",
            Self::Reject => "reject",
        })
    }
}

impl fmt::Display for WriteFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Continue => "continue",
            Self::Abort => "abort",
        })
    }
}
