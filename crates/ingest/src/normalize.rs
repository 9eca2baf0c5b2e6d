//! Message-to-point normalization.
//!
//! Turns one decoded payload map plus its source topic into an
//! [`InsertRecord`]: the `time` key becomes the timestamp, every other key
//! is coerced to a float, and the topic is rewritten into a series path.

use std::collections::BTreeMap;

use regex::Regex;
use rmpv::Value;

use bridge_core::config::{DEFAULT_SERIES_PATTERN, DEFAULT_SERIES_REPLACEMENT};
use bridge_core::{CoercionPolicy, InsertRecord, MissingTimestampPolicy, PipelineConfig};

use crate::error::{NormalizeError, PayloadError};

/// Key holding the sample timestamp (nanoseconds since the epoch).
pub const TIME_FIELD: &str = "time";

/// A decoded payload: field name to MessagePack value, kept exactly as sent.
pub type Payload = BTreeMap<String, Value>;

/// Decode payload object content into a field map.
///
/// Only the envelope shape is checked here (a map with string keys); field
/// values of any type are kept so coercion can judge them per key.
pub fn decode_payload(content: &[u8]) -> Result<Payload, PayloadError> {
    let mut reader = content;
    match rmpv::decode::read_value(&mut reader)? {
        Value::Map(entries) => entries
            .into_iter()
            .map(|(key, value)| match key {
                Value::String(s) => s
                    .into_str()
                    .map(|key| (key, value))
                    .ok_or(PayloadError::NonStringKey),
                _ => Err(PayloadError::NonStringKey),
            })
            .collect(),
        other => Err(PayloadError::NotAMap(value_kind(&other))),
    }
}

// ── Series naming ────────────────────────────────────────────────────

/// Rewrites bus topics into series paths.
///
/// Topics that do not match the pattern are returned unchanged.
#[derive(Debug, Clone)]
pub struct SeriesMapper {
    pattern: Regex,
    replacement: String,
}

impl SeriesMapper {
    pub fn new(pattern: &str, replacement: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement: replacement.to_string(),
        })
    }

    pub fn series_path(&self, topic: &str) -> String {
        self.pattern
            .replace_all(topic, self.replacement.as_str())
            .into_owned()
    }
}

impl Default for SeriesMapper {
    fn default() -> Self {
        Self::new(DEFAULT_SERIES_PATTERN, DEFAULT_SERIES_REPLACEMENT)
            .expect("default series pattern compiles")
    }
}

// ── Normalizer ───────────────────────────────────────────────────────

/// Result of a successful normalization, with what had to be papered over.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub record: InsertRecord,
    /// Keys dropped under [`CoercionPolicy::SkipField`].
    pub skipped_fields: Vec<String>,
    /// The payload had no `time` key and the timestamp defaulted to zero.
    pub missing_timestamp: bool,
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    series: SeriesMapper,
    coercion: CoercionPolicy,
    missing_timestamp: MissingTimestampPolicy,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            series: SeriesMapper::default(),
            coercion: CoercionPolicy::default(),
            missing_timestamp: MissingTimestampPolicy::default(),
        }
    }
}

impl Normalizer {
    pub fn new(
        series: SeriesMapper,
        coercion: CoercionPolicy,
        missing_timestamp: MissingTimestampPolicy,
    ) -> Self {
        Self {
            series,
            coercion,
            missing_timestamp,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self, regex::Error> {
        Ok(Self::new(
            SeriesMapper::new(&config.series_pattern, &config.series_replacement)?,
            config.coercion_policy,
            config.missing_timestamp_policy,
        ))
    }

    pub fn coercion_policy(&self) -> CoercionPolicy {
        self.coercion
    }

    pub fn series_path(&self, topic: &str) -> String {
        self.series.series_path(topic)
    }

    /// Build an [`InsertRecord`] from one payload.
    ///
    /// A value that is neither boolean nor numeric fails the whole record
    /// unless the policy is [`CoercionPolicy::SkipField`]. A non-numeric
    /// `time` always fails.
    pub fn normalize(&self, topic: &str, payload: &Payload) -> Result<Normalized, NormalizeError> {
        let mut fields = BTreeMap::new();
        let mut skipped_fields = Vec::new();
        let mut timestamp = None;

        for (key, value) in payload {
            if key == TIME_FIELD {
                timestamp = Some(coerce_timestamp(value)?);
                continue;
            }
            match coerce_float(key, value) {
                Ok(v) => {
                    fields.insert(key.clone(), v);
                }
                Err(_) if self.coercion == CoercionPolicy::SkipField => {
                    skipped_fields.push(key.clone());
                }
                Err(e) => return Err(e),
            }
        }

        let missing_timestamp = timestamp.is_none();
        let timestamp = match (timestamp, self.missing_timestamp) {
            (Some(ts), _) => ts,
            (None, MissingTimestampPolicy::Zero) => 0,
            (None, MissingTimestampPolicy::Reject) => return Err(NormalizeError::MissingTimestamp),
        };

        Ok(Normalized {
            record: InsertRecord::new(self.series_path(topic), timestamp, fields),
            skipped_fields,
            missing_timestamp,
        })
    }
}

// ── Coercion ─────────────────────────────────────────────────────────

/// Booleans map to `1.0`/`0.0`; integers and floats of any width convert to
/// `f64`. Non-finite floats pass through; the store decides what to do with them.
pub fn coerce_float(key: &str, value: &Value) -> Result<f64, NormalizeError> {
    match value {
        Value::Boolean(true) => Ok(1.0),
        Value::Boolean(false) => Ok(0.0),
        Value::Integer(n) => n.as_f64().ok_or_else(|| coercion_error(key, value)),
        Value::F32(f) => Ok(f64::from(*f)),
        Value::F64(f) => Ok(*f),
        _ => Err(coercion_error(key, value)),
    }
}

/// Integers are taken verbatim; finite floats are truncated toward zero.
fn coerce_timestamp(value: &Value) -> Result<i64, NormalizeError> {
    let ts = match value {
        Value::Integer(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::F32(f) if f.is_finite() => Some(*f as i64),
        Value::F64(f) if f.is_finite() => Some(*f as i64),
        _ => None,
    };
    ts.ok_or_else(|| coercion_error(TIME_FIELD, value))
}

fn coercion_error(key: &str, value: &Value) -> NormalizeError {
    NormalizeError::TypeCoercion {
        key: key.to_string(),
        kind: value_kind(value),
    }
}

/// Runtime type name used in coercion errors.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Nil => "nil",
        Value::Boolean(_) => "bool",
        Value::Integer(_) => "integer",
        Value::F32(_) | Value::F64(_) => "float",
        Value::String(_) => "string",
        Value::Binary(_) => "binary",
        Value::Array(_) => "array",
        Value::Map(_) => "map",
        Value::Ext(..) => "ext",
    }
}
