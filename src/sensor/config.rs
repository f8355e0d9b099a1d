use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

use crate::error::ConfigError;

/// Attribute map as handed over by the host.
pub type Attributes = Map<String, Value>;

pub const DEFAULT_EXPIRATION_SECONDS: u64 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorConfig {
    /// Name of the speech source dependency.
    pub speech_service: String,
    /// Name of the sentiment classifier dependency.
    pub sentiment_service: String,
    pub reading_expiration_seconds: u64,
}

// Everything optional here so missing fields get our own error instead of serde's.
#[derive(Deserialize)]
struct RawAttributes {
    #[serde(default)]
    speech_service: Option<String>,
    #[serde(default)]
    sentiment_service: Option<String>,
    #[serde(default)]
    reading_expiration_seconds: Option<Value>,
}

impl SensorConfig {
    pub fn from_attributes(attributes: &Attributes) -> Result<Self, ConfigError> {
        let raw: RawAttributes = serde_json::from_value(Value::Object(attributes.clone()))
            .map_err(|e| ConfigError::InvalidAttribute {
                name: "attributes",
                reason: e.to_string(),
            })?;

        let speech_service = required(raw.speech_service, "speech_service")?;
        let sentiment_service = required(raw.sentiment_service, "sentiment_service")?;
        let reading_expiration_seconds = match raw.reading_expiration_seconds {
            None | Some(Value::Null) => DEFAULT_EXPIRATION_SECONDS,
            Some(value) => parse_seconds(&value)?,
        };

        Ok(Self {
            speech_service,
            sentiment_service,
            reading_expiration_seconds,
        })
    }

    pub fn expiration_window(&self) -> Duration {
        Duration::from_secs(self.reading_expiration_seconds)
    }

    /// Names the host must resolve before calling `reconfigure`.
    pub fn required_dependencies(&self) -> Vec<String> {
        vec![self.speech_service.clone(), self.sentiment_service.clone()]
    }
}

/// Checks the attributes and returns the names of the required dependencies.
pub fn validate_config(attributes: &Attributes) -> Result<Vec<String>, ConfigError> {
    SensorConfig::from_attributes(attributes).map(|config| config.required_dependencies())
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingAttribute(name)),
    }
}

// Hosts that stringly-type their attributes send "30" as often as 30.
fn parse_seconds(value: &Value) -> Result<u64, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidAttribute {
        name: "reading_expiration_seconds",
        reason,
    };

    match value {
        Value::Number(n) => {
            if let Some(secs) = n.as_u64() {
                Ok(secs)
            } else if let Some(f) = n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0) {
                Ok(f as u64)
            } else {
                Err(invalid(format!("expected a non-negative integer, got {}", n)))
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|e| invalid(format!("{:?} is not an integer: {}", s, e))),
        other => Err(invalid(format!("expected an integer, got {}", other))),
    }
}
