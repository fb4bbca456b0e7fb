//! Type definitions for the routing engine.
//!
//! Configuration payload structs, the `Delay` value, and the error taxonomy
//! shared by the registry, the matcher and the authentication gate.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::collections::IdListError;

// ============================================================================
// Error Types
// ============================================================================

/// Authentication failure, carrying a human-readable reason.
///
/// Raised by the auth gate; the caller translates it into the gate's
/// configured unauthorized response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct AuthenticationError(pub String);

/// Error types for registry and configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed configuration: bad regex, unknown auth method, payload that
    /// does not deserialize.
    #[error("route configuration error: {0}")]
    Configuration(String),
    /// Payload rejected by the schema gate.
    #[error("invalid payload: {0}")]
    Validation(String),
    #[error("{0}")]
    DuplicateId(String),
    #[error("{0}")]
    MissingId(String),
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Configuration(err.to_string())
    }
}

impl From<regex::Error> for EngineError {
    fn from(err: regex::Error) -> Self {
        EngineError::Configuration(err.to_string())
    }
}

impl EngineError {
    pub(crate) fn duplicate_route(err: IdListError) -> Self {
        match err {
            IdListError::DuplicateKey(id) => {
                EngineError::DuplicateId(format!("route id \"{id}\" already exists"))
            }
            IdListError::MissingKey(id) => {
                EngineError::MissingId(format!("route \"{id}\" does not exist"))
            }
        }
    }
}

// ============================================================================
// Delay
// ============================================================================

/// Simulated response latency: a fixed wait or a `[min, max)` random range,
/// in seconds.
///
/// Resolved to a concrete [`Duration`] when a response is emitted; the
/// engine itself never sleeps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DelayRepr", into = "DelayRepr")]
pub enum Delay {
    Fixed(f64),
    Range(f64, f64),
}

impl Default for Delay {
    fn default() -> Self {
        Delay::Fixed(0.0)
    }
}

impl Delay {
    /// Resolve to a concrete duration, drawing from the range if configured.
    pub fn resolve(&self) -> Duration {
        let seconds = match *self {
            Delay::Fixed(seconds) => seconds,
            Delay::Range(min, max) if min < max => rand::thread_rng().gen_range(min..max),
            Delay::Range(min, _) => min,
        };
        Duration::from_secs_f64(seconds)
    }
}

/// Wire shape of a delay: a bare number or a two-element array.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
enum DelayRepr {
    Fixed(f64),
    Range(f64, f64),
}

impl TryFrom<DelayRepr> for Delay {
    type Error = String;

    fn try_from(repr: DelayRepr) -> Result<Self, Self::Error> {
        match repr {
            DelayRepr::Fixed(seconds) if seconds >= 0.0 => Ok(Delay::Fixed(seconds)),
            DelayRepr::Fixed(seconds) => Err(format!("delay must be non-negative, got {seconds}")),
            DelayRepr::Range(min, max) if min < 0.0 || max < 0.0 => {
                Err(format!("delay bounds must be non-negative, got [{min}, {max}]"))
            }
            DelayRepr::Range(min, max) if min > max => {
                Err(format!("delay range is inverted: [{min}, {max}]"))
            }
            DelayRepr::Range(min, max) => Ok(Delay::Range(min, max)),
        }
    }
}

impl From<Delay> for DelayRepr {
    fn from(delay: Delay) -> Self {
        match delay {
            Delay::Fixed(seconds) => DelayRepr::Fixed(seconds),
            Delay::Range(min, max) => DelayRepr::Range(min, max),
        }
    }
}

// ============================================================================
// Configuration payloads
// ============================================================================

/// How a configured body value is compared against the request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyMatchingMethod {
    #[default]
    Exact,
    Regex,
}

pub(crate) fn default_status() -> u16 {
    200
}

pub(crate) fn default_weight() -> f64 {
    0.5
}

fn default_method() -> Option<String> {
    Some("GET".to_string())
}

/// Configuration payload for one canned response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub body: serde_json::Value,
    #[serde(default)]
    pub delay: Delay,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default)]
    pub repeat: Option<u64>,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

/// Configuration payload for a route.
///
/// `method` defaults to `GET` when the field is missing; an explicit `null`
/// matches any verb. Fields the engine computes on serialization
/// (`used_count`, `is_active`) are ignored on the way in, so serialized
/// routes can be fed back unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default = "default_method")]
    pub method: Option<String>,
    pub path: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub body_matching_method: BodyMatchingMethod,
    #[serde(default)]
    pub response_selection: super::selection::SelectionStrategy,
    #[serde(default)]
    pub auth: Option<serde_json::Value>,
    pub responses: Vec<ResponseConfig>,
}
