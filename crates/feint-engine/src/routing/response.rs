//! Canned response data and the per-route response pool entries.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::types::{Delay, EngineError, ResponseConfig};
use crate::collections::IdItem;

/// Emission data for one simulated response: body, latency, headers, status.
///
/// Immutable once built; also used for the unauthorized responses carried by
/// the authentication gate.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub body: Value,
    pub delay: Delay,
    pub headers: HashMap<String, String>,
    pub status: u16,
}

impl Response {
    pub fn new(body: Value, delay: Delay, status: u16) -> Self {
        Self {
            body,
            delay,
            headers: HashMap::new(),
            status,
        }
    }

    /// The response emitted when an authentication gate has no explicitly
    /// configured unauthorized response.
    pub fn default_unauthorized() -> Self {
        Self::new(
            json!({"error": "Unauthorized", "message": "Authentication failed."}),
            Delay::Fixed(0.0),
            401,
        )
    }

    /// Snapshot this response for emission, resolving the delay to a
    /// concrete duration.
    pub fn render(&self) -> Reply {
        Reply {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
            delay: self.delay.resolve(),
        }
    }

    pub fn serialize(&self) -> Value {
        json!({
            "body": self.body,
            "delay": self.delay,
            "headers": self.headers,
            "status": self.status,
        })
    }
}

/// A rendered response ready for the transport layer to emit.
///
/// The delay is advisory: the engine never sleeps, the transport simulates
/// the latency.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Value,
    pub delay: Duration,
}

/// One canned response in a route's pool, with its usage budget and
/// selection weight.
#[derive(Debug)]
pub struct RouteResponse {
    id: String,
    response: Response,
    repeat: Option<u64>,
    weight: f64,
    used_count: AtomicU64,
}

impl RouteResponse {
    pub fn from_config(config: ResponseConfig) -> Result<Self, EngineError> {
        if config.weight < 0.0 {
            return Err(EngineError::Configuration(format!(
                "response weight must be non-negative, got {}",
                config.weight
            )));
        }
        let id = config
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Ok(Self {
            id,
            response: Response {
                body: config.body,
                delay: config.delay,
                headers: config.headers,
                status: config.status,
            },
            repeat: config.repeat,
            weight: config.weight,
            used_count: AtomicU64::new(0),
        })
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn repeat(&self) -> Option<u64> {
        self.repeat
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn used_count(&self) -> u64 {
        self.used_count.load(Ordering::SeqCst)
    }

    /// True while the response has uses left.
    pub fn is_active(&self) -> bool {
        match self.repeat {
            None => true,
            Some(repeat) => self.used_count() < repeat,
        }
    }

    pub(crate) fn record_use(&self) {
        self.used_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Snapshot for emission; see [`Response::render`].
    pub fn render(&self) -> Reply {
        self.response.render()
    }

    pub fn serialize(&self) -> Value {
        let mut payload = self.response.serialize();
        let map = payload.as_object_mut().expect("response serializes to an object");
        map.insert("id".to_string(), json!(self.id));
        map.insert("used_count".to_string(), json!(self.used_count()));
        map.insert("repeat".to_string(), json!(self.repeat));
        map.insert("weight".to_string(), json!(self.weight));
        map.insert("is_active".to_string(), json!(self.is_active()));
        payload
    }
}

impl IdItem for RouteResponse {
    fn id(&self) -> &str {
        &self.id
    }
}
