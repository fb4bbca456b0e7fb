//! A route: one request matcher plus its owned response pool, auth and
//! selection policy.

use parking_lot::{Mutex, MutexGuard};
use regex::Regex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

use super::auth::Auth;
use super::response::RouteResponse;
use super::selection::SelectionStrategy;
use super::types::{AuthenticationError, BodyMatchingMethod, EngineError, RouteConfig};
use crate::collections::{IdItem, IdList};
use crate::request::IncomingRequest;

/// A compiled pattern matched from the start of its input.
///
/// Prefix semantics, not a full-string match: a pattern of `/a` matches the
/// path `/ab`. Callers that want a full match anchor the pattern themselves.
#[derive(Debug)]
pub struct Pattern {
    raw: String,
    regex: Regex,
}

impl Pattern {
    pub fn compile(raw: &str) -> Result<Self, EngineError> {
        Ok(Self {
            raw: raw.to_string(),
            regex: Regex::new(raw)?,
        })
    }

    /// True when the pattern matches at the very start of `text`.
    pub fn matches_start(&self, text: &str) -> bool {
        // The regex crate returns the leftmost match, so a match can only
        // start past 0 when none exists at 0.
        self.regex.find(text).is_some_and(|m| m.start() == 0)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// How the request body is matched, when a body matcher is configured.
#[derive(Debug)]
pub enum BodyMatcher {
    Exact(String),
    Regex(Pattern),
}

impl BodyMatcher {
    fn from_config(
        body: Option<String>,
        method: BodyMatchingMethod,
    ) -> Result<Option<Self>, EngineError> {
        match (body, method) {
            (None, _) => Ok(None),
            (Some(body), BodyMatchingMethod::Exact) => Ok(Some(BodyMatcher::Exact(body))),
            (Some(body), BodyMatchingMethod::Regex) => {
                Ok(Some(BodyMatcher::Regex(Pattern::compile(&body)?)))
            }
        }
    }

    fn matches(&self, body: &str) -> bool {
        match self {
            BodyMatcher::Exact(expected) => expected == body,
            BodyMatcher::Regex(pattern) => pattern.matches_start(body),
        }
    }

    fn value(&self) -> &str {
        match self {
            BodyMatcher::Exact(expected) => expected,
            BodyMatcher::Regex(pattern) => pattern.as_str(),
        }
    }

    fn method(&self) -> BodyMatchingMethod {
        match self {
            BodyMatcher::Exact(_) => BodyMatchingMethod::Exact,
            BodyMatcher::Regex(_) => BodyMatchingMethod::Regex,
        }
    }
}

/// A registered virtual route.
pub struct Route {
    id: String,
    method: Option<String>,
    path: Pattern,
    body: Option<BodyMatcher>,
    auth: Auth,
    response_selection: SelectionStrategy,
    responses: IdList<RouteResponse>,
    used_count: AtomicU64,
    serve_lock: Mutex<()>,
}

impl Route {
    /// Build a route from its (schema-validated) configuration payload.
    ///
    /// The payload must already carry an id; the registry fills in generated
    /// ids before building.
    pub fn from_config(config: RouteConfig) -> Result<Self, EngineError> {
        let id = config.id.ok_or_else(|| {
            EngineError::Configuration("route configuration is missing an id".to_string())
        })?;
        if config.responses.is_empty() {
            return Err(EngineError::Configuration(format!(
                "route \"{id}\" must define at least one response"
            )));
        }

        let mut responses = IdList::new();
        for response_config in config.responses {
            let response = RouteResponse::from_config(response_config)?;
            let response_id = response.id().to_string();
            responses.add(response).map_err(|_| {
                EngineError::DuplicateId(format!("duplicate response id \"{response_id}\""))
            })?;
        }

        Ok(Self {
            id,
            method: config.method,
            path: Pattern::compile(&config.path)?,
            body: BodyMatcher::from_config(config.body, config.body_matching_method)?,
            auth: Auth::from_config(config.auth)?,
            response_selection: config.response_selection,
            responses,
            used_count: AtomicU64::new(0),
            serve_lock: Mutex::new(()),
        })
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    pub fn response_selection(&self) -> SelectionStrategy {
        self.response_selection
    }

    pub fn responses(&self) -> &IdList<RouteResponse> {
        &self.responses
    }

    pub fn get_response(&self, response_id: &str) -> Option<&RouteResponse> {
        self.responses.get(response_id)
    }

    pub fn used_count(&self) -> u64 {
        self.used_count.load(Ordering::SeqCst)
    }

    /// True while at least one owned response is active.
    pub fn is_active(&self) -> bool {
        self.responses.iter().any(|r| r.is_active())
    }

    /// Exclusive guard over this route's select/record-use sequence.
    ///
    /// Dispatch holds it so a repeat budget is never over-served by
    /// concurrent requests.
    pub(crate) fn serve_guard(&self) -> MutexGuard<'_, ()> {
        self.serve_lock.lock()
    }

    /// True when the request matches this route's method, path and body, and
    /// the route still has an active response.
    pub fn matches(&self, request: &IncomingRequest) -> bool {
        self.matches_method(&request.method)
            && self.path.matches_start(&request.path)
            && self.matches_body(&request.body)
            && self.is_active()
    }

    fn matches_method(&self, method: &str) -> bool {
        match &self.method {
            None => true,
            Some(configured) => configured == method,
        }
    }

    fn matches_body(&self, body: &str) -> bool {
        match &self.body {
            None => true,
            Some(matcher) => matcher.matches(body),
        }
    }

    /// Check the request against this route's authentication gate.
    pub fn authenticate(&self, request: &IncomingRequest) -> Result<(), AuthenticationError> {
        self.auth.authenticate(request)
    }

    /// Pick the next response per the configured strategy; `None` when the
    /// pool is exhausted.
    pub fn select_response(&self) -> Option<&RouteResponse> {
        self.response_selection.select_response(&self.responses)
    }

    /// Record one served request on this route and, when given, on the
    /// response that was emitted. Called exactly once per request actually
    /// served; matching alone does not count a use.
    pub fn record_use(&self, response: Option<&RouteResponse>) {
        self.used_count.fetch_add(1, Ordering::SeqCst);
        if let Some(response) = response {
            response.record_use();
        }
    }

    pub fn serialize(&self) -> Value {
        json!({
            "id": self.id,
            "method": self.method,
            "path": self.path.as_str(),
            "body": self.body.as_ref().map(BodyMatcher::value),
            "body_matching_method": self.body.as_ref().map_or(BodyMatchingMethod::Exact, BodyMatcher::method),
            "auth": self.auth.serialize(),
            "response_selection": self.response_selection,
            "used_count": self.used_count(),
            "responses": self.responses.iter().map(RouteResponse::serialize).collect::<Vec<_>>(),
            "is_active": self.is_active(),
        })
    }
}

impl IdItem for Route {
    fn id(&self) -> &str {
        &self.id
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("path", &self.path.as_str())
            .field("response_selection", &self.response_selection)
            .field("responses", &self.responses.len())
            .field("used_count", &self.used_count())
            .finish()
    }
}
