//! Top-level route registry and dispatch.

use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use super::response::{Reply, Response};
use super::route::Route;
use super::types::{AuthenticationError, EngineError, RouteConfig};
use crate::collections::{IdItem, IdList};
use crate::request::IncomingRequest;
use crate::validation;

/// Schema gating every route payload before it becomes a [`Route`].
const ROUTE_SCHEMA: &str = "route.json";

/// Outcome of dispatching one live request through the registry.
#[derive(Debug)]
pub enum Dispatch {
    /// A route matched, authenticated and selected a response; its usage has
    /// been recorded.
    Served {
        route_id: String,
        response_id: String,
        reply: Reply,
    },
    /// A route matched but the request failed its authentication gate; the
    /// reply is the gate's configured unauthorized response.
    Unauthorized {
        route_id: String,
        reason: AuthenticationError,
        reply: Reply,
    },
    /// No registered route matched.
    NoMatch,
}

/// Registry of virtual routes; dispatches each incoming request to the first
/// matching route in insertion order.
///
/// Structural operations exclude all concurrent access; [`Router::dispatch`]
/// runs under the registry read lock plus a per-route serve lock, so usage
/// accounting stays exactly-once when the transport layer drives many
/// requests in parallel.
#[derive(Debug, Default)]
pub struct Router {
    routes: RwLock<IdList<Arc<Route>>>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(IdList::new()),
        }
    }

    /// Register a route from a configuration payload.
    ///
    /// Generates an id when the payload carries none; fails with a
    /// duplicate-id condition when the id already exists.
    pub fn add_route(&self, payload: Value) -> Result<Arc<Route>, EngineError> {
        let mut routes = self.routes.write();
        let route = Self::build_route(&routes, payload)?;
        routes
            .add(Arc::clone(&route))
            .map_err(EngineError::duplicate_route)?;
        info!(route_id = route.id(), "route added");
        Ok(route)
    }

    pub fn get_route(&self, route_id: &str) -> Option<Arc<Route>> {
        self.routes.read().get(route_id).cloned()
    }

    /// Remove a route, failing with a missing-id condition when absent.
    pub fn remove_route(&self, route_id: &str) -> Result<(), EngineError> {
        self.routes.write().remove(route_id).map_err(|_| {
            EngineError::MissingId(format!("route \"{route_id}\" does not exist"))
        })?;
        info!(route_id, "route removed");
        Ok(())
    }

    /// Replace the route stored under `route_id` with completely new data,
    /// preserving its position. The payload may rename the route; renaming
    /// onto an existing id fails with a duplicate-id condition.
    pub fn update_route(&self, payload: Value, route_id: &str) -> Result<Arc<Route>, EngineError> {
        let mut routes = self.routes.write();
        if !routes.contains(route_id) {
            return Err(EngineError::MissingId(format!(
                "cannot update route \"{route_id}\": route does not exist"
            )));
        }

        let mut payload = payload;
        if let Some(map) = payload.as_object_mut() {
            if map.get("id").is_none_or(Value::is_null) {
                map.insert("id".to_string(), Value::String(route_id.to_string()));
            }
        }
        let route = Self::build_route(&routes, payload)?;
        if route.id() != route_id && routes.contains(route.id()) {
            return Err(EngineError::DuplicateId(format!(
                "cannot change route id \"{route_id}\" to \"{}\": route id already exists",
                route.id()
            )));
        }

        routes
            .replace(route_id, Arc::clone(&route))
            .map_err(EngineError::duplicate_route)?;
        info!(route_id, new_id = route.id(), "route updated");
        Ok(route)
    }

    /// Discard all routes and, when payloads are given, register each
    /// through the same add path, so intra-batch duplicate ids still fail;
    /// readers never observe a partially-built registry.
    pub fn reset(&self, payloads: Option<Vec<Value>>) -> Result<(), EngineError> {
        let mut fresh: IdList<Arc<Route>> = IdList::new();
        if let Some(payloads) = payloads {
            for payload in payloads {
                let route = Self::build_route(&fresh, payload)?;
                fresh
                    .add(Arc::clone(&route))
                    .map_err(EngineError::duplicate_route)?;
            }
        }

        let count = fresh.len();
        *self.routes.write() = fresh;
        info!(routes = count, "registry reset");
        Ok(())
    }

    /// Validate, id-fill and deserialize one payload against the registry it
    /// will be inserted into.
    fn build_route(routes: &IdList<Arc<Route>>, payload: Value) -> Result<Arc<Route>, EngineError> {
        validation::validate_payload(ROUTE_SCHEMA, &payload)?;
        let mut config: RouteConfig = serde_json::from_value(payload)?;
        if config.id.is_none() {
            config.id = Some(Self::generate_route_id(routes));
        }
        Ok(Arc::new(Route::from_config(config)?))
    }

    /// Generate a fresh route id, retrying on the (practically impossible)
    /// collision with an existing one.
    fn generate_route_id(routes: &IdList<Arc<Route>>) -> String {
        loop {
            let id = uuid::Uuid::new_v4().to_string();
            if !routes.contains(&id) {
                return id;
            }
        }
    }

    /// Find the first registered route matching the request, in insertion
    /// order. A linear scan: registries are configuration-sized.
    pub fn match_request(&self, request: &IncomingRequest) -> Option<Arc<Route>> {
        self.routes
            .read()
            .iter()
            .find(|route| route.matches(request))
            .cloned()
    }

    /// Run the full pipeline for one live request: match, authenticate,
    /// select, record use.
    pub fn dispatch(&self, request: &IncomingRequest) -> Dispatch {
        let routes = self.routes.read();
        for route in routes.iter() {
            let _serving = route.serve_guard();
            if !route.matches(request) {
                continue;
            }

            if let Err(reason) = route.authenticate(request) {
                debug!(route_id = route.id(), %reason, "request failed authentication");
                let reply = route
                    .auth()
                    .unauthorized_response()
                    .cloned()
                    .unwrap_or_else(Response::default_unauthorized)
                    .render();
                return Dispatch::Unauthorized {
                    route_id: route.id().to_string(),
                    reason,
                    reply,
                };
            }

            // Matching requires an active response, and the serve guard is
            // held, so selection cannot come back empty here.
            let Some(response) = route.select_response() else {
                continue;
            };
            route.record_use(Some(response));
            debug!(
                route_id = route.id(),
                response_id = response.id(),
                "request served"
            );
            return Dispatch::Served {
                route_id: route.id().to_string(),
                response_id: response.id().to_string(),
                reply: response.render(),
            };
        }
        Dispatch::NoMatch
    }

    pub fn route_count(&self) -> usize {
        self.routes.read().len()
    }

    /// Snapshot of all routes in insertion order.
    pub fn routes(&self) -> Vec<Arc<Route>> {
        self.routes.read().iter().cloned().collect()
    }

    /// Serialize the whole registry to configuration-shaped payloads.
    pub fn serialize(&self) -> Value {
        Value::Array(
            self.routes
                .read()
                .iter()
                .map(|route| route.serialize())
                .collect(),
        )
    }
}
