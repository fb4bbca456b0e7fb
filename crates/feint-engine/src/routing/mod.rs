//! The dispatch engine: route registry, matching, authentication and
//! response selection.
//!
//! This module provides:
//! - `Router`: registry of virtual routes, dispatching each incoming request
//!   to the first matching route
//! - `Route`: one matcher with its owned response pool, auth gate and
//!   selection policy
//! - `Auth`: pluggable authentication variants
//! - `SelectionStrategy`: cycle/random/greedy response selection
//!
//! ## Module Structure
//!
//! - `types`: configuration payload structs, `Delay`, error taxonomy
//! - `selection`: response-selection algorithms
//! - `auth`: authentication gate variants
//! - `response`: canned response data and pool entries
//! - `route`: matcher and pool owner
//! - `router`: registry and dispatch pipeline
//!
//! ## Concurrency
//!
//! Engine work is synchronous pure CPU; nothing here suspends, and `Delay`
//! is advisory data for the transport layer. The registry is safe to share
//! across threads: structural operations take the registry write lock, and
//! `Router::dispatch` covers the match/authenticate/select/record-use
//! sequence with a per-route lock so `repeat` budgets are never over-served.

mod auth;
mod response;
mod route;
mod router;
mod selection;
mod types;


pub use auth::{Auth, AUTH_METHODS};
pub use response::{Reply, Response, RouteResponse};
pub use route::{BodyMatcher, Pattern, Route};
pub use router::{Dispatch, Router};
pub use selection::SelectionStrategy;
pub use types::{
    AuthenticationError, BodyMatchingMethod, Delay, EngineError, ResponseConfig, RouteConfig,
};
