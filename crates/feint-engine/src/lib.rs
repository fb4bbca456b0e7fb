//! Feint: a programmable HTTP test-double engine.
//!
//! Operators register virtual routes (matchers over method/path/body with a
//! pool of canned responses, an authentication requirement and a
//! response-selection policy) and live requests are dispatched against them
//! to produce simulated responses with configurable status, headers, body,
//! latency and finite-use budgets.
//!
//! The crate is transport-agnostic: the enclosing HTTP layer parses each
//! wire request into an [`request::IncomingRequest`], drives
//! [`routing::Router::dispatch`], and emits the returned reply (honoring its
//! advisory delay). Configuration payloads pass through the
//! [`validation`] schema gate before they become engine objects.

pub mod collections;
pub mod request;
pub mod routing;
pub mod validation;

pub use request::IncomingRequest;
pub use routing::{Dispatch, EngineError, Router};
