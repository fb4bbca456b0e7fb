//! Parsed view of an incoming HTTP request.
//!
//! The engine never touches sockets; the enclosing transport parses the wire
//! request and hands the engine this flattened view.

use std::collections::HashMap;

/// The request fields the matcher and authentication gate operate on.
#[derive(Debug, Clone, Default)]
pub struct IncomingRequest {
    /// HTTP verb, as sent (e.g. `GET`).
    pub method: String,
    /// Request path without the query string.
    pub path: String,
    /// Raw query string, without the leading `?`.
    pub query_string: String,
    /// Decoded query arguments.
    pub args: HashMap<String, String>,
    /// Request headers.
    pub headers: HashMap<String, String>,
    /// Request cookies.
    pub cookies: HashMap<String, String>,
    /// Posted form fields.
    pub form: HashMap<String, String>,
    /// Raw request body.
    pub body: String,
}

impl IncomingRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    /// Set the raw query string and derive `args` from it.
    pub fn with_query(mut self, query_string: impl Into<String>) -> Self {
        self.query_string = query_string.into();
        self.args = parse_query_string(&self.query_string);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn with_form_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }
}

/// Split a raw query string into decoded key/value pairs.
///
/// A key without `=` maps to an empty value.
pub fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|s| !s.is_empty())
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?;
            let value = parts.next().unwrap_or("");
            Some((
                urlencoding::decode(key).unwrap_or_default().into_owned(),
                urlencoding::decode(value).unwrap_or_default().into_owned(),
            ))
        })
        .collect()
}
