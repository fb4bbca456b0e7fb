//! Pluggable authentication gate.
//!
//! A route's auth is one tagged variant resolved from the `method`
//! discriminator of its configuration payload. Every variant except no-auth
//! carries an unauthorized response for the transport to emit on failure;
//! the check itself only reports a message-carrying failure and never picks
//! the emitted status.

use base64::Engine as _;
use hmac::{Hmac, Mac};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use sha1::Sha1;
use std::collections::HashMap;

use super::response::Response;
use super::types::{AuthenticationError, EngineError, ResponseConfig};
use crate::request::IncomingRequest;

type HmacSha1 = Hmac<Sha1>;

/// Signed URLs are accepted up to one hour after signing.
const HMAC_PAST_TOLERANCE_SECS: i64 = 3600;
/// Small allowance for clock skew on timestamps from the future.
const HMAC_FUTURE_TOLERANCE_SECS: i64 = 5;

static BEARER_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Bearer (?P<token>.*)").expect("static pattern compiles"));
static HMAC_SIGN_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&hmac_sign=.*$").expect("static pattern compiles"));

/// Authentication requirement attached to a route.
#[derive(Debug)]
pub enum Auth {
    /// No authentication; always passes.
    None,
    Token(TokenAuth),
    Basic(BasicAuth),
    Hmac(HmacAuth),
    Form(FormAuth),
    Cookie(CookieAuth),
}

/// Discriminator values accepted in auth configuration payloads.
pub const AUTH_METHODS: &[&str] = &["token", "basic", "hmac", "form", "cookie"];

#[derive(Debug, Deserialize)]
struct TokenAuthConfig {
    token: String,
    #[serde(default)]
    unauthorized_response: Option<ResponseConfig>,
}

#[derive(Debug, Deserialize)]
struct BasicAuthConfig {
    username: String,
    password: String,
    #[serde(default)]
    unauthorized_response: Option<ResponseConfig>,
}

#[derive(Debug, Deserialize)]
struct HmacAuthConfig {
    key: String,
    #[serde(default)]
    unauthorized_response: Option<ResponseConfig>,
}

#[derive(Debug, Deserialize)]
struct FormAuthConfig {
    fields: HashMap<String, String>,
    #[serde(default)]
    unauthorized_response: Option<ResponseConfig>,
}

#[derive(Debug, Deserialize)]
struct CookieAuthConfig {
    name: String,
    value: String,
    #[serde(default)]
    unauthorized_response: Option<ResponseConfig>,
}

fn unauthorized_response(config: Option<ResponseConfig>) -> Response {
    match config {
        Some(config) => Response {
            body: config.body,
            delay: config.delay,
            headers: config.headers,
            status: config.status,
        },
        None => Response::default_unauthorized(),
    }
}

impl Auth {
    /// Resolve the concrete variant from a configuration payload.
    ///
    /// Absent or `null` payloads mean no-auth; anything else must carry a
    /// known `method` discriminator.
    pub fn from_config(payload: Option<Value>) -> Result<Self, EngineError> {
        let Some(payload) = payload else {
            return Ok(Auth::None);
        };
        if payload.is_null() {
            return Ok(Auth::None);
        }

        let method = match payload.get("method") {
            Some(Value::String(method)) => method.clone(),
            Some(_) | None => {
                return Err(EngineError::Configuration(
                    "missing field \"method\" of auth configuration".to_string(),
                ))
            }
        };

        match method.as_str() {
            "token" => {
                let config: TokenAuthConfig = serde_json::from_value(payload)?;
                Ok(Auth::Token(TokenAuth {
                    token: config.token,
                    unauthorized_response: unauthorized_response(config.unauthorized_response),
                }))
            }
            "basic" => {
                let config: BasicAuthConfig = serde_json::from_value(payload)?;
                Ok(Auth::Basic(BasicAuth {
                    username: config.username,
                    password: config.password,
                    unauthorized_response: unauthorized_response(config.unauthorized_response),
                }))
            }
            "hmac" => {
                let config: HmacAuthConfig = serde_json::from_value(payload)?;
                Ok(Auth::Hmac(HmacAuth {
                    key: config.key,
                    unauthorized_response: unauthorized_response(config.unauthorized_response),
                }))
            }
            "form" => {
                let config: FormAuthConfig = serde_json::from_value(payload)?;
                Ok(Auth::Form(FormAuth {
                    fields: config.fields,
                    unauthorized_response: unauthorized_response(config.unauthorized_response),
                }))
            }
            "cookie" => {
                let config: CookieAuthConfig = serde_json::from_value(payload)?;
                Ok(Auth::Cookie(CookieAuth {
                    name: config.name,
                    value: config.value,
                    unauthorized_response: unauthorized_response(config.unauthorized_response),
                }))
            }
            unknown => Err(EngineError::Configuration(format!(
                "unknown authentication method \"{unknown}\""
            ))),
        }
    }

    /// Check the request, failing with the reason when it does not carry
    /// valid credentials.
    pub fn authenticate(&self, request: &IncomingRequest) -> Result<(), AuthenticationError> {
        match self {
            Auth::None => Ok(()),
            Auth::Token(auth) => auth.authenticate(request),
            Auth::Basic(auth) => auth.authenticate(request),
            Auth::Hmac(auth) => auth.authenticate(request),
            Auth::Form(auth) => auth.authenticate(request),
            Auth::Cookie(auth) => auth.authenticate(request),
        }
    }

    /// The response emitted on failure; `None` only for no-auth, which
    /// cannot fail.
    pub fn unauthorized_response(&self) -> Option<&Response> {
        match self {
            Auth::None => None,
            Auth::Token(auth) => Some(&auth.unauthorized_response),
            Auth::Basic(auth) => Some(&auth.unauthorized_response),
            Auth::Hmac(auth) => Some(&auth.unauthorized_response),
            Auth::Form(auth) => Some(&auth.unauthorized_response),
            Auth::Cookie(auth) => Some(&auth.unauthorized_response),
        }
    }

    pub fn serialize(&self) -> Value {
        let (method, mut payload) = match self {
            Auth::None => return Value::Null,
            Auth::Token(auth) => ("token", json!({"token": auth.token})),
            Auth::Basic(auth) => (
                "basic",
                json!({"username": auth.username, "password": auth.password}),
            ),
            Auth::Hmac(auth) => ("hmac", json!({"key": auth.key})),
            Auth::Form(auth) => ("form", json!({"fields": auth.fields})),
            Auth::Cookie(auth) => ("cookie", json!({"name": auth.name, "value": auth.value})),
        };
        let map = payload.as_object_mut().expect("auth serializes to an object");
        map.insert("method".to_string(), json!(method));
        if let Some(response) = self.unauthorized_response() {
            map.insert("unauthorized_response".to_string(), response.serialize());
        }
        payload
    }
}

/// `Authorization: Bearer <token>` header check.
#[derive(Debug)]
pub struct TokenAuth {
    token: String,
    unauthorized_response: Response,
}

impl TokenAuth {
    fn authenticate(&self, request: &IncomingRequest) -> Result<(), AuthenticationError> {
        let header = request.headers.get("Authorization").ok_or_else(|| {
            AuthenticationError("missing authentication header \"Authorization\"".to_string())
        })?;
        let captures = BEARER_HEADER.captures(header).ok_or_else(|| {
            AuthenticationError(format!("invalid authentication header \"{header}\""))
        })?;
        let token = &captures["token"];
        if token != self.token {
            return Err(AuthenticationError(format!(
                "authentication token \"{token}\" doesn't match"
            )));
        }
        Ok(())
    }
}

/// `Authorization: Basic <base64 user:pass>` header check.
#[derive(Debug)]
pub struct BasicAuth {
    username: String,
    password: String,
    unauthorized_response: Response,
}

impl BasicAuth {
    fn decode_credentials(header: &str) -> Option<(String, String)> {
        let encoded = header.strip_prefix("Basic ").unwrap_or(header);
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;
        Some((username.to_string(), password.to_string()))
    }

    fn authenticate(&self, request: &IncomingRequest) -> Result<(), AuthenticationError> {
        let header = request.headers.get("Authorization").ok_or_else(|| {
            AuthenticationError("missing authentication header \"Authorization\"".to_string())
        })?;
        let (username, password) = Self::decode_credentials(header).ok_or_else(|| {
            AuthenticationError(format!("invalid authentication header \"{header}\""))
        })?;
        if username != self.username || password != self.password {
            return Err(AuthenticationError(format!(
                "authentication \"{username}:{password}\" doesn't match"
            )));
        }
        Ok(())
    }
}

/// Replay-resistant signed-URL check: an HMAC-SHA1 hex digest over the path
/// and query string (minus the signature parameter), plus a timestamp bound
/// to a validity window.
#[derive(Debug)]
pub struct HmacAuth {
    key: String,
    unauthorized_response: Response,
}

impl HmacAuth {
    fn signature_of(&self, hashable: &str) -> String {
        let mut mac = HmacSha1::new_from_slice(self.key.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(hashable.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn timestamp(args: &HashMap<String, String>) -> Result<f64, AuthenticationError> {
        let raw = args.get("hmac_timestamp").ok_or_else(|| {
            AuthenticationError(
                "HMAC authentication failed, URL is missing required parameter: \
                 \"hmac_timestamp\""
                    .to_string(),
            )
        })?;
        raw.parse::<f64>().map_err(|_| {
            AuthenticationError(format!(
                "HMAC authentication failed, \"hmac_timestamp\" is not a valid timestamp: {raw}"
            ))
        })
    }

    fn check_time(timestamp: f64) -> Result<(), AuthenticationError> {
        let now = chrono::Utc::now().timestamp() as f64;
        if timestamp > now + HMAC_FUTURE_TOLERANCE_SECS as f64 {
            return Err(AuthenticationError(format!(
                "HMAC authentication failed, URL contains hmac_timestamp more than \
                 {HMAC_FUTURE_TOLERANCE_SECS} seconds in the future: {timestamp}"
            )));
        }
        if timestamp < now - HMAC_PAST_TOLERANCE_SECS as f64 {
            return Err(AuthenticationError(format!(
                "HMAC authentication failed, URL contains hmac_timestamp more than \
                 {HMAC_PAST_TOLERANCE_SECS} seconds in the past: {timestamp}"
            )));
        }
        Ok(())
    }

    fn authenticate(&self, request: &IncomingRequest) -> Result<(), AuthenticationError> {
        let timestamp = Self::timestamp(&request.args)?;
        let signature = request.args.get("hmac_sign").ok_or_else(|| {
            AuthenticationError(
                "HMAC authentication failed, URL is missing a required parameter: \"hmac_sign\""
                    .to_string(),
            )
        })?;

        let hashable = format!(
            "{}?{}",
            request.path,
            HMAC_SIGN_PARAM.replace(&request.query_string, "")
        );
        let expected = self.signature_of(&hashable);
        if expected.is_empty() || expected != *signature {
            return Err(AuthenticationError(
                "HMAC authentication failed, hash in URL parameter \"hmac_sign\" is invalid"
                    .to_string(),
            ));
        }
        Self::check_time(timestamp)
    }
}

/// Exact-value check over posted form fields.
#[derive(Debug)]
pub struct FormAuth {
    fields: HashMap<String, String>,
    unauthorized_response: Response,
}

impl FormAuth {
    fn authenticate(&self, request: &IncomingRequest) -> Result<(), AuthenticationError> {
        for (field, expected) in &self.fields {
            let sent = request.form.get(field).ok_or_else(|| {
                AuthenticationError(format!("missing authentication field \"{field}\""))
            })?;
            if sent != expected {
                return Err(AuthenticationError(format!(
                    "incorrect value \"{sent}\" in field \"{field}\""
                )));
            }
        }
        Ok(())
    }
}

/// Exact-value check on a named cookie.
#[derive(Debug)]
pub struct CookieAuth {
    name: String,
    value: String,
    unauthorized_response: Response,
}

impl CookieAuth {
    fn authenticate(&self, request: &IncomingRequest) -> Result<(), AuthenticationError> {
        let sent = request.cookies.get(&self.name).ok_or_else(|| {
            AuthenticationError(format!("missing authentication cookie \"{}\"", self.name))
        })?;
        if *sent != self.value {
            return Err(AuthenticationError(format!(
                "incorrect value \"{sent}\" of cookie \"{}\"",
                self.name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sign a URL the way a client would: hash path + query, then append the
    /// signature parameter.
    fn signed_request(key: &str, path: &str, timestamp: f64) -> IncomingRequest {
        let query = format!("hmac_timestamp={timestamp}");
        let mut mac = HmacSha1::new_from_slice(key.as_bytes()).unwrap();
        mac.update(format!("{path}?{query}").as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        IncomingRequest::new("GET", path).with_query(format!("{query}&hmac_sign={signature}"))
    }

    fn now() -> f64 {
        chrono::Utc::now().timestamp() as f64
    }

    #[test]
    fn no_auth_from_absent_or_null_payload() {
        assert!(matches!(Auth::from_config(None).unwrap(), Auth::None));
        assert!(matches!(
            Auth::from_config(Some(Value::Null)).unwrap(),
            Auth::None
        ));
    }

    #[test]
    fn missing_method_is_a_configuration_error() {
        let err = Auth::from_config(Some(json!({"token": "abc"}))).unwrap_err();
        assert!(matches!(err, EngineError::Configuration(msg) if msg.contains("method")));
    }

    #[test]
    fn unknown_method_is_a_configuration_error() {
        let err = Auth::from_config(Some(json!({"method": "saml"}))).unwrap_err();
        assert!(matches!(err, EngineError::Configuration(msg) if msg.contains("saml")));
    }

    #[test]
    fn method_table_is_exhaustive() {
        for method in AUTH_METHODS {
            let payload = match *method {
                "token" => json!({"method": "token", "token": "t"}),
                "basic" => json!({"method": "basic", "username": "u", "password": "p"}),
                "hmac" => json!({"method": "hmac", "key": "k"}),
                "form" => json!({"method": "form", "fields": {"a": "b"}}),
                "cookie" => json!({"method": "cookie", "name": "n", "value": "v"}),
                other => panic!("untested auth method {other}"),
            };
            let auth = Auth::from_config(Some(payload)).unwrap();
            assert!(auth.unauthorized_response().is_some());
        }
    }

    #[test]
    fn default_unauthorized_response_applies() {
        let auth = Auth::from_config(Some(json!({"method": "token", "token": "t"}))).unwrap();
        let response = auth.unauthorized_response().unwrap();
        assert_eq!(response.status, 401);
        assert_eq!(
            response.body,
            json!({"error": "Unauthorized", "message": "Authentication failed."})
        );
    }

    #[test]
    fn configured_unauthorized_response_wins() {
        let auth = Auth::from_config(Some(json!({
            "method": "cookie",
            "name": "session",
            "value": "s3cret",
            "unauthorized_response": {"body": "go away", "status": 403}
        })))
        .unwrap();
        let response = auth.unauthorized_response().unwrap();
        assert_eq!(response.status, 403);
        assert_eq!(response.body, json!("go away"));
    }

    #[test]
    fn token_auth_distinguishes_failures() {
        let auth = Auth::from_config(Some(json!({"method": "token", "token": "s3cret"}))).unwrap();

        let missing = auth
            .authenticate(&IncomingRequest::new("GET", "/"))
            .unwrap_err();
        assert!(missing.0.contains("missing authentication header"));

        let bad_scheme = auth
            .authenticate(&IncomingRequest::new("GET", "/").with_header("Authorization", "Basic s3cret"))
            .unwrap_err();
        assert!(bad_scheme.0.contains("invalid authentication header"));

        let mismatch = auth
            .authenticate(&IncomingRequest::new("GET", "/").with_header("Authorization", "Bearer nope"))
            .unwrap_err();
        assert!(mismatch.0.contains("doesn't match"));

        assert!(auth
            .authenticate(
                &IncomingRequest::new("GET", "/").with_header("Authorization", "Bearer s3cret")
            )
            .is_ok());
    }

    #[test]
    fn basic_auth_checks_credentials() {
        let auth = Auth::from_config(Some(json!({
            "method": "basic",
            "username": "user",
            "password": "pass"
        })))
        .unwrap();

        let encoded = base64::engine::general_purpose::STANDARD.encode("user:pass");
        assert!(auth
            .authenticate(
                &IncomingRequest::new("GET", "/")
                    .with_header("Authorization", format!("Basic {encoded}"))
            )
            .is_ok());

        let wrong = base64::engine::general_purpose::STANDARD.encode("user:wrong");
        let err = auth
            .authenticate(
                &IncomingRequest::new("GET", "/")
                    .with_header("Authorization", format!("Basic {wrong}"))
            )
            .unwrap_err();
        assert!(err.0.contains("doesn't match"));

        let undecodable = auth
            .authenticate(
                &IncomingRequest::new("GET", "/").with_header("Authorization", "Basic %%%")
            )
            .unwrap_err();
        assert!(undecodable.0.contains("invalid authentication header"));
    }

    #[test]
    fn hmac_auth_accepts_freshly_signed_url() {
        let auth = Auth::from_config(Some(json!({"method": "hmac", "key": "k3y"}))).unwrap();
        let request = signed_request("k3y", "/endpoint", now());
        assert!(auth.authenticate(&request).is_ok());
    }

    #[test]
    fn hmac_auth_window_edges() {
        let auth = Auth::from_config(Some(json!({"method": "hmac", "key": "k3y"}))).unwrap();

        let just_inside = signed_request("k3y", "/endpoint", now() - 3599.0);
        assert!(auth.authenticate(&just_inside).is_ok());

        let too_old = signed_request("k3y", "/endpoint", now() - 3601.0);
        let err = auth.authenticate(&too_old).unwrap_err();
        assert!(err.0.contains("in the past"));

        let from_future = signed_request("k3y", "/endpoint", now() + 60.0);
        let err = auth.authenticate(&from_future).unwrap_err();
        assert!(err.0.contains("in the future"));
    }

    #[test]
    fn hmac_auth_signature_is_bound_to_path() {
        let auth = Auth::from_config(Some(json!({"method": "hmac", "key": "k3y"}))).unwrap();
        let signed = signed_request("k3y", "/endpoint", now());

        let replayed = IncomingRequest::new("GET", "/other")
            .with_query(signed.query_string.clone());
        let err = auth.authenticate(&replayed).unwrap_err();
        assert!(err.0.contains("\"hmac_sign\" is invalid"));
    }

    #[test]
    fn hmac_auth_rejects_wrong_key() {
        let auth = Auth::from_config(Some(json!({"method": "hmac", "key": "k3y"}))).unwrap();
        let request = signed_request("other-key", "/endpoint", now());
        let err = auth.authenticate(&request).unwrap_err();
        assert!(err.0.contains("\"hmac_sign\" is invalid"));
    }

    #[test]
    fn hmac_auth_requires_parameters() {
        let auth = Auth::from_config(Some(json!({"method": "hmac", "key": "k3y"}))).unwrap();

        let no_timestamp = IncomingRequest::new("GET", "/e").with_query("hmac_sign=abc");
        let err = auth.authenticate(&no_timestamp).unwrap_err();
        assert!(err.0.contains("hmac_timestamp"));

        let no_signature =
            IncomingRequest::new("GET", "/e").with_query(format!("hmac_timestamp={}", now()));
        let err = auth.authenticate(&no_signature).unwrap_err();
        assert!(err.0.contains("hmac_sign"));

        let bad_timestamp = IncomingRequest::new("GET", "/e")
            .with_query("hmac_timestamp=yesterday&hmac_sign=abc");
        let err = auth.authenticate(&bad_timestamp).unwrap_err();
        assert!(err.0.contains("not a valid timestamp"));
    }

    #[test]
    fn form_auth_checks_every_field() {
        let auth = Auth::from_config(Some(json!({
            "method": "form",
            "fields": {"username": "u", "pin": "1234"}
        })))
        .unwrap();

        let ok = IncomingRequest::new("POST", "/login")
            .with_form_field("username", "u")
            .with_form_field("pin", "1234");
        assert!(auth.authenticate(&ok).is_ok());

        let missing = IncomingRequest::new("POST", "/login").with_form_field("username", "u");
        let err = auth.authenticate(&missing).unwrap_err();
        assert!(err.0.contains("missing authentication field"));

        let wrong = IncomingRequest::new("POST", "/login")
            .with_form_field("username", "u")
            .with_form_field("pin", "0000");
        let err = auth.authenticate(&wrong).unwrap_err();
        assert!(err.0.contains("incorrect value"));
    }

    #[test]
    fn cookie_auth_checks_named_cookie() {
        let auth = Auth::from_config(Some(json!({
            "method": "cookie",
            "name": "session",
            "value": "s3cret"
        })))
        .unwrap();

        assert!(auth
            .authenticate(&IncomingRequest::new("GET", "/").with_cookie("session", "s3cret"))
            .is_ok());

        let missing = auth
            .authenticate(&IncomingRequest::new("GET", "/"))
            .unwrap_err();
        assert!(missing.0.contains("missing authentication cookie"));

        let wrong = auth
            .authenticate(&IncomingRequest::new("GET", "/").with_cookie("session", "forged"))
            .unwrap_err();
        assert!(wrong.0.contains("incorrect value"));
    }

    #[test]
    fn serialize_round_trips_through_config() {
        let payload = json!({
            "method": "basic",
            "username": "user",
            "password": "pass",
            "unauthorized_response": {"body": "denied", "status": 403}
        });
        let auth = Auth::from_config(Some(payload)).unwrap();
        let serialized = auth.serialize();

        assert_eq!(serialized["method"], json!("basic"));
        assert_eq!(serialized["username"], json!("user"));
        assert_eq!(serialized["unauthorized_response"]["status"], json!(403));

        let rebuilt = Auth::from_config(Some(serialized.clone())).unwrap();
        assert_eq!(rebuilt.serialize(), serialized);
    }

    #[test]
    fn no_auth_serializes_to_null() {
        assert_eq!(Auth::None.serialize(), Value::Null);
    }
}
