//! JSON-schema gate for configuration payloads.
//!
//! Validators are expensive to compile, so each embedded schema is compiled
//! on first use and cached process-wide under its schema id. Payloads pass
//! through here before they are turned into Auth/Route/Response objects.

use jsonschema::Validator;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::routing::EngineError;

/// Embedded schema sources, keyed by schema id.
static SCHEMA_SOURCES: &[(&str, &str)] = &[("route.json", include_str!("schemas/route.json"))];

static VALIDATORS: Lazy<RwLock<HashMap<&'static str, Arc<Validator>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Fetch the compiled validator for a schema id, compiling and caching it on
/// first use.
pub fn get_validator(schema_id: &str) -> Result<Arc<Validator>, EngineError> {
    if let Some(validator) = VALIDATORS.read().get(schema_id) {
        return Ok(Arc::clone(validator));
    }

    let &(id, source) = SCHEMA_SOURCES
        .iter()
        .find(|(id, _)| *id == schema_id)
        .ok_or_else(|| EngineError::Configuration(format!("unknown schema \"{schema_id}\"")))?;

    let schema: Value = serde_json::from_str(source)?;
    let compiled = jsonschema::validator_for(&schema)
        .map_err(|e| EngineError::Configuration(format!("schema \"{id}\" failed to compile: {e}")))?;
    let validator = Arc::new(compiled);

    let mut cache = VALIDATORS.write();
    // Another thread may have compiled while we did; keep the first one.
    let entry = cache.entry(id).or_insert_with(|| {
        debug!(schema = id, "schema validator compiled and cached");
        Arc::clone(&validator)
    });
    Ok(Arc::clone(entry))
}

/// Validate a payload against the named schema, failing with the first
/// violation message.
pub fn validate_payload(schema_id: &str, payload: &Value) -> Result<(), EngineError> {
    let validator = get_validator(schema_id)?;
    validator
        .validate(payload)
        .map_err(|e| EngineError::Validation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_schema_id_fails() {
        assert!(matches!(
            get_validator("nonexistent.json"),
            Err(EngineError::Configuration(_))
        ));
    }

    #[test]
    fn validator_is_cached_per_id() {
        let first = get_validator("route.json").unwrap();
        let second = get_validator("route.json").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn accepts_minimal_route_payload() {
        let payload = json!({"path": "/items", "responses": [{"body": "ok"}]});
        assert!(validate_payload("route.json", &payload).is_ok());
    }

    #[test]
    fn accepts_full_route_payload() {
        let payload = json!({
            "id": "route-1",
            "method": "POST",
            "path": "/items",
            "body": "^\\{",
            "body_matching_method": "regex",
            "response_selection": "random",
            "auth": {"method": "token", "token": "t"},
            "responses": [
                {
                    "id": "r1",
                    "body": {"ok": true},
                    "delay": [0.1, 0.5],
                    "headers": {"content-type": "application/json"},
                    "status": 201,
                    "repeat": 3,
                    "weight": 1.5
                }
            ]
        });
        assert!(validate_payload("route.json", &payload).is_ok());
    }

    #[test]
    fn rejects_route_without_responses() {
        let payload = json!({"path": "/items"});
        let err = validate_payload("route.json", &payload).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let empty = json!({"path": "/items", "responses": []});
        assert!(validate_payload("route.json", &empty).is_err());
    }

    #[test]
    fn rejects_bad_selection_tag() {
        let payload = json!({
            "path": "/items",
            "response_selection": "round-robin",
            "responses": [{"body": "ok"}]
        });
        assert!(validate_payload("route.json", &payload).is_err());
    }

    #[test]
    fn rejects_malformed_delay() {
        let payload = json!({
            "path": "/items",
            "responses": [{"body": "ok", "delay": [0.1, 0.2, 0.3]}]
        });
        assert!(validate_payload("route.json", &payload).is_err());
    }

    #[test]
    fn rejects_unknown_auth_method_shape() {
        let payload = json!({
            "path": "/items",
            "auth": {"method": "saml"},
            "responses": [{"body": "ok"}]
        });
        assert!(validate_payload("route.json", &payload).is_err());
    }

    #[test]
    fn accepts_serialized_route_shape() {
        // Serialized routes carry computed fields; they must re-validate.
        let payload = json!({
            "id": "route-1",
            "method": "GET",
            "path": "/items",
            "body": null,
            "body_matching_method": "exact",
            "auth": null,
            "response_selection": "greedy",
            "used_count": 4,
            "is_active": true,
            "responses": [
                {
                    "id": "r1",
                    "body": "ok",
                    "delay": 0.0,
                    "headers": {},
                    "status": 200,
                    "repeat": null,
                    "weight": 0.5,
                    "used_count": 4,
                    "is_active": true
                }
            ]
        });
        assert!(validate_payload("route.json", &payload).is_ok());
    }
}
