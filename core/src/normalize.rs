//! Canonical forms for requests entering and responses leaving the dispatcher.
//!
//! Requests: action type and parameter keys lower-cased, top-level string
//! parameter values trimmed. `context` is passed through untouched.
//!
//! Responses: object keys lower-cased at every depth of `data`; arrays keep
//! their order. String leaves are *not* trimmed on the way out.
//!
//! Keys that collide after lower-casing keep the value visited last, in the
//! map's key order.

use relay_types::{ActionRequest, ActionResponse};
use serde_json::{Map, Value};

#[must_use]
pub fn standardize_request(request: &ActionRequest) -> ActionRequest {
    let parameters = request
        .parameters
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => Value::String(s.trim().to_string()),
                other => other.clone(),
            };
            (key.to_lowercase(), value)
        })
        .collect();

    ActionRequest {
        action_type: request.action_type.to_lowercase(),
        parameters,
        context: request.context.clone(),
    }
}

#[must_use]
pub fn standardize_response(response: ActionResponse) -> ActionResponse {
    match response {
        ActionResponse::Success { data } => ActionResponse::Success {
            data: data.map(lowercase_keys),
        },
        failure @ ActionResponse::Failure { .. } => failure,
    }
}

fn lowercase_keys(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(lowercase_keys).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key.to_lowercase(), lowercase_keys(value)))
                .collect::<Map<String, Value>>(),
        ),
        leaf => leaf,
    }
}
