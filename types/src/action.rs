//! Action request/response values exchanged with connectors.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// One unit of work requested of a connector.
///
/// Requests are treated as immutable once handed to the dispatcher; the
/// normalizer produces a canonicalized copy instead of editing in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
}

impl ActionRequest {
    #[must_use]
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            parameters: Map::new(),
            context: None,
        }
    }

    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = Some(context);
        self
    }
}

/// Structured error carried by a failed [`ActionResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionError {
    pub code: String,
    pub message: String,
}

impl ActionError {
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ActionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Result of a connector action.
///
/// This is a sum type: data can only accompany success and an error can only
/// accompany failure. A failed action is a value, never a Rust error.
///
/// On the wire it keeps the flat `{ success, data?, error? }` shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "ResponseWire", try_from = "ResponseWire")]
pub enum ActionResponse {
    Success { data: Option<Value> },
    Failure { error: ActionError },
}

impl ActionResponse {
    #[must_use]
    pub fn success(data: impl Into<Value>) -> Self {
        Self::Success {
            data: Some(data.into()),
        }
    }

    /// Successful response with no payload.
    #[must_use]
    pub const fn empty() -> Self {
        Self::Success { data: None }
    }

    #[must_use]
    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failure {
            error: ActionError::new(code, message),
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Success { data } => data.as_ref(),
            Self::Failure { .. } => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&ActionError> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error } => Some(error),
        }
    }
}

/// A wire-format response violated the success/data/error pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidResponse {
    #[error("successful response must not carry an error")]
    ErrorOnSuccess,
    #[error("failed response must carry an error")]
    MissingError,
    #[error("failed response must not carry data")]
    DataOnFailure,
}

#[derive(Serialize, Deserialize)]
struct ResponseWire {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<ActionError>,
}

impl From<ActionResponse> for ResponseWire {
    fn from(value: ActionResponse) -> Self {
        match value {
            ActionResponse::Success { data } => Self {
                success: true,
                data,
                error: None,
            },
            ActionResponse::Failure { error } => Self {
                success: false,
                data: None,
                error: Some(error),
            },
        }
    }
}

impl TryFrom<ResponseWire> for ActionResponse {
    type Error = InvalidResponse;

    fn try_from(wire: ResponseWire) -> Result<Self, Self::Error> {
        match (wire.success, wire.data, wire.error) {
            (true, _, Some(_)) => Err(InvalidResponse::ErrorOnSuccess),
            (true, data, None) => Ok(Self::Success { data }),
            (false, Some(_), _) => Err(InvalidResponse::DataOnFailure),
            (false, None, None) => Err(InvalidResponse::MissingError),
            (false, None, Some(error)) => Ok(Self::Failure { error }),
        }
    }
}
