//! JSON-RPC 2.0 envelopes.
//!
//! Shared by both ends the server talks to: the editor on stdio, and engine
//! host processes. Payloads stay as `serde_json::Value` here; handlers decode
//! them into `lichen_types` shapes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub(crate) const INVALID_REQUEST: i64 = -32600;
pub(crate) const METHOD_NOT_FOUND: i64 = -32601;
pub(crate) const INVALID_PARAMS: i64 = -32602;
pub(crate) const INTERNAL_ERROR: i64 = -32603;
pub(crate) const SERVER_NOT_INITIALIZED: i64 = -32002;

/// Request identifier; JSON-RPC allows numbers and strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ResponseError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn invalid_params(error: &serde_json::Error) -> Self {
        Self::new(INVALID_PARAMS, format!("Invalid params: {error}"))
    }
}

/// One decoded JSON-RPC frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request {
        id: RequestId,
        method: String,
        params: Value,
    },
    Notification {
        method: String,
        params: Value,
    },
    Response {
        id: RequestId,
        result: Result<Value, ResponseError>,
    },
}

impl Message {
    pub fn request(id: RequestId, method: impl Into<String>, params: Value) -> Self {
        Self::Request {
            id,
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Self::Notification {
            method: method.into(),
            params,
        }
    }

    pub fn response(id: RequestId, result: Result<Value, ResponseError>) -> Self {
        Self::Response { id, result }
    }

    /// Classify a raw frame.
    ///
    /// Returns `None` for frames that are not a request, notification, or
    /// response (including responses carrying a `null` id).
    pub fn from_value(mut frame: Value) -> Option<Self> {
        let object = frame.as_object_mut()?;
        let id = object
            .remove("id")
            .map(serde_json::from_value::<RequestId>)
            .transpose()
            .ok()?;
        let method = match object.remove("method") {
            Some(Value::String(method)) => Some(method),
            Some(_) => return None,
            None => None,
        };
        let params = object.remove("params").unwrap_or(Value::Null);

        match (id, method) {
            (Some(id), Some(method)) => Some(Self::Request { id, method, params }),
            (None, Some(method)) => Some(Self::Notification { method, params }),
            (Some(id), None) => {
                if let Some(error) = object.remove("error") {
                    let error = serde_json::from_value::<ResponseError>(error).ok()?;
                    Some(Self::Response {
                        id,
                        result: Err(error),
                    })
                } else {
                    let result = object.remove("result")?;
                    Some(Self::Response {
                        id,
                        result: Ok(result),
                    })
                }
            }
            (None, None) => None,
        }
    }

    /// Encode as a JSON-RPC 2.0 frame. `null` params are omitted.
    pub fn to_value(&self) -> Value {
        let mut frame = serde_json::Map::new();
        frame.insert("jsonrpc".into(), Value::from("2.0"));
        match self {
            Self::Request { id, method, params } => {
                frame.insert("id".into(), id_value(id));
                frame.insert("method".into(), Value::from(method.as_str()));
                if !params.is_null() {
                    frame.insert("params".into(), params.clone());
                }
            }
            Self::Notification { method, params } => {
                frame.insert("method".into(), Value::from(method.as_str()));
                if !params.is_null() {
                    frame.insert("params".into(), params.clone());
                }
            }
            Self::Response { id, result } => {
                frame.insert("id".into(), id_value(id));
                match result {
                    Ok(value) => {
                        frame.insert("result".into(), value.clone());
                    }
                    Err(error) => {
                        frame.insert(
                            "error".into(),
                            serde_json::to_value(error).unwrap_or(Value::Null),
                        );
                    }
                }
            }
        }
        Value::Object(frame)
    }
}

fn id_value(id: &RequestId) -> Value {
    match id {
        RequestId::Number(n) => Value::from(*n),
        RequestId::String(s) => Value::from(s.as_str()),
    }
}

/// Decode request or notification params, mapping failures to `-32602`.
pub(crate) fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, ResponseError> {
    serde_json::from_value(params).map_err(|e| ResponseError::invalid_params(&e))
}
