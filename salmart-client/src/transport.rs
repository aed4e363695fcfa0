//! Network Client capability.
//!
//! The cache engine talks to the server only through [`ApiTransport`], so
//! tests can substitute a scripted transport for [`crate::RestClient`].

use async_trait::async_trait;
use salmart_core::{NetworkError, SalmartResult};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outbound API call, relative to the configured base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Append a query parameter only when `value` is present.
    pub fn with_query_opt<V: Into<String>>(self, name: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.with_query(name, value),
            None => self,
        }
    }

    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// `METHOD /path`, without the query string.
    pub fn route(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

impl fmt::Display for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)?;
        for (i, (k, v)) in self.query.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{}{}={}", sep, k, v)?;
        }
        Ok(())
    }
}

/// Issues JSON requests against the Salmart API.
///
/// Implementations must fail with `ApiError` for non-success statuses and
/// with `NetworkError` when no response was obtained. Failures are never
/// swallowed.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn fetch_json(&self, request: ApiRequest) -> SalmartResult<Value>;
}

/// Decode a response body into `T`, reporting shape mismatches as
/// [`NetworkError::Decode`].
pub fn decode_body<T: DeserializeOwned>(value: Value) -> SalmartResult<T> {
    serde_json::from_value(value).map_err(|e| {
        NetworkError::Decode {
            reason: e.to_string(),
        }
        .into()
    })
}

/// Decode a list response.
///
/// Accepts a bare array or an envelope carrying the array under `field` or
/// `data`.
pub fn decode_list<T: DeserializeOwned>(value: Value, field: &str) -> SalmartResult<Vec<T>> {
    match value {
        Value::Array(_) => decode_body(value),
        Value::Object(mut map) => {
            let inner = map
                .remove(field)
                .or_else(|| map.remove("data"))
                .unwrap_or(Value::Array(Vec::new()));
            decode_body(inner)
        }
        Value::Null => Ok(Vec::new()),
        other => Err(NetworkError::Decode {
            reason: format!("expected a list, got {}", kind_of(&other)),
        }
        .into()),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
