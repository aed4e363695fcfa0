//! reqwest-backed REST client.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use salmart_core::{ApiError, NetworkError, SalmartError, SalmartResult};
use serde_json::Value;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::session::Session;
use crate::transport::{ApiRequest, ApiTransport, Method};

#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    session: Session,
}

impl RestClient {
    pub fn new(config: &ClientConfig, session: Session) -> Result<Self, ClientError> {
        Self::with_base_url(&config.api_base_url, config.request_timeout(), session)
    }

    pub fn with_base_url(
        base_url: &str,
        timeout: Duration,
        session: Session,
    ) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    async fn parse_response(&self, response: reqwest::Response) -> SalmartResult<Value> {
        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        if status.is_success() {
            // Handle 204 No Content and empty bodies
            if status == StatusCode::NO_CONTENT || text.trim().is_empty() {
                return Ok(Value::Null);
            }
            serde_json::from_str(&text).map_err(|e| {
                SalmartError::from(NetworkError::Decode {
                    reason: e.to_string(),
                })
            })
        } else {
            Err(api_error_from_body(status, &text).into())
        }
    }
}

#[async_trait]
impl ApiTransport for RestClient {
    async fn fetch_json(&self, request: ApiRequest) -> SalmartResult<Value> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(bearer) = self.session.bearer() {
            builder = builder.header(AUTHORIZATION, bearer);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::debug!(request = %request, "Sending API request");
        let response = builder.send().await.map_err(transport_error)?;
        let result = self.parse_response(response).await;
        if let Err(e) = &result {
            tracing::debug!(request = %request, error = %e, "API request failed");
        }
        result
    }
}

fn transport_error(err: reqwest::Error) -> SalmartError {
    if err.is_timeout() {
        NetworkError::Timeout.into()
    } else if err.is_decode() {
        NetworkError::Decode {
            reason: err.to_string(),
        }
        .into()
    } else {
        NetworkError::Transport {
            reason: err.to_string(),
        }
        .into()
    }
}

/// Build an [`ApiError`] from a non-success response body.
///
/// Uses the body's `message` (or `error`) field when the body is JSON and
/// falls back to the canonical status text otherwise.
pub fn api_error_from_body(status: StatusCode, body: &str) -> ApiError {
    let server_message = serde_json::from_str::<Value>(body).ok().and_then(|json| {
        ["message", "error"].iter().find_map(|field| {
            json.get(*field)
                .and_then(Value::as_str)
                .filter(|m| !m.trim().is_empty())
                .map(str::to_string)
        })
    });
    let message = server_message.unwrap_or_else(|| {
        status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
    });
    ApiError::new(status.as_u16(), message)
}
