//! WebSocket push listener with reconnect backoff.

use futures_util::StreamExt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::config::{ClientConfig, ReconnectConfig};
use crate::error::ClientError;
use crate::push::{ListenerEvent, PushEvent};
use crate::session::Session;

#[derive(Clone)]
pub struct WsClient {
    endpoint: String,
    session: Session,
    reconnect: ReconnectConfig,
}

impl WsClient {
    pub fn new(config: &ClientConfig, session: Session) -> Self {
        Self::with_endpoint(&config.ws_endpoint, config.reconnect.clone(), session)
    }

    pub fn with_endpoint(endpoint: &str, reconnect: ReconnectConfig, session: Session) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            session,
            reconnect,
        }
    }

    pub async fn connect(&self) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>, ClientError> {
        let mut request = self.endpoint.as_str().into_client_request()?;
        if let Some(bearer) = self.session.bearer() {
            let value = HeaderValue::from_str(&bearer)
                .map_err(|e| ClientError::InvalidHeader(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        let (stream, _) = tokio_tungstenite::connect_async(request).await?;
        Ok(stream)
    }

    pub fn reconnect_config(&self) -> &ReconnectConfig {
        &self.reconnect
    }
}

/// Spawn the listener loop.
///
/// Every decoded frame is forwarded as [`ListenerEvent::Push`]. The loop
/// reconnects with jittered exponential backoff and stops once the
/// receiving side is dropped.
pub fn spawn_push_listener(ws: WsClient, sender: mpsc::Sender<ListenerEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut backoff = ws.reconnect_config().initial_ms;
        loop {
            match ws.connect().await {
                Ok(mut stream) => {
                    tracing::info!(endpoint = %ws.endpoint, "Push listener connected");
                    if sender.send(ListenerEvent::Connected).await.is_err() {
                        return;
                    }
                    backoff = ws.reconnect_config().initial_ms;

                    let mut reason = "connection closed".to_string();
                    while let Some(message) = stream.next().await {
                        let event = match message {
                            Ok(Message::Text(text)) => Some(decode_frame(&text)),
                            Ok(Message::Close(_)) => break,
                            Ok(_) => None,
                            Err(err) => {
                                reason = err.to_string();
                                break;
                            }
                        };
                        if let Some(event) = event {
                            if sender.send(event).await.is_err() {
                                return;
                            }
                        }
                    }

                    tracing::info!(reason = %reason, "Push listener disconnected");
                    if sender
                        .send(ListenerEvent::Disconnected { reason })
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        endpoint = %ws.endpoint,
                        error = %err,
                        retry_in_ms = backoff,
                        "Push listener connect failed"
                    );
                    if sender.is_closed() {
                        return;
                    }
                }
            }

            let delay = jittered_backoff(backoff, ws.reconnect_config().jitter_ms);
            tokio::time::sleep(Duration::from_millis(delay)).await;

            backoff = next_backoff(backoff, ws.reconnect_config());
        }
    })
}

fn decode_frame(text: &str) -> ListenerEvent {
    match PushEvent::decode(text) {
        Ok(event) => {
            tracing::debug!(event = event.name(), "Push event received");
            ListenerEvent::Push(event)
        }
        Err(err) => {
            tracing::warn!(error = %err, "Undecodable push frame");
            ListenerEvent::DecodeError {
                message: err.to_string(),
            }
        }
    }
}

fn next_backoff(current_ms: u64, config: &ReconnectConfig) -> u64 {
    let next = (current_ms as f64 * config.multiplier) as u64;
    next.min(config.max_ms)
}

fn jittered_backoff(base_ms: u64, jitter_ms: u64) -> u64 {
    if jitter_ms == 0 {
        return base_ms;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_nanos(0))
        .subsec_nanos() as u64;
    let jitter = nanos % jitter_ms;
    base_ms.saturating_add(jitter)
}
