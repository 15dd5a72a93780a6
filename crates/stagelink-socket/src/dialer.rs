// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Production WebSocket dialer backed by tokio-tungstenite.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{Bytes, Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use stagelink_core::{SocketDialer, SocketLink, StagelinkError};

/// Dials real WebSocket connections with a bearer token in the
/// `Authorization` header.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteDialer;

#[async_trait]
impl SocketDialer for TungsteniteDialer {
    async fn dial(&self, url: &str, token: &str) -> Result<Box<dyn SocketLink>, StagelinkError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| StagelinkError::Config(format!("invalid socket url `{url}`: {e}")))?;

        let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
            StagelinkError::Auth {
                message: format!("credential not header-safe: {e}"),
                source: Some(Box::new(e)),
            }
        })?;
        request.headers_mut().insert(header::AUTHORIZATION, value);

        match connect_async(request).await {
            Ok((ws, response)) => {
                debug!(url, status = %response.status(), "websocket handshake complete");
                Ok(Box::new(TungsteniteLink { ws }))
            }
            Err(WsError::Http(response))
                if response.status() == StatusCode::UNAUTHORIZED
                    || response.status() == StatusCode::FORBIDDEN =>
            {
                Err(StagelinkError::Auth {
                    message: format!("socket handshake rejected ({})", response.status()),
                    source: None,
                })
            }
            Err(e) => Err(StagelinkError::Transport {
                message: format!("websocket connect failed: {e}"),
                source: Some(Box::new(e)),
            }),
        }
    }
}

struct TungsteniteLink {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl SocketLink for TungsteniteLink {
    async fn send_text(&mut self, text: String) -> Result<(), StagelinkError> {
        self.ws
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| StagelinkError::Transport {
                message: format!("websocket send failed: {e}"),
                source: Some(Box::new(e)),
            })
    }

    async fn next_text(&mut self) -> Option<Result<String, StagelinkError>> {
        loop {
            match self.ws.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Close(_)) => return None,
                // Ping/pong are answered by the library; binary frames are
                // not part of the protocol.
                Ok(_) => continue,
                Err(e) => {
                    return Some(Err(StagelinkError::Transport {
                        message: format!("websocket read failed: {e}"),
                        source: Some(Box::new(e)),
                    }));
                }
            }
        }
    }

    async fn ping(&mut self) -> Result<(), StagelinkError> {
        self.ws
            .send(Message::Ping(Bytes::new()))
            .await
            .map_err(|e| StagelinkError::Transport {
                message: format!("websocket ping failed: {e}"),
                source: Some(Box::new(e)),
            })
    }

    async fn close(&mut self) {
        let _ = self.ws.close(None).await;
    }
}
