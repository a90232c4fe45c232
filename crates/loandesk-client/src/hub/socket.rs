//! Duplex channel frames and connectors
//!
//! Frames are JSON objects `{"event": <name>, "data": <payload>}`.

use crate::error::HubError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use loandesk_core::{FileId, Notification};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Event pushed by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum InboundEvent {
    #[serde(rename = "connect")]
    Connect,
    #[serde(rename = "disconnect")]
    Disconnect,
    /// Full list, replaces the local one
    #[serde(rename = "getAllNotifications")]
    AllNotifications(Vec<Notification>),
    #[serde(rename = "notification")]
    Notification(Notification),
}

/// Event sent by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum OutboundEvent {
    #[serde(rename = "join", rename_all = "camelCase")]
    Join {
        employee_id: String,
        organization: String,
    },
    #[serde(rename = "markAsRead", rename_all = "camelCase")]
    MarkAsRead { file_id: FileId },
}

/// Both directions of one connection
#[derive(Debug)]
pub struct SocketPair {
    pub outbound: mpsc::Sender<OutboundEvent>,
    /// Closes when the connection drops
    pub inbound: mpsc::Receiver<InboundEvent>,
}

/// Opens duplex connections
#[async_trait]
pub trait SocketConnector: Send + Sync {
    /// Open a new connection
    ///
    /// # Errors
    /// `HubError::ConnectFailed` if the endpoint is unreachable
    async fn connect(&self) -> Result<SocketPair, HubError>;
}

/// WebSocket connector
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    capacity: usize,
}

impl WsConnector {
    #[must_use]
    pub fn new(url: impl Into<String>, capacity: usize) -> Self {
        Self {
            url: url.into(),
            capacity: capacity.max(1),
        }
    }
}

#[async_trait]
impl SocketConnector for WsConnector {
    async fn connect(&self) -> Result<SocketPair, HubError> {
        let (stream, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| HubError::ConnectFailed(e.to_string()))?;
        tracing::info!(url = %self.url, "socket connected");
        let (mut write, mut read) = stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundEvent>(self.capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel::<InboundEvent>(self.capacity);

        tokio::spawn(async move {
            while let Some(event) = outbound_rx.recv().await {
                let frame = match serde_json::to_string(&event) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to encode socket frame");
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(frame)).await {
                    tracing::warn!(error = %e, "socket write failed");
                    break;
                }
            }
            write.close().await.ok();
        });

        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => match serde_json::from_str::<InboundEvent>(&text) {
                        Ok(event) => {
                            if inbound_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::debug!(error = %e, "ignoring unknown socket frame"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "socket read failed");
                        break;
                    }
                }
            }
        });

        Ok(SocketPair {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
