//! Live notification hub
//!
//! One duplex connection per session, opened on first need:
//! - `join` is sent on every (re)connect
//! - pushed notifications are deduplicated by id before anyone hears of them
//! - each new notification chimes once and asks for a silent refresh of its file
//! - a reconnect announces `ResyncRequired`, since pushes sent while
//!   disconnected are not replayed

mod sink;
mod socket;

pub use sink::NotificationSink;
pub use socket::{InboundEvent, OutboundEvent, SocketConnector, SocketPair, WsConnector};

use crate::error::HubError;
use crate::navigation::Navigation;
use crate::session::SessionContext;
use loandesk_core::{FileId, Notification};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;

/// Local side effect of channel traffic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubEvent {
    Connected,
    Disconnected,
    ListReplaced { count: usize },
    Received(Notification),
    /// Play the notification sound
    Chime,
    BadgeChanged { unread: usize },
    /// Re-fetch the file silently
    RefreshRequested { file_id: FileId },
    /// Pushes may have been missed; re-fetch the full list
    ResyncRequired,
}

struct Connection {
    outbound: mpsc::Sender<OutboundEvent>,
    pump: JoinHandle<()>,
}

impl Connection {
    fn is_live(&self) -> bool {
        !self.pump.is_finished() && !self.outbound.is_closed()
    }
}

/// Connection manager for the notification channel
pub struct NotificationHub {
    connector: Arc<dyn SocketConnector>,
    session: Arc<SessionContext>,
    navigation: Arc<Navigation>,
    sink: Arc<NotificationSink>,
    events: broadcast::Sender<HubEvent>,
    connection: Mutex<Option<Connection>>,
    connects: AtomicU64,
}

impl NotificationHub {
    #[must_use]
    pub fn new(
        connector: Arc<dyn SocketConnector>,
        session: Arc<SessionContext>,
        navigation: Arc<Navigation>,
        capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            connector,
            session,
            navigation,
            sink: Arc::new(NotificationSink::new()),
            events,
            connection: Mutex::new(None),
            connects: AtomicU64::new(0),
        }
    }

    /// Local notification list
    #[must_use]
    pub fn sink(&self) -> &NotificationSink {
        &self.sink
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.events.subscribe()
    }

    /// Whether a live connection exists
    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.as_ref().is_some_and(Connection::is_live)
    }

    /// Reuse the live connection or open one, blocking until `join` is sent
    ///
    /// Concurrent callers wait on the same attempt; only one connection is
    /// ever opened at a time.
    ///
    /// # Errors
    /// - `NotAuthenticated` without an employee and an organization
    /// - `ConnectFailed` or `ChannelClosed` from the connector
    pub async fn ensure_connected(&self) -> Result<mpsc::Sender<OutboundEvent>, HubError> {
        let mut slot = self.connection.lock().await;
        if let Some(connection) = slot.as_ref().filter(|c| c.is_live()) {
            return Ok(connection.outbound.clone());
        }

        let (employee_id, organization) = self.identity()?;
        let pair = self.connector.connect().await?;
        pair.outbound
            .send(OutboundEvent::Join {
                employee_id: employee_id.clone(),
                organization: organization.clone(),
            })
            .await
            .map_err(|_| HubError::ChannelClosed)?;

        let previous = self.connects.fetch_add(1, Ordering::SeqCst);
        tracing::info!(employee = %employee_id, %organization, reconnect = previous > 0, "joined notification channel");

        let pump = tokio::spawn(pump(pair.inbound, Arc::clone(&self.sink), self.events.clone()));
        let outbound = pair.outbound.clone();
        if let Some(stale) = slot.replace(Connection {
            outbound: pair.outbound,
            pump,
        }) {
            stale.pump.abort();
        }

        self.emit(HubEvent::Connected);
        if previous > 0 {
            self.emit(HubEvent::ResyncRequired);
        }
        Ok(outbound)
    }

    /// Mark every notification about `file_id` as read, locally and remotely
    ///
    /// The remote acknowledgment is fire-and-forget.
    ///
    /// # Errors
    /// Connection errors from [`NotificationHub::ensure_connected`]
    pub async fn mark_as_read(&self, file_id: FileId) -> Result<(), HubError> {
        let outbound = self.ensure_connected().await?;
        if self.sink.mark_file_read(&file_id) > 0 {
            self.emit(HubEvent::BadgeChanged {
                unread: self.sink.unread_count(),
            });
        }
        if outbound.send(OutboundEvent::MarkAsRead { file_id: file_id.clone() }).await.is_err() {
            tracing::warn!(%file_id, "markAsRead not delivered, channel closed");
        }
        Ok(())
    }

    /// Close the connection, if any
    pub async fn disconnect(&self) {
        if let Some(connection) = self.connection.lock().await.take() {
            let was_live = connection.is_live();
            connection.pump.abort();
            if was_live {
                tracing::info!("notification channel closed");
                self.emit(HubEvent::Disconnected);
            }
        }
    }

    fn identity(&self) -> Result<(String, String), HubError> {
        let employee_id = self.session.employee_id().ok_or(HubError::NotAuthenticated)?;
        let organization = self
            .navigation
            .current()
            .organization_segment()
            .map(str::to_string)
            .or_else(|| {
                self.session
                    .snapshot()
                    .default_organization()
                    .map(|m| m.id.clone())
            })
            .ok_or(HubError::NotAuthenticated)?;
        Ok((employee_id, organization))
    }

    fn emit(&self, event: HubEvent) {
        self.events.send(event).ok();
    }
}

impl std::fmt::Debug for NotificationHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationHub")
            .field("notifications", &self.sink.len())
            .field("connects", &self.connects.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

async fn pump(
    mut inbound: mpsc::Receiver<InboundEvent>,
    sink: Arc<NotificationSink>,
    events: broadcast::Sender<HubEvent>,
) {
    while let Some(event) = inbound.recv().await {
        match event {
            InboundEvent::Connect => tracing::debug!("server acknowledged connection"),
            InboundEvent::Disconnect => {
                tracing::info!("server closed notification channel");
                break;
            }
            InboundEvent::AllNotifications(list) => {
                let count = sink.replace(list);
                tracing::debug!(count, "notification list replaced");
                events.send(HubEvent::ListReplaced { count }).ok();
                events
                    .send(HubEvent::BadgeChanged {
                        unread: sink.unread_count(),
                    })
                    .ok();
            }
            InboundEvent::Notification(notification) => {
                if !sink.insert(notification.clone()) {
                    tracing::debug!(id = %notification.id, "duplicate notification ignored");
                    continue;
                }
                tracing::info!(id = %notification.id, title = %notification.title, "notification received");
                let file_id = notification.file_id.clone();
                events.send(HubEvent::Received(notification)).ok();
                events.send(HubEvent::Chime).ok();
                if let Some(file_id) = file_id {
                    events.send(HubEvent::RefreshRequested { file_id }).ok();
                }
                events
                    .send(HubEvent::BadgeChanged {
                        unread: sink.unread_count(),
                    })
                    .ok();
            }
        }
    }
    events.send(HubEvent::Disconnected).ok();
}
