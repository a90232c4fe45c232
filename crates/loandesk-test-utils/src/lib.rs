//! Testing utilities for the loandesk workspace
//!
//! Scripted transport, in-memory sockets and fixtures shared by the
//! integration tests.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use loandesk_client::{
    ClientConfig, HubError, InboundEvent, LoandeskClient, MemoryStore, OutboundEvent,
    PreparedRequest, RawResponse, SessionStore, SocketConnector, SocketPair, Transport,
    TransportError,
};
use loandesk_core::{FileId, Notification, NotificationId, OrganizationMembership, SessionSnapshot};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

pub const TEST_TOKEN: &str = "test-token";
pub const TEST_EMPLOYEE: &str = "E1";
pub const TEST_ORGANIZATION: &str = "acme";

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

pub fn json_response(status: u16, body: Value) -> RawResponse {
    RawResponse {
        status,
        content_type: Some("application/json".to_string()),
        body: serde_json::to_vec(&body).unwrap(),
    }
}

pub fn pdf_response(bytes: &[u8]) -> RawResponse {
    RawResponse {
        status: 200,
        content_type: Some("application/pdf".to_string()),
        body: bytes.to_vec(),
    }
}

/// Transport answering from a queue and recording every request
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
    requests: Mutex<Vec<PreparedRequest>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every request until the gate hands out a permit
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn push(&self, response: RawResponse) -> &Self {
        self.responses.lock().push_back(Ok(response));
        self
    }

    pub fn push_json(&self, status: u16, body: Value) -> &Self {
        self.push(json_response(status, body))
    }

    pub fn push_error(&self, error: TransportError) -> &Self {
        self.responses.lock().push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<PreparedRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn last_request(&self) -> Option<PreparedRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: PreparedRequest) -> Result<RawResponse, TransportError> {
        self.requests.lock().push(request);
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| TransportError::Request("gate closed".to_string()))?
                .forget();
        }
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Request("no scripted response".to_string())))
    }
}

// ---------------------------------------------------------------------------
// Sockets
// ---------------------------------------------------------------------------

/// Server side of one in-memory connection
#[derive(Debug)]
pub struct ServerEnd {
    sent: mpsc::Receiver<OutboundEvent>,
    push: mpsc::Sender<InboundEvent>,
}

impl ServerEnd {
    pub async fn push(&self, event: InboundEvent) {
        self.push.send(event).await.unwrap();
    }

    /// Next frame sent by the client, waiting up to one second
    pub async fn next_sent(&mut self) -> Option<OutboundEvent> {
        tokio::time::timeout(Duration::from_secs(1), self.sent.recv())
            .await
            .ok()
            .flatten()
    }

    /// Frames already sent, without waiting
    pub fn drain_sent(&mut self) -> Vec<OutboundEvent> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.sent.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

/// Connector handing out in-memory connections
#[derive(Debug)]
pub struct MemoryConnector {
    capacity: usize,
    servers: Mutex<VecDeque<ServerEnd>>,
    connects: AtomicUsize,
    refuse: AtomicBool,
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self {
            capacity: 32,
            servers: Mutex::new(VecDeque::new()),
            connects: AtomicUsize::new(0),
            refuse: AtomicBool::new(false),
        }
    }
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Refuse connections until called again with `false`
    pub fn refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Server end of the oldest connection not yet taken
    pub fn take_server(&self) -> Option<ServerEnd> {
        self.servers.lock().pop_front()
    }
}

#[async_trait]
impl SocketConnector for MemoryConnector {
    async fn connect(&self) -> Result<SocketPair, HubError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(HubError::ConnectFailed("connection refused".to_string()));
        }
        let (outbound, sent) = mpsc::channel(self.capacity);
        let (push, inbound) = mpsc::channel(self.capacity);
        self.servers.lock().push_back(ServerEnd { sent, push });
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(SocketPair { outbound, inbound })
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn notification(id: &str, file_id: Option<&str>) -> Notification {
    Notification {
        id: NotificationId::from(id),
        employee: TEST_EMPLOYEE.to_string(),
        organization: TEST_ORGANIZATION.to_string(),
        file_id: file_id.map(FileId::from),
        task_id: None,
        title: "Case file update".to_string(),
        message: format!("update {id}"),
        is_read: false,
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
    }
}

pub fn login_response() -> Value {
    json!({
        "data": {
            "token": TEST_TOKEN,
            "employeeId": TEST_EMPLOYEE,
            "organizations": [{"_id": TEST_ORGANIZATION, "name": "Acme Finance"}]
        }
    })
}

pub fn signed_in_snapshot() -> SessionSnapshot {
    SessionSnapshot {
        token: Some(TEST_TOKEN.to_string()),
        employee_id: Some(TEST_EMPLOYEE.to_string()),
        organizations: vec![OrganizationMembership::new(TEST_ORGANIZATION, "Acme Finance")],
        authenticated: true,
        loading: false,
    }
}

/// Client wired to scripted parts
pub struct Harness {
    pub client: LoandeskClient,
    pub transport: Arc<ScriptedTransport>,
    pub connector: Arc<MemoryConnector>,
    pub store: Arc<MemoryStore>,
}

impl Harness {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, ScriptedTransport::new())
    }

    pub fn with_transport(config: ClientConfig, transport: ScriptedTransport) -> Self {
        let transport = Arc::new(transport);
        let connector = Arc::new(MemoryConnector::new());
        let store = Arc::new(MemoryStore::new());
        let client = LoandeskClient::new(
            config,
            transport.clone(),
            connector.clone(),
            store.clone() as Arc<dyn SessionStore>,
        );
        Self {
            client,
            transport,
            connector,
            store,
        }
    }

    /// Signed in to the test organization, on its dashboard
    pub fn signed_in(config: ClientConfig) -> Self {
        let harness = Self::new(config);
        harness.client.guard().establish(signed_in_snapshot()).unwrap();
        harness
    }

    pub fn signed_in_with_transport(config: ClientConfig, transport: ScriptedTransport) -> Self {
        let harness = Self::with_transport(config, transport);
        harness.client.guard().establish(signed_in_snapshot()).unwrap();
        harness
    }
}
