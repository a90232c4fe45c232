//! API gateway
//!
//! Single chokepoint for outbound requests:
//! - Decorates every call with token, organization and content type
//! - Normalizes responses into [`ApiResponse`]
//! - Reacts to 401 (forced logout) and 406 (not-found redirect) once per
//!   response, before any caller sees the result

use crate::config::OrganizationFallback;
use crate::error::{ClientError, FailureKind, UNEXPECTED_ERROR_MESSAGE};
use crate::navigation::{Navigation, Route};
use crate::session::SessionContext;
use crate::transport::{Method, PreparedRequest, RawResponse, RequestBody, Transport};
use loandesk_core::Attachment;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Request as issued by callers
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: RequestBody,
    /// Caller-supplied headers, appended after the standard ones
    pub headers: Vec<(String, String)>,
    /// Allowed without a resolved organization (sign-in flows)
    pub unscoped: bool,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>, body: RequestBody) -> Self {
        Self {
            method,
            path: path.into(),
            body,
            headers: Vec::new(),
            unscoped: false,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path, RequestBody::Empty)
    }

    #[must_use]
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path, RequestBody::Json(body))
    }

    #[must_use]
    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Put, path, RequestBody::Json(body))
    }

    #[must_use]
    pub fn multipart(
        method: Method,
        path: impl Into<String>,
        fields: Map<String, Value>,
        attachments: Vec<Attachment>,
    ) -> Self {
        Self::new(method, path, RequestBody::Multipart { fields, attachments })
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Mark the request as not needing an organization
    #[must_use]
    pub fn unscoped(mut self) -> Self {
        self.unscoped = true;
        self
    }
}

/// Error envelope returned by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiErrorBody {
    pub status: u16,
    pub message: String,
    pub field_errors: BTreeMap<String, String>,
}

/// Normalized response
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    /// JSON payload
    Data(Value),
    /// Non-JSON payload, e.g. a generated PDF
    Binary(Vec<u8>),
    /// Server-reported error
    Error(ApiErrorBody),
    /// No usable answer; `status` is `None` when nothing was received
    Failure { status: Option<u16>, message: String },
}

impl ApiResponse {
    /// HTTP status carried by failures
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiResponse::Error(body) => Some(body.status),
            ApiResponse::Failure { status, .. } => *status,
            ApiResponse::Data(_) | ApiResponse::Binary(_) => None,
        }
    }

    /// JSON payload or the classified failure
    ///
    /// # Errors
    /// `ClientError::Api` for anything but `Data`
    pub fn into_json(self) -> Result<Value, ClientError> {
        match self {
            ApiResponse::Data(value) => Ok(value),
            ApiResponse::Binary(_) => Err(ClientError::unexpected(UNEXPECTED_ERROR_MESSAGE)),
            other => Err(other.into_error()),
        }
    }

    /// Binary payload or the classified failure
    ///
    /// # Errors
    /// `ClientError::Api` for anything but `Binary`
    pub fn into_binary(self) -> Result<Vec<u8>, ClientError> {
        match self {
            ApiResponse::Binary(bytes) => Ok(bytes),
            ApiResponse::Data(_) => Err(ClientError::unexpected(UNEXPECTED_ERROR_MESSAGE)),
            other => Err(other.into_error()),
        }
    }

    fn into_error(self) -> ClientError {
        match self {
            ApiResponse::Error(body) if body.status == 0 => ClientError::Api {
                kind: FailureKind::UnexpectedError,
                status: None,
                message: body.message,
                field_errors: body.field_errors,
            },
            ApiResponse::Error(body) => {
                let kind = match FailureKind::from_status(Some(body.status)) {
                    FailureKind::UnexpectedError if !body.field_errors.is_empty() => {
                        FailureKind::ValidationFailed
                    }
                    // a 2xx `{error}` envelope is a business rule refusal
                    FailureKind::UnexpectedError
                        if (200..300).contains(&body.status)
                            && body.message != UNEXPECTED_ERROR_MESSAGE =>
                    {
                        FailureKind::ValidationFailed
                    }
                    kind => kind,
                };
                ClientError::Api {
                    kind,
                    status: Some(body.status),
                    message: body.message,
                    field_errors: body.field_errors,
                }
            }
            ApiResponse::Failure { status, message } => ClientError::Api {
                kind: FailureKind::from_status(status),
                status,
                message,
                field_errors: BTreeMap::new(),
            },
            ApiResponse::Data(_) | ApiResponse::Binary(_) => {
                ClientError::unexpected(UNEXPECTED_ERROR_MESSAGE)
            }
        }
    }
}

/// Outbound request chokepoint
pub struct ApiGateway {
    transport: Arc<dyn Transport>,
    session: Arc<SessionContext>,
    navigation: Arc<Navigation>,
    fallback: OrganizationFallback,
}

impl ApiGateway {
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        session: Arc<SessionContext>,
        navigation: Arc<Navigation>,
        fallback: OrganizationFallback,
    ) -> Self {
        Self {
            transport,
            session,
            navigation,
            fallback,
        }
    }

    /// Issue a request and normalize the answer
    ///
    /// 401 and 406 reactions happen here, whatever the caller does next.
    pub async fn call(&self, request: ApiRequest) -> ApiResponse {
        let prepared = match self.prepare(request) {
            Ok(prepared) => prepared,
            Err(response) => return response,
        };
        let method = prepared.method;
        let path = prepared.path.clone();

        match self.transport.execute(prepared).await {
            Ok(raw) => {
                tracing::debug!(%method, %path, status = raw.status, "response received");
                self.react_to_status(raw.status);
                normalize(raw)
            }
            Err(e) => {
                tracing::warn!(%method, %path, error = %e, "no response received");
                ApiResponse::Failure {
                    status: None,
                    message: e.to_string(),
                }
            }
        }
    }

    fn prepare(&self, request: ApiRequest) -> Result<PreparedRequest, ApiResponse> {
        let organization = self.resolve_organization(request.unscoped)?;

        let mut headers = Vec::with_capacity(request.headers.len() + 3);
        if let Some(token) = self.session.token() {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }
        headers.push(("organization".to_string(), organization));
        if !request.body.is_multipart() {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }
        headers.extend(request.headers);

        Ok(PreparedRequest {
            method: request.method,
            path: request.path,
            headers,
            body: request.body,
        })
    }

    fn resolve_organization(&self, unscoped: bool) -> Result<String, ApiResponse> {
        let route = self.navigation.current();
        if let Some(organization) = route.organization_segment() {
            return Ok(organization.to_string());
        }
        if unscoped || route.is_public() {
            return Ok(String::new());
        }
        match self.fallback {
            OrganizationFallback::EmptySentinel => {
                tracing::warn!(route = %route, "no organization in route, sending empty organization");
                Ok(String::new())
            }
            OrganizationFallback::Reject => {
                tracing::warn!(route = %route, "no organization in route, request refused");
                // status 0: refused before anything was sent
                Err(ApiResponse::Error(ApiErrorBody {
                    status: 0,
                    message: format!("no organization resolved from route '{route}'"),
                    field_errors: BTreeMap::new(),
                }))
            }
        }
    }

    fn react_to_status(&self, status: u16) {
        match status {
            401 => {
                tracing::warn!("session expired, forcing logout");
                if let Err(e) = self.session.clear() {
                    tracing::error!(error = %e, "failed to clear persisted session");
                }
                self.navigation.navigate(Route::login());
            }
            406 => {
                tracing::warn!("access denied, redirecting to not-found");
                self.navigation.navigate(Route::not_found());
            }
            _ => {}
        }
    }
}

impl std::fmt::Debug for ApiGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiGateway")
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

fn normalize(raw: RawResponse) -> ApiResponse {
    let status = raw.status;

    if raw.is_success() {
        if !raw.is_json() && !raw.body.is_empty() {
            return ApiResponse::Binary(raw.body);
        }
        if raw.body.is_empty() {
            return ApiResponse::Data(Value::Null);
        }
        return match serde_json::from_slice::<Value>(&raw.body) {
            Ok(Value::Object(mut map)) => {
                if map.get("error").is_some_and(is_error_flag) {
                    ApiResponse::Error(error_body(status, &map))
                } else if let Some(data) = map.remove("data") {
                    ApiResponse::Data(data)
                } else {
                    ApiResponse::Data(Value::Object(map))
                }
            }
            Ok(other) => ApiResponse::Data(other),
            Err(_) => ApiResponse::Error(ApiErrorBody {
                status,
                message: UNEXPECTED_ERROR_MESSAGE.to_string(),
                field_errors: BTreeMap::new(),
            }),
        };
    }

    let parsed = serde_json::from_slice::<Value>(&raw.body).ok();
    let envelope = parsed.as_ref().and_then(Value::as_object);

    if (400..500).contains(&status) && status != 401 && status != 406 {
        if let Some(map) = envelope.filter(|m| {
            m.contains_key("error") || m.contains_key("errors") || m.contains_key("message")
        }) {
            return ApiResponse::Error(error_body(status, map));
        }
    }

    let message = envelope
        .and_then(|m| m.get("message").or_else(|| m.get("error")))
        .and_then(Value::as_str)
        .map_or_else(|| format!("request failed with status {status}"), str::to_string);
    ApiResponse::Failure {
        status: Some(status),
        message,
    }
}

fn error_body(status: u16, envelope: &Map<String, Value>) -> ApiErrorBody {
    let error = envelope.get("error");
    let message = match error {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Object(inner)) => inner
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => envelope
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    };
    let message = if message.is_empty() {
        UNEXPECTED_ERROR_MESSAGE.to_string()
    } else {
        message
    };

    let field_errors = envelope
        .get("errors")
        .or_else(|| error.and_then(|e| e.get("errors")))
        .map(parse_field_errors)
        .unwrap_or_default();

    ApiErrorBody {
        status,
        message,
        field_errors,
    }
}

/// Accepts `{field: message}` or `[{field|path, message}]`
fn parse_field_errors(errors: &Value) -> BTreeMap<String, String> {
    match errors {
        Value::Object(map) => map
            .iter()
            .map(|(field, message)| {
                let text = message
                    .as_str()
                    .map_or_else(|| message.to_string(), str::to_string);
                (field.clone(), text)
            })
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let field = item.get("field").or_else(|| item.get("path"))?.as_str()?;
                let message = item.get("message")?.as_str()?;
                Some((field.to_string(), message.to_string()))
            })
            .collect(),
        _ => BTreeMap::new(),
    }
}

/// `error` set to anything but `null` or `false`
fn is_error_flag(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}
