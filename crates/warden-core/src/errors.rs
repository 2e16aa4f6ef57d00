use thiserror::Error;

/// Reasons the [`crate::firewall::Firewall`] rejects a network destination.
/// Maps directly to the `network_blocked` audit detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NetworkBlocked {
    #[error("blocked_port")]
    BlockedPort,
    #[error("not_in_allowed_range")]
    NotInAllowedRange,
    #[error("dns_not_allowed")]
    DnsNotAllowed,
    #[error("dns_resolution_failed")]
    DnsResolutionFailed,
    #[error("endpoint_not_allowed")]
    EndpointNotAllowed,
}

impl NetworkBlocked {
    pub fn reason(self) -> &'static str {
        match self {
            NetworkBlocked::BlockedPort => "blocked_port",
            NetworkBlocked::NotInAllowedRange => "not_in_allowed_range",
            NetworkBlocked::DnsNotAllowed => "dns_not_allowed",
            NetworkBlocked::DnsResolutionFailed => "dns_resolution_failed",
            NetworkBlocked::EndpointNotAllowed => "endpoint_not_allowed",
        }
    }
}

#[derive(Debug, Error)]
pub enum UrlError {
    #[error("malformed URL")]
    Malformed,
    #[error(transparent)]
    Blocked(#[from] NetworkBlocked),
}

/// Raised by the [`crate::validator::Validator`]. The `detail` field is
/// never sent to the client; only `message` (generic) crosses that
/// boundary, `detail` goes to the audit log. `network_reason` is set only
/// when the firewall, not a path/command check, is what rejected the
/// value, so the server can tell a `network_blocked` audit event apart
/// from a generic `validation_failed` one.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
    pub detail: String,
    pub network_reason: Option<&'static str>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: detail.into(),
            network_reason: None,
        }
    }

    pub fn network(message: impl Into<String>, detail: impl Into<String>, reason: &'static str) -> Self {
        Self {
            message: message.into(),
            detail: detail.into(),
            network_reason: Some(reason),
        }
    }
}

#[derive(Debug, Error)]
#[error("Rate limit exceeded")]
pub struct RateExceeded {
    pub retry_after_ms: u64,
}

/// Transport/codec-level failures. These become JSON-RPC error responses;
/// everything else in the pipeline becomes a tool-result error instead.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("parse error")]
    ParseError,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl ProtocolError {
    pub fn code(&self) -> i32 {
        match self {
            ProtocolError::ParseError => -32700,
            ProtocolError::InvalidRequest(_) => -32600,
            ProtocolError::MethodNotFound(_) => -32601,
            ProtocolError::InvalidParams(_) => -32602,
            ProtocolError::InternalError(_) => -32603,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ProtocolError::ParseError => "parse error".to_string(),
            ProtocolError::InvalidRequest(m) => m.clone(),
            ProtocolError::MethodNotFound(m) => m.clone(),
            ProtocolError::InvalidParams(m) => m.clone(),
            ProtocolError::InternalError(m) => m.clone(),
        }
    }
}
