use thiserror::Error;

use crate::transport::Endpoint;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("building the HTTP client failed: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {endpoint} failed: {source}")]
    Connect {
        endpoint: Endpoint,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} answered with HTTP {status}")]
    Status {
        endpoint: Endpoint,
        status: reqwest::StatusCode,
    },
    #[error("reading the {endpoint} stream failed: {source}")]
    Read {
        endpoint: Endpoint,
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("a query is already in flight on this client")]
    QueryInFlight,
    #[error("stop signal for session {session_id} failed: {reason}")]
    StopSignal { session_id: String, reason: String },
}

impl ClientError {
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::ProtocolViolation(reason.into())
    }

    #[cfg(test)]
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::ProtocolViolation(_))
    }
}
