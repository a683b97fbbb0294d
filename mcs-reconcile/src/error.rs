//! Error types.

use std::time::Duration;

use thiserror::Error;

use crate::kind::{ManagedResource, ResourceKind};
use crate::status::CanonicalStatus;

/// Errors raised by the HTTP transport layer.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The backend answered 404.
    #[error("resource not found with: [{method} {url}], error message: {body}")]
    NotFound {
        method: String,
        url: String,
        body: String,
    },

    /// The backend answered with a status code outside the accepted set.
    #[error("unexpected response code {status} for [{method} {url}]: {body}")]
    Http {
        status: u16,
        method: String,
        url: String,
        body: String,
    },

    /// Connection, TLS or timeout failure before a response was read.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The response body did not match the expected payload.
    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// No usable endpoint is configured for a service category.
    #[error("invalid endpoint: {0}")]
    Endpoint(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }

    /// Server-side failures an idempotent request may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Http {
                status: 500 | 503 | 504,
                ..
            }
        )
    }
}

/// Errors surfaced by the reconciliation engine.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Transport failure, never retried here.
    #[error(transparent)]
    Transport(#[from] ClientError),

    /// The resource does not exist.
    #[error("{kind} {id} not found")]
    NotFound { kind: ResourceKind, id: String },

    /// The backend reported its own error status. Terminal.
    #[error("{} {} entered error state", .resource.kind(), .resource.id)]
    ErrorState { resource: Box<ManagedResource> },

    /// Deadline exceeded while polling.
    #[error(
        "timeout after {timeout:?} waiting for {kind} {id} (last status: {})",
        last_seen(.last_status)
    )]
    Timeout {
        kind: ResourceKind,
        id: String,
        timeout: Duration,
        last_status: Option<CanonicalStatus>,
    },

    /// An observed status matched neither pending nor target.
    #[error("{kind} {id} reported unexpected status {status} (pending: {pending:?}, target: {target:?})")]
    UnexpectedStatus {
        kind: ResourceKind,
        id: String,
        status: CanonicalStatus,
        pending: Vec<CanonicalStatus>,
        target: Vec<CanonicalStatus>,
    },

    /// More than one kind answered for the same identifier.
    #[error("identifier {id} matches more than one kind: {kinds:?}")]
    AmbiguousKind { id: String, kinds: Vec<ResourceKind> },

    /// No kind answered for the identifier.
    #[error("identifier {id} does not name any of {kinds:?}")]
    NoSuchKind { id: String, kinds: Vec<ResourceKind> },

    #[error("invalid poll spec: {0}")]
    InvalidPollSpec(String),

    /// A step of a multi-step update failed. Earlier steps stay applied.
    #[error("step {step}/{total} ({name}) failed, applied before it: {completed:?}: {source}")]
    StepFailed {
        step: usize,
        total: usize,
        name: String,
        completed: Vec<String>,
        #[source]
        source: Box<ReconcileError>,
    },

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("invalid spec: {0}")]
    InvalidSpec(String),

    #[error("operation not supported: {0}")]
    Unsupported(String),
}

impl ReconcileError {
    /// True for a transport 404, an engine-level `NotFound` and an
    /// identifier no kind answered for.
    pub fn is_not_found(&self) -> bool {
        match self {
            ReconcileError::NotFound { .. } | ReconcileError::NoSuchKind { .. } => true,
            ReconcileError::Transport(e) => e.is_not_found(),
            _ => false,
        }
    }
}

fn last_seen(status: &Option<CanonicalStatus>) -> String {
    match status {
        Some(status) => status.to_string(),
        None => "none observed".to_string(),
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;
