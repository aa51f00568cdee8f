use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Identifier assigned to a stored object, stable for the life of the object.
///
/// Issued as `<random-unique-id>_<original-filename>` so that keys never
/// collide even when the same file is uploaded twice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Derive a fresh, globally unique key for an uploaded file.
    pub fn generate(filename: &str) -> Self {
        Self(format!("{}_{}", Uuid::new_v4(), filename))
    }

    /// Accept an externally supplied key, rejecting empty or blank values.
    pub fn parse(raw: impl Into<String>) -> Result<Self, GatewayError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "object key must be a non-empty string".to_string(),
            ));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata sent when requesting a write credential.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub filename: String,
    pub content_type: String,
    pub size: u64,
}

/// Body of a delete call.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeleteRequest {
    pub key: String,
}

/// A short-lived, single-object write authorization.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteCredential {
    /// Target location for the byte transfer (PUT).
    pub presigned_url: String,
    /// Key under which the object will live once written.
    pub key: ObjectKey,
    /// End of the credential's validity window.
    pub expires_at: DateTime<Utc>,
}

/// Why an abuse-control check refused to serve a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum DenialReason {
    /// Bot detection flagged the caller.
    Bot,
    /// Fixed-window rate limit exceeded for this identity.
    RateLimited,
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenialReason::Bot => write!(f, "bot detected"),
            DenialReason::RateLimited => write!(f, "rate limit exceeded"),
        }
    }
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway returned status {status_code}: {message}")]
    Status { status_code: u16, message: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("storage backend error: {0}")]
    Storage(String),

    #[error("internal gateway error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(status_code: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status_code,
            message: message.into(),
        }
    }
}

/// Outcome of a gateway operation, with denial kept apart from failure so
/// callers can message the user appropriately.
#[derive(Debug)]
pub enum GatewayDecision<T> {
    /// Checks passed and the operation succeeded.
    Granted(T),
    /// An abuse-control check refused the request; nothing was issued.
    Denied(DenialReason),
    /// The operation itself failed (transport, validation, backing store).
    Failed(GatewayError),
}

impl<T> GatewayDecision<T> {
    pub fn is_granted(&self) -> bool {
        matches!(self, GatewayDecision::Granted(_))
    }
}

/// Boundary consumed by the upload session. Implementations are the HTTP
/// client against a remote gateway, or an in-process service.
#[async_trait::async_trait]
pub trait StorageGateway: Send + Sync {
    /// Ask for a time-limited write credential for one object.
    async fn request_write_credential(
        &self,
        request: &UploadRequest,
    ) -> GatewayDecision<WriteCredential>;

    /// Delete a stored object by key.
    async fn delete_object(&self, key: &ObjectKey) -> GatewayDecision<()>;
}
