use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, warn};

use crate::config::GatewayConfig;
use crate::policy::{AbuseControl, AbuseDecision, RequestFingerprint};

use super::store::ObjectStore;
use super::types::{
    DenialReason,
    GatewayDecision,
    GatewayError,
    ObjectKey,
    StorageGateway,
    UploadRequest,
    WriteCredential,
};

/// An authenticated caller. Session/cookie handling lives upstream; by the
/// time a request reaches the service the identity is trusted.
#[derive(Debug, Clone)]
pub struct Caller {
    pub identity: String,
    pub fingerprint: RequestFingerprint,
}

impl Caller {
    pub fn new(identity: impl Into<String>, fingerprint: RequestFingerprint) -> Self {
        Self {
            identity: identity.into(),
            fingerprint,
        }
    }
}

/// Server side of the storage gateway: applies abuse controls, validates the
/// payload, and issues credentials or performs deletions against the backing
/// store. A denied decision never issues a credential.
pub struct GatewayService {
    store: Arc<dyn ObjectStore>,
    abuse: AbuseControl,
    config: GatewayConfig,
}

impl GatewayService {
    pub fn new(store: Arc<dyn ObjectStore>, abuse: AbuseControl, config: GatewayConfig) -> Self {
        Self { store, abuse, config }
    }

    fn check_abuse(&self, caller: &Caller, operation: &str) -> Result<(), DenialReason> {
        match self.abuse.evaluate(&caller.identity, &caller.fingerprint) {
            AbuseDecision::Allow => Ok(()),
            AbuseDecision::Deny(reason) => {
                warn!(identity = %caller.identity, %reason, operation, "abuse control denied request");
                Err(reason)
            }
        }
    }

    fn validate_upload(request: &UploadRequest) -> Result<(), GatewayError> {
        if request.filename.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "filename must not be empty".to_string(),
            ));
        }
        if request.content_type.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "content type must not be empty".to_string(),
            ));
        }
        if request.size == 0 {
            return Err(GatewayError::InvalidRequest(
                "size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Issue a write credential for one object. The abuse check runs before
    /// anything else and a denial fails closed.
    pub async fn issue_credential(
        &self,
        caller: &Caller,
        request: &UploadRequest,
    ) -> GatewayDecision<WriteCredential> {
        if let Err(reason) = self.check_abuse(caller, "upload") {
            return GatewayDecision::Denied(reason);
        }

        if let Err(err) = Self::validate_upload(request) {
            return GatewayDecision::Failed(err);
        }

        let key = ObjectKey::generate(&request.filename);
        let expiry = Duration::from_secs(self.config.credential_expiry_secs);

        match self
            .store
            .presign_put(&key, &request.content_type, request.size, expiry)
            .await
        {
            Ok(presigned_url) => {
                debug!(identity = %caller.identity, %key, "issued write credential");
                GatewayDecision::Granted(WriteCredential {
                    presigned_url,
                    key,
                    expires_at: Utc::now() + chrono::Duration::seconds(
                        self.config.credential_expiry_secs as i64,
                    ),
                })
            }
            Err(err) => {
                error!(identity = %caller.identity, %err, "failed to presign upload");
                GatewayDecision::Failed(err)
            }
        }
    }

    /// Delete a stored object. Backing-store errors are surfaced, never
    /// swallowed.
    pub async fn delete_object(&self, caller: &Caller, raw_key: &str) -> GatewayDecision<()> {
        if let Err(reason) = self.check_abuse(caller, "delete") {
            return GatewayDecision::Denied(reason);
        }

        let key = match ObjectKey::parse(raw_key) {
            Ok(key) => key,
            Err(err) => return GatewayDecision::Failed(err),
        };

        match self.store.delete(&key).await {
            Ok(()) => {
                debug!(identity = %caller.identity, %key, "deleted object");
                GatewayDecision::Granted(())
            }
            Err(err) => {
                error!(identity = %caller.identity, %key, %err, "failed to delete object");
                GatewayDecision::Failed(err)
            }
        }
    }
}

/// In-process gateway adapter: the session talks to a local `GatewayService`
/// as a fixed caller instead of going over HTTP. Used by tests and demos.
pub struct LocalGateway {
    service: Arc<GatewayService>,
    caller: Caller,
}

impl LocalGateway {
    pub fn new(service: Arc<GatewayService>, caller: Caller) -> Self {
        Self { service, caller }
    }
}

#[async_trait::async_trait]
impl StorageGateway for LocalGateway {
    async fn request_write_credential(
        &self,
        request: &UploadRequest,
    ) -> GatewayDecision<WriteCredential> {
        self.service.issue_credential(&self.caller, request).await
    }

    async fn delete_object(&self, key: &ObjectKey) -> GatewayDecision<()> {
        self.service.delete_object(&self.caller, key.as_str()).await
    }
}
