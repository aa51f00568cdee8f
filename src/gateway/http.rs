use reqwest::{Client, StatusCode};

use super::types::{
    DeleteRequest,
    DenialReason,
    GatewayDecision,
    GatewayError,
    ObjectKey,
    StorageGateway,
    UploadRequest,
    WriteCredential,
};

/// HTTP client for a remote storage gateway exposing the upload and delete
/// endpoints.
#[derive(Debug, Clone)]
pub struct HttpStorageGateway {
    client: Client,
    upload_endpoint: String,
    delete_endpoint: String,
    auth_token: Option<String>,
}

impl HttpStorageGateway {
    pub fn new(upload_endpoint: impl Into<String>, delete_endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            upload_endpoint: upload_endpoint.into(),
            delete_endpoint: delete_endpoint.into(),
            auth_token: None,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Map a non-success endpoint status to the decision the caller should see.
/// The gateway distinguishes policy denials from generic failure: 403 is the
/// bot verdict, 429 the rate limit.
pub(crate) fn denial_from_status(status: StatusCode) -> Option<DenialReason> {
    match status {
        StatusCode::FORBIDDEN => Some(DenialReason::Bot),
        StatusCode::TOO_MANY_REQUESTS => Some(DenialReason::RateLimited),
        _ => None,
    }
}

fn failure_from_status(status: StatusCode, body: String) -> GatewayError {
    if status == StatusCode::BAD_REQUEST {
        GatewayError::InvalidRequest(body)
    } else {
        GatewayError::status(status.as_u16(), body)
    }
}

#[async_trait::async_trait]
impl StorageGateway for HttpStorageGateway {
    async fn request_write_credential(
        &self,
        request: &UploadRequest,
    ) -> GatewayDecision<WriteCredential> {
        let response = self
            .apply_auth(self.client.post(&self.upload_endpoint))
            .json(request)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) => return GatewayDecision::Failed(err.into()),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return match denial_from_status(status) {
                Some(reason) => GatewayDecision::Denied(reason),
                None => GatewayDecision::Failed(failure_from_status(status, body)),
            };
        }

        match response.json::<WriteCredential>().await {
            Ok(credential) => GatewayDecision::Granted(credential),
            Err(err) => GatewayDecision::Failed(err.into()),
        }
    }

    async fn delete_object(&self, key: &ObjectKey) -> GatewayDecision<()> {
        let body = DeleteRequest {
            key: key.as_str().to_string(),
        };

        let response = self
            .apply_auth(self.client.delete(&self.delete_endpoint))
            .json(&body)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) => return GatewayDecision::Failed(err.into()),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return match denial_from_status(status) {
                Some(reason) => GatewayDecision::Denied(reason),
                None => GatewayDecision::Failed(failure_from_status(status, body)),
            };
        }

        GatewayDecision::Granted(())
    }
}
