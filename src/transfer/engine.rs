use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Body, Client};

use crate::gateway::WriteCredential;
use crate::session::SourceHandle;

use super::errors::{Result, TransferError};
use super::progress::{ProgressFn, ProgressStream, ProgressTracker};

/// Moves raw bytes to the location a write credential authorizes, emitting
/// progress along the way. One full-body write per call; failures surface
/// immediately and retry policy is left to the caller (there is none).
#[async_trait]
pub trait TransferEngine: Send + Sync {
    async fn transfer(
        &self,
        source: &SourceHandle,
        credential: &WriteCredential,
        progress: ProgressFn,
    ) -> Result<()>;
}

/// HTTP transfer engine: a single PUT to the presigned URL, streamed in
/// chunks through a progress-counting stream.
#[derive(Debug, Clone)]
pub struct HttpTransferEngine {
    client: Client,
    chunk_size: usize,
}

impl HttpTransferEngine {
    pub fn new() -> Self {
        // No request timeout: the credential's validity window is the only
        // bound on a stalled transfer.
        Self {
            client: Client::new(),
            chunk_size: 64 * 1024,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

impl Default for HttpTransferEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a source into chunks without copying; each chunk is a view into
/// the source's backing storage.
pub(crate) fn chunk_source(bytes: &Bytes, chunk_size: usize) -> Vec<Bytes> {
    (0..bytes.len())
        .step_by(chunk_size.max(1))
        .map(|start| bytes.slice(start..(start + chunk_size).min(bytes.len())))
        .collect()
}

#[async_trait]
impl TransferEngine for HttpTransferEngine {
    async fn transfer(
        &self,
        source: &SourceHandle,
        credential: &WriteCredential,
        progress: ProgressFn,
    ) -> Result<()> {
        let total = source.len() as u64;
        let tracker = Arc::new(ProgressTracker::new(total, progress));

        let chunks: Vec<std::io::Result<Bytes>> = chunk_source(source.bytes(), self.chunk_size)
            .into_iter()
            .map(Ok)
            .collect();
        let body_stream = ProgressStream::new(stream::iter(chunks), tracker.clone());

        let response = self
            .client
            .put(&credential.presigned_url)
            .header(CONTENT_TYPE, HeaderValue::from_str(source.content_type())?)
            .body(Body::wrap_stream(body_stream))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::status(
                status.as_u16(),
                format!("upload failed with status {}", status),
            ));
        }

        // The stream has fully drained by now, but an empty source never
        // ticks, so close out the terminal percent explicitly.
        tracker.finish();

        Ok(())
    }
}
