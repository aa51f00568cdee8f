use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::AcceptPolicy;
use crate::errors::{Result, UploadError};
use crate::gateway::{GatewayDecision, ObjectKey, StorageGateway, UploadRequest};
use crate::transfer::{ProgressFn, TransferEngine};

use super::preview::{PreviewHandle, PreviewRevoker};
use super::types::{
    FileCandidate,
    Rejection,
    SessionEvent,
    SourceHandle,
    TaskId,
    TaskSnapshot,
    UploadPhase,
    UploadTask,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Single-slot upload session: selection through credential request, byte
/// transfer, completion, and explicit removal.
///
/// One task is live at a time. Selecting while a transfer or delete is in
/// flight is refused; superseding an idle task releases its local preview
/// before the new one is allocated.
pub struct UploadSession {
    slot: Arc<RwLock<UploadTask>>,
    gateway: Arc<dyn StorageGateway>,
    engine: Arc<dyn TransferEngine>,
    policy: AcceptPolicy,
    preview_revoker: Option<PreviewRevoker>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl UploadSession {
    pub fn new(
        gateway: Arc<dyn StorageGateway>,
        engine: Arc<dyn TransferEngine>,
        policy: AcceptPolicy,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            slot: Arc::new(RwLock::new(UploadTask::empty())),
            gateway,
            engine,
            policy,
            preview_revoker: None,
            event_tx,
        }
    }

    /// Install a callback invoked when a local preview locator is released.
    pub fn with_preview_revoker(mut self, revoker: PreviewRevoker) -> Self {
        self.preview_revoker = Some(revoker);
        self
    }

    /// Start the slot over an already-stored object, as edit flows do: phase
    /// is Uploaded, the preview points at the hosted copy and is never
    /// revoked locally.
    pub fn with_existing_object(self, key: ObjectKey, preview_url: impl Into<String>) -> Self {
        {
            let mut slot = self.slot.write();
            slot.id = Some(TaskId::new());
            slot.phase = UploadPhase::Uploaded;
            slot.key = Some(key);
            slot.preview = Some(PreviewHandle::remote(preview_url));
        }
        self
    }

    /// Subscribe to session events. Slow receivers may observe lag on the
    /// broadcast channel; each subscriber gets its own copy.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Read-only view of the slot.
    pub fn snapshot(&self) -> TaskSnapshot {
        self.slot.read().snapshot()
    }

    /// Offer a batch of candidates. The whole batch is validated up front;
    /// accepted files are then uploaded in order, each superseding the
    /// previous one, so the slot ends on the last candidate.
    pub async fn select_files(&self, candidates: Vec<FileCandidate>) -> Result<()> {
        if let Err(reason) = self.policy.check(&candidates) {
            return Err(self.reject(reason));
        }

        for candidate in candidates {
            self.select_file(candidate).await?;
        }

        Ok(())
    }

    /// Validate and upload one file. On acceptance the current task (if any)
    /// is superseded, then the pipeline runs: credential request, transfer,
    /// Uploaded. Every failure path ends in Errored; recovery is re-selection.
    pub async fn select_file(&self, candidate: FileCandidate) -> Result<()> {
        if let Err(reason) = self.policy.check_one(&candidate) {
            return Err(self.reject(reason));
        }

        let request = {
            let mut slot = self.slot.write();

            if matches!(slot.phase, UploadPhase::Uploading | UploadPhase::Deleting) {
                drop(slot);
                return Err(self.reject(Rejection::TransferInFlight));
            }

            let old_phase = slot.phase;
            let task_id = TaskId::new();

            // Release the superseded task's local preview before anything
            // is allocated for the new one.
            slot.preview.take();

            *slot = UploadTask {
                id: Some(task_id),
                phase: UploadPhase::Uploading,
                file_name: Some(candidate.file_name.clone()),
                content_type: Some(candidate.content_type.clone()),
                size: candidate.size(),
                progress_percent: 0,
                key: None,
                source: Some(SourceHandle::new(
                    candidate.bytes.clone(),
                    candidate.content_type.clone(),
                )),
                preview: Some(self.make_local_preview(task_id, &candidate.file_name)),
                error: None,
                selected_at: Some(Utc::now()),
                uploaded_at: None,
            };

            self.emit_phase_change(old_phase, UploadPhase::Uploading);

            UploadRequest {
                filename: candidate.file_name.clone(),
                content_type: candidate.content_type.clone(),
                size: candidate.size(),
            }
        };

        let credential = match self.gateway.request_write_credential(&request).await {
            GatewayDecision::Granted(credential) => credential,
            GatewayDecision::Denied(reason) => {
                self.fail_task(reason.to_string(), Some(reason));
                return Err(UploadError::Denied(reason));
            }
            GatewayDecision::Failed(err) => {
                self.fail_task(err.to_string(), None);
                return Err(UploadError::Gateway(err));
            }
        };

        let source = SourceHandle::new(candidate.bytes, candidate.content_type);
        let progress = self.progress_sink();

        match self.engine.transfer(&source, &credential, progress).await {
            Ok(()) => {
                {
                    let mut slot = self.slot.write();
                    slot.phase = UploadPhase::Uploaded;
                    slot.progress_percent = 100;
                    slot.key = Some(credential.key.clone());
                    // Bytes are stored; the local copy is no longer needed.
                    slot.source = None;
                    slot.uploaded_at = Some(Utc::now());
                }

                debug!(key = %credential.key, "upload completed");
                self.emit_phase_change(UploadPhase::Uploading, UploadPhase::Uploaded);
                let _ = self.event_tx.send(SessionEvent::Uploaded {
                    key: credential.key,
                });

                Ok(())
            }
            Err(err) => {
                self.fail_task(err.to_string(), None);
                Err(UploadError::Transfer(err))
            }
        }
    }

    /// Delete the stored object and clear the slot. No-op while a delete is
    /// already in flight or when no key is held, so repeated calls make no
    /// extra network requests.
    pub async fn remove_current_file(&self) -> Result<()> {
        let key = {
            let mut slot = self.slot.write();

            if slot.phase == UploadPhase::Deleting {
                return Ok(());
            }
            let Some(key) = slot.key.clone() else {
                return Ok(());
            };

            let old_phase = slot.phase;
            slot.phase = UploadPhase::Deleting;
            self.emit_phase_change(old_phase, UploadPhase::Deleting);

            key
        };

        match self.gateway.delete_object(&key).await {
            GatewayDecision::Granted(()) => {
                {
                    // Dropping the old task releases its local preview.
                    let mut slot = self.slot.write();
                    *slot = UploadTask::empty();
                }

                debug!(%key, "object removed, slot reset");
                self.emit_phase_change(UploadPhase::Deleting, UploadPhase::Empty);
                let _ = self.event_tx.send(SessionEvent::Removed { key });

                Ok(())
            }
            GatewayDecision::Denied(reason) => {
                // The key is kept so removal can be retried.
                self.fail_task_keep_key(reason.to_string(), Some(reason));
                Err(UploadError::Denied(reason))
            }
            GatewayDecision::Failed(err) => {
                self.fail_task_keep_key(err.to_string(), None);
                Err(UploadError::Gateway(err))
            }
        }
    }

    fn make_local_preview(&self, task_id: TaskId, file_name: &str) -> PreviewHandle {
        let uri = format!("mem://{}/{}", task_id.0.simple(), file_name);
        PreviewHandle::local(uri, self.preview_revoker.clone())
    }

    fn progress_sink(&self) -> ProgressFn {
        let slot = self.slot.clone();
        let event_tx = self.event_tx.clone();

        Arc::new(move |percent| {
            let mut slot = slot.write();
            // Guard monotonicity regardless of the engine's behavior.
            if slot.phase == UploadPhase::Uploading && percent > slot.progress_percent {
                slot.progress_percent = percent.min(100);
                let _ = event_tx.send(SessionEvent::Progress {
                    percent: slot.progress_percent,
                });
            }
        })
    }

    fn reject(&self, reason: Rejection) -> UploadError {
        let _ = self.event_tx.send(SessionEvent::Rejected {
            reason: reason.clone(),
        });
        UploadError::Rejected(reason)
    }

    fn fail_task(&self, error: String, denial: Option<crate::gateway::DenialReason>) {
        {
            let mut slot = self.slot.write();
            let old_phase = slot.phase;
            slot.phase = UploadPhase::Errored;
            slot.progress_percent = 0;
            slot.key = None;
            slot.error = Some(error.clone());
            self.emit_phase_change(old_phase, UploadPhase::Errored);
        }
        let _ = self.event_tx.send(SessionEvent::Failed { error, denial });
    }

    fn fail_task_keep_key(&self, error: String, denial: Option<crate::gateway::DenialReason>) {
        {
            let mut slot = self.slot.write();
            let old_phase = slot.phase;
            slot.phase = UploadPhase::Errored;
            slot.error = Some(error.clone());
            self.emit_phase_change(old_phase, UploadPhase::Errored);
        }
        let _ = self.event_tx.send(SessionEvent::Failed { error, denial });
    }

    fn emit_phase_change(&self, old_phase: UploadPhase, new_phase: UploadPhase) {
        debug!(?old_phase, ?new_phase, "phase transition");
        let _ = self.event_tx.send(SessionEvent::PhaseChanged {
            old_phase,
            new_phase,
        });
    }
}
