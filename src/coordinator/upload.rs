use std::sync::Mutex;

use futures::future::join_all;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::backend::{BackendError, SharedMutationApi};
use crate::notifications::{
    OperationDetail, OperationPatch, SharedNotificationStore, TrackedOperation,
};

use super::encode::{join_target, UploadFile};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded,
    Failed(String),
    /// Surfaced to the store as an error, like any other failure.
    Cancelled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub operation_ids: Vec<String>,
}

impl UploadSummary {
    fn record(&mut self, outcome: &UploadOutcome) {
        match outcome {
            UploadOutcome::Uploaded => self.succeeded += 1,
            UploadOutcome::Failed(_) => self.failed += 1,
            UploadOutcome::Cancelled => self.cancelled += 1,
        }
    }
}

/// Coarse batch-level progress: `batches_done * batch_size / total`, capped at 100.
pub fn batch_progress(batches_done: usize, batch_size: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let percent = batches_done.saturating_mul(batch_size).saturating_mul(100) / total;
    percent.min(100) as u8
}

/// Moves files to the backend in concurrent batches, mirroring each one in the store.
pub struct UploadCoordinator {
    api: SharedMutationApi,
    store: SharedNotificationStore,
    cancel: Mutex<CancellationToken>,
    progress: watch::Sender<u8>,
}

impl UploadCoordinator {
    pub const DEFAULT_BATCH_SIZE: usize = 3;

    const READING_PROGRESS: u8 = 10;
    const SENDING_PROGRESS: u8 = 50;

    pub fn new(api: SharedMutationApi, store: SharedNotificationStore) -> Self {
        let (progress, _) = watch::channel(0);
        Self {
            api,
            store,
            cancel: Mutex::new(CancellationToken::new()),
            progress,
        }
    }

    /// Shared signal observed by every in-flight and queued upload.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn cancel(&self) {
        info!("upload cancellation requested");
        self.cancellation_token().cancel();
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<u8> {
        self.progress.subscribe()
    }

    /// A cancelled signal only applies to the session it interrupted.
    fn begin_session(&self) -> CancellationToken {
        let mut guard = self
            .cancel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.is_cancelled() {
            *guard = CancellationToken::new();
        }
        guard.clone()
    }

    #[instrument(skip_all, fields(file = %file.name, target = %target_path))]
    pub async fn upload_one(&self, file: UploadFile, target_path: &str) -> UploadOutcome {
        let token = self.begin_session();
        let original_path = join_target(target_path, &file.name);
        let op = TrackedOperation::upload(file.name.clone(), original_path.clone());
        let id = op.id.clone();
        self.store.add_operations([op]);

        self.run_upload(&id, &file, &original_path, &token).await
    }

    #[instrument(skip_all, fields(files = files.len(), target = %target_path, batch_size = batch_size))]
    pub async fn upload_many(
        &self,
        files: Vec<UploadFile>,
        target_path: &str,
        batch_size: usize,
    ) -> UploadSummary {
        let token = self.begin_session();
        let batch_size = batch_size.max(1);
        let total = files.len();

        let mut ops = Vec::with_capacity(total);
        let entries: Vec<(String, String, UploadFile)> = files
            .into_iter()
            .map(|file| {
                let original_path = join_target(target_path, &file.name);
                let op = TrackedOperation::upload(file.name.clone(), original_path.clone());
                let id = op.id.clone();
                ops.push(op);
                (id, original_path, file)
            })
            .collect();

        self.store.add_operations(ops);
        self.progress.send_replace(0);
        // let subscribers see every entry pending before the first batch starts
        tokio::task::yield_now().await;

        let mut summary = UploadSummary {
            operation_ids: entries.iter().map(|(id, _, _)| id.clone()).collect(),
            ..UploadSummary::default()
        };

        for (index, batch) in entries.chunks(batch_size).enumerate() {
            if token.is_cancelled() {
                for (id, _, _) in batch {
                    self.mark_cancelled(id);
                    summary.record(&UploadOutcome::Cancelled);
                }
                continue;
            }

            let outcomes = join_all(
                batch
                    .iter()
                    .map(|(id, path, file)| self.run_upload(id, file, path, &token)),
            )
            .await;
            outcomes.iter().for_each(|outcome| summary.record(outcome));

            let progress = batch_progress(index + 1, batch_size, total);
            self.progress.send_replace(progress);
            info!(batch = index + 1, progress, "upload batch settled");
        }

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "upload session finished"
        );
        summary
    }

    async fn run_upload(
        &self,
        id: &str,
        file: &UploadFile,
        original_path: &str,
        token: &CancellationToken,
    ) -> UploadOutcome {
        if token.is_cancelled() {
            self.mark_cancelled(id);
            return UploadOutcome::Cancelled;
        }

        self.store
            .update_operation(id, OperationPatch::in_progress(Self::READING_PROGRESS));
        let request = match file.build_request(original_path).await {
            Ok(request) => request,
            Err(err) => return self.mark_failed(id, format!("{err:#}")),
        };
        self.store
            .update_operation(id, OperationPatch::in_progress(Self::SENDING_PROGRESS));

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(BackendError::Cancelled),
            result = self.api.upload_file(request) => result,
        };

        match result {
            Ok(()) => {
                self.store.update_operation(id, OperationPatch::completed());
                UploadOutcome::Uploaded
            }
            Err(BackendError::Cancelled) => {
                self.mark_cancelled(id);
                UploadOutcome::Cancelled
            }
            Err(err) => self.mark_failed(id, err.to_string()),
        }
    }

    fn mark_failed(&self, id: &str, message: String) -> UploadOutcome {
        warn!(%id, error = %message, "upload failed");
        self.store.update_operation(
            id,
            OperationPatch::failed().with_detail(OperationDetail::Message(message.clone())),
        );
        UploadOutcome::Failed(message)
    }

    fn mark_cancelled(&self, id: &str) {
        self.store.update_operation(
            id,
            OperationPatch::failed()
                .with_detail(OperationDetail::Message("Upload cancelled".to_string())),
        );
    }
}
