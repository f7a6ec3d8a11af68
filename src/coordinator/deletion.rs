use tracing::{info, instrument, warn};

use crate::backend::{BackendError, DeleteConflict, DeleteTarget, SharedMutationApi};
use crate::notifications::{
    OperationDetail, OperationPatch, SharedNotificationStore, TrackedOperation,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// HTTP 409: some files are still being processed.
    Conflict(DeleteConflict),
    Failed(String),
}

pub struct DeletionCoordinator {
    api: SharedMutationApi,
    store: SharedNotificationStore,
}

impl DeletionCoordinator {
    pub fn new(api: SharedMutationApi, store: SharedNotificationStore) -> Self {
        Self { api, store }
    }

    #[instrument(skip_all, fields(path = %target.original_path, kind = ?target.kind))]
    pub async fn delete(&self, target: DeleteTarget) -> DeleteOutcome {
        let op = TrackedOperation::deletion(target.display_name(), target.original_path.clone());
        let id = op.id.clone();
        self.store.add_operations([op]);
        self.store.update_operation(&id, OperationPatch::in_progress(50));

        match self.api.delete(&target).await {
            Ok(()) => {
                info!("delete completed");
                self.store.update_operation(&id, OperationPatch::completed());
                DeleteOutcome::Deleted
            }
            Err(BackendError::Conflict(conflict)) => {
                warn!(
                    processing = conflict.processing_files.len(),
                    failed = conflict.failed_files.len(),
                    deleted = conflict.deleted_files.len(),
                    "delete blocked by files still processing"
                );
                self.store.update_operation(
                    &id,
                    OperationPatch::failed()
                        .with_detail(OperationDetail::DeleteConflict(conflict.clone())),
                );
                DeleteOutcome::Conflict(conflict)
            }
            Err(err) => {
                let message = err.to_string();
                warn!(error = %message, "delete failed");
                self.store.update_operation(
                    &id,
                    OperationPatch::failed().with_detail(OperationDetail::Message(message.clone())),
                );
                DeleteOutcome::Failed(message)
            }
        }
    }
}
