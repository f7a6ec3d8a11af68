use tracing::{info, instrument, warn};

use crate::backend::{ProcessingItem, ProcessingRequest, SharedMutationApi};
use crate::feed::reconcile::PROCESSING_QUEUE_ID;
use crate::notifications::types::generate_id;
use crate::notifications::{
    OperationDetail, OperationKind, OperationStatus, SharedNotificationStore, TrackedOperation,
};

/// Queues files for processing; the processing feed takes over the entry afterwards.
pub struct ProcessingCoordinator {
    api: SharedMutationApi,
    store: SharedNotificationStore,
}

impl ProcessingCoordinator {
    pub fn new(api: SharedMutationApi, store: SharedNotificationStore) -> Self {
        Self { api, store }
    }

    #[instrument(skip_all, fields(items = items.len()))]
    pub async fn queue(&self, items: Vec<ProcessingItem>) -> anyhow::Result<()> {
        anyhow::ensure!(!items.is_empty(), "Nothing to queue for processing");
        let count = items.len();

        match self.api.queue_processing(ProcessingRequest { items }).await {
            Ok(()) => {
                info!(count, "queued for processing");
                let already_running = self
                    .store
                    .get(PROCESSING_QUEUE_ID)
                    .is_some_and(|op| op.status.is_active());
                if !already_running {
                    self.store.add_operations([TrackedOperation::new(
                        PROCESSING_QUEUE_ID,
                        OperationKind::Processing,
                        format!("Queued {count} files for processing"),
                        "",
                    )]);
                }
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "queueing for processing failed");
                let failed = TrackedOperation::new(
                    generate_id(),
                    OperationKind::Processing,
                    format!("Could not queue {count} files"),
                    "",
                )
                .with_status(OperationStatus::Error)
                .with_detail(OperationDetail::Message(err.to_string()));
                self.store.add_operations([failed]);
                Err(anyhow::Error::new(err).context("Processing request rejected"))
            }
        }
    }
}
