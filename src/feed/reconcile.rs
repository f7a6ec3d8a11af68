use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::{ProcessingStatus, ServiceStatus};
use crate::notifications::{
    OperationDetail, OperationKind, OperationPatch, OperationStatus, SharedNotificationStore,
    TrackedOperation,
};

use super::client::FeedSnapshot;

pub const PROCESSING_QUEUE_ID: &str = "processing-queue";
pub const SERVICE_ALERT_ID: &str = "external-service-alert";

/// Mirrors status feed snapshots onto the singleton store entries they own.
#[derive(Clone)]
pub struct StatusReconciler {
    store: SharedNotificationStore,
}

impl StatusReconciler {
    pub fn new(store: SharedNotificationStore) -> Self {
        Self { store }
    }

    pub fn apply_processing(&self, snapshot: &FeedSnapshot<ProcessingStatus>) {
        // Stale data never drives state changes.
        let FeedSnapshot::Fresh { status, .. } = snapshot else {
            return;
        };

        let detail = OperationDetail::Processing {
            total_count: status.total_count,
            processed_count: status.processed_count,
        };
        let existing = self.store.get(PROCESSING_QUEUE_ID);

        if status.is_active() {
            let progress = status.progress_percent();
            match existing {
                Some(op) if op.status.is_active() => {
                    self.store.update_operation(
                        PROCESSING_QUEUE_ID,
                        OperationPatch::in_progress(progress)
                            .with_detail(detail)
                            .with_display_name(queue_title(status)),
                    );
                }
                _ => {
                    info!(
                        total = status.total_count,
                        processed = status.processed_count,
                        "processing queue became active"
                    );
                    self.store.add_operations([processing_operation(status)
                        .with_status(OperationStatus::InProgress)
                        .with_progress(progress)
                        .with_detail(detail)]);
                }
            }
            return;
        }

        if let Some(op) = existing {
            if op.status.is_active() {
                debug!("processing queue drained");
                self.store.update_operation(
                    PROCESSING_QUEUE_ID,
                    OperationPatch::completed().with_detail(detail),
                );
            }
        }
    }

    pub fn apply_service(&self, snapshot: &FeedSnapshot<ServiceStatus>) {
        let FeedSnapshot::Fresh { status, .. } = snapshot else {
            return;
        };

        if status.available {
            if self.store.remove_operation(SERVICE_ALERT_ID) {
                info!("external model service reachable again");
            }
            return;
        }

        let message = status
            .message
            .clone()
            .unwrap_or_else(|| "The model provider is not reachable.".to_string());
        let alert = TrackedOperation::alert(SERVICE_ALERT_ID, "Model service unavailable", message);
        if self.store.get(SERVICE_ALERT_ID).as_ref() != Some(&alert) {
            info!("external model service unavailable");
            self.store.add_operations([alert]);
        }
    }

    /// Applies every new snapshot from both feeds until `cancel` fires or both feeds go away.
    /// Store changes re-apply the latest service snapshot, so an alert the backend still
    /// reports survives a `reset_all` made elsewhere.
    pub fn spawn(
        self,
        mut processing: watch::Receiver<FeedSnapshot<ProcessingStatus>>,
        mut service: watch::Receiver<FeedSnapshot<ServiceStatus>>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let mut store_updates = self.store.subscribe();

        tokio::spawn(async move {
            self.apply_processing(&processing.borrow_and_update().clone());
            self.apply_service(&service.borrow_and_update().clone());

            let mut processing_open = true;
            let mut service_open = true;
            while processing_open || service_open {
                tokio::select! {
                    changed = processing.changed(), if processing_open => match changed {
                        Ok(()) => {
                            let snapshot = processing.borrow_and_update().clone();
                            self.apply_processing(&snapshot);
                        }
                        Err(_) => processing_open = false,
                    },
                    changed = service.changed(), if service_open => match changed {
                        Ok(()) => {
                            let snapshot = service.borrow_and_update().clone();
                            self.apply_service(&snapshot);
                        }
                        Err(_) => service_open = false,
                    },
                    changed = store_updates.changed(), if service_open => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = service.borrow().clone();
                        self.apply_service(&snapshot);
                    }
                    _ = cancel.cancelled() => break,
                }
            }
            debug!("status reconciler stopped");
        })
    }
}

fn processing_operation(status: &ProcessingStatus) -> TrackedOperation {
    TrackedOperation::new(
        PROCESSING_QUEUE_ID,
        OperationKind::Processing,
        queue_title(status),
        "",
    )
}

fn queue_title(status: &ProcessingStatus) -> String {
    format!(
        "Processing {} of {} files",
        status.processed_count.min(status.total_count),
        status.total_count
    )
}
