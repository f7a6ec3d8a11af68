use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::client::MutationApi;
use super::error::BackendError;
use super::types::{DeleteConflict, DeleteTarget, ProcessingRequest, UploadFileRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    UploadStarted(String),
    UploadFinished(String),
    Deleted(String),
    Queued(Vec<String>),
}

/// In-memory backend used for `--dry-run` and tests; records every call it sees.
#[derive(Default)]
pub struct MockBackend {
    events: Mutex<Vec<MockEvent>>,
    uploads: Mutex<Vec<UploadFileRequest>>,
    failing_paths: Mutex<HashSet<String>>,
    delete_conflict: Mutex<Option<DeleteConflict>>,
    upload_delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    /// Each upload takes `delay` before it settles.
    pub fn with_upload_delay(delay: Duration) -> Self {
        Self {
            upload_delay: delay,
            ..Self::default()
        }
    }

    #[cfg(test)]
    pub fn fail_uploads_for(&self, original_path: impl Into<String>) {
        lock(&self.failing_paths).insert(original_path.into());
    }

    #[cfg(test)]
    pub fn conflict_on_delete(&self, conflict: DeleteConflict) {
        *lock(&self.delete_conflict) = Some(conflict);
    }

    #[cfg(test)]
    pub fn events(&self) -> Vec<MockEvent> {
        lock(&self.events).clone()
    }

    #[cfg(test)]
    pub fn uploads(&self) -> Vec<UploadFileRequest> {
        lock(&self.uploads).clone()
    }

    #[cfg(test)]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, event: MockEvent) {
        lock(&self.events).push(event);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Releases the in-flight slot even when the upload future is dropped mid-way.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MutationApi for MockBackend {
    async fn upload_file(&self, request: UploadFileRequest) -> Result<(), BackendError> {
        let path = request.original_path.clone();
        self.record(MockEvent::UploadStarted(path.clone()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _slot = InFlight(&self.in_flight);

        if !self.upload_delay.is_zero() {
            tokio::time::sleep(self.upload_delay).await;
        }

        self.record(MockEvent::UploadFinished(path.clone()));
        if lock(&self.failing_paths).contains(&path) {
            return Err(BackendError::Status {
                code: 500,
                body: format!("mock failure for {path}"),
            });
        }

        info!(%path, bytes = request.base64_content.len(), "mock upload stored");
        lock(&self.uploads).push(request);
        Ok(())
    }

    async fn delete(&self, target: &DeleteTarget) -> Result<(), BackendError> {
        if let Some(conflict) = lock(&self.delete_conflict).clone() {
            return Err(BackendError::Conflict(conflict));
        }
        self.record(MockEvent::Deleted(target.original_path.clone()));
        Ok(())
    }

    async fn queue_processing(&self, request: ProcessingRequest) -> Result<(), BackendError> {
        let paths = request
            .items
            .into_iter()
            .map(|item| item.original_path)
            .collect();
        self.record(MockEvent::Queued(paths));
        Ok(())
    }
}
