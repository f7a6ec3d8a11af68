use std::sync::Arc;

use async_trait::async_trait;

use super::error::BackendError;
use super::types::{DeleteTarget, ProcessingRequest, UploadFileRequest};

/// Mutation surface of the backend consumed by the coordinators.
#[async_trait]
pub trait MutationApi: Send + Sync {
    async fn upload_file(&self, request: UploadFileRequest) -> Result<(), BackendError>;
    async fn delete(&self, target: &DeleteTarget) -> Result<(), BackendError>;
    async fn queue_processing(&self, request: ProcessingRequest) -> Result<(), BackendError>;
}

pub type SharedMutationApi = Arc<dyn MutationApi>;
