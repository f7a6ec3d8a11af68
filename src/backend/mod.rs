pub mod client;
pub mod error;
pub mod http;
pub mod mock;
pub mod types;

pub use client::SharedMutationApi;
pub use error::BackendError;
pub use http::BackendHttpClient;
pub use mock::MockBackend;
pub use types::{
    DeleteConflict, DeleteTarget, ProcessingItem, ProcessingRequest, ProcessingStatus,
    ServiceStatus, UploadFileRequest,
};
