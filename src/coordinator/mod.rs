pub mod deletion;
pub mod encode;
pub mod processing;
pub mod upload;

pub use deletion::{DeleteOutcome, DeletionCoordinator};
pub use encode::UploadFile;
pub use processing::ProcessingCoordinator;
pub use upload::{UploadCoordinator, UploadOutcome};
