pub mod store;
pub mod types;

pub use store::{NotificationStore, SharedNotificationStore, StoreSnapshot};
pub use types::{
    OperationDetail, OperationKind, OperationPatch, OperationStatus, TrackedOperation,
};
