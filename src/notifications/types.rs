use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::DeleteConflict;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    Upload,
    Deletion,
    Processing,
    ExternalServiceAlert,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] = [
        OperationKind::Upload,
        OperationKind::Deletion,
        OperationKind::Processing,
        OperationKind::ExternalServiceAlert,
    ];
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OperationKind::Upload => "upload",
            OperationKind::Deletion => "deletion",
            OperationKind::Processing => "processing",
            OperationKind::ExternalServiceAlert => "external-service-alert",
        };

        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationStatus {
    Pending,
    InProgress,
    Completed,
    Error,
}

impl OperationStatus {
    /// Pending and in-progress operations still count towards a group's active work.
    pub fn is_active(self) -> bool {
        matches!(self, OperationStatus::Pending | OperationStatus::InProgress)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OperationStatus::Pending => "pending",
            OperationStatus::InProgress => "in-progress",
            OperationStatus::Completed => "completed",
            OperationStatus::Error => "error",
        };

        write!(f, "{}", label)
    }
}

/// Kind-specific payload carried next to the common fields.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OperationDetail {
    #[default]
    None,
    Processing {
        total_count: u64,
        processed_count: u64,
    },
    DeleteConflict(DeleteConflict),
    Message(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedOperation {
    pub id: String,
    pub kind: OperationKind,
    pub display_name: String,
    pub target_path: String,
    pub status: OperationStatus,
    pub progress_percent: u8,
    #[serde(default)]
    pub detail: OperationDetail,
}

impl TrackedOperation {
    pub fn new(
        id: impl Into<String>,
        kind: OperationKind,
        display_name: impl Into<String>,
        target_path: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            display_name: display_name.into(),
            target_path: target_path.into(),
            status: OperationStatus::Pending,
            progress_percent: 0,
            detail: OperationDetail::None,
        }
    }

    pub fn upload(display_name: impl Into<String>, target_path: impl Into<String>) -> Self {
        Self::new(
            generate_id(),
            OperationKind::Upload,
            display_name,
            target_path,
        )
    }

    pub fn deletion(display_name: impl Into<String>, target_path: impl Into<String>) -> Self {
        Self::new(
            generate_id(),
            OperationKind::Deletion,
            display_name,
            target_path,
        )
    }

    /// Alerts carry a well-known id so re-adding replaces the previous alert.
    pub fn alert(
        id: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let mut op = Self::new(id, OperationKind::ExternalServiceAlert, title, "");
        op.status = OperationStatus::Error;
        op.detail = OperationDetail::Message(message.into());
        op.normalize();
        op
    }

    pub fn with_status(mut self, status: OperationStatus) -> Self {
        self.status = status;
        self.normalize();
        self
    }

    pub fn with_progress(mut self, progress_percent: u8) -> Self {
        self.progress_percent = progress_percent;
        self.normalize();
        self
    }

    pub fn with_detail(mut self, detail: OperationDetail) -> Self {
        self.detail = detail;
        self
    }

    /// Merge a patch into the operation, keeping the status/progress invariants intact.
    pub fn apply(&mut self, patch: OperationPatch) {
        let previous_status = self.status;
        let previous_progress = self.progress_percent;

        if let Some(display_name) = patch.display_name {
            self.display_name = display_name;
        }
        if let Some(detail) = patch.detail {
            self.detail = detail;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(progress) = patch.progress_percent {
            let progress = progress.min(100);
            let still_running = previous_status == OperationStatus::InProgress
                && self.status == OperationStatus::InProgress;
            self.progress_percent = if still_running {
                progress.max(previous_progress)
            } else {
                progress
            };
        }

        self.normalize();
    }

    pub(crate) fn normalize(&mut self) {
        self.progress_percent = match self.status {
            OperationStatus::Completed => 100,
            OperationStatus::Error => 0,
            _ => self.progress_percent.min(100),
        };
    }
}

/// Partial update applied through `NotificationStore::update_operation`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationPatch {
    pub display_name: Option<String>,
    pub status: Option<OperationStatus>,
    pub progress_percent: Option<u8>,
    pub detail: Option<OperationDetail>,
}

impl OperationPatch {
    pub fn status(status: OperationStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn in_progress(progress_percent: u8) -> Self {
        Self::status(OperationStatus::InProgress).with_progress(progress_percent)
    }

    pub fn completed() -> Self {
        Self::status(OperationStatus::Completed)
    }

    pub fn failed() -> Self {
        Self::status(OperationStatus::Error)
    }

    pub fn with_progress(mut self, progress_percent: u8) -> Self {
        self.progress_percent = Some(progress_percent);
        self
    }

    pub fn with_detail(mut self, detail: OperationDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }
}

pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_force_progress() {
        let mut op = TrackedOperation::upload("a.txt", "docs/a.txt").with_progress(40);
        op.apply(OperationPatch::completed().with_progress(12));
        assert_eq!(op.progress_percent, 100);

        op.apply(OperationPatch::failed());
        assert_eq!(op.progress_percent, 0);
    }

    #[test]
    fn progress_never_moves_backwards_while_in_progress() {
        let mut op = TrackedOperation::upload("a.txt", "docs/a.txt");
        op.apply(OperationPatch::in_progress(60));
        op.apply(OperationPatch::in_progress(30));
        assert_eq!(op.progress_percent, 60);

        op.apply(OperationPatch::in_progress(250));
        assert_eq!(op.progress_percent, 100);
    }

    #[test]
    fn alerts_are_errors_with_message() {
        let alert = TrackedOperation::alert("svc", "Ollama unreachable", "connection refused");
        assert_eq!(alert.kind, OperationKind::ExternalServiceAlert);
        assert_eq!(alert.status, OperationStatus::Error);
        assert_eq!(alert.progress_percent, 0);
        assert!(alert.target_path.is_empty());
        assert_eq!(
            alert.detail,
            OperationDetail::Message("connection refused".to_string())
        );
    }

    #[test]
    fn kinds_serialize_kebab_case() {
        let value = serde_json::to_value(OperationKind::ExternalServiceAlert).expect("serialize");
        assert_eq!(value, serde_json::json!("external-service-alert"));
        assert_eq!(OperationStatus::InProgress.to_string(), "in-progress");
    }
}
