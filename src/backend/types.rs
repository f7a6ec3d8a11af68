use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/datasources/file-manager/upload-file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFileRequest {
    pub original_path: String,
    pub base64_content: String,
    pub name: String,
    pub file_created_at: Option<DateTime<Utc>>,
    pub file_modified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingItem {
    pub original_path: String,
    pub stacks_identifiers_to_queue: Vec<i64>,
}

/// Body of `POST /api/processing`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProcessingRequest {
    pub items: Vec<ProcessingItem>,
}

/// Structured detail returned with HTTP 409 when part of a delete touches files still being processed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeleteConflict {
    #[serde(default)]
    pub processing_files: Vec<String>,
    #[serde(default)]
    pub failed_files: Vec<String>,
    #[serde(default)]
    pub deleted_files: Vec<String>,
}

impl DeleteConflict {
    pub fn is_empty(&self) -> bool {
        self.processing_files.is_empty()
            && self.failed_files.is_empty()
            && self.deleted_files.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteTargetKind {
    File,
    Folder,
    ProcessedData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteTarget {
    pub kind: DeleteTargetKind,
    pub original_path: String,
}

impl DeleteTarget {
    pub fn file(path: impl Into<String>) -> Self {
        Self::new(DeleteTargetKind::File, path)
    }

    pub fn folder(path: impl Into<String>) -> Self {
        Self::new(DeleteTargetKind::Folder, path)
    }

    pub fn processed_data(path: impl Into<String>) -> Self {
        Self::new(DeleteTargetKind::ProcessedData, path)
    }

    pub fn new(kind: DeleteTargetKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            original_path: path.into(),
        }
    }

    pub fn endpoint(&self) -> &'static str {
        match self.kind {
            DeleteTargetKind::File => "api/datasources/file-manager/file",
            DeleteTargetKind::Folder => "api/datasources/file-manager/folder",
            DeleteTargetKind::ProcessedData => "api/processing/processed-data",
        }
    }

    /// Last path segment, used as the notification title.
    pub fn display_name(&self) -> String {
        let trimmed = self.original_path.trim_end_matches('/');
        let name = trimmed.rsplit('/').next().unwrap_or(trimmed);
        match self.kind {
            DeleteTargetKind::ProcessedData => format!("processed data of {name}"),
            _ => name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct DeleteRequestBody<'a> {
    pub original_path: &'a str,
}

/// Snapshot pushed by the processing-status feed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProcessingStatus {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub processed_count: u64,
    #[serde(default)]
    pub items: Vec<ProcessingStatusItem>,
}

impl ProcessingStatus {
    pub fn is_active(&self) -> bool {
        self.processed_count < self.total_count
            || self.items.iter().any(ProcessingStatusItem::is_pending)
    }

    pub fn progress_percent(&self) -> u8 {
        if self.total_count == 0 {
            return 0;
        }
        let ratio = self.processed_count.min(self.total_count) * 100 / self.total_count;
        ratio as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProcessingStatusItem {
    pub original_path: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub stack_identifier: Option<i64>,
}

impl ProcessingStatusItem {
    fn is_pending(&self) -> bool {
        matches!(
            self.status.as_deref(),
            Some("pending") | Some("queued") | Some("processing")
        )
    }
}

/// Snapshot pushed by the external model-provider availability feed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceStatus {
    #[serde(alias = "is_available", alias = "ok")]
    pub available: bool,
    #[serde(default)]
    pub message: Option<String>,
}
