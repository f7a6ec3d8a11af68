use std::fmt::Write as _;

use serde::Serialize;

use crate::backend::DeleteConflict;
use crate::notifications::{
    OperationDetail, OperationKind, OperationStatus, StoreSnapshot, TrackedOperation,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeIcon {
    Clock,
    Spinner,
    Check,
    Cross,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeColor {
    Grey,
    Blue,
    Green,
    Red,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusBadge {
    pub icon: BadgeIcon,
    pub color: BadgeColor,
}

pub fn status_badge(kind: OperationKind, status: OperationStatus) -> StatusBadge {
    let (icon, color) = match (kind, status) {
        (OperationKind::ExternalServiceAlert, OperationStatus::Error) => {
            (BadgeIcon::Warning, BadgeColor::Red)
        }
        (_, OperationStatus::Pending) => (BadgeIcon::Clock, BadgeColor::Grey),
        (_, OperationStatus::InProgress) => (BadgeIcon::Spinner, BadgeColor::Blue),
        (_, OperationStatus::Completed) => (BadgeIcon::Check, BadgeColor::Green),
        (_, OperationStatus::Error) => (BadgeIcon::Cross, BadgeColor::Red),
    };

    StatusBadge { icon, color }
}

/// Unweighted mean of member progress; an empty group reports 0.
pub fn group_progress<'a>(ops: impl IntoIterator<Item = &'a TrackedOperation>) -> u8 {
    let (sum, count) = ops
        .into_iter()
        .fold((0u32, 0u32), |(sum, count), op| {
            (sum + u32::from(op.progress_percent), count + 1)
        });

    if count == 0 {
        0
    } else {
        (sum / count) as u8
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindCounts {
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

pub fn kind_counts(snapshot: &StoreSnapshot, kind: OperationKind) -> KindCounts {
    snapshot
        .of_kind(kind)
        .fold(KindCounts::default(), |mut counts, op| {
            match op.status {
                OperationStatus::Pending | OperationStatus::InProgress => counts.active += 1,
                OperationStatus::Completed => counts.completed += 1,
                OperationStatus::Error => counts.failed += 1,
            }
            counts
        })
}

pub fn should_auto_hide(snapshot: &StoreSnapshot, kind: OperationKind) -> bool {
    let counts = kind_counts(snapshot, kind);
    counts.active == 0 && counts.completed > 0
}

/// Multi-line message for a delete blocked by files still being processed.
pub fn conflict_summary(conflict: &DeleteConflict) -> String {
    let mut message = String::from("Some items could not be deleted.");

    for (heading, files) in [
        ("Still processing", &conflict.processing_files),
        ("Failed", &conflict.failed_files),
        ("Deleted", &conflict.deleted_files),
    ] {
        if files.is_empty() {
            continue;
        }
        let _ = write!(message, "\n{heading}:");
        for file in files {
            let _ = write!(message, "\n  - {file}");
        }
    }

    message
}

pub fn operation_message(op: &TrackedOperation) -> Option<String> {
    match &op.detail {
        OperationDetail::None => None,
        OperationDetail::Processing {
            total_count,
            processed_count,
        } => Some(format!("{processed_count}/{total_count} processed")),
        OperationDetail::DeleteConflict(conflict) => Some(conflict_summary(conflict)),
        OperationDetail::Message(message) => Some(message.clone()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationView {
    pub id: String,
    pub title: String,
    pub subtitle: String,
    pub badge: StatusBadge,
    pub progress_percent: u8,
    pub message: Option<String>,
}

impl From<&TrackedOperation> for OperationView {
    fn from(op: &TrackedOperation) -> Self {
        Self {
            id: op.id.clone(),
            title: op.display_name.clone(),
            subtitle: op.target_path.clone(),
            badge: status_badge(op.kind, op.status),
            progress_percent: op.progress_percent,
            message: operation_message(op),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationGroup {
    pub kind: OperationKind,
    pub title: String,
    pub counts: KindCounts,
    pub progress_percent: u8,
    pub auto_hide: bool,
    pub operations: Vec<OperationView>,
}

/// One group per kind that currently has entries, in a stable kind order.
pub fn grouped_view(snapshot: &StoreSnapshot) -> Vec<OperationGroup> {
    OperationKind::ALL
        .into_iter()
        .filter_map(|kind| {
            let operations: Vec<OperationView> =
                snapshot.of_kind(kind).map(OperationView::from).collect();
            if operations.is_empty() {
                return None;
            }

            let counts = kind_counts(snapshot, kind);
            Some(OperationGroup {
                kind,
                title: group_title(kind, &counts),
                counts,
                progress_percent: group_progress(snapshot.of_kind(kind)),
                auto_hide: should_auto_hide(snapshot, kind),
                operations,
            })
        })
        .collect()
}

fn group_title(kind: OperationKind, counts: &KindCounts) -> String {
    let total = counts.active + counts.completed + counts.failed;
    let noun = if total == 1 { "item" } else { "items" };

    match kind {
        OperationKind::Upload if counts.active > 0 => format!("Uploading {total} {noun}"),
        OperationKind::Upload => format!("Uploaded {} of {total} {noun}", counts.completed),
        OperationKind::Deletion if counts.active > 0 => format!("Deleting {total} {noun}"),
        OperationKind::Deletion => format!("Deleted {} of {total} {noun}", counts.completed),
        OperationKind::Processing if counts.active > 0 => "Processing files".to_string(),
        OperationKind::Processing => "Processing finished".to_string(),
        OperationKind::ExternalServiceAlert => "Service alerts".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(id: &str, kind: OperationKind, status: OperationStatus, progress: u8) -> TrackedOperation {
        TrackedOperation::new(id, kind, id, format!("docs/{id}"))
            .with_status(status)
            .with_progress(progress)
    }

    fn snapshot(operations: Vec<TrackedOperation>) -> StoreSnapshot {
        StoreSnapshot {
            revision: 1,
            operations,
        }
    }

    #[test]
    fn badges_follow_status() {
        assert_eq!(
            status_badge(OperationKind::Upload, OperationStatus::Error).color,
            BadgeColor::Red
        );
        assert_eq!(
            status_badge(OperationKind::Upload, OperationStatus::Completed).color,
            BadgeColor::Green
        );
        assert_eq!(
            status_badge(OperationKind::Deletion, OperationStatus::InProgress).icon,
            BadgeIcon::Spinner
        );
        assert_eq!(
            status_badge(OperationKind::ExternalServiceAlert, OperationStatus::Error).icon,
            BadgeIcon::Warning
        );
    }

    #[test]
    fn group_progress_is_unweighted_mean() {
        let ops = [
            op("a", OperationKind::Upload, OperationStatus::InProgress, 50),
            op("b", OperationKind::Upload, OperationStatus::Completed, 0),
            op("c", OperationKind::Upload, OperationStatus::Pending, 0),
        ];
        assert_eq!(group_progress(ops.iter()), 50);
        assert_eq!(group_progress(std::iter::empty()), 0);
    }

    #[test]
    fn auto_hide_needs_completed_and_no_active() {
        let done = snapshot(vec![
            op("a", OperationKind::Upload, OperationStatus::Completed, 100),
            op("b", OperationKind::Upload, OperationStatus::Error, 0),
        ]);
        assert!(should_auto_hide(&done, OperationKind::Upload));
        assert!(!should_auto_hide(&done, OperationKind::Deletion));

        let running = snapshot(vec![
            op("a", OperationKind::Upload, OperationStatus::Completed, 100),
            op("b", OperationKind::Upload, OperationStatus::InProgress, 10),
        ]);
        assert!(!should_auto_hide(&running, OperationKind::Upload));

        let failed_only = snapshot(vec![op("a", OperationKind::Upload, OperationStatus::Error, 0)]);
        assert!(!should_auto_hide(&failed_only, OperationKind::Upload));
    }

    #[test]
    fn conflict_summary_lists_every_section() {
        let summary = conflict_summary(&DeleteConflict {
            processing_files: vec!["x.pdf".to_string()],
            failed_files: vec!["z.pdf".to_string()],
            deleted_files: vec!["y.pdf".to_string()],
        });
        assert_eq!(
            summary,
            "Some items could not be deleted.\nStill processing:\n  - x.pdf\nFailed:\n  - z.pdf\nDeleted:\n  - y.pdf"
        );
    }

    #[test]
    fn grouped_view_orders_kinds_and_skips_empty_groups() {
        let view = grouped_view(&snapshot(vec![
            TrackedOperation::alert("svc", "Model service unavailable", "refused"),
            op("a", OperationKind::Upload, OperationStatus::InProgress, 40),
            op("b", OperationKind::Upload, OperationStatus::Pending, 0),
        ]));

        let kinds: Vec<OperationKind> = view.iter().map(|group| group.kind).collect();
        assert_eq!(
            kinds,
            vec![OperationKind::Upload, OperationKind::ExternalServiceAlert]
        );
        assert_eq!(view[0].title, "Uploading 2 items");
        assert_eq!(view[0].progress_percent, 20);
        assert!(!view[0].auto_hide);
        assert_eq!(view[1].operations[0].message.as_deref(), Some("refused"));
    }
}
