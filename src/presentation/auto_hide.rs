use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::notifications::{OperationKind, SharedNotificationStore, StoreSnapshot};

use super::view::should_auto_hide;

pub const AUTO_HIDE_DELAY: Duration = Duration::from_secs(1);

/// True when some kind finished with successes and nothing anywhere is still running,
/// since `reset_all` clears every kind at once.
pub fn ready_to_hide(snapshot: &StoreSnapshot) -> bool {
    let any_active = snapshot.operations.iter().any(|op| op.status.is_active());
    !any_active
        && OperationKind::ALL
            .into_iter()
            .any(|kind| should_auto_hide(snapshot, kind))
}

/// Clears the store `AUTO_HIDE_DELAY` after it settles into a finished state.
pub fn spawn_auto_hide(store: SharedNotificationStore, cancel: CancellationToken) -> JoinHandle<()> {
    let mut updates = store.subscribe();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = cancel.cancelled() => break,
            }

            if !ready_to_hide(&updates.borrow_and_update()) {
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(AUTO_HIDE_DELAY) => {}
                _ = cancel.cancelled() => break,
            }

            // anything started during the grace period keeps the list visible
            if ready_to_hide(&store.snapshot()) {
                debug!("auto-hiding finished notifications");
                store.reset_all();
            }
        }
    })
}
