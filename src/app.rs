use std::sync::Arc;

use anyhow::Context;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::{
    BackendHttpClient, MockBackend, ProcessingStatus, ServiceStatus, SharedMutationApi,
};
use crate::config::CoordinatorConfig;
use crate::coordinator::{DeletionCoordinator, ProcessingCoordinator, UploadCoordinator};
use crate::feed::{FeedSettings, SharedStatusSource, StatusFeedClient, StatusReconciler};
use crate::notifications::{NotificationStore, SharedNotificationStore};
use crate::presentation::spawn_auto_hide;

pub const PROCESSING_FEED: &str = "processing-status";
pub const SERVICE_FEED: &str = "service-status";

/// Wires one store to the coordinators and, on demand, the status feeds.
pub struct App {
    config: CoordinatorConfig,
    store: SharedNotificationStore,
    http: Option<BackendHttpClient>,
    pub uploads: UploadCoordinator,
    pub deletions: DeletionCoordinator,
    pub processing: ProcessingCoordinator,
}

impl App {
    pub fn connect(config: CoordinatorConfig) -> anyhow::Result<Self> {
        let http = BackendHttpClient::new(config.clone())?;
        info!(base_url = %config.base_url, "using backend");
        let api: SharedMutationApi = Arc::new(http.clone());
        Ok(Self::with_api(config, api, Some(http)))
    }

    /// Mutations land on an in-memory backend; status feeds are unavailable.
    pub fn dry_run(config: CoordinatorConfig) -> Self {
        info!("dry run: mutations go to an in-memory backend");
        Self::with_api(config, Arc::new(MockBackend::new()), None)
    }

    pub fn with_api(
        config: CoordinatorConfig,
        api: SharedMutationApi,
        http: Option<BackendHttpClient>,
    ) -> Self {
        let store = NotificationStore::shared();
        Self {
            uploads: UploadCoordinator::new(api.clone(), store.clone()),
            deletions: DeletionCoordinator::new(api.clone(), store.clone()),
            processing: ProcessingCoordinator::new(api, store.clone()),
            config,
            store,
            http,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn store(&self) -> &SharedNotificationStore {
        &self.store
    }

    pub fn feed_settings(&self) -> FeedSettings {
        FeedSettings {
            reconnect_delay: self.config.reconnect_delay(),
            ..FeedSettings::default()
        }
    }

    pub fn start_feeds(&self) -> anyhow::Result<RunningFeeds> {
        let http = self
            .http
            .as_ref()
            .context("Status feeds need a live backend; drop --dry-run")?;

        let processing = http.status_source(PROCESSING_FEED, &self.config.processing_status);
        let service = http.status_source(SERVICE_FEED, &self.config.service_status);
        Ok(self.start_feeds_from(Arc::new(processing), Arc::new(service)))
    }

    pub fn start_feeds_from(
        &self,
        processing: SharedStatusSource,
        service: SharedStatusSource,
    ) -> RunningFeeds {
        let cancel = CancellationToken::new();
        let processing: StatusFeedClient<ProcessingStatus> =
            StatusFeedClient::spawn(processing, self.feed_settings());
        let service: StatusFeedClient<ServiceStatus> =
            StatusFeedClient::spawn(service, self.feed_settings());

        let reconciler = StatusReconciler::new(self.store.clone()).spawn(
            processing.subscribe(),
            service.subscribe(),
            cancel.clone(),
        );
        let auto_hide = spawn_auto_hide(self.store.clone(), cancel.clone());

        RunningFeeds {
            processing,
            service,
            tasks: vec![reconciler, auto_hide],
            cancel,
        }
    }
}

/// Feeds plus the tasks that fold their snapshots into the store.
pub struct RunningFeeds {
    pub processing: StatusFeedClient<ProcessingStatus>,
    pub service: StatusFeedClient<ServiceStatus>,
    tasks: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl RunningFeeds {
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.processing.shutdown().await;
        self.service.shutdown().await;
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!(?err, "background task ended abnormally");
            }
        }
        info!("status feeds stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::coordinator::UploadFile;
    use crate::feed::mock::MockStatusSource;
    use crate::feed::reconcile::{PROCESSING_QUEUE_ID, SERVICE_ALERT_ID};
    use crate::feed::state::FeedState;
    use crate::notifications::{OperationKind, OperationStatus};

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn feeds_drive_singleton_entries() {
        let app = App::dry_run(CoordinatorConfig::default());

        let processing = Arc::new(MockStatusSource::new(
            PROCESSING_FEED,
            r#"{"total_count":4,"processed_count":1}"#,
        ));
        let processing_frames = processing.push_connection();
        let service = Arc::new(MockStatusSource::new(
            SERVICE_FEED,
            r#"{"available":false,"message":"connection refused"}"#,
        ));
        let service_frames = service.push_connection();

        let feeds = app.start_feeds_from(processing.clone(), service.clone());
        settle().await;

        assert_eq!(feeds.processing.state(), FeedState::Connected);
        let queue = app.store().get(PROCESSING_QUEUE_ID).expect("queue entry");
        assert_eq!(queue.status, OperationStatus::InProgress);
        assert_eq!(queue.progress_percent, 25);
        assert!(app.store().get(SERVICE_ALERT_ID).is_some());

        service_frames
            .send(Ok(r#"{"available":true}"#.to_string()))
            .expect("service stream open");
        processing_frames
            .send(Ok(r#"{"total_count":4,"processed_count":4}"#.to_string()))
            .expect("processing stream open");
        settle().await;

        assert!(app.store().get(SERVICE_ALERT_ID).is_none());
        let queue = app.store().get(PROCESSING_QUEUE_ID).expect("queue entry");
        assert_eq!(queue.status, OperationStatus::Completed);

        // finished processing is auto-hidden like any other completed work
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert!(app.store().snapshot().is_empty());

        feeds.shutdown().await;
        assert_eq!(processing.open_sockets(), 0);
        assert_eq!(service.open_sockets(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_hide_keeps_an_alert_the_service_still_reports() {
        let app = App::dry_run(CoordinatorConfig::default());

        let processing = Arc::new(MockStatusSource::new(
            PROCESSING_FEED,
            r#"{"total_count":0,"processed_count":0}"#,
        ));
        let _processing_frames = processing.push_connection();
        let service = Arc::new(MockStatusSource::new(SERVICE_FEED, r#"{"available":false}"#));
        let _service_frames = service.push_connection();

        let feeds = app.start_feeds_from(processing, service);
        settle().await;
        assert!(app.store().get(SERVICE_ALERT_ID).is_some());

        let summary = app
            .uploads
            .upload_many(vec![UploadFile::in_memory("a.txt", "alpha")], "docs", 3)
            .await;
        assert_eq!(summary.succeeded, 1);

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        settle().await;

        let snapshot = app.store().snapshot();
        let kinds: Vec<OperationKind> = snapshot.operations.iter().map(|op| op.kind).collect();
        assert_eq!(kinds, vec![OperationKind::ExternalServiceAlert]);
        assert_eq!(
            feeds.service.snapshot().status().map(|status| status.available),
            Some(false)
        );

        feeds.shutdown().await;
    }

    #[test]
    fn dry_run_has_no_status_feeds() {
        let app = App::dry_run(CoordinatorConfig::default());
        let err = app.start_feeds().err().expect("no live backend");
        assert!(err.to_string().contains("--dry-run"));
    }

    #[test]
    fn feed_settings_follow_config() {
        let config = CoordinatorConfig {
            reconnect_delay_ms: 500,
            ..CoordinatorConfig::default()
        };
        let app = App::dry_run(config);
        assert_eq!(app.feed_settings().reconnect_delay, Duration::from_millis(500));
    }
}
