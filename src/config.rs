use std::env;
use std::time::Duration;

use anyhow::Context;

use crate::coordinator::UploadCoordinator;

#[derive(Debug, Clone)]
pub struct StatusEndpoint {
    pub http_path: String,
    pub ws_path: String,
}

impl StatusEndpoint {
    /// Streaming endpoints live under the polling path with a `/ws` suffix.
    pub fn from_http_path(path: &str) -> Self {
        let http_path = path.trim_matches('/').to_string();
        Self {
            ws_path: format!("{http_path}/ws"),
            http_path,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub base_url: String,
    pub access_token: Option<String>,
    pub http_timeout_ms: u64,
    pub reconnect_delay_ms: u64,
    pub upload_batch_size: usize,
    pub processing_status: StatusEndpoint,
    pub service_status: StatusEndpoint,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            access_token: None,
            http_timeout_ms: 30_000,
            reconnect_delay_ms: 2_000,
            upload_batch_size: UploadCoordinator::DEFAULT_BATCH_SIZE,
            processing_status: StatusEndpoint::from_http_path("api/processing/status"),
            service_status: StatusEndpoint::from_http_path("api/ollama-status"),
        }
    }
}

impl CoordinatorConfig {
    const DEFAULT_BASE_URL: &'static str = "http://127.0.0.1:8000";

    const BASE_URL_VARS: [&'static str; 2] = ["NOTIFY_BACKEND_URL", "BACKEND_BASE_URL"];
    const ACCESS_TOKEN_VARS: [&'static str; 2] = ["NOTIFY_ACCESS_TOKEN", "BACKEND_ACCESS_TOKEN"];
    const TIMEOUT_VARS: [&'static str; 1] = ["NOTIFY_HTTP_TIMEOUT_MS"];
    const RECONNECT_VARS: [&'static str; 1] = ["NOTIFY_RECONNECT_DELAY_MS"];
    const BATCH_SIZE_VARS: [&'static str; 1] = ["NOTIFY_UPLOAD_BATCH_SIZE"];

    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let read = |candidates: &[&'static str]| candidates.iter().find_map(|key| lookup(key));
        let defaults = Self::default();

        let base_url = read(&Self::BASE_URL_VARS).unwrap_or(defaults.base_url);
        url::Url::parse(&base_url)
            .with_context(|| format!("Backend base url '{base_url}' is not a valid url"))?;

        let upload_batch_size = read(&Self::BATCH_SIZE_VARS)
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|size| *size > 0)
            .unwrap_or(defaults.upload_batch_size);

        Ok(Self {
            base_url,
            access_token: read(&Self::ACCESS_TOKEN_VARS).filter(|token| !token.is_empty()),
            http_timeout_ms: read(&Self::TIMEOUT_VARS)
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(defaults.http_timeout_ms),
            reconnect_delay_ms: read(&Self::RECONNECT_VARS)
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(defaults.reconnect_delay_ms),
            upload_batch_size,
            ..defaults
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms.max(1))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}
