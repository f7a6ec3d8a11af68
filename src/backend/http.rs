use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, instrument, warn};
use url::Url;

use super::client::MutationApi;
use super::error::BackendError;
use super::types::{
    DeleteConflict, DeleteRequestBody, DeleteTarget, ProcessingRequest, UploadFileRequest,
};
use crate::config::{CoordinatorConfig, StatusEndpoint};
use crate::feed::{FrameStream, StatusSource};

const UPLOAD_PATH: &str = "api/datasources/file-manager/upload-file";
const PROCESSING_PATH: &str = "api/processing";

/// Thin HTTP client for the backend's mutation and status endpoints.
#[derive(Clone)]
pub struct BackendHttpClient {
    http: reqwest::Client,
    config: Arc<CoordinatorConfig>,
}

impl BackendHttpClient {
    pub fn new(config: CoordinatorConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()
            .context("Failed to build backend HTTP client")?;

        Ok(Self {
            http,
            config: Arc::new(config),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.config.access_token {
            builder.bearer_auth(token)
        } else {
            builder
        }
    }

    /// Streaming endpoints take the access token as a query parameter instead of a header.
    pub fn websocket_url(&self, path: &str) -> anyhow::Result<Url> {
        let mut url = Url::parse(&self.endpoint(path))
            .with_context(|| format!("Invalid status stream url for '{path}'"))?;
        let scheme = match url.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => other,
        }
        .to_string();
        url.set_scheme(&scheme)
            .map_err(|_| anyhow!("Cannot open a websocket over scheme '{scheme}'"))?;

        if let Some(token) = &self.config.access_token {
            url.query_pairs_mut().append_pair("token", token);
        }
        Ok(url)
    }

    pub fn status_source(&self, name: &str, endpoint: &StatusEndpoint) -> HttpStatusSource {
        HttpStatusSource {
            name: name.to_string(),
            client: self.clone(),
            endpoint: endpoint.clone(),
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::CONFLICT {
            if let Some(conflict) = parse_conflict(&body) {
                return Err(BackendError::Conflict(conflict));
            }
        }

        Err(BackendError::Status {
            code: status.as_u16(),
            body,
        })
    }
}

#[derive(Deserialize)]
struct ConflictEnvelope {
    detail: DeleteConflict,
}

/// Accepts both `{ "detail": {...} }` and a bare detail object.
fn parse_conflict(body: &str) -> Option<DeleteConflict> {
    serde_json::from_str::<ConflictEnvelope>(body)
        .map(|envelope| envelope.detail)
        .or_else(|_| serde_json::from_str::<DeleteConflict>(body))
        .ok()
        .filter(|conflict| !conflict.is_empty())
}

#[async_trait]
impl MutationApi for BackendHttpClient {
    #[instrument(skip_all, fields(path = %request.original_path))]
    async fn upload_file(&self, request: UploadFileRequest) -> Result<(), BackendError> {
        let response = self
            .apply_auth(self.http.post(self.endpoint(UPLOAD_PATH)))
            .json(&request)
            .send()
            .await?;
        Self::check(response).await?;
        debug!("upload accepted");
        Ok(())
    }

    #[instrument(skip_all, fields(path = %target.original_path))]
    async fn delete(&self, target: &DeleteTarget) -> Result<(), BackendError> {
        let response = self
            .apply_auth(self.http.delete(self.endpoint(target.endpoint())))
            .json(&DeleteRequestBody {
                original_path: &target.original_path,
            })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(items = request.items.len()))]
    async fn queue_processing(&self, request: ProcessingRequest) -> Result<(), BackendError> {
        let response = self
            .apply_auth(self.http.post(self.endpoint(PROCESSING_PATH)))
            .json(&request)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

/// Baseline polling + websocket push for one status endpoint.
pub struct HttpStatusSource {
    name: String,
    client: BackendHttpClient,
    endpoint: StatusEndpoint,
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_baseline(&self) -> anyhow::Result<String> {
        let url = self.client.endpoint(&self.endpoint.http_path);
        let response = self
            .client
            .apply_auth(self.client.http.get(&url))
            .send()
            .await
            .with_context(|| format!("{} status request failed", self.name))?
            .error_for_status()
            .with_context(|| format!("{} status request returned error status", self.name))?;

        response
            .text()
            .await
            .with_context(|| format!("Failed to read {} status response", self.name))
    }

    async fn open_stream(&self) -> anyhow::Result<FrameStream> {
        let url = self.client.websocket_url(&self.endpoint.ws_path)?;
        let (socket, _) = connect_async(url.as_str())
            .await
            .with_context(|| format!("{} status websocket handshake failed", self.name))?;

        let name = self.name.clone();
        let frames = socket.filter_map(move |message| {
            let frame = match message {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => Some(Ok(text)),
                    Err(_) => {
                        warn!(feed = %name, "dropping non-utf8 binary status frame");
                        None
                    }
                },
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => None,
                Ok(Message::Close(_)) => None,
                Err(err) => Some(Err(anyhow!(err).context("status websocket read failed"))),
            };
            async move { frame }
        });

        Ok(frames.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str, token: Option<&str>) -> BackendHttpClient {
        let config = CoordinatorConfig {
            base_url: base_url.to_string(),
            access_token: token.map(str::to_string),
            ..CoordinatorConfig::default()
        };
        BackendHttpClient::new(config).expect("build client")
    }

    #[test]
    fn websocket_url_swaps_scheme_and_carries_token() {
        let url = client("https://backend.example/", Some("abc"))
            .websocket_url("api/processing/status/ws")
            .expect("ws url");
        assert_eq!(
            url.as_str(),
            "wss://backend.example/api/processing/status/ws?token=abc"
        );

        let plain = client("http://127.0.0.1:8000", None)
            .websocket_url("/api/ollama-status/ws")
            .expect("ws url");
        assert_eq!(plain.as_str(), "ws://127.0.0.1:8000/api/ollama-status/ws");
    }

    #[test]
    fn conflict_bodies_parse_with_or_without_envelope() {
        let wrapped = parse_conflict(
            r#"{"detail":{"processing_files":["x.pdf"],"failed_files":[],"deleted_files":["y.pdf"]}}"#,
        )
        .expect("wrapped conflict");
        assert_eq!(wrapped.processing_files, vec!["x.pdf".to_string()]);
        assert_eq!(wrapped.deleted_files, vec!["y.pdf".to_string()]);

        let bare = parse_conflict(r#"{"failed_files":["z.pdf"]}"#).expect("bare conflict");
        assert_eq!(bare.failed_files, vec!["z.pdf".to_string()]);

        assert!(parse_conflict(r#"{"detail":"File is locked"}"#).is_none());
        assert!(parse_conflict("").is_none());
    }
}
