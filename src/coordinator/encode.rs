use std::path::PathBuf;
use std::time::SystemTime;

use anyhow::{anyhow, Context};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};

use crate::backend::UploadFileRequest;

#[derive(Debug, Clone)]
enum FileSource {
    Disk(PathBuf),
    #[cfg(test)]
    Memory {
        bytes: Vec<u8>,
        created_at: Option<DateTime<Utc>>,
        modified_at: Option<DateTime<Utc>>,
    },
}

/// A file selected for upload; content is only read when its batch starts.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    source: FileSource,
}

impl UploadFile {
    pub fn from_path(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("'{}' has no usable file name", path.display()))?;

        Ok(Self {
            name,
            source: FileSource::Disk(path),
        })
    }

    #[cfg(test)]
    pub fn in_memory(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            source: FileSource::Memory {
                bytes: bytes.into(),
                created_at: None,
                modified_at: None,
            },
        }
    }

    #[cfg(test)]
    pub fn with_timestamps(
        mut self,
        created_at: Option<DateTime<Utc>>,
        modified_at: Option<DateTime<Utc>>,
    ) -> Self {
        if let FileSource::Memory {
            created_at: created,
            modified_at: modified,
            ..
        } = &mut self.source
        {
            *created = created_at;
            *modified = modified_at;
        }
        self
    }

    /// Read, encode and wrap the file into the upload body for `original_path`.
    pub async fn build_request(&self, original_path: &str) -> anyhow::Result<UploadFileRequest> {
        let (bytes, created_at, modified_at) = match &self.source {
            FileSource::Disk(path) => {
                let bytes = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("Failed to read '{}'", path.display()))?;
                let metadata = tokio::fs::metadata(path)
                    .await
                    .with_context(|| format!("Failed to stat '{}'", path.display()))?;
                (
                    bytes,
                    metadata.created().ok().map(to_utc),
                    metadata.modified().ok().map(to_utc),
                )
            }
            #[cfg(test)]
            FileSource::Memory {
                bytes,
                created_at,
                modified_at,
            } => (bytes.clone(), *created_at, *modified_at),
        };

        Ok(UploadFileRequest {
            original_path: original_path.to_string(),
            base64_content: encode_data_url(&self.name, &bytes),
            name: self.name.clone(),
            file_created_at: created_at,
            file_modified_at: modified_at,
        })
    }
}

fn to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

/// `data:<mime>;base64,<payload>`, with the MIME type guessed from the file name.
pub fn encode_data_url(name: &str, bytes: &[u8]) -> String {
    let mime = mime_guess::from_path(name).first_or_octet_stream();
    format!("data:{};base64,{}", mime.essence_str(), STANDARD.encode(bytes))
}

/// Destination path for `name` under `target`; an empty target means the root.
pub fn join_target(target: &str, name: &str) -> String {
    let target = target.trim_matches('/');
    if target.is_empty() {
        name.to_string()
    } else {
        format!("{target}/{name}")
    }
}
