use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::UploadError;

/// A local file staged for upload: an immutable byte sequence of known
/// length, with a name and a declared content type. The path is the source
/// of truth when the file is split into parts.
#[derive(Debug, Clone)]
pub struct UploadSource {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub content_type: String,
}

impl UploadSource {
    /// Stats the file and guesses its content type from the file name,
    /// falling back to `application/octet-stream`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, UploadError> {
        let path = path.as_ref().to_path_buf();
        let size = std::fs::metadata(&path)?.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let content_type = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(Self {
            path,
            name,
            size,
            content_type,
        })
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

/// One entry of the completion manifest. Serialized field names follow the
/// store's CompleteMultipartUpload wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    #[serde(rename = "ETag")]
    pub etag: String,
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
}

/// What a caller declares about a file when asking for a presigned upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresignRequest {
    pub filename: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub size: Option<u64>,
}

/// A presigned POST target: the form fields are opaque, signer-issued
/// key/value pairs that must reach the store verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresignedPost {
    pub url: String,
    pub fields: HashMap<String, String>,
}

#[derive(Clone, Debug, Default)]
pub struct UploadProgress {
    pub bytes_uploaded: u64,
    pub total_bytes: u64,
}

#[derive(Debug)]
pub enum UploadEvent {
    Progress(UploadProgress),
    Completed(Vec<CompletedPart>),
}

/// Store connection settings plus the upload policy enforced by the signer.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadPolicy {
    pub bucket: String,
    pub region: String,
    pub endpoint: String,
    pub credentials: StoreCredentials,
    pub max_file_size: Option<u64>,
    pub allowed_types: Option<Vec<String>>,
    pub expires_in_seconds: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreCredentials {
    pub access_key: String,
    pub secret_key: String,
}
