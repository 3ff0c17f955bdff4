use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::post_policy::{PostPolicy, PostPolicyField, PostPolicyValue};
use s3::region::Region;
use s3::serde_types::Part;
use url::Url;

use crate::error::UploadError;
use crate::types::{CompletedPart, PresignRequest, PresignedPost, UploadPolicy};

/// Default expiry for single-shot presigned operations.
const DEFAULT_EXPIRY_SECS: u32 = 300;

/// Expiry for per-part URLs. Longer than the single-shot window because a
/// multipart session may span a long transfer.
const PART_EXPIRY_SECS: u32 = 3600;

/// The capability a multipart upload needs from its trusted signer.
///
/// The three operations are bound to one session: `create` mints it, and the
/// signer itself retains the association for the `sign_part` and `complete`
/// calls that follow, so the identifier never travels back through the
/// caller.
#[async_trait]
pub trait PartSigner: Send + Sync {
    /// Mints the upload session and returns its identifier. Callers are free
    /// to ignore the identifier.
    async fn create(&self) -> Result<String, UploadError>;

    /// Issues a time-limited URL authorizing the upload of one part.
    async fn sign_part(&self, part_number: u32) -> Result<Url, UploadError>;

    /// Commits the finished object from the ordered part manifest.
    async fn complete(&self, parts: &[CompletedPart]) -> Result<(), UploadError>;
}

/// Server-side signer: validates upload requests against policy and mints
/// presigned URLs scoped to a single bucket.
#[derive(Clone, Debug)]
pub struct S3Signer {
    bucket: Box<Bucket>,
    max_file_size: Option<u64>,
    allowed_types: Option<Vec<String>>,
    expires_in_seconds: u32,
}

impl S3Signer {
    pub fn new(policy: &UploadPolicy) -> Result<Self, UploadError> {
        let region = Region::Custom {
            region: policy.region.clone(),
            endpoint: policy.endpoint.clone(),
        };
        let credentials = Credentials::new(
            Some(&policy.credentials.access_key),
            Some(&policy.credentials.secret_key),
            None,
            None,
            None,
        )?;
        let bucket = Bucket::new(&policy.bucket, region, credentials)?.with_path_style();

        Ok(Self {
            bucket,
            max_file_size: policy.max_file_size,
            allowed_types: policy.allowed_types.clone(),
            expires_in_seconds: policy.expires_in_seconds.unwrap_or(DEFAULT_EXPIRY_SECS),
        })
    }

    pub fn with_expires_in(mut self, expires_in_seconds: u32) -> Self {
        self.expires_in_seconds = expires_in_seconds;
        self
    }

    /// Policy checks. Synchronous, and always ahead of any store call.
    fn validate(&self, size: Option<u64>, content_type: &str) -> Result<(), UploadError> {
        if let (Some(max_size), Some(size)) = (self.max_file_size, size) {
            if size > max_size {
                return Err(UploadError::FileTooLarge { size, max_size });
            }
        }

        if let Some(allowed) = &self.allowed_types {
            if !allowed.iter().any(|allowed_type| allowed_type == content_type) {
                return Err(UploadError::TypeNotAllowed(content_type.to_string()));
            }
        }

        Ok(())
    }

    /// Presigns a single-shot PUT of the declared file to its key.
    pub async fn presign_put(&self, request: &PresignRequest) -> Result<Url, UploadError> {
        self.validate(request.size, &request.content_type)?;

        // The content type is signed into the URL and must match at upload
        // time.
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_str(&request.content_type)
                .map_err(|_| UploadError::TypeNotAllowed(request.content_type.clone()))?,
        );

        let url = self
            .bucket
            .presign_put(&request.filename, self.expires_in_seconds, Some(headers), None)
            .await?;

        Ok(Url::parse(&url)?)
    }

    /// Presigns a POST form upload: URL plus the policy fields the form must
    /// carry verbatim.
    pub async fn presign_post(&self, request: &PresignRequest) -> Result<PresignedPost, UploadError> {
        self.validate(request.size, &request.content_type)?;

        let mut policy = PostPolicy::new(self.expires_in_seconds)
            .condition(
                PostPolicyField::Key,
                PostPolicyValue::Exact(Cow::from(request.filename.clone())),
            )?
            .condition(
                PostPolicyField::ContentType,
                PostPolicyValue::Exact(Cow::from(request.content_type.clone())),
            )?;

        if let Some(upper) = self.max_file_size.or(request.size) {
            let upper = upper.min(u64::from(u32::MAX)) as u32;
            policy = policy.condition(
                PostPolicyField::ContentLengthRange,
                PostPolicyValue::Range(0, upper),
            )?;
        }

        let presigned = self.bucket.presign_post(policy).await?;

        Ok(PresignedPost {
            url: presigned.url,
            fields: presigned.fields,
        })
    }

    /// Opens a multipart session for the key and returns its UploadId.
    pub async fn create_multipart(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, UploadError> {
        let response = self
            .bucket
            .initiate_multipart_upload(key, content_type)
            .await
            .map_err(|err| UploadError::SessionCreation(err.to_string()))?;

        Ok(response.upload_id)
    }

    /// Presigns the upload of one part, bound to `(key, upload_id,
    /// part_number)` through signed query parameters.
    pub async fn presign_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
    ) -> Result<Url, UploadError> {
        let mut queries = HashMap::new();
        queries.insert("partNumber".to_string(), part_number.to_string());
        queries.insert("uploadId".to_string(), upload_id.to_string());

        let url = self
            .bucket
            .presign_put(key, PART_EXPIRY_SECS, None, Some(queries))
            .await?;

        Ok(Url::parse(&url)?)
    }

    /// Commits the object from the ordered part manifest.
    pub async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), UploadError> {
        let parts: Vec<Part> = parts
            .iter()
            .map(|part| Part {
                etag: part.etag.clone(),
                part_number: part.part_number,
            })
            .collect();

        self.bucket
            .complete_multipart_upload(key, upload_id, parts)
            .await?;

        Ok(())
    }

    /// Binds a session-shaped signer to one destination key and content
    /// type. The declared size and type are validated here, before anything
    /// reaches the store.
    pub fn multipart_signer(
        &self,
        key: &str,
        content_type: &str,
        size: u64,
    ) -> Result<MultipartSigner, UploadError> {
        self.validate(Some(size), content_type)?;

        Ok(MultipartSigner {
            signer: self.clone(),
            key: key.to_string(),
            content_type: content_type.to_string(),
            upload_id: Mutex::new(None),
        })
    }
}

/// A [`PartSigner`] for one multipart session against the store. Retains the
/// UploadId minted by `create` so later calls need no session parameter.
#[derive(Debug)]
pub struct MultipartSigner {
    signer: S3Signer,
    key: String,
    content_type: String,
    upload_id: Mutex<Option<String>>,
}

impl MultipartSigner {
    fn current_upload_id(&self) -> Result<String, UploadError> {
        self.upload_id
            .lock()
            .expect("upload id lock poisoned")
            .clone()
            .ok_or_else(|| UploadError::SessionCreation("no active upload session".to_string()))
    }
}

#[async_trait]
impl PartSigner for MultipartSigner {
    async fn create(&self) -> Result<String, UploadError> {
        let upload_id = self
            .signer
            .create_multipart(&self.key, &self.content_type)
            .await?;
        *self.upload_id.lock().expect("upload id lock poisoned") = Some(upload_id.clone());
        Ok(upload_id)
    }

    async fn sign_part(&self, part_number: u32) -> Result<Url, UploadError> {
        let upload_id = self.current_upload_id()?;
        self.signer
            .presign_part(&self.key, &upload_id, part_number)
            .await
    }

    async fn complete(&self, parts: &[CompletedPart]) -> Result<(), UploadError> {
        let upload_id = self.current_upload_id()?;
        self.signer
            .complete_multipart(&self.key, &upload_id, parts)
            .await
    }
}
