use reqwest::StatusCode;
use thiserror::Error;

/// Errors surfaced by the upload paths and the signer.
///
/// Validation errors (`FileTooLarge`, `TypeNotAllowed`) are raised before any
/// network call. Transfer and integrity errors are fatal to the session they
/// occur in; nothing is retried and no cleanup call is made, the session is
/// simply never completed.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("file too large: {size} bytes exceeds the {max_size} byte limit")]
    FileTooLarge { size: u64, max_size: u64 },

    #[error("invalid file type: {0}")]
    TypeNotAllowed(String),

    #[error("chunk size must be a positive number of bytes")]
    InvalidChunkSize,

    #[error("too many parts: {total_parts} exceeds the {max_parts} part limit")]
    TooManyParts { total_parts: u64, max_parts: u64 },

    #[error("PUT upload failed with status {0}")]
    PutFailed(StatusCode),

    #[error("POST upload failed with status {0}")]
    PostFailed(StatusCode),

    #[error("multipart upload failed at part {part_number} with status {status}")]
    PartFailed { part_number: u32, status: StatusCode },

    #[error("missing ETag on the response for part {0}")]
    MissingEtag(u32),

    #[error("failed to create upload session: {0}")]
    SessionCreation(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("store error: {0}")]
    Store(#[from] s3::error::S3Error),

    #[error("invalid post policy: {0}")]
    PostPolicy(#[from] s3::post_policy::PostPolicyError),

    #[error("invalid store credentials: {0}")]
    Credentials(#[from] s3::creds::error::CredentialsError),

    #[error("invalid presigned url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
