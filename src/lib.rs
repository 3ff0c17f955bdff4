//! Helpers for uploading files directly to an S3-compatible object store
//! with presigned URLs, so file bytes never pass through an application
//! server.
//!
//! [`UploadClient`] drives the client side: single-shot PUT and POST paths
//! plus the multipart orchestrator, which needs only the [`PartSigner`]
//! capability. [`S3Signer`] is the trusted server side: it validates upload
//! requests against policy and mints the presigned URLs.

pub mod client;
pub mod error;
pub mod signer;
pub mod types;

pub use client::{DEFAULT_CHUNK_SIZE, UploadClient};
pub use error::UploadError;
pub use signer::{MultipartSigner, PartSigner, S3Signer};
pub use types::{
    CompletedPart, PresignRequest, PresignedPost, StoreCredentials, UploadEvent, UploadPolicy,
    UploadProgress, UploadSource,
};
