use std::{fs::File, io::Read};

use futures::{StreamExt, stream::BoxStream};
use reqwest::{
    Client, StatusCode,
    header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG},
};
use tokio::sync::mpsc;
use url::Url;

use crate::error::UploadError;
use crate::signer::PartSigner;
use crate::types::{CompletedPart, PresignedPost, UploadEvent, UploadProgress, UploadSource};

const MEGABYTE: u64 = 1024 * 1024;

/// Default part size for multipart uploads. The final part may be smaller.
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * MEGABYTE;

/// Part numbers above this are rejected by S3-compatible stores.
const MAX_PARTS_COUNT: u64 = 10_000;

const SUB_CHUNK_SIZE: usize = 64 * 1024;

fn total_parts(size: u64, chunk_size: u64) -> u64 {
    size.div_ceil(chunk_size)
}

fn normalize_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

/// HTTP client for the upload paths. All authorization lives in the presigned
/// URLs it is handed; the client itself carries no credentials.
pub struct UploadClient {
    client: Client,
}

impl Default for UploadClient {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Uploads the whole file to a presigned URL with a single PUT.
    ///
    /// The content type header must match what the URL was signed for. The
    /// progress sink observes 0 before the transfer and 100 after a
    /// successful response; no partial progress is reported on this path.
    pub async fn put_file(
        &self,
        source: &UploadSource,
        url: &Url,
        on_progress: Option<&(dyn Fn(u8) + Send + Sync)>,
    ) -> Result<(), UploadError> {
        if let Some(progress) = on_progress {
            progress(0);
        }

        let bytes = std::fs::read(&source.path)?;

        let response = self
            .client
            .put(url.clone())
            .header(CONTENT_TYPE, &source.content_type)
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UploadError::PutFailed(response.status()));
        }

        if let Some(progress) = on_progress {
            progress(100);
        }

        Ok(())
    }

    /// Uploads the file through a presigned POST form.
    ///
    /// Every signer-issued field is appended verbatim, then the file content
    /// under the field name `file`.
    pub async fn post_file(
        &self,
        source: &UploadSource,
        post: &PresignedPost,
    ) -> Result<(), UploadError> {
        let mut form = reqwest::multipart::Form::new();
        for (name, value) in &post.fields {
            form = form.text(name.clone(), value.clone());
        }

        let bytes = std::fs::read(&source.path)?;
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(source.name.clone())
            .mime_str(&source.content_type)?;
        form = form.part("file", part);

        let response = self.client.post(&post.url).multipart(form).send().await?;

        if !response.status().is_success() {
            return Err(UploadError::PostFailed(response.status()));
        }

        Ok(())
    }

    /// Uploads the file as a multipart session driven by `signer`.
    ///
    /// The session is created once, then each part is signed and uploaded
    /// strictly sequentially; the manifest of `{ETag, PartNumber}` pairs is
    /// committed only after every part succeeded. The first failure abandons
    /// the session: no further parts are signed and the completion call is
    /// never made. Progress and the final manifest arrive as stream events.
    pub fn multipart_upload<'a, S: PartSigner>(
        &'a self,
        source: &'a UploadSource,
        signer: &'a S,
        chunk_size: u64,
    ) -> Result<BoxStream<'a, Result<UploadEvent, UploadError>>, UploadError> {
        if chunk_size == 0 {
            return Err(UploadError::InvalidChunkSize);
        }

        let parts_count = total_parts(source.size, chunk_size);
        if parts_count > MAX_PARTS_COUNT {
            return Err(UploadError::TooManyParts {
                total_parts: parts_count,
                max_parts: MAX_PARTS_COUNT,
            });
        }

        let stream = async_stream::try_stream! {
            yield UploadEvent::Progress(UploadProgress {
                bytes_uploaded: 0,
                total_bytes: source.size,
            });

            // The session identifier stays with the signer; subsequent
            // sign_part/complete calls are bound to it signer-side.
            signer.create().await?;

            let mut file = File::open(&source.path)?;
            let mut buffer = vec![0u8; chunk_size as usize];
            let mut parts: Vec<CompletedPart> = Vec::with_capacity(parts_count as usize);
            let mut bytes_uploaded = 0u64;

            let (progress_tx, mut progress_rx) = mpsc::channel::<u64>(64);

            for part_number in 1..=parts_count {
                let offset = (part_number - 1) * chunk_size;
                let len = chunk_size.min(source.size - offset) as usize;
                file.read_exact(&mut buffer[..len])?;
                let chunk = buffer[..len].to_vec();

                let url = signer.sign_part(part_number as u32).await?;

                let put_fut = self.put_part(url, part_number as u32, chunk, progress_tx.clone());
                tokio::pin!(put_fut);

                let upload_result: Result<String, UploadError> = loop {
                    tokio::select! {
                        biased;
                        result = &mut put_fut => {
                            break result;
                        }
                        Some(bytes) = progress_rx.recv() => {
                            bytes_uploaded += bytes;
                            yield UploadEvent::Progress(UploadProgress {
                                bytes_uploaded,
                                total_bytes: source.size,
                            });
                        }
                    }
                };
                let etag = upload_result?;

                // The channel undercounts when sub-chunk messages are
                // dropped; the completed range is authoritative.
                while progress_rx.try_recv().is_ok() {}
                bytes_uploaded = offset + len as u64;
                yield UploadEvent::Progress(UploadProgress {
                    bytes_uploaded,
                    total_bytes: source.size,
                });

                parts.push(CompletedPart {
                    etag: normalize_etag(&etag),
                    part_number: part_number as u32,
                });
            }

            signer.complete(&parts).await?;

            yield UploadEvent::Completed(parts);
        };

        Ok(Box::pin(stream))
    }

    /// Sends one part body to its presigned URL, streamed in small
    /// sub-chunks so byte-level progress can be reported while the transfer
    /// is in flight. Returns the raw ETag header value.
    async fn put_part(
        &self,
        url: Url,
        part_number: u32,
        chunk: Vec<u8>,
        progress_tx: mpsc::Sender<u64>,
    ) -> Result<String, UploadError> {
        let content_length = chunk.len() as u64;

        let chunks: Vec<Vec<u8>> = chunk
            .chunks(SUB_CHUNK_SIZE)
            .map(|chunk| chunk.to_vec())
            .collect();

        let stream = futures::stream::iter(chunks).map(move |chunk| {
            let len = chunk.len() as u64;
            let tx = progress_tx.clone();
            let _ = tx.try_send(len);
            Ok::<_, std::io::Error>(chunk)
        });

        let body = reqwest::Body::wrap_stream(stream);

        let response = self
            .client
            .put(url)
            .header(CONTENT_LENGTH, content_length)
            .body(body)
            .send()
            .await?;

        let status: StatusCode = response.status();
        if !status.is_success() {
            return Err(UploadError::PartFailed {
                part_number,
                status,
            });
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .ok_or(UploadError::MissingEtag(part_number))?;

        Ok(etag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_count_is_ceiling_of_size_over_chunk() {
        assert_eq!(total_parts(10 * MEGABYTE, 5 * MEGABYTE), 2);
        assert_eq!(total_parts(10 * MEGABYTE + 1, 5 * MEGABYTE), 3);
        assert_eq!(total_parts(1, 5 * MEGABYTE), 1);
        assert_eq!(total_parts(5 * MEGABYTE, 5 * MEGABYTE), 1);
    }

    #[test]
    fn all_parts_full_except_the_last() {
        let size = 12 * MEGABYTE + 17;
        let chunk_size = 5 * MEGABYTE;
        let count = total_parts(size, chunk_size);

        assert_eq!(count, 3);
        for part_number in 1..count {
            let offset = (part_number - 1) * chunk_size;
            assert_eq!(chunk_size.min(size - offset), chunk_size);
        }
        let last_offset = (count - 1) * chunk_size;
        assert_eq!(size - last_offset, 2 * MEGABYTE + 17);
    }

    #[test]
    fn etag_normalization_strips_wrapping_quotes() {
        assert_eq!(normalize_etag("\"abc123\""), "abc123");
        assert_eq!(normalize_etag("abc123"), "abc123");
    }

    #[test]
    fn zero_chunk_size_is_rejected_before_any_signer_call() {
        struct NeverSigner;

        #[async_trait::async_trait]
        impl PartSigner for NeverSigner {
            async fn create(&self) -> Result<String, UploadError> {
                panic!("signer must not be called");
            }
            async fn sign_part(&self, _part_number: u32) -> Result<Url, UploadError> {
                panic!("signer must not be called");
            }
            async fn complete(&self, _parts: &[CompletedPart]) -> Result<(), UploadError> {
                panic!("signer must not be called");
            }
        }

        let source = UploadSource {
            path: "does-not-matter".into(),
            name: "does-not-matter".to_string(),
            size: 10,
            content_type: "application/octet-stream".to_string(),
        };

        let client = UploadClient::new();
        let result = client.multipart_upload(&source, &NeverSigner, 0);
        assert!(matches!(result, Err(UploadError::InvalidChunkSize)));
    }
}
