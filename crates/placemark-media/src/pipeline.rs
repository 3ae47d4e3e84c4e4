//! Review photo pipeline: compress, upload, delete.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use placemark_core::defaults::{COMPRESS_TIMEOUT_MS, FILE_READ_TIMEOUT_MS, UPLOAD_TIMEOUT_MS};
use placemark_core::{
    with_timeout, BlobStorage, CompressedPhoto, Error, PhotoCompressor, PhotoPipeline, Result,
    ReviewPhoto, UploadPhotoRequest,
};

use crate::compressor::local_path;

/// Photo pipeline over a compressor and an optional blob storage.
///
/// Without storage the pipeline runs in local echo mode: uploads return the
/// source URI as the photo URL and deletes do nothing.
pub struct StoragePhotoPipeline {
    compressor: Arc<dyn PhotoCompressor>,
    storage: Option<Arc<dyn BlobStorage>>,
    compress_timeout: Duration,
    file_read_timeout: Duration,
    upload_timeout: Duration,
}

impl StoragePhotoPipeline {
    pub fn new(compressor: Arc<dyn PhotoCompressor>, storage: Arc<dyn BlobStorage>) -> Self {
        Self::build(compressor, Some(storage))
    }

    /// Pipeline with no remote storage.
    pub fn local_echo(compressor: Arc<dyn PhotoCompressor>) -> Self {
        Self::build(compressor, None)
    }

    fn build(compressor: Arc<dyn PhotoCompressor>, storage: Option<Arc<dyn BlobStorage>>) -> Self {
        Self {
            compressor,
            storage,
            compress_timeout: Duration::from_millis(COMPRESS_TIMEOUT_MS),
            file_read_timeout: Duration::from_millis(FILE_READ_TIMEOUT_MS),
            upload_timeout: Duration::from_millis(UPLOAD_TIMEOUT_MS),
        }
    }

    pub fn with_compress_timeout(mut self, timeout: Duration) -> Self {
        self.compress_timeout = timeout;
        self
    }

    pub fn with_file_read_timeout(mut self, timeout: Duration) -> Self {
        self.file_read_timeout = timeout;
        self
    }

    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }

    pub fn is_local_echo(&self) -> bool {
        self.storage.is_none()
    }
}

#[async_trait]
impl PhotoPipeline for StoragePhotoPipeline {
    async fn compress(&self, source_uri: &str) -> Result<CompressedPhoto> {
        let started = Instant::now();
        let photo = with_timeout(
            "review-photo-compress",
            self.compress_timeout,
            self.compressor.compress(source_uri),
        )
        .await?;
        debug!(
            source_uri,
            duration_ms = started.elapsed().as_millis() as u64,
            "photo pipeline: compressed"
        );
        Ok(photo)
    }

    async fn upload(&self, request: UploadPhotoRequest) -> Result<ReviewPhoto> {
        let Some(storage) = self.storage.as_ref() else {
            debug!(storage_path = %request.storage_path, "photo pipeline: local echo upload");
            return Ok(ReviewPhoto::new(request.storage_path, request.source_uri));
        };

        let started = Instant::now();
        let source = local_path(&request.source_uri).to_string();
        let data = with_timeout("review-photo-read", self.file_read_timeout, async {
            tokio::fs::read(&source).await.map_err(|e| {
                warn!(source = %source, error = %e, "photo pipeline: read failed");
                Error::from(e)
            })
        })
        .await?;
        let size = data.len();

        let url = with_timeout(
            "review-photo-upload",
            self.upload_timeout,
            storage.upload(&request.storage_path, data, &request.content_type),
        )
        .await
        .map_err(|e| {
            warn!(storage_path = %request.storage_path, error = %e, "photo pipeline: upload failed");
            e
        })?;

        info!(
            storage_path = %request.storage_path,
            size,
            duration_ms = started.elapsed().as_millis() as u64,
            "photo pipeline: uploaded"
        );
        Ok(ReviewPhoto::new(request.storage_path, url))
    }

    async fn delete_photo(&self, storage_path: &str) -> Result<()> {
        match self.storage.as_ref() {
            Some(storage) => storage.delete(storage_path).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::PassthroughCompressor;

    struct SlowCompressor;

    #[async_trait]
    impl PhotoCompressor for SlowCompressor {
        async fn compress(&self, _source_uri: &str) -> Result<CompressedPhoto> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Err(Error::Internal("unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn local_echo_returns_source_uri() {
        let pipeline = StoragePhotoPipeline::local_echo(Arc::new(PassthroughCompressor));
        let photo = pipeline
            .upload(UploadPhotoRequest {
                source_uri: "file:///tmp/a.jpg".to_string(),
                storage_path: "reviews/u/r/photo-1-1.jpg".to_string(),
                content_type: "image/jpeg".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(photo.path, "reviews/u/r/photo-1-1.jpg");
        assert_eq!(photo.url, "file:///tmp/a.jpg");
        pipeline.delete_photo(&photo.path).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn compress_times_out() {
        let pipeline = StoragePhotoPipeline::local_echo(Arc::new(SlowCompressor))
            .with_compress_timeout(Duration::from_millis(100));
        let err = pipeline.compress("file:///tmp/a.jpg").await.unwrap_err();
        assert_eq!(err.to_string(), "review-photo-compress-timeout");
    }
}
