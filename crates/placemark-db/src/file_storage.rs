//! Blob storage backends for review photos.
//!
//! - [`FilesystemBlobStorage`]: local directory, atomic writes, `file://` URLs
//! - [`HttpBlobStorage`]: object storage over HTTP
//!
//! ## Example
//!
//! ```rust,ignore
//! use placemark_db::file_storage::FilesystemBlobStorage;
//!
//! let storage = FilesystemBlobStorage::new("/var/placemark/blobs");
//! storage.validate().await?;
//! let url = storage.upload("reviews/u1/r1/photo-1-1.jpg", bytes, "image/jpeg").await?;
//! ```

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use placemark_core::defaults::{HTTP_TIMEOUT_SECS, PHOTO_CACHE_CONTROL};
use placemark_core::{BlobStorage, Error, Result};

fn check_relative(path: &str) -> Result<()> {
    let escapes = Path::new(path)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if path.is_empty() || escapes {
        return Err(Error::InvalidInput(format!("invalid storage path: {}", path)));
    }
    Ok(())
}

// =============================================================================
// FILESYSTEM
// =============================================================================

/// Filesystem blob storage.
///
/// Objects are stored at `{base_path}/{storage_path}`.
pub struct FilesystemBlobStorage {
    base_path: PathBuf,
}

impl FilesystemBlobStorage {
    /// Create a new filesystem backend with the given base directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn full_path(&self, path: &str) -> Result<PathBuf> {
        check_relative(path)?;
        Ok(self.base_path.join(path))
    }

    /// Write, read back and delete a sample photo under the base directory.
    ///
    /// Run at startup so a missing or read-only directory shows up before
    /// the first review is published.
    pub async fn validate(&self) -> Result<()> {
        const SAMPLE: &str = "health-check/sample.jpg";
        const BYTES: &[u8] = b"placemark-filesystem-check";

        let fail = |step: &str, e: Error| {
            Error::Storage(format!("{} under {}: {}", step, self.base_path.display(), e))
        };
        self.upload(SAMPLE, BYTES.to_vec(), "image/jpeg")
            .await
            .map_err(|e| fail("sample write", e))?;
        let read_back = self.read(SAMPLE).await.map_err(|e| fail("sample read", e))?;
        if read_back != BYTES {
            return Err(fail(
                "sample read",
                Error::Internal("read-back mismatch".to_string()),
            ));
        }
        self.delete(SAMPLE).await.map_err(|e| fail("sample delete", e))?;
        let _ = fs::remove_dir(self.base_path.join("health-check")).await;
        debug!(base_path = %self.base_path.display(), "file_storage: validated");
        Ok(())
    }
}

#[async_trait]
impl BlobStorage for FilesystemBlobStorage {
    async fn upload(&self, path: &str, data: Vec<u8>, content_type: &str) -> Result<String> {
        let full_path = self.full_path(path)?;
        debug!(
            storage_path = %path,
            full_path = %full_path.display(),
            size = data.len(),
            content_type,
            "file_storage: upload"
        );

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                warn!(parent = %parent.display(), error = %e, "file_storage: create_dir_all failed");
                e
            })?;
        }

        // temp file + rename, so a reader never sees a partial photo
        let temp_path = full_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await.map_err(|e| {
            warn!(temp_path = %temp_path.display(), error = %e, "file_storage: File::create failed");
            e
        })?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &full_path).await.map_err(|e| {
            warn!(from = %temp_path.display(), to = %full_path.display(), error = %e, "file_storage: rename failed");
            e
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&full_path, std::fs::Permissions::from_mode(0o644)).await?;
        }

        Ok(format!("file://{}", full_path.display()))
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(path)?;
        match fs::read(&full_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("blob {}", path)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path)?;
        if fs::try_exists(&full_path).await? {
            fs::remove_file(full_path).await?;
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full_path = self.full_path(path)?;
        Ok(fs::try_exists(full_path).await?)
    }
}

// =============================================================================
// HTTP OBJECT STORAGE
// =============================================================================

/// Configuration for [`HttpBlobStorage`].
#[derive(Debug, Clone)]
pub struct HttpBlobStorageConfig {
    /// Object API base URL; objects live at `{base_url}/o/{encoded path}`.
    pub base_url: String,
    /// Public base used to build URLs when the upload response carries none.
    pub public_base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
}

impl HttpBlobStorageConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            public_base_url: None,
            api_key: None,
            timeout_seconds: HTTP_TIMEOUT_SECS,
        }
    }

    pub fn with_public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = Some(url.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Read configuration from the environment.
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `PLACEMARK_BLOB_URL` | (required) | Object API base URL |
    /// | `PLACEMARK_BLOB_PUBLIC_URL` | (none) | Public base for photo URLs |
    /// | `PLACEMARK_BLOB_API_KEY` | (none) | Bearer token |
    /// | `PLACEMARK_HTTP_TIMEOUT` | `30` | Request timeout (seconds) |
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("PLACEMARK_BLOB_URL")
            .map_err(|_| Error::Config("PLACEMARK_BLOB_URL is not set".to_string()))?;
        let config = Self {
            base_url,
            public_base_url: std::env::var("PLACEMARK_BLOB_PUBLIC_URL").ok(),
            api_key: std::env::var("PLACEMARK_BLOB_API_KEY").ok(),
            timeout_seconds: std::env::var("PLACEMARK_HTTP_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(HTTP_TIMEOUT_SECS),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(Error::Config(format!(
                "blob storage URL must start with http:// or https://, got: {}",
                self.base_url
            )));
        }
        if self.timeout_seconds == 0 {
            return Err(Error::Config(
                "blob storage timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    url: Option<String>,
}

/// Object storage reached over HTTP.
pub struct HttpBlobStorage {
    client: Client,
    config: HttpBlobStorageConfig,
}

impl HttpBlobStorage {
    pub fn new(config: HttpBlobStorageConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Storage(format!("Failed to create HTTP client: {}", e)))?;
        info!(url = %config.base_url, "Initializing HTTP blob storage");
        Ok(Self { client, config })
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/o/{}",
            self.config.base_url.trim_end_matches('/'),
            urlencoding::encode(path)
        )
    }

    fn public_url(&self, path: &str) -> String {
        match self.config.public_base_url {
            Some(ref base) => format!("{}/{}", base.trim_end_matches('/'), path),
            None => self.object_url(path),
        }
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.api_key {
            Some(ref api_key) => req.header("Authorization", format!("Bearer {}", api_key)),
            None => req,
        }
    }

    async fn failure(op: &str, path: &str, response: reqwest::Response) -> Error {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        warn!(op, storage_path = %path, status, "blob storage request failed");
        Error::Storage(format!(
            "{} {} failed with HTTP {}: {}",
            op,
            path,
            status,
            body.chars().take(240).collect::<String>()
        ))
    }
}

#[async_trait]
impl BlobStorage for HttpBlobStorage {
    async fn upload(&self, path: &str, data: Vec<u8>, content_type: &str) -> Result<String> {
        check_relative(path)?;
        let size = data.len();
        let response = self
            .authorize(self.client.put(self.object_url(path)))
            .header("Content-Type", content_type)
            .header("Cache-Control", PHOTO_CACHE_CONTROL)
            .body(data)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::failure("upload", path, response).await);
        }

        let body = response.text().await.unwrap_or_default();
        let url = serde_json::from_str::<UploadResponse>(&body)
            .ok()
            .and_then(|parsed| parsed.url)
            .unwrap_or_else(|| self.public_url(path));
        debug!(storage_path = %path, size, "blob storage: uploaded");
        Ok(url)
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let response = self
            .authorize(self.client.get(self.object_url(path)))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("blob {}", path)));
        }
        if !response.status().is_success() {
            return Err(Self::failure("read", path, response).await);
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let response = self
            .authorize(self.client.delete(self.object_url(path)))
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(storage_path = %path, "blob storage: delete of missing object");
            return Ok(());
        }
        if !status.is_success() {
            return Err(Self::failure("delete", path, response).await);
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let response = self
            .authorize(self.client.head(self.object_url(path)))
            .send()
            .await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::failure("exists", path, response).await),
        }
    }
}
