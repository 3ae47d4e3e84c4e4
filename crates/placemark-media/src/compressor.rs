//! Photo compressors.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};
use uuid::Uuid;

use placemark_core::defaults::{
    COMPRESS_TIMEOUT_MS, PHOTO_CONTENT_TYPE, PHOTO_MAX_WIDTH, PHOTO_QUALITY,
};
use placemark_core::{CompressedPhoto, Error, PhotoCompressor, Result};

/// Strip a `file://` scheme, leaving a plain filesystem path.
pub fn local_path(uri: &str) -> &str {
    uri.strip_prefix("file://").unwrap_or(uri)
}

/// Map a 0.0..=1.0 quality onto ffmpeg's JPEG `-q:v` scale (2 best, 31 worst).
pub fn jpeg_qscale(quality: f32) -> u32 {
    let quality = quality.clamp(0.0, 1.0);
    (2.0 + (1.0 - quality) * 29.0).round() as u32
}

/// Guess an image content type from a file extension.
pub fn content_type_for(uri: &str) -> &'static str {
    let ext = Path::new(local_path(uri))
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("heic") | Some("heif") => "image/heic",
        Some("gif") => "image/gif",
        _ => PHOTO_CONTENT_TYPE,
    }
}

/// Run a command that writes its output to a file.
async fn run_cmd_status(cmd: &mut Command, timeout: Duration) -> Result<()> {
    let output = tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| {
            Error::Media(format!(
                "External command timed out after {}ms",
                timeout.as_millis()
            ))
        })?
        .map_err(|e| Error::Media(format!("Failed to execute command: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Media(format!(
            "Command failed (exit {}): {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(())
}

/// Resizes and re-encodes photos as JPEG with ffmpeg.
pub struct FfmpegCompressor {
    work_dir: PathBuf,
    max_width: u32,
    quality: f32,
    timeout: Duration,
}

impl FfmpegCompressor {
    /// Compressed files are written into `work_dir`.
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            max_width: PHOTO_MAX_WIDTH,
            quality: PHOTO_QUALITY,
            timeout: Duration::from_millis(COMPRESS_TIMEOUT_MS),
        }
    }

    pub fn with_max_width(mut self, max_width: u32) -> Self {
        self.max_width = max_width;
        self
    }

    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// True when an `ffmpeg` binary can be executed.
    pub async fn is_available() -> bool {
        match Command::new("ffmpeg").arg("-version").output().await {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl PhotoCompressor for FfmpegCompressor {
    async fn compress(&self, source_uri: &str) -> Result<CompressedPhoto> {
        let source = local_path(source_uri);
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let output = self.work_dir.join(format!("photo-{}.jpg", Uuid::now_v7()));
        debug!(source = %source, output = %output.display(), "compressing photo");

        // never upscale; -2 keeps the height even for the encoder
        let scale = format!("scale='min({},iw)':-2", self.max_width);
        run_cmd_status(
            Command::new("ffmpeg")
                .arg("-v")
                .arg("error")
                .arg("-i")
                .arg(source)
                .arg("-vf")
                .arg(&scale)
                .arg("-q:v")
                .arg(jpeg_qscale(self.quality).to_string())
                .arg("-frames:v")
                .arg("1")
                .arg("-y")
                .arg(&output),
            self.timeout,
        )
        .await?;

        info!(source = %source, output = %output.display(), "photo compressed");
        Ok(CompressedPhoto {
            uri: format!("file://{}", output.display()),
            content_type: PHOTO_CONTENT_TYPE.to_string(),
        })
    }
}

/// Returns the source unchanged. Used when no encoder is installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCompressor;

#[async_trait]
impl PhotoCompressor for PassthroughCompressor {
    async fn compress(&self, source_uri: &str) -> Result<CompressedPhoto> {
        Ok(CompressedPhoto {
            uri: source_uri.to_string(),
            content_type: content_type_for(source_uri).to_string(),
        })
    }
}
