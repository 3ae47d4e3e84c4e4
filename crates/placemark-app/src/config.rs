//! Application configuration.
//!
//! Backends are chosen once at startup from the environment:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PLACEMARK_DOCUMENT_URL` | (none) | Document API base URL; unset = in-memory store |
//! | `PLACEMARK_DOCUMENT_API_KEY` | (none) | Bearer token for the document API |
//! | `PLACEMARK_BLOB_URL` | (none) | Object API base URL; wins over `PLACEMARK_BLOB_DIR` |
//! | `PLACEMARK_BLOB_PUBLIC_URL` | (none) | Public base for photo URLs |
//! | `PLACEMARK_BLOB_API_KEY` | (none) | Bearer token for the object API |
//! | `PLACEMARK_BLOB_DIR` | (none) | Filesystem blob root; unset = local echo |
//! | `PLACEMARK_HTTP_TIMEOUT` | `30` | HTTP request timeout (seconds) |
//! | `PLACEMARK_COMPRESSOR` | `auto` | `auto`, `ffmpeg` or `none` |
//! | `PLACEMARK_WORK_DIR` | `$TMPDIR/placemark` | Scratch directory for compressed photos |
//! | `PLACEMARK_STEP_TIMEOUT_MS` | `90000` | Per-step mutation timeout |
//! | `PLACEMARK_HYDRATE_LIMIT` | `120` | Feed size for `hydrate_reviews` |
//! | `LOG_FORMAT` | `text` | `text` or `json` |
//! | `LOG_FILE` | (none) | Log file path, rotated daily |
//! | `LOG_ANSI` | (auto) | Force ANSI colours on or off |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use placemark_core::defaults::{HTTP_TIMEOUT_SECS, HYDRATE_LIMIT, STEP_TIMEOUT_MS};
use placemark_core::{Error, Result};
use placemark_db::{HttpBlobStorageConfig, HttpStoreConfig};

/// Where review and engagement documents live.
#[derive(Debug, Clone)]
pub enum DocumentBackend {
    Memory,
    Http(HttpStoreConfig),
}

impl DocumentBackend {
    pub fn name(&self) -> &'static str {
        match self {
            DocumentBackend::Memory => "memory",
            DocumentBackend::Http(_) => "http",
        }
    }
}

/// Where review photos are uploaded.
#[derive(Debug, Clone)]
pub enum BlobBackend {
    /// No remote storage: photo URLs are the local source URIs.
    LocalEcho,
    Filesystem(PathBuf),
    Http(HttpBlobStorageConfig),
}

impl BlobBackend {
    pub fn name(&self) -> &'static str {
        match self {
            BlobBackend::LocalEcho => "local-echo",
            BlobBackend::Filesystem(_) => "filesystem",
            BlobBackend::Http(_) => "http",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressorChoice {
    /// ffmpeg when it is installed, otherwise passthrough.
    #[default]
    Auto,
    Ffmpeg,
    Passthrough,
}

impl FromStr for CompressorChoice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(CompressorChoice::Auto),
            "ffmpeg" => Ok(CompressorChoice::Ffmpeg),
            "none" | "passthrough" => Ok(CompressorChoice::Passthrough),
            other => Err(Error::Config(format!(
                "PLACEMARK_COMPRESSOR must be auto, ffmpeg or none, got: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub document: DocumentBackend,
    pub blob: BlobBackend,
    pub compressor: CompressorChoice,
    pub work_dir: PathBuf,
    pub step_timeout: Duration,
    pub hydrate_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            document: DocumentBackend::Memory,
            blob: BlobBackend::LocalEcho,
            compressor: CompressorChoice::Auto,
            work_dir: std::env::temp_dir().join("placemark"),
            step_timeout: Duration::from_millis(STEP_TIMEOUT_MS),
            hydrate_limit: HYDRATE_LIMIT,
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let http_timeout = parse_var(&get, "PLACEMARK_HTTP_TIMEOUT")?.unwrap_or(HTTP_TIMEOUT_SECS);

        let document = match get("PLACEMARK_DOCUMENT_URL") {
            Some(url) => {
                let mut config = HttpStoreConfig::new(url).with_timeout_seconds(http_timeout);
                config.api_key = get("PLACEMARK_DOCUMENT_API_KEY");
                DocumentBackend::Http(config)
            }
            None => DocumentBackend::Memory,
        };

        let blob = match (get("PLACEMARK_BLOB_URL"), get("PLACEMARK_BLOB_DIR")) {
            (Some(url), _) => {
                let mut config = HttpBlobStorageConfig::new(url).with_timeout_seconds(http_timeout);
                config.public_base_url = get("PLACEMARK_BLOB_PUBLIC_URL");
                config.api_key = get("PLACEMARK_BLOB_API_KEY");
                BlobBackend::Http(config)
            }
            (None, Some(dir)) => BlobBackend::Filesystem(PathBuf::from(dir)),
            (None, None) => BlobBackend::LocalEcho,
        };

        let defaults = Self::default();
        let config = Self {
            document,
            blob,
            compressor: match get("PLACEMARK_COMPRESSOR") {
                Some(value) => value.parse()?,
                None => defaults.compressor,
            },
            work_dir: get("PLACEMARK_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            step_timeout: parse_var(&get, "PLACEMARK_STEP_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.step_timeout),
            hydrate_limit: parse_var(&get, "PLACEMARK_HYDRATE_LIMIT")?
                .unwrap_or(defaults.hydrate_limit),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let DocumentBackend::Http(config) = &self.document {
            config.validate()?;
        }
        if let BlobBackend::Http(config) = &self.blob {
            config.validate()?;
        }
        if self.step_timeout.is_zero() {
            return Err(Error::Config(
                "step timeout must be greater than zero".to_string(),
            ));
        }
        if self.hydrate_limit == 0 {
            return Err(Error::Config(
                "hydrate limit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    get(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|_| Error::Config(format!("{} is not a valid number: {}", key, raw)))
        })
        .transpose()
}

/// Log output settings, read separately so logging is up before the rest
/// of the configuration is validated.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub json: bool,
    pub file: Option<PathBuf>,
    pub ansi: Option<bool>,
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            json: lookup("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json")),
            file: lookup("LOG_FILE")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            ansi: lookup("LOG_ANSI").map(|v| v == "true" || v == "1"),
        }
    }
}
