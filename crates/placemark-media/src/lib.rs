//! # placemark-media
//!
//! Review photo handling: compression to a bounded JPEG and the
//! compress / upload / delete pipeline used by the mutation engine.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use placemark_media::{FfmpegCompressor, StoragePhotoPipeline};
//! use placemark_db::FilesystemBlobStorage;
//!
//! let pipeline = StoragePhotoPipeline::new(
//!     Arc::new(FfmpegCompressor::new("/tmp/placemark-photos")),
//!     Arc::new(FilesystemBlobStorage::new("/var/placemark/blobs")),
//! );
//! let compressed = pipeline.compress("file:///photos/IMG_0001.HEIC").await?;
//! ```

pub mod compressor;
pub mod pipeline;

pub use compressor::{content_type_for, jpeg_qscale, local_path, FfmpegCompressor, PassthroughCompressor};
pub use pipeline::StoragePhotoPipeline;
