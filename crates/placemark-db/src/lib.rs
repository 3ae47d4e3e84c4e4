//! # placemark-db
//!
//! Persistence layer for placemark.
//!
//! This crate provides:
//! - Document-store collaborators: in-memory and HTTP
//! - Review repositories: in-memory and document-backed (canonical record +
//!   per-author projection written in one batch)
//! - Engagement repositories for likes and comments
//! - Follower fan-out for `review_published` notifications
//! - Blob storage backends for photos: filesystem and HTTP
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use placemark_db::{DocumentReviewRepository, HttpDocumentStore, HttpStoreConfig};
//!
//! let store = Arc::new(HttpDocumentStore::new(HttpStoreConfig::from_env()?)?);
//! let reviews = DocumentReviewRepository::new(store);
//! let recent = reviews.list_recent_reviews(20).await?;
//! ```

pub mod engagement;
pub mod fanout;
pub mod file_storage;
pub mod http_store;
pub mod memory_store;
pub mod reviews;

mod json;

// Re-export core types
pub use placemark_core::*;

pub use engagement::{DocumentEngagementRepository, MemoryEngagementRepository};
pub use fanout::DocumentFollowerFanout;
pub use file_storage::{FilesystemBlobStorage, HttpBlobStorage, HttpBlobStorageConfig};
pub use http_store::{HttpDocumentStore, HttpStoreConfig};
pub use memory_store::MemoryDocumentStore;
pub use reviews::{
    decode_review, encode_review, projection_collection, DocumentReviewRepository,
    MemoryReviewRepository, REVIEWS_COLLECTION,
};
