//! Core traits for placemark abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, so backends are selected once at startup and tests can
//! substitute scripted fakes.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// REVIEW REPOSITORY
// =============================================================================

/// Persistence for reviews.
///
/// A review is stored as two documents (canonical record and per-author
/// projection) that are written and deleted together.
#[async_trait]
pub trait ReviewRepository: Send + Sync {
    /// Generate a new review id without reading external state.
    fn create_review_id(&self) -> String;

    /// Load a review by id.
    async fn load_review(&self, review_id: &str) -> Result<Option<ReviewRecord>>;

    /// Atomically write the canonical record and its author projection.
    async fn write_review_pair(&self, review: &ReviewRecord) -> Result<()>;

    /// Atomically delete the canonical record and its author projection.
    async fn delete_review_pair(&self, review: &ReviewRecord) -> Result<()>;

    /// Reviews of one place, newest `created_at` first.
    async fn list_reviews_for_place(&self, place_id: &str) -> Result<Vec<ReviewRecord>>;

    /// Most recent reviews, newest `created_at` first. `limit` is clamped to at least 1.
    async fn list_recent_reviews(&self, limit: usize) -> Result<Vec<ReviewRecord>>;
}

// =============================================================================
// DOCUMENT STORE
// =============================================================================

/// One operation of an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Set {
        collection: String,
        id: String,
        data: JsonValue,
    },
    Delete {
        collection: String,
        id: String,
    },
}

/// Group of writes that must all apply or none.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, collection: impl Into<String>, id: impl Into<String>, data: JsonValue) -> Self {
        self.ops.push(WriteOp::Set {
            collection: collection.into(),
            id: id.into(),
            data,
        });
        self
    }

    pub fn delete(mut self, collection: impl Into<String>, id: impl Into<String>) -> Self {
        self.ops.push(WriteOp::Delete {
            collection: collection.into(),
            id: id.into(),
        });
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// A document returned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: JsonValue,
}

/// `where field == value orderBy field desc limit n` over one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentQuery {
    pub collection: String,
    pub filters: Vec<(String, JsonValue)>,
    pub order_by_desc: Option<String>,
    pub limit: Option<usize>,
}

impl DocumentQuery {
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order_by_desc: None,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: JsonValue) -> Self {
        self.filters.push((field.into(), value));
        self
    }

    pub fn order_by_desc(mut self, field: impl Into<String>) -> Self {
        self.order_by_desc = Some(field.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Document-store collaborator.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Point read. `Ok(None)` when the document does not exist.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Apply every write of the batch atomically.
    async fn commit(&self, batch: WriteBatch) -> Result<()>;

    /// Run an equality-filtered, ordered, limited query.
    async fn query(&self, query: DocumentQuery) -> Result<Vec<Document>>;
}

// =============================================================================
// BLOB STORAGE & PHOTO PIPELINE
// =============================================================================

/// Storage backend for photo bytes.
///
/// Allows abstracting over filesystem, HTTP object storage or other providers.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Write data to `path`, overwriting any existing object. Returns the fetchable URL.
    async fn upload(&self, path: &str, data: Vec<u8>, content_type: &str) -> Result<String>;

    /// Read data from the specified path.
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Delete data at the specified path. Missing paths are not an error.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Check if data exists at the specified path.
    async fn exists(&self, path: &str) -> Result<bool>;
}

/// Produces a smaller local copy of a photo.
#[async_trait]
pub trait PhotoCompressor: Send + Sync {
    async fn compress(&self, source_uri: &str) -> Result<CompressedPhoto>;
}

/// Compress / upload / delete for review photos.
#[async_trait]
pub trait PhotoPipeline: Send + Sync {
    /// Compress a local photo into a new local resource.
    async fn compress(&self, source_uri: &str) -> Result<CompressedPhoto>;

    /// Upload to `storage_path`, overwriting on repeat.
    async fn upload(&self, request: UploadPhotoRequest) -> Result<ReviewPhoto>;

    /// Delete by storage path. Deleting a missing path succeeds.
    async fn delete_photo(&self, storage_path: &str) -> Result<()>;
}

// =============================================================================
// ENGAGEMENT
// =============================================================================

/// Persistence for likes and comments.
#[async_trait]
pub trait EngagementRepository: Send + Sync {
    async fn get_like_state(&self, review_id: &str, user_id: &str) -> Result<LikeState>;

    async fn set_liked(&self, review_id: &str, user_id: &str, liked: bool) -> Result<()>;

    async fn get_like_count(&self, review_id: &str) -> Result<i64>;

    async fn get_comment_count(&self, review_id: &str) -> Result<i64>;

    /// Newest first, at most `limit` (clamped to at least 1).
    async fn list_comments(&self, review_id: &str, limit: usize) -> Result<CommentPage>;

    /// Create a comment; the server assigns id and timestamps.
    async fn create_comment(&self, input: CreateCommentInput) -> Result<ReviewComment>;

    /// Delete a comment owned by `user_id`. Missing comments succeed.
    async fn delete_comment(&self, review_id: &str, comment_id: &str, user_id: &str) -> Result<()>;
}

// =============================================================================
// FOLLOWER FAN-OUT
// =============================================================================

/// Follower lookup and notification records for `review_published` fan-out.
#[async_trait]
pub trait FollowerFanout: Send + Sync {
    async fn list_follower_ids(&self, user_id: &str) -> Result<Vec<String>>;

    async fn create_notification(&self, notification: ReviewPublishedNotification) -> Result<()>;
}
