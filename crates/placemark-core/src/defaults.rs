//! Centralized default constants for placemark.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers.

// =============================================================================
// MUTATION TIMEOUTS
// =============================================================================

/// Upper bound for each compress / upload / load step of a mutation.
pub const STEP_TIMEOUT_MS: u64 = 90_000;

/// Reading a local photo before upload.
pub const FILE_READ_TIMEOUT_MS: u64 = 20_000;

/// Sending photo bytes to blob storage.
pub const UPLOAD_TIMEOUT_MS: u64 = 90_000;

/// Running the external compressor.
pub const COMPRESS_TIMEOUT_MS: u64 = 60_000;

/// Default HTTP request timeout for document and blob backends.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// PHOTOS
// =============================================================================

/// Compressed photo width in pixels (height keeps the aspect ratio).
pub const PHOTO_MAX_WIDTH: u32 = 1440;

/// JPEG quality in the 0.0..=1.0 range.
pub const PHOTO_QUALITY: f32 = 0.45;

/// Content type of compressed photos.
pub const PHOTO_CONTENT_TYPE: &str = "image/jpeg";

/// Cache-Control sent with uploaded photos.
pub const PHOTO_CACHE_CONTROL: &str = "public,max-age=31536000";

// =============================================================================
// LISTING
// =============================================================================

/// Cap on reviews returned for a single place.
pub const REVIEW_LIST_LIMIT: usize = 50;

/// Default number of recent reviews loaded by a cache hydrate.
pub const HYDRATE_LIMIT: usize = 120;

/// Default page size for comment lists.
pub const COMMENT_LIST_LIMIT: usize = 50;

// =============================================================================
// CACHE
// =============================================================================

/// Default freshness window for the review list.
pub const REVIEWS_STALE_MS: i64 = 60_000;

/// Default freshness window for a single review detail.
pub const REVIEW_DETAIL_STALE_MS: i64 = 60_000;

// =============================================================================
// ENGAGEMENT
// =============================================================================

/// Maximum comment length in characters, after trimming.
pub const COMMENT_MAX_LENGTH: usize = 200;

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// Delivery attempts per follower notification.
pub const FANOUT_ATTEMPTS: usize = 2;

/// Followers read for one `review_published` fan-out.
pub const FOLLOWER_FANOUT_LIMIT: usize = 500;

// =============================================================================
// EVENTS
// =============================================================================

/// Broadcast buffer for store events. Use 32 in tests.
pub const EVENT_BUS_CAPACITY: usize = 256;
