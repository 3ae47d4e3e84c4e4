//! Structured logging field names shared by every placemark crate.
//!
//! `tracing` macros take field names as identifiers, so these constants are
//! the written contract that the macros follow; log queries can rely on them.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | WARN  | Recoverable issue, failure swallowed (rollback, cleanup, fan-out) |
//! | INFO  | Lifecycle events, completed mutations |
//! | DEBUG | Step start/finish, cache decisions (skip, merge, dedupe) |
//! | TRACE | Per-document decoding |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Review being created, updated, deleted or fetched.
pub const REVIEW_ID: &str = "review_id";

/// Acting or owning user.
pub const USER_ID: &str = "user_id";

pub const PLACE_ID: &str = "place_id";

pub const COMMENT_ID: &str = "comment_id";

// ─── Photo fields ──────────────────────────────────────────────────────────

/// Blob storage key of a photo.
pub const STORAGE_PATH: &str = "storage_path";

/// 1-based position of a photo within the review.
pub const PHOTO_INDEX: &str = "photo_index";

/// Photos that reached storage before a failure.
pub const UPLOADED_COUNT: &str = "uploaded_count";

// ─── Timing and outcome fields ─────────────────────────────────────────────

/// Bounded step name, also the prefix of its timeout error.
pub const OPERATION: &str = "op";

pub const DURATION_MS: &str = "duration_ms";

pub const TIMEOUT_MS: &str = "timeout_ms";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Every field name above.
pub const ALL_FIELDS: &[&str] = &[
    REVIEW_ID,
    USER_ID,
    PLACE_ID,
    COMMENT_ID,
    STORAGE_PATH,
    PHOTO_INDEX,
    UPLOADED_COUNT,
    OPERATION,
    DURATION_MS,
    TIMEOUT_MS,
    ERROR_MSG,
];
