//! # placemark-state
//!
//! Client-side caches for reviews and engagement.
//!
//! - [`ReviewStore`]: staleness-aware review cache with de-duplicated detail
//!   fetches and a monotonic `updated_at` merge.
//! - [`EngagementStore`]: like state with optimistic toggles, and comment
//!   lists.
//!
//! Both stores are explicit containers shared through `Arc`. State changes
//! are announced on an [`EventBus`](placemark_core::EventBus).

pub mod engagement;
pub mod optimistic;
pub mod reviews;

pub use engagement::{
    validate_comment_text, CommentState, EngagementCounts, EngagementStore, LikeSnapshot,
    PostCommentInput,
};
pub use optimistic::optimistic;
pub use reviews::{
    AuthorFilter, FetchPolicy, HydrateError, HydrateErrorKind, HydrateOutcome, HydrationStatus,
    ReviewStore, ReviewStoreBuilder,
};
