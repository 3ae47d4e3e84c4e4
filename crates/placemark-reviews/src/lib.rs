//! # placemark-reviews
//!
//! Orchestrates review create / update / delete over a [`ReviewRepository`]
//! and a [`PhotoPipeline`], with rollback of partially uploaded photos.
//!
//! ## Example
//!
//! ```rust,ignore
//! use placemark_reviews::{MutationDeps, MutationOptions, ReviewMutations};
//!
//! let mutations = ReviewMutations::new(MutationDeps::new(repository, photos));
//! let review = mutations.create_review(input, MutationOptions::default()).await?;
//! ```
//!
//! [`ReviewRepository`]: placemark_core::ReviewRepository
//! [`PhotoPipeline`]: placemark_core::PhotoPipeline

pub mod mutations;
pub mod progress;
pub mod upload;

pub use mutations::{MutationDeps, ReviewMutations};
pub use progress::{
    MutationOperation, MutationOptions, MutationProgress, MutationStage, ProgressCallback,
};
pub use upload::{photo_storage_path, UploadOutcome};
