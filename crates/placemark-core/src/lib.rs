//! # placemark-core
//!
//! Core types, traits, and abstractions for the placemark review service.
//!
//! This crate provides the foundational data structures and trait definitions
//! that the repository, media, mutation and cache crates depend on.
//!
//! All crates log through `tracing` with the snake_case field names listed
//! in [`logging`].

pub mod clock;
pub mod defaults;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod task;
pub mod timeout;
pub mod traits;

// Re-export commonly used types at crate root
pub use clock::{
    format_timestamp, new_review_id, Clock, IdGenerator, ManualClock, RandomIds, SequentialIds,
    SystemClock,
};
pub use error::{Error, Result};
pub use events::{EventBus, StoreEvent};
pub use models::*;
pub use task::run_to_completion;
pub use timeout::with_timeout;
pub use traits::*;
