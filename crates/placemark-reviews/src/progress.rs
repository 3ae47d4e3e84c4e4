//! Progress reporting for review mutations.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

/// Which mutation is reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationOperation {
    Create,
    Update,
}

/// Stage of a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationStage {
    Compressing,
    Uploading,
    Saving,
}

/// One progress report. `completed` counts photos finished so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationProgress {
    pub operation: MutationOperation,
    pub stage: MutationStage,
    pub completed: usize,
    pub total: usize,
    pub review_id: String,
}

pub type ProgressCallback = Arc<dyn Fn(MutationProgress) + Send + Sync>;

/// Per-call options.
#[derive(Clone, Default)]
pub struct MutationOptions {
    pub on_progress: Option<ProgressCallback>,
}

impl MutationOptions {
    pub fn with_progress(callback: impl Fn(MutationProgress) + Send + Sync + 'static) -> Self {
        Self {
            on_progress: Some(Arc::new(callback)),
        }
    }

    pub(crate) fn emit(&self, progress: MutationProgress) {
        if let Some(ref callback) = self.on_progress {
            callback(progress);
        }
    }
}

impl fmt::Debug for MutationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationOptions")
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}
