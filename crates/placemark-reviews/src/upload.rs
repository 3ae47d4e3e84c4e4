//! Sequential photo upload with partial-failure reporting, and rollback.

use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::{debug, warn};

use placemark_core::{
    with_timeout, Clock, Error, PhotoPipeline, ReviewPhoto, ReviewPhotoDraft, UploadPhotoRequest,
};

use crate::progress::{MutationOperation, MutationOptions, MutationProgress, MutationStage};

/// Result of uploading the drafts of one mutation call.
#[derive(Debug)]
pub enum UploadOutcome {
    /// Every draft was compressed and uploaded.
    Complete(Vec<ReviewPhoto>),
    /// A step failed. `uploaded` holds what reached storage before `cause`.
    Partial {
        uploaded: Vec<ReviewPhoto>,
        cause: Error,
    },
}

/// Storage key for a new photo. `sequence` is 1-based.
pub fn photo_storage_path(author_id: &str, review_id: &str, millis: i64, sequence: usize) -> String {
    format!(
        "reviews/{}/{}/photo-{}-{}.jpg",
        author_id, review_id, millis, sequence
    )
}

pub(crate) struct UploadContext<'a> {
    pub photos: &'a dyn PhotoPipeline,
    pub clock: &'a dyn Clock,
    pub step_timeout: Duration,
    pub author_id: &'a str,
    pub review_id: &'a str,
    pub operation: MutationOperation,
    pub options: &'a MutationOptions,
}

impl UploadContext<'_> {
    fn progress(&self, stage: MutationStage, completed: usize, total: usize) {
        self.options.emit(MutationProgress {
            operation: self.operation,
            stage,
            completed,
            total,
            review_id: self.review_id.to_string(),
        });
    }
}

/// Compress and upload every draft without a storage path, in input order.
///
/// Stops at the first failure; the remaining drafts are not attempted.
/// New photos are numbered after `starting_index` so paths never collide
/// with photos the review keeps.
pub(crate) async fn upload_new_photos(
    ctx: &UploadContext<'_>,
    drafts: &[ReviewPhotoDraft],
    starting_index: usize,
) -> UploadOutcome {
    let total = drafts.iter().filter(|draft| draft.is_draft()).count();
    let mut uploaded: Vec<ReviewPhoto> = Vec::with_capacity(total);

    for draft in drafts {
        if !draft.is_draft() {
            continue;
        }
        let sequence = starting_index + uploaded.len() + 1;
        let storage_path =
            photo_storage_path(ctx.author_id, ctx.review_id, ctx.clock.now_millis(), sequence);

        ctx.progress(MutationStage::Compressing, uploaded.len(), total);
        let started = Instant::now();
        let compressed = match with_timeout(
            "reviews.compressPhoto",
            ctx.step_timeout,
            ctx.photos.compress(&draft.uri),
        )
        .await
        {
            Ok(compressed) => compressed,
            Err(cause) => return partial(ctx, uploaded, cause),
        };
        debug!(
            review_id = ctx.review_id,
            photo_index = sequence,
            duration_ms = started.elapsed().as_millis() as u64,
            "reviews: photo compressed"
        );

        ctx.progress(MutationStage::Uploading, uploaded.len(), total);
        let started = Instant::now();
        let request = UploadPhotoRequest {
            source_uri: compressed.uri,
            storage_path,
            content_type: compressed.content_type,
        };
        let photo = match with_timeout(
            "reviews.uploadPhoto",
            ctx.step_timeout,
            ctx.photos.upload(request),
        )
        .await
        {
            Ok(photo) => photo,
            Err(cause) => return partial(ctx, uploaded, cause),
        };
        debug!(
            review_id = ctx.review_id,
            photo_index = sequence,
            storage_path = %photo.path,
            duration_ms = started.elapsed().as_millis() as u64,
            "reviews: photo uploaded"
        );

        uploaded.push(photo);
        ctx.progress(MutationStage::Uploading, uploaded.len(), total);
    }

    UploadOutcome::Complete(uploaded)
}

fn partial(ctx: &UploadContext<'_>, uploaded: Vec<ReviewPhoto>, cause: Error) -> UploadOutcome {
    warn!(
        review_id = ctx.review_id,
        uploaded_count = uploaded.len(),
        error = %cause,
        "reviews: photo upload failed"
    );
    UploadOutcome::Partial { uploaded, cause }
}

/// Delete every path concurrently and wait for all of them.
///
/// Failures are logged with the path and swallowed, so an orphaned blob can
/// be found in the logs; the caller's original error is what gets reported.
pub(crate) async fn delete_paths_best_effort<'a, I>(photos: &dyn PhotoPipeline, paths: I, reason: &str)
where
    I: IntoIterator<Item = &'a str>,
{
    let paths: Vec<&str> = paths.into_iter().collect();
    if paths.is_empty() {
        return;
    }
    let results = join_all(paths.iter().map(|path| photos.delete_photo(path))).await;
    for (path, result) in paths.iter().zip(results) {
        if let Err(e) = result {
            warn!(storage_path = %path, reason, error = %e, "reviews: photo delete failed, blob may be orphaned");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_path_format() {
        assert_eq!(
            photo_storage_path("user-1", "review-9", 1739181600000, 2),
            "reviews/user-1/review-9/photo-1739181600000-2.jpg"
        );
    }
}
