//! Review create / update / delete.
//!
//! Ordering rules every operation follows:
//!
//! 1. Photo uploads finish before the review pair is written, so a stored
//!    review never references a photo that is not in storage.
//! 2. If the upload loop or the write fails, only the photos uploaded by
//!    this call are deleted, then the original error is returned.
//! 3. Photos that stop being referenced are deleted only after the write
//!    succeeds.
//!
//! Each operation runs on its own task, so a caller that stops waiting does
//! not interrupt it between an upload and its rollback.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use placemark_core::defaults::STEP_TIMEOUT_MS;
use placemark_core::{
    run_to_completion, with_timeout, Clock, CreateReviewInput, DeleteReviewInput, Error,
    IdGenerator, PhotoPipeline, Result, ReviewPhoto, ReviewRecord, ReviewRepository, SystemClock,
    UpdateReviewInput,
};

use crate::progress::{MutationOperation, MutationOptions, MutationProgress, MutationStage};
use crate::upload::{delete_paths_best_effort, upload_new_photos, UploadContext, UploadOutcome};

/// Collaborators of the mutation engine.
#[derive(Clone)]
pub struct MutationDeps {
    pub clock: Arc<dyn Clock>,
    /// Review id source. `None` asks the repository.
    pub ids: Option<Arc<dyn IdGenerator>>,
    pub repository: Arc<dyn ReviewRepository>,
    pub photos: Arc<dyn PhotoPipeline>,
    /// Bound on each compress, upload and pre-update load.
    pub step_timeout: Duration,
}

impl MutationDeps {
    pub fn new(repository: Arc<dyn ReviewRepository>, photos: Arc<dyn PhotoPipeline>) -> Self {
        Self {
            clock: Arc::new(SystemClock),
            ids: None,
            repository,
            photos,
            step_timeout: Duration::from_millis(STEP_TIMEOUT_MS),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn with_step_timeout(mut self, step_timeout: Duration) -> Self {
        self.step_timeout = step_timeout;
        self
    }
}

/// Review mutation engine. Holds no state of its own.
#[derive(Clone)]
pub struct ReviewMutations {
    deps: MutationDeps,
}

impl ReviewMutations {
    pub fn new(deps: MutationDeps) -> Self {
        Self { deps }
    }

    pub fn repository(&self) -> &Arc<dyn ReviewRepository> {
        &self.deps.repository
    }

    fn next_review_id(&self) -> String {
        match self.deps.ids {
            Some(ref ids) => ids.review_id(),
            None => self.deps.repository.create_review_id(),
        }
    }

    fn upload_context<'a>(
        &'a self,
        author_id: &'a str,
        review_id: &'a str,
        operation: MutationOperation,
        options: &'a MutationOptions,
    ) -> UploadContext<'a> {
        UploadContext {
            photos: self.deps.photos.as_ref(),
            clock: self.deps.clock.as_ref(),
            step_timeout: self.deps.step_timeout,
            author_id,
            review_id,
            operation,
            options,
        }
    }

    async fn rollback(&self, uploaded: &[ReviewPhoto]) {
        delete_paths_best_effort(
            self.deps.photos.as_ref(),
            uploaded.iter().map(|photo| photo.path.as_str()),
            "rollback",
        )
        .await;
    }

    /// Create a review, uploading every photo draft first.
    pub async fn create_review(
        &self,
        input: CreateReviewInput,
        options: MutationOptions,
    ) -> Result<ReviewRecord> {
        let this = self.clone();
        run_to_completion("reviews.createReview", async move {
            this.run_create(input, options).await
        })
        .await
    }

    async fn run_create(
        &self,
        input: CreateReviewInput,
        options: MutationOptions,
    ) -> Result<ReviewRecord> {
        let review_id = self.next_review_id();
        let now = self.deps.clock.now_iso();
        let started = Instant::now();
        info!(
            review_id = %review_id,
            place_id = %input.place.id,
            photo_drafts = input.photos.len(),
            "reviews: create started"
        );

        let ctx = self.upload_context(&input.author.id, &review_id, MutationOperation::Create, &options);
        let uploaded = match upload_new_photos(&ctx, &input.photos, 0).await {
            UploadOutcome::Complete(uploaded) => uploaded,
            UploadOutcome::Partial { uploaded, cause } => {
                self.rollback(&uploaded).await;
                warn!(review_id = %review_id, rolled_back = uploaded.len(), error = %cause, "reviews: create failed");
                return Err(cause);
            }
        };

        let mut review = ReviewRecord {
            id: review_id.clone(),
            place_id: input.place.id,
            place_title: input.place.title.clone(),
            place_coordinates: input.place.coordinates,
            title: input.place.title,
            notes: input.notes,
            rating: input.rating,
            visibility: input.visibility,
            user_id: input.author.id,
            user_name: input.author.name,
            user_handle: input.author.handle,
            user_avatar: input.author.avatar,
            photos: Vec::new(),
            photo_urls: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
        };
        review.set_photos(uploaded);

        options.emit(MutationProgress {
            operation: MutationOperation::Create,
            stage: MutationStage::Saving,
            completed: review.photos.len(),
            total: review.photos.len().max(1),
            review_id: review_id.clone(),
        });
        if let Err(cause) = self.deps.repository.write_review_pair(&review).await {
            self.rollback(&review.photos).await;
            warn!(review_id = %review_id, rolled_back = review.photos.len(), error = %cause, "reviews: create write failed");
            return Err(cause);
        }

        info!(
            review_id = %review_id,
            uploaded_photos = review.photos.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "reviews: created"
        );
        Ok(review)
    }

    /// Update a review owned by `input.author`.
    ///
    /// Entries of `input.photos` with a storage path are kept as-is, the rest
    /// are uploaded. Existing photos not kept are deleted after the write.
    pub async fn update_review(
        &self,
        input: UpdateReviewInput,
        options: MutationOptions,
    ) -> Result<ReviewRecord> {
        let this = self.clone();
        run_to_completion("reviews.updateReview", async move {
            this.run_update(input, options).await
        })
        .await
    }

    async fn run_update(
        &self,
        input: UpdateReviewInput,
        options: MutationOptions,
    ) -> Result<ReviewRecord> {
        let started = Instant::now();
        info!(
            review_id = %input.review_id,
            place_id = %input.place.id,
            photo_drafts = input.photos.len(),
            "reviews: update started"
        );

        let existing = with_timeout(
            "reviews.loadReview",
            self.deps.step_timeout,
            self.deps.repository.load_review(&input.review_id),
        )
        .await?
        .ok_or_else(|| Error::ReviewNotFound(input.review_id.clone()))?;

        if existing.user_id != input.author.id {
            warn!(
                review_id = %input.review_id,
                user_id = %input.author.id,
                owner_id = %existing.user_id,
                "reviews: update forbidden"
            );
            return Err(Error::ReviewForbidden(input.review_id));
        }

        let retained: Vec<ReviewPhoto> = input
            .photos
            .iter()
            .filter_map(|draft| draft.as_retained())
            .collect();
        let retained_paths: HashSet<&str> = retained.iter().map(|p| p.path.as_str()).collect();
        let removed_paths: Vec<String> = existing
            .photos
            .iter()
            .map(|photo| photo.path.clone())
            .filter(|path| !retained_paths.contains(path.as_str()))
            .collect();

        let ctx = self.upload_context(
            &input.author.id,
            &input.review_id,
            MutationOperation::Update,
            &options,
        );
        let uploaded = match upload_new_photos(&ctx, &input.photos, retained.len()).await {
            UploadOutcome::Complete(uploaded) => uploaded,
            UploadOutcome::Partial { uploaded, cause } => {
                self.rollback(&uploaded).await;
                warn!(review_id = %input.review_id, rolled_back = uploaded.len(), error = %cause, "reviews: update failed");
                return Err(cause);
            }
        };

        let retained_count = retained.len();
        let uploaded_count = uploaded.len();
        let mut merged = retained;
        merged.extend(uploaded.iter().cloned());

        let mut updated = ReviewRecord {
            place_id: input.place.id,
            place_title: input.place.title.clone(),
            place_coordinates: input.place.coordinates.or(existing.place_coordinates),
            title: input.place.title,
            notes: input.notes,
            rating: input.rating,
            visibility: input.visibility,
            user_name: input.author.name,
            user_handle: input.author.handle,
            user_avatar: input.author.avatar,
            updated_at: self.deps.clock.now_iso(),
            ..existing
        };
        updated.set_photos(merged);

        options.emit(MutationProgress {
            operation: MutationOperation::Update,
            stage: MutationStage::Saving,
            completed: updated.photos.len(),
            total: updated.photos.len().max(1),
            review_id: updated.id.clone(),
        });
        if let Err(cause) = self.deps.repository.write_review_pair(&updated).await {
            self.rollback(&uploaded).await;
            warn!(review_id = %updated.id, rolled_back = uploaded_count, error = %cause, "reviews: update write failed");
            return Err(cause);
        }

        delete_paths_best_effort(
            self.deps.photos.as_ref(),
            removed_paths.iter().map(String::as_str),
            "removed-by-update",
        )
        .await;

        info!(
            review_id = %updated.id,
            retained_photos = retained_count,
            uploaded_photos = uploaded_count,
            removed_photos = removed_paths.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "reviews: updated"
        );
        Ok(updated)
    }

    /// Delete a review owned by `input.author_id`. Deleting a missing review
    /// succeeds.
    pub async fn delete_review(&self, input: DeleteReviewInput) -> Result<()> {
        let this = self.clone();
        run_to_completion("reviews.deleteReview", async move { this.run_delete(input).await })
            .await
    }

    async fn run_delete(&self, input: DeleteReviewInput) -> Result<()> {
        let Some(existing) = self.deps.repository.load_review(&input.review_id).await? else {
            debug!(review_id = %input.review_id, "reviews: delete of missing review");
            return Ok(());
        };

        if existing.user_id != input.author_id {
            warn!(
                review_id = %input.review_id,
                user_id = %input.author_id,
                owner_id = %existing.user_id,
                "reviews: delete forbidden"
            );
            return Err(Error::ReviewForbidden(input.review_id));
        }

        self.deps.repository.delete_review_pair(&existing).await?;
        delete_paths_best_effort(
            self.deps.photos.as_ref(),
            existing.photos.iter().map(|photo| photo.path.as_str()),
            "review-deleted",
        )
        .await;

        info!(
            review_id = %existing.id,
            photos = existing.photos.len(),
            "reviews: deleted"
        );
        Ok(())
    }
}
