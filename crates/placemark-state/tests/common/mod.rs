//! Collaborators for cache tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use placemark_core::{
    Clock, CommentPage, CompressedPhoto, CreateCommentInput, CreateReviewInput, EngagementRepository,
    Error, FollowerFanout, LikeState, ManualClock, PhotoPipeline, Result, ReviewAuthor,
    ReviewComment, ReviewPhoto, ReviewPlace, ReviewPublishedNotification, ReviewRecord,
    ReviewRepository, ReviewVisibility, SequentialIds, UploadPhotoRequest,
};
use placemark_db::{MemoryEngagementRepository, MemoryReviewRepository};
use placemark_reviews::{MutationDeps, ReviewMutations};
use placemark_state::{EngagementStore, ReviewStore};

pub const START: &str = "2026-02-10T10:00:00.000Z";

/// Review repository with call counters, gates on point reads and list
/// loads, and switchable failures.
#[derive(Default)]
pub struct ScriptedRepository {
    pub inner: MemoryReviewRepository,
    pub gate: Option<Semaphore>,
    pub list_gate: Option<Semaphore>,
    pub fail_lists: AtomicBool,
    pub fail_writes: AtomicBool,
    pub loads: AtomicUsize,
    pub lists: AtomicUsize,
}

impl ScriptedRepository {
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    pub fn gated_lists() -> Self {
        Self {
            list_gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    /// Let every waiting and future point read through.
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1024);
        }
    }

    /// Let every waiting and future list load through.
    pub fn release_lists(&self) {
        if let Some(gate) = &self.list_gate {
            gate.add_permits(1024);
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    pub async fn seed(&self, review: &ReviewRecord) {
        self.inner.write_review_pair(review).await.unwrap();
    }
}

#[async_trait]
impl ReviewRepository for ScriptedRepository {
    fn create_review_id(&self) -> String {
        self.inner.create_review_id()
    }

    async fn load_review(&self, review_id: &str) -> Result<Option<ReviewRecord>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| Error::Internal(e.to_string()))?;
        }
        self.inner.load_review(review_id).await
    }

    async fn write_review_pair(&self, review: &ReviewRecord) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Database("batch commit failed".to_string()));
        }
        self.inner.write_review_pair(review).await
    }

    async fn delete_review_pair(&self, review: &ReviewRecord) -> Result<()> {
        self.inner.delete_review_pair(review).await
    }

    async fn list_reviews_for_place(&self, place_id: &str) -> Result<Vec<ReviewRecord>> {
        self.inner.list_reviews_for_place(place_id).await
    }

    async fn list_recent_reviews(&self, limit: usize) -> Result<Vec<ReviewRecord>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.list_gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| Error::Internal(e.to_string()))?;
        }
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(Error::Request("network unreachable".to_string()));
        }
        self.inner.list_recent_reviews(limit).await
    }
}

/// Pipeline that accepts everything without touching storage.
#[derive(Default)]
pub struct AcceptingPipeline {
    pub deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl PhotoPipeline for AcceptingPipeline {
    async fn compress(&self, source_uri: &str) -> Result<CompressedPhoto> {
        Ok(CompressedPhoto {
            uri: source_uri.to_string(),
            content_type: "image/jpeg".to_string(),
        })
    }

    async fn upload(&self, request: UploadPhotoRequest) -> Result<ReviewPhoto> {
        let url = format!("https://cdn.test/{}", request.storage_path);
        Ok(ReviewPhoto::new(request.storage_path, url))
    }

    async fn delete_photo(&self, storage_path: &str) -> Result<()> {
        self.deleted.lock().unwrap().push(storage_path.to_string());
        Ok(())
    }
}

/// Follower fan-out that fails the first `fail_first` deliveries.
#[derive(Default)]
pub struct RecordingFanout {
    pub followers: Vec<String>,
    pub fail_first: usize,
    pub fail_lookup: bool,
    pub attempts: Mutex<Vec<ReviewPublishedNotification>>,
}

impl RecordingFanout {
    pub fn attempts(&self) -> Vec<ReviewPublishedNotification> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl FollowerFanout for RecordingFanout {
    async fn list_follower_ids(&self, _user_id: &str) -> Result<Vec<String>> {
        if self.fail_lookup {
            return Err(Error::Request("followers unavailable".to_string()));
        }
        Ok(self.followers.clone())
    }

    async fn create_notification(&self, notification: ReviewPublishedNotification) -> Result<()> {
        let mut attempts = self.attempts.lock().unwrap();
        attempts.push(notification);
        if attempts.len() <= self.fail_first {
            return Err(Error::Request("temporary-notification-error".to_string()));
        }
        Ok(())
    }
}

pub struct ReviewHarness {
    pub clock: Arc<ManualClock>,
    pub repo: Arc<ScriptedRepository>,
    pub store: ReviewStore,
}

impl ReviewHarness {
    pub fn clock_millis(&self) -> i64 {
        self.clock.now_millis()
    }
}

pub fn review_harness(repo: ScriptedRepository) -> ReviewHarness {
    review_harness_with_fanout(repo, None)
}

pub fn review_harness_with_fanout(
    repo: ScriptedRepository,
    fanout: Option<Arc<RecordingFanout>>,
) -> ReviewHarness {
    let clock = Arc::new(ManualClock::at(START));
    let repo = Arc::new(repo);
    let deps = MutationDeps::new(repo.clone(), Arc::new(AcceptingPipeline::default()))
        .with_clock(clock.clone())
        .with_ids(Arc::new(SequentialIds::new()));
    let mut builder = ReviewStore::builder(ReviewMutations::new(deps)).with_clock(clock.clone());
    if let Some(fanout) = fanout {
        builder = builder.with_fanout(fanout);
    }
    ReviewHarness {
        clock,
        repo,
        store: builder.build(),
    }
}

pub fn review(id: &str, created_at: &str, updated_at: &str) -> ReviewRecord {
    ReviewRecord {
        id: id.to_string(),
        place_id: "place-1".to_string(),
        place_title: "Tidewater Oyster Bar".to_string(),
        place_coordinates: None,
        title: "Tidewater Oyster Bar".to_string(),
        notes: "Test".to_string(),
        rating: 8.0,
        visibility: ReviewVisibility::Followers,
        user_id: "user-1".to_string(),
        user_name: "Morgan".to_string(),
        user_handle: "morgan".to_string(),
        user_avatar: None,
        photos: Vec::new(),
        photo_urls: Vec::new(),
        created_at: created_at.to_string(),
        updated_at: updated_at.to_string(),
    }
}

pub fn create_input(author_id: &str) -> CreateReviewInput {
    CreateReviewInput {
        author: ReviewAuthor {
            id: author_id.to_string(),
            name: "Author".to_string(),
            handle: "author".to_string(),
            avatar: None,
        },
        place: ReviewPlace {
            id: "place-1".to_string(),
            title: "Tidewater Oyster Bar".to_string(),
            coordinates: None,
        },
        notes: "Briny and cold".to_string(),
        rating: 8.0,
        visibility: ReviewVisibility::Followers,
        photos: Vec::new(),
    }
}

/// Engagement repository with switchable failures and call counters.
pub struct ScriptedEngagement {
    pub inner: MemoryEngagementRepository,
    pub fail_set_liked: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_delete: AtomicBool,
    pub fail_list: AtomicBool,
    pub like_count_override: Option<i64>,
    /// Holds `set_liked` calls until released.
    pub like_gate: Option<Semaphore>,
    pub like_writes_started: AtomicUsize,
    pub like_writes: Mutex<Vec<bool>>,
    pub like_state_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
}

impl ScriptedEngagement {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            inner: MemoryEngagementRepository::new(clock),
            fail_set_liked: AtomicBool::new(false),
            fail_create: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            fail_list: AtomicBool::new(false),
            like_count_override: None,
            like_gate: None,
            like_writes_started: AtomicUsize::new(0),
            like_writes: Mutex::new(Vec::new()),
            like_state_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn release_likes(&self) {
        if let Some(gate) = &self.like_gate {
            gate.add_permits(1024);
        }
    }

    /// `liked` values sent to `set_liked`, in arrival order.
    pub fn like_writes(&self) -> Vec<bool> {
        self.like_writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl EngagementRepository for ScriptedEngagement {
    async fn get_like_state(&self, review_id: &str, user_id: &str) -> Result<LikeState> {
        self.like_state_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.inner.get_like_state(review_id, user_id).await?;
        if let Some(count) = self.like_count_override {
            state.like_count = count;
        }
        Ok(state)
    }

    async fn set_liked(&self, review_id: &str, user_id: &str, liked: bool) -> Result<()> {
        self.like_writes_started.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.like_gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| Error::Internal(e.to_string()))?;
        }
        self.like_writes.lock().unwrap().push(liked);
        if self.fail_set_liked.load(Ordering::SeqCst) {
            return Err(Error::Request("like write rejected".to_string()));
        }
        self.inner.set_liked(review_id, user_id, liked).await
    }

    async fn get_like_count(&self, review_id: &str) -> Result<i64> {
        self.inner.get_like_count(review_id).await
    }

    async fn get_comment_count(&self, review_id: &str) -> Result<i64> {
        self.inner.get_comment_count(review_id).await
    }

    async fn list_comments(&self, review_id: &str, limit: usize) -> Result<CommentPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Error::Request("comments unavailable".to_string()));
        }
        self.inner.list_comments(review_id, limit).await
    }

    async fn create_comment(&self, input: CreateCommentInput) -> Result<ReviewComment> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::Request("comment write rejected".to_string()));
        }
        self.inner.create_comment(input).await
    }

    async fn delete_comment(&self, review_id: &str, comment_id: &str, user_id: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(Error::Request("comment delete rejected".to_string()));
        }
        self.inner.delete_comment(review_id, comment_id, user_id).await
    }
}

pub struct EngagementHarness {
    pub clock: Arc<ManualClock>,
    pub repo: Arc<ScriptedEngagement>,
    pub store: EngagementStore,
}

pub fn engagement_harness(configure: impl FnOnce(&mut ScriptedEngagement)) -> EngagementHarness {
    let clock = Arc::new(ManualClock::at(START));
    let mut repo = ScriptedEngagement::new(clock.clone());
    configure(&mut repo);
    let repo = Arc::new(repo);
    EngagementHarness {
        clock,
        store: EngagementStore::new(repo.clone()),
        repo,
    }
}

pub fn comment_input(user_id: &str, text: &str) -> placemark_state::PostCommentInput {
    placemark_state::PostCommentInput {
        review_id: "review-1".to_string(),
        user_id: user_id.to_string(),
        user_name: "Riley".to_string(),
        user_handle: "riley".to_string(),
        user_avatar: None,
        text: text.to_string(),
    }
}
