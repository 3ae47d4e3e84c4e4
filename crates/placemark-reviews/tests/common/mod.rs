//! Scripted collaborators for mutation tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use placemark_core::{
    CompressedPhoto, CreateReviewInput, Error, ManualClock, PhotoPipeline, Result, ReviewAuthor,
    ReviewPhoto, ReviewPhotoDraft, ReviewPlace, ReviewRecord, ReviewRepository, ReviewVisibility,
    SequentialIds, UploadPhotoRequest,
};
use placemark_db::MemoryReviewRepository;
use placemark_reviews::{MutationDeps, ReviewMutations};

pub const START: &str = "2026-02-10T10:00:00.000Z";

/// Photo pipeline that fails on the n-th (1-based) compress or upload call.
#[derive(Default)]
pub struct ScriptedPipeline {
    pub fail_compress_at: Option<usize>,
    pub fail_upload_at: Option<usize>,
    pub compress_delay: Option<Duration>,
    pub fail_deletes: AtomicBool,
    pub compress_calls: AtomicUsize,
    pub upload_calls: AtomicUsize,
    pub uploaded: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
}

impl ScriptedPipeline {
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn uploaded(&self) -> Vec<String> {
        self.uploaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl PhotoPipeline for ScriptedPipeline {
    async fn compress(&self, source_uri: &str) -> Result<CompressedPhoto> {
        let call = self.compress_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.compress_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_compress_at == Some(call) {
            return Err(Error::Media(format!("cannot decode {}", source_uri)));
        }
        Ok(CompressedPhoto {
            uri: format!("{}.compressed.jpg", source_uri),
            content_type: "image/jpeg".to_string(),
        })
    }

    async fn upload(&self, request: UploadPhotoRequest) -> Result<ReviewPhoto> {
        let call = self.upload_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_upload_at == Some(call) {
            return Err(Error::Storage("upload rejected".to_string()));
        }
        self.uploaded
            .lock()
            .unwrap()
            .push(request.storage_path.clone());
        let url = format!("https://cdn.test/{}", request.storage_path);
        Ok(ReviewPhoto::new(request.storage_path, url))
    }

    async fn delete_photo(&self, storage_path: &str) -> Result<()> {
        self.deleted.lock().unwrap().push(storage_path.to_string());
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Error::Storage("delete rejected".to_string()));
        }
        Ok(())
    }
}

/// Memory repository whose writes can be made to fail.
#[derive(Default)]
pub struct FlakyRepository {
    pub inner: MemoryReviewRepository,
    pub fail_writes: AtomicBool,
    pub loads: AtomicUsize,
    pub writes: AtomicUsize,
}

#[async_trait]
impl ReviewRepository for FlakyRepository {
    fn create_review_id(&self) -> String {
        self.inner.create_review_id()
    }

    async fn load_review(&self, review_id: &str) -> Result<Option<ReviewRecord>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load_review(review_id).await
    }

    async fn write_review_pair(&self, review: &ReviewRecord) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
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
        self.inner.list_recent_reviews(limit).await
    }
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub repo: Arc<FlakyRepository>,
    pub photos: Arc<ScriptedPipeline>,
    pub mutations: ReviewMutations,
}

pub fn harness(photos: ScriptedPipeline) -> Harness {
    let clock = Arc::new(ManualClock::at(START));
    let repo = Arc::new(FlakyRepository::default());
    let photos = Arc::new(photos);
    let deps = MutationDeps::new(repo.clone(), photos.clone())
        .with_clock(clock.clone())
        .with_ids(Arc::new(SequentialIds::new()));
    Harness {
        clock,
        repo,
        photos,
        mutations: ReviewMutations::new(deps),
    }
}

pub fn author() -> ReviewAuthor {
    ReviewAuthor {
        id: "user-1".to_string(),
        name: "Morgan".to_string(),
        handle: "morgan".to_string(),
        avatar: None,
    }
}

pub fn place() -> ReviewPlace {
    ReviewPlace {
        id: "place-1".to_string(),
        title: "Tidewater Oyster Bar".to_string(),
        coordinates: Some([-122.41, 37.77]),
    }
}

pub fn create_input(drafts: &[&str]) -> CreateReviewInput {
    CreateReviewInput {
        author: author(),
        place: place(),
        notes: "Briny and cold".to_string(),
        rating: 9.0,
        visibility: ReviewVisibility::Followers,
        photos: drafts.iter().map(|uri| ReviewPhotoDraft::local(*uri)).collect(),
    }
}
