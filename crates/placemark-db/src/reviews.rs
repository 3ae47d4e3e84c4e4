//! Review repositories.
//!
//! A review lives in two documents that are always written and deleted
//! together:
//!
//! - canonical record at `reviews/{reviewId}`
//! - author projection at `userReviews/{userId}/items/{reviewId}`

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tokio::sync::RwLock;
use tracing::{debug, info, trace};

use placemark_core::defaults::REVIEW_LIST_LIMIT;
use placemark_core::{
    new_review_id, newest_review_first, DocumentQuery, DocumentStore, Result, ReviewPhoto,
    ReviewRecord, ReviewRepository, ReviewVisibility, WriteBatch,
};

use crate::json::{owned_str, str_field};

/// Collection holding canonical review records.
pub const REVIEWS_COLLECTION: &str = "reviews";

/// Collection holding one author's review projections.
pub fn projection_collection(user_id: &str) -> String {
    format!("userReviews/{}/items", user_id)
}

/// Encode a review as the document payload shared by both locations.
pub fn encode_review(review: &ReviewRecord) -> JsonValue {
    json!({
        "id": review.id,
        "placeId": review.place_id,
        "placeTitle": review.place_title,
        "placeCoordinates": review.place_coordinates,
        "title": review.title,
        "notes": review.notes,
        "rating": review.rating,
        "visibility": review.visibility.as_str(),
        "userId": review.user_id,
        "userName": review.user_name,
        "userHandle": review.user_handle,
        "userAvatar": review.user_avatar,
        "photos": review.photos,
        "photoUrls": review.photo_urls,
        "createdAt": review.created_at,
        "updatedAt": review.updated_at,
    })
}

fn decode_photo(value: &JsonValue) -> Option<ReviewPhoto> {
    let path = value.get("path")?.as_str()?;
    let url = value.get("url")?.as_str()?;
    Some(ReviewPhoto::new(path, url))
}

fn decode_coordinates(value: Option<&JsonValue>) -> Option<[f64; 2]> {
    let items = value?.as_array()?;
    if items.len() < 2 {
        return None;
    }
    let longitude = items[0].as_f64()?;
    let latitude = items[1].as_f64()?;
    (longitude.is_finite() && latitude.is_finite()).then_some([longitude, latitude])
}

/// Decode a stored review document.
///
/// Returns `None` when any required field is missing or has the wrong type.
/// Malformed photos are dropped, `photoUrls` is recomputed from the kept
/// photos, and unusable coordinates become `None`.
pub fn decode_review(id: &str, raw: &JsonValue) -> Option<ReviewRecord> {
    let map = raw.as_object()?;

    let photos: Vec<ReviewPhoto> = map
        .get("photos")
        .and_then(JsonValue::as_array)
        .map(|items| items.iter().filter_map(decode_photo).collect())
        .unwrap_or_default();
    let visibility = ReviewVisibility::parse_lenient(str_field(map, "visibility").unwrap_or(""));

    let mut record = ReviewRecord {
        id: id.to_string(),
        place_id: owned_str(map, "placeId")?,
        place_title: owned_str(map, "placeTitle")?,
        place_coordinates: decode_coordinates(map.get("placeCoordinates")),
        title: owned_str(map, "title")?,
        notes: owned_str(map, "notes")?,
        rating: map.get("rating")?.as_f64()?,
        visibility,
        user_id: owned_str(map, "userId")?,
        user_name: owned_str(map, "userName")?,
        user_handle: owned_str(map, "userHandle")?,
        user_avatar: owned_str(map, "userAvatar"),
        photos: Vec::new(),
        photo_urls: Vec::new(),
        created_at: owned_str(map, "createdAt")?,
        updated_at: owned_str(map, "updatedAt")?,
    };
    record.set_photos(photos);
    Some(record)
}

fn decode_documents(docs: Vec<placemark_core::Document>) -> Vec<ReviewRecord> {
    let total = docs.len();
    let reviews: Vec<ReviewRecord> = docs
        .into_iter()
        .filter_map(|doc| {
            let decoded = decode_review(&doc.id, &doc.data);
            if decoded.is_none() {
                trace!(review_id = %doc.id, "skipping malformed review document");
            }
            decoded
        })
        .collect();
    if reviews.len() < total {
        debug!(
            skipped = total - reviews.len(),
            total, "dropped malformed review documents"
        );
    }
    reviews
}

// =============================================================================
// DOCUMENT-BACKED REPOSITORY
// =============================================================================

/// Review repository over a [`DocumentStore`].
pub struct DocumentReviewRepository {
    store: Arc<dyn DocumentStore>,
}

impl DocumentReviewRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ReviewRepository for DocumentReviewRepository {
    fn create_review_id(&self) -> String {
        new_review_id()
    }

    async fn load_review(&self, review_id: &str) -> Result<Option<ReviewRecord>> {
        let doc = self.store.get(REVIEWS_COLLECTION, review_id).await?;
        Ok(doc.and_then(|doc| decode_review(&doc.id, &doc.data)))
    }

    async fn write_review_pair(&self, review: &ReviewRecord) -> Result<()> {
        let payload = encode_review(review);
        let batch = WriteBatch::new()
            .set(REVIEWS_COLLECTION, &review.id, payload.clone())
            .set(projection_collection(&review.user_id), &review.id, payload);
        self.store.commit(batch).await?;
        debug!(review_id = %review.id, user_id = %review.user_id, "reviews: pair written");
        Ok(())
    }

    async fn delete_review_pair(&self, review: &ReviewRecord) -> Result<()> {
        let batch = WriteBatch::new()
            .delete(REVIEWS_COLLECTION, &review.id)
            .delete(projection_collection(&review.user_id), &review.id);
        self.store.commit(batch).await?;
        info!(review_id = %review.id, user_id = %review.user_id, "reviews: pair deleted");
        Ok(())
    }

    async fn list_reviews_for_place(&self, place_id: &str) -> Result<Vec<ReviewRecord>> {
        let docs = self
            .store
            .query(
                DocumentQuery::collection(REVIEWS_COLLECTION)
                    .where_eq("placeId", json!(place_id))
                    .order_by_desc("createdAt")
                    .limit(REVIEW_LIST_LIMIT),
            )
            .await?;
        Ok(decode_documents(docs))
    }

    async fn list_recent_reviews(&self, limit: usize) -> Result<Vec<ReviewRecord>> {
        let bounded = limit.max(1);
        let docs = self
            .store
            .query(
                DocumentQuery::collection(REVIEWS_COLLECTION)
                    .order_by_desc("createdAt")
                    .limit(bounded),
            )
            .await?;
        Ok(decode_documents(docs))
    }
}

// =============================================================================
// IN-MEMORY REPOSITORY
// =============================================================================

#[derive(Default)]
struct MemoryState {
    canonical: HashMap<String, ReviewRecord>,
    projections: HashMap<String, HashMap<String, ReviewRecord>>,
}

/// Review repository kept in process memory.
///
/// Canonical records and author projections share one lock so both sides of
/// a pair change together.
#[derive(Default)]
pub struct MemoryReviewRepository {
    state: RwLock<MemoryState>,
}

impl MemoryReviewRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Author projection of a review, if present.
    pub async fn projection(&self, user_id: &str, review_id: &str) -> Option<ReviewRecord> {
        self.state
            .read()
            .await
            .projections
            .get(user_id)
            .and_then(|items| items.get(review_id))
            .cloned()
    }

    /// Number of canonical records.
    pub async fn len(&self) -> usize {
        self.state.read().await.canonical.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ReviewRepository for MemoryReviewRepository {
    fn create_review_id(&self) -> String {
        new_review_id()
    }

    async fn load_review(&self, review_id: &str) -> Result<Option<ReviewRecord>> {
        Ok(self.state.read().await.canonical.get(review_id).cloned())
    }

    async fn write_review_pair(&self, review: &ReviewRecord) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .projections
            .entry(review.user_id.clone())
            .or_default()
            .insert(review.id.clone(), review.clone());
        state.canonical.insert(review.id.clone(), review.clone());
        Ok(())
    }

    async fn delete_review_pair(&self, review: &ReviewRecord) -> Result<()> {
        let mut state = self.state.write().await;
        state.canonical.remove(&review.id);
        if let Some(items) = state.projections.get_mut(&review.user_id) {
            items.remove(&review.id);
        }
        Ok(())
    }

    async fn list_reviews_for_place(&self, place_id: &str) -> Result<Vec<ReviewRecord>> {
        let state = self.state.read().await;
        let mut reviews: Vec<ReviewRecord> = state
            .canonical
            .values()
            .filter(|review| review.place_id == place_id)
            .cloned()
            .collect();
        reviews.sort_by(newest_review_first);
        reviews.truncate(REVIEW_LIST_LIMIT);
        Ok(reviews)
    }

    async fn list_recent_reviews(&self, limit: usize) -> Result<Vec<ReviewRecord>> {
        let state = self.state.read().await;
        let mut reviews: Vec<ReviewRecord> = state.canonical.values().cloned().collect();
        reviews.sort_by(newest_review_first);
        reviews.truncate(limit.max(1));
        Ok(reviews)
    }
}
