//! Domain models for reviews, photos and engagement.

use serde::{Deserialize, Serialize};

// =============================================================================
// REVIEWS
// =============================================================================

/// Who can see a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReviewVisibility {
    #[default]
    Followers,
    Subscribers,
}

impl ReviewVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewVisibility::Followers => "followers",
            ReviewVisibility::Subscribers => "subscribers",
        }
    }

    /// Lenient parse: anything other than `subscribers` is `followers`.
    pub fn parse_lenient(value: &str) -> Self {
        if value == "subscribers" {
            ReviewVisibility::Subscribers
        } else {
            ReviewVisibility::Followers
        }
    }
}

/// An uploaded review photo.
///
/// `path` is the durable storage key used for deletion; `url` is the
/// fetchable address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReviewPhoto {
    pub path: String,
    pub url: String,
}

impl ReviewPhoto {
    pub fn new(path: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            url: url.into(),
        }
    }
}

/// A photo as submitted by the client.
///
/// Without a `storage_path` it is a draft that still has to be uploaded;
/// with one it refers to a photo the review already owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewPhotoDraft {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
}

impl ReviewPhotoDraft {
    /// A new local photo that needs uploading.
    pub fn local(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            storage_path: None,
        }
    }

    /// An already-uploaded photo kept as-is.
    pub fn retained(photo: &ReviewPhoto) -> Self {
        Self {
            uri: photo.url.clone(),
            storage_path: Some(photo.path.clone()),
        }
    }

    pub fn is_draft(&self) -> bool {
        self.storage_path.is_none()
    }

    /// The photo this entry refers to if it was uploaded before.
    pub fn as_retained(&self) -> Option<ReviewPhoto> {
        self.storage_path
            .as_ref()
            .map(|path| ReviewPhoto::new(path.clone(), self.uri.clone()))
    }
}

/// Author snapshot embedded into a review at write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewAuthor {
    pub id: String,
    pub name: String,
    pub handle: String,
    pub avatar: Option<String>,
}

/// The place being reviewed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewPlace {
    pub id: String,
    pub title: String,
    /// `[longitude, latitude]`
    #[serde(default)]
    pub coordinates: Option<[f64; 2]>,
}

/// The canonical review entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecord {
    pub id: String,
    pub place_id: String,
    pub place_title: String,
    pub place_coordinates: Option<[f64; 2]>,
    pub title: String,
    pub notes: String,
    pub rating: f64,
    pub visibility: ReviewVisibility,
    pub user_id: String,
    pub user_name: String,
    pub user_handle: String,
    pub user_avatar: Option<String>,
    pub photos: Vec<ReviewPhoto>,
    pub photo_urls: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ReviewRecord {
    /// Replace the photo list, keeping `photo_urls` in lockstep.
    pub fn set_photos(&mut self, photos: Vec<ReviewPhoto>) {
        self.photo_urls = photos.iter().map(|photo| photo.url.clone()).collect();
        self.photos = photos;
    }

    /// Storage paths of every photo the review owns.
    pub fn photo_paths(&self) -> Vec<String> {
        self.photos.iter().map(|photo| photo.path.clone()).collect()
    }

    /// True when `photo_urls` is exactly the projection of `photos`.
    pub fn photo_urls_consistent(&self) -> bool {
        self.photo_urls.len() == self.photos.len()
            && self
                .photos
                .iter()
                .zip(self.photo_urls.iter())
                .all(|(photo, url)| &photo.url == url)
    }

    /// Last-writer-wins by `updated_at`: true if `incoming` may replace `self`.
    pub fn superseded_by(&self, incoming: &ReviewRecord) -> bool {
        self.updated_at.as_str() <= incoming.updated_at.as_str()
    }
}

/// Input for creating a review.
#[derive(Debug, Clone)]
pub struct CreateReviewInput {
    pub author: ReviewAuthor,
    pub place: ReviewPlace,
    pub notes: String,
    pub rating: f64,
    pub visibility: ReviewVisibility,
    pub photos: Vec<ReviewPhotoDraft>,
}

/// Input for updating a review. Photos with a `storage_path` are retained.
#[derive(Debug, Clone)]
pub struct UpdateReviewInput {
    pub review_id: String,
    pub author: ReviewAuthor,
    pub place: ReviewPlace,
    pub notes: String,
    pub rating: f64,
    pub visibility: ReviewVisibility,
    pub photos: Vec<ReviewPhotoDraft>,
}

/// Input for deleting a review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteReviewInput {
    pub review_id: String,
    pub author_id: String,
}

// =============================================================================
// PHOTO PIPELINE
// =============================================================================

/// A compressed local photo ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedPhoto {
    pub uri: String,
    pub content_type: String,
}

/// Request for uploading one photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPhotoRequest {
    pub source_uri: String,
    pub storage_path: String,
    pub content_type: String,
}

// =============================================================================
// ENGAGEMENT
// =============================================================================

/// Like state of one review as seen by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeState {
    pub review_id: String,
    pub user_id: String,
    pub liked: bool,
    pub like_count: i64,
}

/// A comment on a review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewComment {
    pub id: String,
    pub review_id: String,
    pub user_id: String,
    pub user_name: String,
    pub user_handle: String,
    pub user_avatar: Option<String>,
    pub text: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for posting a comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCommentInput {
    pub review_id: String,
    pub user_id: String,
    pub user_name: String,
    pub user_handle: String,
    pub user_avatar: Option<String>,
    pub text: String,
}

/// One page of comments, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentPage {
    pub items: Vec<ReviewComment>,
    pub has_more: bool,
}

/// Newest `created_at` first.
pub fn newest_comment_first(a: &ReviewComment, b: &ReviewComment) -> std::cmp::Ordering {
    b.created_at.cmp(&a.created_at)
}

/// Newest `created_at` first, ties broken by id for a stable order.
pub fn newest_review_first(a: &ReviewRecord, b: &ReviewRecord) -> std::cmp::Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// A `review_published` notification addressed to one follower.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewPublishedNotification {
    pub user_id: String,
    pub actor_user_id: String,
    pub actor_name: String,
    pub actor_handle: String,
    pub actor_avatar: Option<String>,
    pub created_at: String,
    pub target_review_id: String,
    pub target_review_place_title: String,
    pub target_review_image_url: Option<String>,
    pub target_review_visibility: ReviewVisibility,
}

impl ReviewPublishedNotification {
    pub fn for_follower(review: &ReviewRecord, follower_id: &str, created_at: &str) -> Self {
        Self {
            user_id: follower_id.to_string(),
            actor_user_id: review.user_id.clone(),
            actor_name: review.user_name.clone(),
            actor_handle: review.user_handle.clone(),
            actor_avatar: review.user_avatar.clone(),
            created_at: created_at.to_string(),
            target_review_id: review.id.clone(),
            target_review_place_title: review.place_title.clone(),
            target_review_image_url: review.photo_urls.first().cloned(),
            target_review_visibility: review.visibility,
        }
    }
}
