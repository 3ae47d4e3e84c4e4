//! Engagement repositories: likes and comments.
//!
//! Document layout:
//!
//! - like marker at `reviewLikes/{reviewId}/users/{userId}`
//! - comment at `reviewComments/{reviewId}/items/{commentId}`

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tokio::sync::RwLock;
use tracing::{debug, trace};
use uuid::Uuid;

use placemark_core::{
    newest_comment_first, Clock, CommentPage, CreateCommentInput, DocumentQuery, DocumentStore,
    EngagementRepository, Error, LikeState, Result, ReviewComment, WriteBatch,
};

use crate::json::{nullable_str, owned_str};

fn likes_collection(review_id: &str) -> String {
    format!("reviewLikes/{}/users", review_id)
}

fn comments_collection(review_id: &str) -> String {
    format!("reviewComments/{}/items", review_id)
}

fn new_comment_id() -> String {
    format!("comment-{}", Uuid::now_v7())
}

fn comment_from_input(id: String, input: CreateCommentInput, now: String) -> ReviewComment {
    ReviewComment {
        id,
        review_id: input.review_id,
        user_id: input.user_id,
        user_name: input.user_name,
        user_handle: input.user_handle,
        user_avatar: input.user_avatar,
        text: input.text,
        created_at: now.clone(),
        updated_at: now,
    }
}

fn encode_comment(comment: &ReviewComment) -> JsonValue {
    json!({
        "reviewId": comment.review_id,
        "userId": comment.user_id,
        "userName": comment.user_name,
        "userHandle": comment.user_handle,
        "userAvatar": comment.user_avatar,
        "text": comment.text,
        "createdAt": comment.created_at,
        "updatedAt": comment.updated_at,
    })
}

fn decode_comment(id: &str, raw: &JsonValue) -> Option<ReviewComment> {
    let map = raw.as_object()?;
    Some(ReviewComment {
        id: id.to_string(),
        review_id: owned_str(map, "reviewId")?,
        user_id: owned_str(map, "userId")?,
        user_name: owned_str(map, "userName")?,
        user_handle: owned_str(map, "userHandle")?,
        user_avatar: nullable_str(map, "userAvatar"),
        text: owned_str(map, "text")?,
        created_at: owned_str(map, "createdAt")?,
        updated_at: owned_str(map, "updatedAt")?,
    })
}

// =============================================================================
// DOCUMENT-BACKED REPOSITORY
// =============================================================================

/// Engagement repository over a [`DocumentStore`].
pub struct DocumentEngagementRepository {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl DocumentEngagementRepository {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    async fn count(&self, collection: String) -> Result<i64> {
        let docs = self.store.query(DocumentQuery::collection(collection)).await?;
        Ok(docs.len() as i64)
    }
}

#[async_trait]
impl EngagementRepository for DocumentEngagementRepository {
    async fn get_like_state(&self, review_id: &str, user_id: &str) -> Result<LikeState> {
        let collection = likes_collection(review_id);
        let (marker, like_count) = tokio::try_join!(
            self.store.get(&collection, user_id),
            self.count(collection.clone()),
        )?;
        Ok(LikeState {
            review_id: review_id.to_string(),
            user_id: user_id.to_string(),
            liked: marker.is_some(),
            like_count,
        })
    }

    async fn set_liked(&self, review_id: &str, user_id: &str, liked: bool) -> Result<()> {
        let collection = likes_collection(review_id);
        let batch = if liked {
            WriteBatch::new().set(
                collection,
                user_id,
                json!({
                    "reviewId": review_id,
                    "userId": user_id,
                    "createdAt": self.clock.now_iso(),
                }),
            )
        } else {
            WriteBatch::new().delete(collection, user_id)
        };
        self.store.commit(batch).await?;
        debug!(review_id, user_id, liked, "engagement: like state written");
        Ok(())
    }

    async fn get_like_count(&self, review_id: &str) -> Result<i64> {
        self.count(likes_collection(review_id)).await
    }

    async fn get_comment_count(&self, review_id: &str) -> Result<i64> {
        self.count(comments_collection(review_id)).await
    }

    async fn list_comments(&self, review_id: &str, limit: usize) -> Result<CommentPage> {
        let bounded = limit.max(1);
        let docs = self
            .store
            .query(
                DocumentQuery::collection(comments_collection(review_id))
                    .order_by_desc("createdAt")
                    .limit(bounded),
            )
            .await?;
        let items: Vec<ReviewComment> = docs
            .iter()
            .filter_map(|doc| {
                let decoded = decode_comment(&doc.id, &doc.data);
                if decoded.is_none() {
                    trace!(review_id, comment_id = %doc.id, "skipping malformed comment");
                }
                decoded
            })
            .collect();
        let has_more = items.len() >= bounded;
        Ok(CommentPage { items, has_more })
    }

    async fn create_comment(&self, input: CreateCommentInput) -> Result<ReviewComment> {
        let comment = comment_from_input(new_comment_id(), input, self.clock.now_iso());
        let batch = WriteBatch::new().set(
            comments_collection(&comment.review_id),
            &comment.id,
            encode_comment(&comment),
        );
        self.store.commit(batch).await?;
        debug!(review_id = %comment.review_id, comment_id = %comment.id, "engagement: comment created");
        Ok(comment)
    }

    async fn delete_comment(&self, review_id: &str, comment_id: &str, user_id: &str) -> Result<()> {
        let collection = comments_collection(review_id);
        let Some(existing) = self.store.get(&collection, comment_id).await? else {
            return Ok(());
        };
        let owner = existing.data.get("userId").and_then(JsonValue::as_str);
        if owner != Some(user_id) {
            return Err(Error::CommentDeleteForbidden);
        }
        self.store
            .commit(WriteBatch::new().delete(collection, comment_id))
            .await?;
        debug!(review_id, comment_id, "engagement: comment deleted");
        Ok(())
    }
}

// =============================================================================
// IN-MEMORY REPOSITORY
// =============================================================================

#[derive(Default)]
struct EngagementState {
    likes: HashMap<String, HashSet<String>>,
    comments: HashMap<String, HashMap<String, ReviewComment>>,
}

/// Engagement repository kept in process memory.
pub struct MemoryEngagementRepository {
    state: RwLock<EngagementState>,
    clock: Arc<dyn Clock>,
}

impl MemoryEngagementRepository {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(EngagementState::default()),
            clock,
        }
    }
}

#[async_trait]
impl EngagementRepository for MemoryEngagementRepository {
    async fn get_like_state(&self, review_id: &str, user_id: &str) -> Result<LikeState> {
        let state = self.state.read().await;
        let users = state.likes.get(review_id);
        Ok(LikeState {
            review_id: review_id.to_string(),
            user_id: user_id.to_string(),
            liked: users.is_some_and(|users| users.contains(user_id)),
            like_count: users.map_or(0, |users| users.len() as i64),
        })
    }

    async fn set_liked(&self, review_id: &str, user_id: &str, liked: bool) -> Result<()> {
        let mut state = self.state.write().await;
        let users = state.likes.entry(review_id.to_string()).or_default();
        if liked {
            users.insert(user_id.to_string());
        } else {
            users.remove(user_id);
        }
        Ok(())
    }

    async fn get_like_count(&self, review_id: &str) -> Result<i64> {
        let state = self.state.read().await;
        Ok(state.likes.get(review_id).map_or(0, |users| users.len() as i64))
    }

    async fn get_comment_count(&self, review_id: &str) -> Result<i64> {
        let state = self.state.read().await;
        Ok(state
            .comments
            .get(review_id)
            .map_or(0, |items| items.len() as i64))
    }

    async fn list_comments(&self, review_id: &str, limit: usize) -> Result<CommentPage> {
        let state = self.state.read().await;
        let mut items: Vec<ReviewComment> = state
            .comments
            .get(review_id)
            .map(|items| items.values().cloned().collect())
            .unwrap_or_default();
        items.sort_by(newest_comment_first);
        items.truncate(limit.max(1));
        Ok(CommentPage {
            items,
            has_more: false,
        })
    }

    async fn create_comment(&self, input: CreateCommentInput) -> Result<ReviewComment> {
        let comment = comment_from_input(new_comment_id(), input, self.clock.now_iso());
        self.state
            .write()
            .await
            .comments
            .entry(comment.review_id.clone())
            .or_default()
            .insert(comment.id.clone(), comment.clone());
        Ok(comment)
    }

    async fn delete_comment(&self, review_id: &str, comment_id: &str, user_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let Some(items) = state.comments.get_mut(review_id) else {
            return Ok(());
        };
        match items.get(comment_id) {
            None => Ok(()),
            Some(comment) if comment.user_id != user_id => Err(Error::CommentDeleteForbidden),
            Some(_) => {
                items.remove(comment_id);
                Ok(())
            }
        }
    }
}
