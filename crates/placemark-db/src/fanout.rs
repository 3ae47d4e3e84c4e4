//! Follower lookup and notification records over a [`DocumentStore`].
//!
//! Document layout:
//!
//! - follower edge at `userFollowers/{userId}/items/{followerId}`
//! - notification at `userNotifications/{userId}/items/{notificationId}`

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tracing::debug;
use uuid::Uuid;

use placemark_core::defaults::FOLLOWER_FANOUT_LIMIT;
use placemark_core::{
    DocumentQuery, DocumentStore, FollowerFanout, Result, ReviewPublishedNotification, WriteBatch,
};

use crate::json::nullable_str;

pub const REVIEW_PUBLISHED: &str = "review_published";

pub fn followers_collection(user_id: &str) -> String {
    format!("userFollowers/{}/items", user_id)
}

pub fn notifications_collection(user_id: &str) -> String {
    format!("userNotifications/{}/items", user_id)
}

/// Notification document body.
pub fn encode_notification(id: &str, notification: &ReviewPublishedNotification) -> Result<JsonValue> {
    let mut payload = serde_json::to_value(notification)?;
    if let Some(map) = payload.as_object_mut() {
        map.insert("id".to_string(), json!(id));
        map.insert("type".to_string(), json!(REVIEW_PUBLISHED));
        map.insert("readAt".to_string(), JsonValue::Null);
        map.insert("targetReviewPlaceSubtitle".to_string(), JsonValue::Null);
    }
    Ok(payload)
}

pub struct DocumentFollowerFanout {
    store: Arc<dyn DocumentStore>,
    limit: usize,
}

impl DocumentFollowerFanout {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            limit: FOLLOWER_FANOUT_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }
}

#[async_trait]
impl FollowerFanout for DocumentFollowerFanout {
    /// Follower ids, de-duplicated, without `user_id` itself. An edge's
    /// `followerUserId` field wins over its document id.
    async fn list_follower_ids(&self, user_id: &str) -> Result<Vec<String>> {
        let docs = self
            .store
            .query(DocumentQuery::collection(followers_collection(user_id)).limit(self.limit))
            .await?;

        let mut seen = HashSet::new();
        let ids: Vec<String> = docs
            .into_iter()
            .map(|doc| {
                doc.data
                    .as_object()
                    .and_then(|map| nullable_str(map, "followerUserId"))
                    .map(|id| id.trim().to_string())
                    .filter(|id| !id.is_empty())
                    .unwrap_or(doc.id)
            })
            .filter(|id| id != user_id && seen.insert(id.clone()))
            .collect();

        debug!(user_id, followers = ids.len(), "fanout: followers listed");
        Ok(ids)
    }

    async fn create_notification(&self, notification: ReviewPublishedNotification) -> Result<()> {
        let id = format!("notification-{}", Uuid::now_v7());
        let payload = encode_notification(&id, &notification)?;
        self.store
            .commit(WriteBatch::new().set(
                notifications_collection(&notification.user_id),
                &id,
                payload,
            ))
            .await?;
        debug!(
            user_id = %notification.user_id,
            review_id = %notification.target_review_id,
            notification_id = %id,
            "fanout: notification written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryDocumentStore;
    use placemark_core::ReviewVisibility;

    fn notification(user_id: &str) -> ReviewPublishedNotification {
        ReviewPublishedNotification {
            user_id: user_id.to_string(),
            actor_user_id: "author-1".to_string(),
            actor_name: "Author".to_string(),
            actor_handle: "author".to_string(),
            actor_avatar: None,
            created_at: "2026-02-10T10:00:00.000Z".to_string(),
            target_review_id: "review-1".to_string(),
            target_review_place_title: "Tidewater Oyster Bar".to_string(),
            target_review_image_url: None,
            target_review_visibility: ReviewVisibility::Followers,
        }
    }

    #[test]
    fn notification_payload_shape() {
        let payload = encode_notification("n1", &notification("follower-1")).unwrap();
        assert_eq!(payload["id"], "n1");
        assert_eq!(payload["type"], "review_published");
        assert_eq!(payload["userId"], "follower-1");
        assert_eq!(payload["targetReviewVisibility"], "followers");
        assert!(payload["readAt"].is_null());
        assert!(payload["targetReviewPlaceSubtitle"].is_null());
    }

    #[tokio::test]
    async fn followers_prefer_field_and_skip_self_and_duplicates() {
        let store = Arc::new(MemoryDocumentStore::new());
        let collection = followers_collection("author-1");
        store
            .commit(
                WriteBatch::new()
                    .set(&collection, "edge-1", json!({ "followerUserId": "follower-1" }))
                    .set(&collection, "follower-2", json!({}))
                    .set(&collection, "follower-1", json!({}))
                    .set(&collection, "author-1", json!({})),
            )
            .await
            .unwrap();

        let fanout = DocumentFollowerFanout::new(store);
        let mut ids = fanout.list_follower_ids("author-1").await.unwrap();
        ids.sort();

        assert_eq!(ids, vec!["follower-1", "follower-2"]);
    }

    #[tokio::test]
    async fn notification_lands_in_follower_collection() {
        let store = Arc::new(MemoryDocumentStore::new());
        let fanout = DocumentFollowerFanout::new(store.clone());

        fanout
            .create_notification(notification("follower-1"))
            .await
            .unwrap();

        assert_eq!(store.len(&notifications_collection("follower-1")).await, 1);
    }
}
