//! Engagement cache: like state, counts and comment lists per review.
//!
//! Likes are toggled optimistically and restored to the exact captured
//! prior values when the remote write fails. Comment posts and deletes set
//! a busy flag around the remote call and change the list only on success.
//!
//! Every operation that raises a flag runs on its own task, so the flag is
//! cleared and a failed toggle restored even if the caller stops waiting.
//! Writes reject empty ids with `InvalidInput`; loads treat them as no-ops.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use placemark_core::defaults::COMMENT_MAX_LENGTH;
use placemark_core::{
    newest_comment_first, run_to_completion, CreateCommentInput, EngagementRepository, Error,
    EventBus, Result, ReviewComment, StoreEvent,
};

use crate::optimistic::optimistic;

/// Comment list of one review and its request flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommentState {
    /// Newest first.
    pub items: Vec<ReviewComment>,
    pub is_hydrating: bool,
    pub is_posting: bool,
    pub hydrated: bool,
    pub has_more: bool,
    pub error: Option<String>,
    pub deleting_by_id: HashSet<String>,
}

/// Cached like state of one review for the signed-in user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LikeSnapshot {
    pub liked: bool,
    pub like_count: i64,
}

/// Like and comment totals of one review.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngagementCounts {
    pub likes: i64,
    pub comments: i64,
}

/// A comment to post. `text` is trimmed and validated before sending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostCommentInput {
    pub review_id: String,
    pub user_id: String,
    pub user_name: String,
    pub user_handle: String,
    pub user_avatar: Option<String>,
    pub text: String,
}

#[derive(Debug, Default)]
struct EngagementState {
    liked_by_review_id: HashMap<String, bool>,
    like_count_by_review_id: HashMap<String, i64>,
    like_hydrating: HashSet<String>,
    like_error_by_review_id: HashMap<String, String>,
    comment_count_by_review_id: HashMap<String, i64>,
    comments_by_review_id: HashMap<String, CommentState>,
}

impl EngagementState {
    fn comments_mut(&mut self, review_id: &str) -> &mut CommentState {
        self.comments_by_review_id
            .entry(review_id.to_string())
            .or_default()
    }

    fn like(&self, review_id: &str) -> LikeSnapshot {
        LikeSnapshot {
            liked: self
                .liked_by_review_id
                .get(review_id)
                .copied()
                .unwrap_or(false),
            like_count: self
                .like_count_by_review_id
                .get(review_id)
                .copied()
                .unwrap_or(0),
        }
    }

    fn set_like(&mut self, review_id: &str, like: LikeSnapshot) {
        self.liked_by_review_id
            .insert(review_id.to_string(), like.liked);
        self.like_count_by_review_id
            .insert(review_id.to_string(), like.like_count);
    }

    fn adjust_comment_count(&mut self, review_id: &str, delta: i64) {
        if let Some(count) = self.comment_count_by_review_id.get_mut(review_id) {
            *count = (*count + delta).max(0);
        }
    }
}

/// Trim and bound comment text.
pub fn validate_comment_text(text: &str) -> Result<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::CommentEmpty);
    }
    if trimmed.chars().count() > COMMENT_MAX_LENGTH {
        return Err(Error::CommentTooLong {
            max: COMMENT_MAX_LENGTH,
        });
    }
    Ok(trimmed)
}

struct EngagementInner {
    state: RwLock<EngagementState>,
    repository: Arc<dyn EngagementRepository>,
    events: EventBus,
}

fn require_id(name: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidInput(format!("{} is required", name)));
    }
    Ok(())
}

/// Process-wide engagement cache. Clones share state.
#[derive(Clone)]
pub struct EngagementStore {
    inner: Arc<EngagementInner>,
}

impl EngagementStore {
    pub fn new(repository: Arc<dyn EngagementRepository>) -> Self {
        Self::with_events(repository, EventBus::default())
    }

    pub fn with_events(repository: Arc<dyn EngagementRepository>, events: EventBus) -> Self {
        Self {
            inner: Arc::new(EngagementInner {
                state: RwLock::new(EngagementState::default()),
                repository,
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    fn read(&self) -> RwLockReadGuard<'_, EngagementState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, EngagementState> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `body` on its own task with a clone of the store.
    async fn detached<T, B, Fut>(&self, operation: &str, body: B) -> Result<T>
    where
        B: FnOnce(EngagementStore) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        run_to_completion(operation, body(self.clone())).await
    }

    fn like_changed(&self, review_id: &str) {
        self.inner.events.emit(StoreEvent::LikeChanged {
            review_id: review_id.to_string(),
        });
    }

    fn comments_changed(&self, review_id: &str) {
        self.inner.events.emit(StoreEvent::CommentsChanged {
            review_id: review_id.to_string(),
        });
    }

    // -------------------------------------------------------------------------
    // Selectors
    // -------------------------------------------------------------------------

    /// Like state, or `None` if it was never loaded or toggled.
    pub fn like(&self, review_id: &str) -> Option<LikeSnapshot> {
        let state = self.read();
        state
            .liked_by_review_id
            .contains_key(review_id)
            .then(|| state.like(review_id))
    }

    pub fn is_like_hydrating(&self, review_id: &str) -> bool {
        self.read().like_hydrating.contains(review_id)
    }

    pub fn like_error(&self, review_id: &str) -> Option<String> {
        self.read().like_error_by_review_id.get(review_id).cloned()
    }

    pub fn comment_count(&self, review_id: &str) -> Option<i64> {
        self.read()
            .comment_count_by_review_id
            .get(review_id)
            .copied()
    }

    /// Comment state, or the empty default when nothing is cached.
    pub fn comments(&self, review_id: &str) -> CommentState {
        self.read()
            .comments_by_review_id
            .get(review_id)
            .cloned()
            .unwrap_or_default()
    }

    // -------------------------------------------------------------------------
    // Likes
    // -------------------------------------------------------------------------

    /// Load like state once per review unless `force`. Concurrent calls for
    /// the same review are skipped while one is running.
    pub async fn hydrate_like_state(&self, review_id: &str, user_id: &str, force: bool) -> Result<()> {
        if review_id.is_empty() || user_id.is_empty() {
            return Ok(());
        }
        let (review_id, user_id) = (review_id.to_string(), user_id.to_string());
        self.detached("engagement.hydrateLikeState", move |store| async move {
            store.load_like_state(&review_id, &user_id, force).await
        })
        .await
    }

    async fn load_like_state(&self, review_id: &str, user_id: &str, force: bool) -> Result<()> {
        {
            let mut state = self.write();
            let loaded = state.liked_by_review_id.contains_key(review_id);
            if state.like_hydrating.contains(review_id) || (!force && loaded) {
                debug!(review_id, "engagement: like hydrate skipped");
                return Ok(());
            }
            state.like_hydrating.insert(review_id.to_string());
        }

        let result = self.inner.repository.get_like_state(review_id, user_id).await;
        {
            let mut state = self.write();
            state.like_hydrating.remove(review_id);
            match result {
                Ok(ref like) => {
                    state.set_like(
                        review_id,
                        LikeSnapshot {
                            liked: like.liked,
                            like_count: like.like_count.max(0),
                        },
                    );
                    state.like_error_by_review_id.remove(review_id);
                }
                Err(ref e) => {
                    state
                        .like_error_by_review_id
                        .insert(review_id.to_string(), e.to_string());
                }
            }
        }
        if let Err(ref e) = result {
            warn!(review_id, error = %e, "engagement: like hydrate failed");
        }
        self.like_changed(review_id);
        result.map(|_| ())
    }

    /// Flip the like optimistically. Returns the new liked value.
    ///
    /// The prior state is read and the flipped state written under one
    /// lock, so rapid toggles each flip the state the previous one left.
    /// On failure the captured prior `liked` and `like_count` are restored
    /// as-is, not recomputed, and the error is returned.
    pub async fn toggle_like(&self, review_id: &str, user_id: &str) -> Result<bool> {
        require_id("review id", review_id)?;
        require_id("user id", user_id)?;
        let (review_id, user_id) = (review_id.to_string(), user_id.to_string());
        self.detached("engagement.toggleLike", move |store| async move {
            store.flip_like(&review_id, &user_id).await
        })
        .await
    }

    async fn flip_like(&self, review_id: &str, user_id: &str) -> Result<bool> {
        let next = optimistic(
            || {
                let mut state = self.write();
                let prior = state.like(review_id);
                let next = LikeSnapshot {
                    liked: !prior.liked,
                    like_count: (prior.like_count + if prior.liked { -1 } else { 1 }).max(0),
                };
                state.set_like(review_id, next);
                drop(state);
                self.like_changed(review_id);
                (prior, next)
            },
            |&(_, next)| async move {
                self.inner
                    .repository
                    .set_liked(review_id, user_id, next.liked)
                    .await
                    .map(|()| next)
            },
            |next: &LikeSnapshot| debug!(review_id, liked = next.liked, "engagement: like saved"),
            |(prior, _), e| {
                warn!(review_id, error = %e, "engagement: like failed, restoring prior state");
                self.write().set_like(review_id, prior);
                self.like_changed(review_id);
            },
        )
        .await?;
        Ok(next.liked)
    }

    /// Load like and comment totals.
    pub async fn hydrate_counts(&self, review_id: &str) -> Result<EngagementCounts> {
        let repository = &self.inner.repository;
        let (likes, comments) = tokio::try_join!(
            repository.get_like_count(review_id),
            repository.get_comment_count(review_id)
        )?;
        let counts = EngagementCounts {
            likes: likes.max(0),
            comments: comments.max(0),
        };
        {
            let mut state = self.write();
            state
                .like_count_by_review_id
                .insert(review_id.to_string(), counts.likes);
            state
                .comment_count_by_review_id
                .insert(review_id.to_string(), counts.comments);
        }
        self.like_changed(review_id);
        self.comments_changed(review_id);
        Ok(counts)
    }

    // -------------------------------------------------------------------------
    // Comments
    // -------------------------------------------------------------------------

    /// Replace the cached comment list, newest first. Runs once per review
    /// unless `force`.
    pub async fn hydrate_comments(&self, review_id: &str, limit: usize, force: bool) -> Result<()> {
        if review_id.is_empty() {
            return Ok(());
        }
        let review_id = review_id.to_string();
        self.detached("engagement.hydrateComments", move |store| async move {
            store.load_comments(&review_id, limit, force).await
        })
        .await
    }

    async fn load_comments(&self, review_id: &str, limit: usize, force: bool) -> Result<()> {
        {
            let mut state = self.write();
            let comments = state.comments_mut(review_id);
            if comments.is_hydrating || (!force && comments.hydrated) {
                debug!(review_id, "engagement: comment hydrate skipped");
                return Ok(());
            }
            comments.is_hydrating = true;
            comments.error = None;
        }
        self.comments_changed(review_id);

        let result = self.inner.repository.list_comments(review_id, limit).await;
        {
            let mut state = self.write();
            let comments = state.comments_mut(review_id);
            comments.is_hydrating = false;
            match result {
                Ok(ref page) => {
                    let mut items = page.items.clone();
                    items.sort_by(newest_comment_first);
                    comments.items = items;
                    comments.hydrated = true;
                    comments.has_more = page.has_more;
                    comments.error = None;
                }
                Err(ref e) => comments.error = Some(e.to_string()),
            }
        }
        self.comments_changed(review_id);

        match result {
            Ok(page) => {
                debug!(review_id, count = page.items.len(), has_more = page.has_more, "engagement: comments hydrated");
                Ok(())
            }
            Err(e) => {
                warn!(review_id, error = %e, "engagement: comment hydrate failed");
                Err(e)
            }
        }
    }

    /// Post a comment. Text is validated before any repository call; the
    /// server's comment is inserted into the sorted list on success.
    pub async fn post_comment(&self, input: PostCommentInput) -> Result<ReviewComment> {
        require_id("review id", &input.review_id)?;
        require_id("user id", &input.user_id)?;
        let text = validate_comment_text(&input.text)?.to_string();
        self.detached("engagement.postComment", move |store| async move {
            store.send_comment(input, text).await
        })
        .await
    }

    async fn send_comment(&self, input: PostCommentInput, text: String) -> Result<ReviewComment> {
        let review_id = input.review_id.clone();

        let create = CreateCommentInput {
            review_id: input.review_id,
            user_id: input.user_id,
            user_name: input.user_name,
            user_handle: input.user_handle,
            user_avatar: input.user_avatar,
            text,
        };

        let created = optimistic(
            || {
                let mut state = self.write();
                let comments = state.comments_mut(&review_id);
                comments.is_posting = true;
                comments.error = None;
                drop(state);
                self.comments_changed(&review_id);
            },
            |_| self.inner.repository.create_comment(create),
            |created: &ReviewComment| {
                let mut state = self.write();
                let comments = state.comments_mut(&review_id);
                comments.items.insert(0, created.clone());
                comments.items.sort_by(newest_comment_first);
                comments.is_posting = false;
                comments.hydrated = true;
                comments.error = None;
                state.adjust_comment_count(&review_id, 1);
                drop(state);
                self.comments_changed(&review_id);
            },
            |(), e| {
                warn!(review_id = %review_id, error = %e, "engagement: comment post failed");
                let mut state = self.write();
                let comments = state.comments_mut(&review_id);
                comments.is_posting = false;
                comments.error = Some(e.to_string());
                drop(state);
                self.comments_changed(&review_id);
            },
        )
        .await?;

        info!(review_id = %review_id, comment_id = %created.id, "engagement: comment posted");
        Ok(created)
    }

    /// Delete a cached comment owned by `user_id`.
    ///
    /// A comment that is not cached or belongs to someone else fails with
    /// `CommentDeleteForbidden` without calling the repository.
    pub async fn delete_comment_and_store(
        &self,
        review_id: &str,
        comment_id: &str,
        user_id: &str,
    ) -> Result<()> {
        require_id("review id", review_id)?;
        require_id("comment id", comment_id)?;
        require_id("user id", user_id)?;

        let owned = self
            .read()
            .comments_by_review_id
            .get(review_id)
            .and_then(|comments| comments.items.iter().find(|c| c.id == comment_id))
            .is_some_and(|comment| comment.user_id == user_id);
        if !owned {
            warn!(review_id, comment_id, user_id, "engagement: comment delete forbidden");
            return Err(Error::CommentDeleteForbidden);
        }

        let (review_id, comment_id, user_id) =
            (review_id.to_string(), comment_id.to_string(), user_id.to_string());
        self.detached("engagement.deleteComment", move |store| async move {
            store.remove_comment(&review_id, &comment_id, &user_id).await
        })
        .await
    }

    async fn remove_comment(&self, review_id: &str, comment_id: &str, user_id: &str) -> Result<()> {
        optimistic(
            || {
                let mut state = self.write();
                let comments = state.comments_mut(review_id);
                comments.deleting_by_id.insert(comment_id.to_string());
                comments.error = None;
                drop(state);
                self.comments_changed(review_id);
            },
            |_| {
                self.inner
                    .repository
                    .delete_comment(review_id, comment_id, user_id)
            },
            |_| {
                let mut state = self.write();
                let comments = state.comments_mut(review_id);
                comments.items.retain(|c| c.id != comment_id);
                comments.deleting_by_id.remove(comment_id);
                comments.error = None;
                state.adjust_comment_count(review_id, -1);
                drop(state);
                self.comments_changed(review_id);
            },
            |(), e| {
                warn!(review_id, comment_id, error = %e, "engagement: comment delete failed");
                let mut state = self.write();
                let comments = state.comments_mut(review_id);
                comments.deleting_by_id.remove(comment_id);
                comments.error = Some(e.to_string());
                drop(state);
                self.comments_changed(review_id);
            },
        )
        .await
    }

    /// Forget all engagement state (sign-out).
    pub fn clear_engagement(&self) {
        *self.write() = EngagementState::default();
        info!("engagement cache: cleared");
        self.inner.events.emit(StoreEvent::Cleared);
    }
}
