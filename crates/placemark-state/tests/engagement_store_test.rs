//! Engagement cache: optimistic likes and comment lists.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::*;
use placemark_core::{EngagementRepository, Error};
use placemark_state::LikeSnapshot;
use tokio::sync::Semaphore;

async fn seed_two_likes(h: &EngagementHarness) {
    h.repo.inner.set_liked("review-1", "user-a", true).await.unwrap();
    h.repo.inner.set_liked("review-1", "user-b", true).await.unwrap();
}

#[tokio::test]
async fn failed_toggle_restores_exact_prior_state() {
    let h = engagement_harness(|_| {});
    seed_two_likes(&h).await;
    h.store.hydrate_like_state("review-1", "user-1", false).await.unwrap();
    assert_eq!(
        h.store.like("review-1"),
        Some(LikeSnapshot {
            liked: false,
            like_count: 2
        })
    );

    h.repo.fail_set_liked.store(true, Ordering::SeqCst);
    let err = h.store.toggle_like("review-1", "user-1").await.unwrap_err();

    assert_eq!(err.code(), "request");
    assert_eq!(
        h.store.like("review-1"),
        Some(LikeSnapshot {
            liked: false,
            like_count: 2
        })
    );
}

#[tokio::test]
async fn toggle_flips_and_persists() {
    let h = engagement_harness(|_| {});
    seed_two_likes(&h).await;
    h.store.hydrate_like_state("review-1", "user-1", false).await.unwrap();

    let liked = h.store.toggle_like("review-1", "user-1").await.unwrap();

    assert!(liked);
    assert_eq!(
        h.store.like("review-1"),
        Some(LikeSnapshot {
            liked: true,
            like_count: 3
        })
    );
    assert!(h.repo.inner.get_like_state("review-1", "user-1").await.unwrap().liked);

    let liked = h.store.toggle_like("review-1", "user-1").await.unwrap();
    assert!(!liked);
    assert_eq!(h.store.like("review-1").unwrap().like_count, 2);
}

#[tokio::test]
async fn unlike_never_goes_below_zero() {
    let h = engagement_harness(|repo| repo.like_count_override = Some(0));
    h.repo.inner.set_liked("review-1", "user-1", true).await.unwrap();
    h.store.hydrate_like_state("review-1", "user-1", false).await.unwrap();

    h.store.toggle_like("review-1", "user-1").await.unwrap();

    assert_eq!(
        h.store.like("review-1"),
        Some(LikeSnapshot {
            liked: false,
            like_count: 0
        })
    );
}

#[tokio::test]
async fn hydrated_like_count_is_clamped() {
    let h = engagement_harness(|repo| repo.like_count_override = Some(-3));

    h.store.hydrate_like_state("review-1", "user-1", false).await.unwrap();

    assert_eq!(h.store.like("review-1").unwrap().like_count, 0);
}

#[tokio::test]
async fn like_hydrate_runs_once_unless_forced() {
    let h = engagement_harness(|_| {});

    h.store.hydrate_like_state("review-1", "user-1", false).await.unwrap();
    h.store.hydrate_like_state("review-1", "user-1", false).await.unwrap();
    assert_eq!(ScriptedEngagement::calls(&h.repo.like_state_calls), 1);

    h.store.hydrate_like_state("review-1", "user-1", true).await.unwrap();
    assert_eq!(ScriptedEngagement::calls(&h.repo.like_state_calls), 2);
    assert!(!h.store.is_like_hydrating("review-1"));
}

#[tokio::test(start_paused = true)]
async fn dropped_toggle_still_restores_on_failure() {
    let h = engagement_harness(|repo| repo.like_gate = Some(Semaphore::new(0)));
    seed_two_likes(&h).await;
    h.store.hydrate_like_state("review-1", "user-1", false).await.unwrap();
    h.repo.fail_set_liked.store(true, Ordering::SeqCst);

    let dropped = tokio::time::timeout(
        Duration::from_millis(100),
        h.store.toggle_like("review-1", "user-1"),
    )
    .await;
    assert!(dropped.is_err());
    assert_eq!(
        h.store.like("review-1"),
        Some(LikeSnapshot {
            liked: true,
            like_count: 3
        })
    );

    h.repo.release_likes();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(
        h.store.like("review-1"),
        Some(LikeSnapshot {
            liked: false,
            like_count: 2
        })
    );
}

#[tokio::test]
async fn rapid_double_toggle_flips_twice() {
    let h = engagement_harness(|repo| repo.like_gate = Some(Semaphore::new(0)));
    seed_two_likes(&h).await;
    h.store.hydrate_like_state("review-1", "user-1", false).await.unwrap();

    let toggle = |store: placemark_state::EngagementStore| {
        tokio::spawn(async move { store.toggle_like("review-1", "user-1").await })
    };
    let first = toggle(h.store.clone());
    let second = toggle(h.store.clone());
    while ScriptedEngagement::calls(&h.repo.like_writes_started) < 2 {
        tokio::task::yield_now().await;
    }

    // both flips are applied before either write lands
    assert_eq!(
        h.store.like("review-1"),
        Some(LikeSnapshot {
            liked: false,
            like_count: 2
        })
    );

    h.repo.release_likes();
    assert!(first.await.unwrap().unwrap());
    assert!(!second.await.unwrap().unwrap());
    assert_eq!(h.repo.like_writes(), vec![true, false]);
    assert!(!h.repo.inner.get_like_state("review-1", "user-1").await.unwrap().liked);
}

#[tokio::test]
async fn writes_reject_empty_ids_and_loads_skip_them() {
    let h = engagement_harness(|_| {});

    h.store.hydrate_like_state("", "user-1", false).await.unwrap();
    h.store.hydrate_comments("", 50, false).await.unwrap();

    let err = h.store.toggle_like("review-1", "").await.unwrap_err();
    assert_eq!(err.code(), "invalid-input");

    let mut orphan = comment_input("user-1", "Hello");
    orphan.review_id = String::new();
    let err = h.store.post_comment(orphan).await.unwrap_err();
    assert_eq!(err.code(), "invalid-input");

    let err = h
        .store
        .delete_comment_and_store("review-1", "", "user-1")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid-input");

    assert_eq!(ScriptedEngagement::calls(&h.repo.like_state_calls), 0);
    assert_eq!(ScriptedEngagement::calls(&h.repo.like_writes_started), 0);
    assert_eq!(ScriptedEngagement::calls(&h.repo.create_calls), 0);
    assert_eq!(ScriptedEngagement::calls(&h.repo.list_calls), 0);
    assert!(h.store.like("review-1").is_none());
}

#[tokio::test]
async fn comment_validation_happens_before_any_call() {
    let h = engagement_harness(|_| {});

    let empty = h.store.post_comment(comment_input("user-1", "   \n")).await;
    assert_eq!(empty.unwrap_err(), Error::CommentEmpty);

    let long = h
        .store
        .post_comment(comment_input("user-1", &"x".repeat(201)))
        .await;
    assert_eq!(long.unwrap_err(), Error::CommentTooLong { max: 200 });

    assert_eq!(ScriptedEngagement::calls(&h.repo.create_calls), 0);
    assert!(!h.store.comments("review-1").is_posting);
}

#[tokio::test]
async fn posted_comment_is_trimmed_and_sorted_in() {
    let h = engagement_harness(|_| {});
    h.clock.advance(60_000);
    let existing = h
        .repo
        .inner
        .create_comment(placemark_core::CreateCommentInput {
            review_id: "review-1".to_string(),
            user_id: "user-2".to_string(),
            user_name: "Sam".to_string(),
            user_handle: "sam".to_string(),
            user_avatar: None,
            text: "First!".to_string(),
        })
        .await
        .unwrap();
    h.store.hydrate_comments("review-1", 50, false).await.unwrap();

    // Server clock behind the existing comment: the new one sorts after it.
    h.clock.advance(-30_000);
    let posted = h
        .store
        .post_comment(comment_input("user-1", "  Great oysters  "))
        .await
        .unwrap();

    assert_eq!(posted.text, "Great oysters");
    let comments = h.store.comments("review-1");
    let ids: Vec<&str> = comments.items.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec![existing.id.as_str(), posted.id.as_str()]);
    assert!(comments.hydrated);
    assert!(!comments.is_posting);
}

#[tokio::test]
async fn failed_post_records_error_and_clears_flag() {
    let h = engagement_harness(|repo| repo.fail_create.store(true, Ordering::SeqCst));

    let err = h
        .store
        .post_comment(comment_input("user-1", "Hello"))
        .await
        .unwrap_err();

    let comments = h.store.comments("review-1");
    assert!(!comments.is_posting);
    assert!(comments.items.is_empty());
    assert_eq!(comments.error, Some(err.to_string()));
}

#[tokio::test]
async fn deleting_someone_elses_comment_fails_fast() {
    let h = engagement_harness(|_| {});
    h.store.post_comment(comment_input("user-2", "Mine")).await.unwrap();
    let comment_id = h.store.comments("review-1").items[0].id.clone();

    let err = h
        .store
        .delete_comment_and_store("review-1", &comment_id, "user-1")
        .await
        .unwrap_err();

    assert_eq!(err, Error::CommentDeleteForbidden);
    assert_eq!(ScriptedEngagement::calls(&h.repo.delete_calls), 0);
    assert_eq!(h.store.comments("review-1").items.len(), 1);
}

#[tokio::test]
async fn deleting_an_uncached_comment_is_forbidden() {
    let h = engagement_harness(|_| {});

    let err = h
        .store
        .delete_comment_and_store("review-1", "comment-404", "user-1")
        .await
        .unwrap_err();

    assert_eq!(err, Error::CommentDeleteForbidden);
    assert_eq!(ScriptedEngagement::calls(&h.repo.delete_calls), 0);
}

#[tokio::test]
async fn delete_removes_comment_after_success() {
    let h = engagement_harness(|_| {});
    let posted = h
        .store
        .post_comment(comment_input("user-1", "Remove me"))
        .await
        .unwrap();

    h.store
        .delete_comment_and_store("review-1", &posted.id, "user-1")
        .await
        .unwrap();

    let comments = h.store.comments("review-1");
    assert!(comments.items.is_empty());
    assert!(comments.deleting_by_id.is_empty());
}

#[tokio::test]
async fn failed_delete_keeps_comment_and_clears_flag() {
    let h = engagement_harness(|repo| repo.fail_delete.store(true, Ordering::SeqCst));
    let posted = h
        .store
        .post_comment(comment_input("user-1", "Sticky"))
        .await
        .unwrap();

    let result = h
        .store
        .delete_comment_and_store("review-1", &posted.id, "user-1")
        .await;

    assert!(result.is_err());
    let comments = h.store.comments("review-1");
    assert_eq!(comments.items.len(), 1);
    assert!(comments.deleting_by_id.is_empty());
    assert!(comments.error.is_some());
}

#[tokio::test]
async fn comment_hydrate_is_gated_by_hydrated_flag() {
    let h = engagement_harness(|_| {});

    h.store.hydrate_comments("review-1", 50, false).await.unwrap();
    h.store.hydrate_comments("review-1", 50, false).await.unwrap();
    assert_eq!(ScriptedEngagement::calls(&h.repo.list_calls), 1);

    h.store.hydrate_comments("review-1", 50, true).await.unwrap();
    assert_eq!(ScriptedEngagement::calls(&h.repo.list_calls), 2);
}

#[tokio::test]
async fn failed_comment_hydrate_records_error() {
    let h = engagement_harness(|repo| repo.fail_list.store(true, Ordering::SeqCst));

    assert!(h.store.hydrate_comments("review-1", 50, false).await.is_err());

    let comments = h.store.comments("review-1");
    assert!(!comments.hydrated);
    assert!(!comments.is_hydrating);
    assert!(comments.error.is_some());
}

#[tokio::test]
async fn counts_track_posts_and_deletes() {
    let h = engagement_harness(|_| {});
    seed_two_likes(&h).await;

    let counts = h.store.hydrate_counts("review-1").await.unwrap();
    assert_eq!(counts.likes, 2);
    assert_eq!(counts.comments, 0);

    let posted = h
        .store
        .post_comment(comment_input("user-1", "Counted"))
        .await
        .unwrap();
    assert_eq!(h.store.comment_count("review-1"), Some(1));

    h.store
        .delete_comment_and_store("review-1", &posted.id, "user-1")
        .await
        .unwrap();
    assert_eq!(h.store.comment_count("review-1"), Some(0));
}

#[tokio::test]
async fn clear_engagement_forgets_everything() {
    let h = engagement_harness(|_| {});
    h.store.hydrate_like_state("review-1", "user-1", false).await.unwrap();
    h.store.post_comment(comment_input("user-1", "Bye")).await.unwrap();

    h.store.clear_engagement();

    assert!(h.store.like("review-1").is_none());
    assert!(h.store.comments("review-1").items.is_empty());
    assert_eq!(h.store.comment_count("review-1"), None);
}
