//! Review client cache.
//!
//! [`ReviewStore`] keeps the reviews a client has seen, keyed by id, and is
//! the only writer of that state. Reads hand out `Arc<ReviewRecord>`
//! snapshots so subscribers never copy or mutate shared records.
//!
//! Merge rule: a fetched record replaces the cached one only when the cached
//! `updated_at` is not newer, so a slow fetch never regresses a review.
//!
//! Create / update / delete touch the cache only after the mutation engine
//! succeeds. They are not optimistic: photo rollback already leaves storage
//! in its pre-call state when they fail.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use placemark_core::defaults::{FANOUT_ATTEMPTS, REVIEWS_STALE_MS, REVIEW_DETAIL_STALE_MS};
use placemark_core::{
    newest_review_first, run_to_completion, Clock, CreateReviewInput, DeleteReviewInput, Error,
    EventBus, FollowerFanout, Result, ReviewPublishedNotification, ReviewRecord, StoreEvent,
    SystemClock, UpdateReviewInput,
};
use placemark_reviews::{MutationOptions, ReviewMutations};

/// Freshness policy for cached reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Cached data younger than this is served without a fetch.
    pub stale_ms: i64,
    /// Ignore freshness and fetch.
    pub force: bool,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            stale_ms: REVIEWS_STALE_MS,
            force: false,
        }
    }
}

impl FetchPolicy {
    pub fn stale_after(stale_ms: i64) -> Self {
        Self {
            stale_ms,
            force: false,
        }
    }

    /// Default window for single-review reads.
    pub fn detail() -> Self {
        Self::stale_after(REVIEW_DETAIL_STALE_MS)
    }

    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }
}

/// Which list load failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HydrateErrorKind {
    Hydrate,
    Refresh,
}

/// A failed list load, kept until the next successful one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HydrateError {
    pub kind: HydrateErrorKind,
    pub message: String,
}

impl HydrateError {
    pub fn code(&self) -> &'static str {
        match self.kind {
            HydrateErrorKind::Hydrate => "reviews-hydrate-failed",
            HydrateErrorKind::Refresh => "reviews-refresh-failed",
        }
    }
}

/// Result of a hydrate or refresh. Failures are also recorded in the store.
#[derive(Debug, Clone, PartialEq)]
pub enum HydrateOutcome {
    /// Another load was running or the cached list is still fresh.
    Skipped,
    Hydrated { count: usize },
    Failed(Error),
}

/// Restrict reviews to a set of authors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorFilter {
    pub author_ids: Vec<String>,
    /// With no author ids, return nothing instead of everything.
    pub require_author_filter: bool,
}

/// Global flags of the review cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HydrationStatus {
    pub hydrated: bool,
    pub is_hydrating: bool,
    pub hydrate_error: Option<HydrateError>,
    pub last_hydrated_at: Option<i64>,
}

#[derive(Debug, Default)]
struct ReviewState {
    reviews_by_id: HashMap<String, Arc<ReviewRecord>>,
    review_ids: Vec<String>,
    review_fetched_at_by_id: HashMap<String, i64>,
    status: HydrationStatus,
}

impl ReviewState {
    fn rebuild_ids(&mut self) {
        let mut records: Vec<&Arc<ReviewRecord>> = self.reviews_by_id.values().collect();
        records.sort_by(|a, b| newest_review_first(a, b));
        self.review_ids = records.iter().map(|r| r.id.clone()).collect();
    }

    /// Monotonic merge. Returns the ids whose cached record changed.
    fn merge(&mut self, records: Vec<ReviewRecord>, fetched_at: i64) -> Vec<String> {
        let mut changed = Vec::new();
        for record in records {
            self.review_fetched_at_by_id
                .insert(record.id.clone(), fetched_at);
            let replace = match self.reviews_by_id.get(&record.id) {
                Some(existing) => existing.superseded_by(&record),
                None => true,
            };
            if replace {
                changed.push(record.id.clone());
                self.reviews_by_id
                    .insert(record.id.clone(), Arc::new(record));
            } else {
                debug!(review_id = %record.id, "reviews cache: kept newer cached record");
            }
        }
        if !changed.is_empty() {
            self.rebuild_ids();
        }
        changed
    }

    fn is_fresh(&self, review_id: &str, now: i64, stale_ms: i64) -> Option<Arc<ReviewRecord>> {
        let fetched_at = *self.review_fetched_at_by_id.get(review_id)?;
        if now - fetched_at >= stale_ms {
            return None;
        }
        self.reviews_by_id.get(review_id).cloned()
    }
}

type DetailFetch = Shared<BoxFuture<'static, Result<Option<Arc<ReviewRecord>>>>>;

struct InFlight {
    generation: u64,
    fetch: DetailFetch,
}

struct StoreInner {
    state: RwLock<ReviewState>,
    in_flight: Mutex<HashMap<String, InFlight>>,
    /// Bumped by `clear_reviews`; loads started before a clear are discarded.
    generation: AtomicU64,
    mutations: ReviewMutations,
    clock: Arc<dyn Clock>,
    fanout: Option<Arc<dyn FollowerFanout>>,
    events: EventBus,
}

/// Process-wide review cache. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ReviewStore {
    inner: Arc<StoreInner>,
}

impl ReviewStore {
    pub fn new(mutations: ReviewMutations) -> Self {
        Self::builder(mutations).build()
    }

    pub fn builder(mutations: ReviewMutations) -> ReviewStoreBuilder {
        ReviewStoreBuilder {
            mutations,
            clock: Arc::new(SystemClock),
            fanout: None,
            events: EventBus::default(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    pub fn mutations(&self) -> &ReviewMutations {
        &self.inner.mutations
    }

    fn read(&self) -> RwLockReadGuard<'_, ReviewState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ReviewState> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    fn emit(&self, event: StoreEvent) {
        self.inner.events.emit(event);
    }

    fn emit_changed(&self, ids: Vec<String>) {
        if !ids.is_empty() {
            self.emit(StoreEvent::ReviewsChanged { ids });
        }
    }

    // -------------------------------------------------------------------------
    // Selectors
    // -------------------------------------------------------------------------

    pub fn review(&self, review_id: &str) -> Option<Arc<ReviewRecord>> {
        self.read().reviews_by_id.get(review_id).cloned()
    }

    /// Cached ids, newest `created_at` first.
    pub fn review_ids(&self) -> Vec<String> {
        self.read().review_ids.clone()
    }

    /// Cached records, newest `created_at` first.
    pub fn review_records(&self) -> Vec<Arc<ReviewRecord>> {
        let state = self.read();
        state
            .review_ids
            .iter()
            .filter_map(|id| state.reviews_by_id.get(id).cloned())
            .collect()
    }

    pub fn reviews_for_place(&self, place_id: &str) -> Vec<Arc<ReviewRecord>> {
        self.review_records()
            .into_iter()
            .filter(|review| review.place_id == place_id)
            .collect()
    }

    pub fn reviews_by_authors(&self, filter: &AuthorFilter) -> Vec<Arc<ReviewRecord>> {
        if filter.author_ids.is_empty() {
            return if filter.require_author_filter {
                Vec::new()
            } else {
                self.review_records()
            };
        }
        self.review_records()
            .into_iter()
            .filter(|review| filter.author_ids.iter().any(|id| *id == review.user_id))
            .collect()
    }

    pub fn status(&self) -> HydrationStatus {
        self.read().status.clone()
    }

    /// When `review_id` was last fetched from the repository.
    pub fn fetched_at(&self, review_id: &str) -> Option<i64> {
        self.read().review_fetched_at_by_id.get(review_id).copied()
    }

    /// Number of detail fetches currently outstanding.
    pub fn in_flight_count(&self) -> usize {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    // -------------------------------------------------------------------------
    // Direct writes
    // -------------------------------------------------------------------------

    /// Insert or replace unconditionally.
    pub fn upsert_review(&self, review: ReviewRecord) {
        self.store_record(Arc::new(review));
    }

    fn store_record(&self, review: Arc<ReviewRecord>) {
        let id = review.id.clone();
        {
            let mut state = self.write();
            state.reviews_by_id.insert(id.clone(), review);
            state.rebuild_ids();
        }
        self.emit_changed(vec![id]);
    }

    /// Merge with the monotonic `updated_at` rule.
    pub fn upsert_reviews(&self, reviews: Vec<ReviewRecord>) {
        let now = self.inner.clock.now_millis();
        let changed = self.write().merge(reviews, now);
        self.emit_changed(changed);
    }

    /// Drop a review from the cache. Missing ids are ignored.
    pub fn remove_review(&self, review_id: &str) {
        let removed = {
            let mut state = self.write();
            let removed = state.reviews_by_id.remove(review_id).is_some();
            state.review_fetched_at_by_id.remove(review_id);
            if removed {
                state.review_ids.retain(|id| id != review_id);
            }
            removed
        };
        if removed {
            self.emit(StoreEvent::ReviewRemoved {
                id: review_id.to_string(),
            });
        }
    }

    /// Reset every field and forget outstanding fetches (sign-out).
    pub fn clear_reviews(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        *self.write() = ReviewState::default();
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        info!("reviews cache: cleared");
        self.emit(StoreEvent::Cleared);
    }

    // -------------------------------------------------------------------------
    // Loads
    // -------------------------------------------------------------------------

    /// Load the recent-reviews list unless a load is running or the last
    /// one is younger than `policy.stale_ms`.
    pub async fn hydrate_reviews(&self, limit: usize, policy: FetchPolicy) -> HydrateOutcome {
        let now = self.inner.clock.now_millis();
        {
            let mut state = self.write();
            if state.status.is_hydrating {
                debug!("reviews cache: hydrate skipped, already hydrating");
                return HydrateOutcome::Skipped;
            }
            if !policy.force {
                if let Some(last) = state.status.last_hydrated_at {
                    if now - last < policy.stale_ms {
                        debug!(age_ms = now - last, "reviews cache: hydrate skipped, still fresh");
                        return HydrateOutcome::Skipped;
                    }
                }
            }
            state.status.is_hydrating = true;
            state.status.hydrate_error = None;
        }
        self.emit(StoreEvent::HydrationChanged);
        self.spawn_load_recent(limit, HydrateErrorKind::Hydrate).await
    }

    /// Load the recent-reviews list regardless of freshness. Still refuses
    /// to overlap a running load.
    pub async fn refresh_reviews(&self, limit: usize) -> HydrateOutcome {
        {
            let mut state = self.write();
            if state.status.is_hydrating {
                debug!("reviews cache: refresh skipped, already hydrating");
                return HydrateOutcome::Skipped;
            }
            state.status.is_hydrating = true;
            state.status.hydrate_error = None;
        }
        self.emit(StoreEvent::HydrationChanged);
        self.spawn_load_recent(limit, HydrateErrorKind::Refresh).await
    }

    /// Run the list load on its own task. `is_hydrating` is already set and
    /// only the load clears it, so the load must outlive a dropped caller.
    async fn spawn_load_recent(&self, limit: usize, kind: HydrateErrorKind) -> HydrateOutcome {
        let store = self.clone();
        match tokio::spawn(async move { store.load_recent(limit, kind).await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "reviews cache: list load task did not complete");
                self.write().status.is_hydrating = false;
                self.emit(StoreEvent::HydrationChanged);
                HydrateOutcome::Failed(Error::Internal(e.to_string()))
            }
        }
    }

    async fn load_recent(&self, limit: usize, kind: HydrateErrorKind) -> HydrateOutcome {
        let generation = self.generation();
        let started = Instant::now();
        let result = self
            .inner
            .mutations
            .repository()
            .list_recent_reviews(limit)
            .await;

        if generation != self.generation() {
            debug!("reviews cache: discarding list load started before clear");
            return HydrateOutcome::Skipped;
        }

        match result {
            Ok(records) => {
                let count = records.len();
                let now = self.inner.clock.now_millis();
                let changed = {
                    let mut state = self.write();
                    let changed = state.merge(records, now);
                    state.status.hydrated = true;
                    state.status.is_hydrating = false;
                    state.status.hydrate_error = None;
                    state.status.last_hydrated_at = Some(now);
                    changed
                };
                info!(
                    count,
                    changed = changed.len(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "reviews cache: hydrated"
                );
                self.emit_changed(changed);
                self.emit(StoreEvent::HydrationChanged);
                HydrateOutcome::Hydrated { count }
            }
            Err(e) => {
                let error = HydrateError {
                    kind,
                    message: e.to_string(),
                };
                warn!(code = error.code(), error = %e, "reviews cache: list load failed, keeping cached data");
                let code = error.code().to_string();
                {
                    let mut state = self.write();
                    state.status.is_hydrating = false;
                    state.status.hydrate_error = Some(error);
                }
                self.emit(StoreEvent::HydrateFailed { error: code });
                HydrateOutcome::Failed(e)
            }
        }
    }

    /// Load one place's reviews and merge them. Returns the place's cached
    /// reviews afterwards.
    pub async fn hydrate_place_reviews(&self, place_id: &str) -> Result<Vec<Arc<ReviewRecord>>> {
        let generation = self.generation();
        let records = self
            .inner
            .mutations
            .repository()
            .list_reviews_for_place(place_id)
            .await?;
        if generation == self.generation() {
            let now = self.inner.clock.now_millis();
            let changed = self.write().merge(records, now);
            debug!(place_id, changed = changed.len(), "reviews cache: place hydrated");
            self.emit_changed(changed);
        }
        Ok(self.reviews_for_place(place_id))
    }

    /// Return a fresh cached review or fetch it, sharing one repository
    /// read between concurrent callers for the same id.
    pub async fn fetch_review_by_id_cached(
        &self,
        review_id: &str,
        policy: FetchPolicy,
    ) -> Result<Option<Arc<ReviewRecord>>> {
        if !policy.force {
            let now = self.inner.clock.now_millis();
            if let Some(cached) = self.read().is_fresh(review_id, now, policy.stale_ms) {
                debug!(review_id, "reviews cache: detail served from cache");
                return Ok(Some(cached));
            }
        }
        self.detail_fetch(review_id).await
    }

    fn detail_fetch(&self, review_id: &str) -> DetailFetch {
        let mut in_flight = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = in_flight.get(review_id) {
            debug!(review_id, "reviews cache: joined in-flight detail fetch");
            return entry.fetch.clone();
        }

        let generation = self.generation();
        let store = self.clone();
        let id = review_id.to_string();
        let fetch = async move { store.run_detail_fetch(id, generation).await }
            .boxed()
            .shared();
        in_flight.insert(
            review_id.to_string(),
            InFlight {
                generation,
                fetch: fetch.clone(),
            },
        );
        drop(in_flight);

        // Driven by its own task so it settles even if every caller goes away.
        tokio::spawn(fetch.clone());
        fetch
    }

    async fn run_detail_fetch(
        self,
        review_id: String,
        generation: u64,
    ) -> Result<Option<Arc<ReviewRecord>>> {
        let result = self
            .inner
            .mutations
            .repository()
            .load_review(&review_id)
            .await;
        let current = generation == self.generation();

        let outcome = match result {
            Ok(Some(record)) if current => {
                let now = self.inner.clock.now_millis();
                let changed = self.write().merge(vec![record], now);
                self.emit_changed(changed);
                Ok(self.review(&review_id))
            }
            Ok(Some(record)) => Ok(Some(Arc::new(record))),
            Ok(None) => {
                debug!(review_id = %review_id, "reviews cache: detail fetch found nothing");
                Ok(None)
            }
            Err(e) => {
                warn!(review_id = %review_id, error = %e, "reviews cache: detail fetch failed");
                Err(e)
            }
        };

        let mut in_flight = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if in_flight
            .get(&review_id)
            .is_some_and(|entry| entry.generation == generation)
        {
            in_flight.remove(&review_id);
        }
        outcome
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    pub async fn create_review_and_store(
        &self,
        input: CreateReviewInput,
        options: MutationOptions,
    ) -> Result<Arc<ReviewRecord>> {
        let store = self.clone();
        run_to_completion("reviews.createReviewAndStore", async move {
            let review = Arc::new(store.inner.mutations.create_review(input, options).await?);
            store.store_record(review.clone());
            store.notify_followers(&review).await;
            Ok(review)
        })
        .await
    }

    pub async fn update_review_and_store(
        &self,
        input: UpdateReviewInput,
        options: MutationOptions,
    ) -> Result<Arc<ReviewRecord>> {
        let store = self.clone();
        run_to_completion("reviews.updateReviewAndStore", async move {
            let review = Arc::new(store.inner.mutations.update_review(input, options).await?);
            store.store_record(review.clone());
            Ok(review)
        })
        .await
    }

    pub async fn delete_review_and_store(&self, input: DeleteReviewInput) -> Result<()> {
        let store = self.clone();
        run_to_completion("reviews.deleteReviewAndStore", async move {
            let review_id = input.review_id.clone();
            store.inner.mutations.delete_review(input).await?;
            store.remove_review(&review_id);
            Ok(())
        })
        .await
    }

    /// Send `review_published` to each follower of the author.
    ///
    /// Each delivery is attempted up to `FANOUT_ATTEMPTS` times. Failures
    /// are logged and never reach the caller.
    async fn notify_followers(&self, review: &ReviewRecord) {
        let Some(fanout) = self.inner.fanout.as_ref() else {
            return;
        };

        let followers = match fanout.list_follower_ids(&review.user_id).await {
            Ok(followers) => followers,
            Err(e) => {
                warn!(review_id = %review.id, user_id = %review.user_id, error = %e, "reviews: follower lookup failed, skipping fan-out");
                return;
            }
        };

        let created_at = self.inner.clock.now_iso();
        let deliveries = followers
            .iter()
            .filter(|follower| **follower != review.user_id)
            .map(|follower| {
                let notification =
                    ReviewPublishedNotification::for_follower(review, follower, &created_at);
                deliver_with_retry(fanout.as_ref(), notification)
            });
        let results = join_all(deliveries).await;
        let failed = results.iter().filter(|delivered| !**delivered).count();

        info!(
            review_id = %review.id,
            followers = results.len(),
            failed,
            "reviews: fan-out finished"
        );
    }
}

/// Configures a [`ReviewStore`] before it is shared.
pub struct ReviewStoreBuilder {
    mutations: ReviewMutations,
    clock: Arc<dyn Clock>,
    fanout: Option<Arc<dyn FollowerFanout>>,
    events: EventBus,
}

impl ReviewStoreBuilder {
    /// Use `clock` for freshness and notification timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Notify the author's followers after each successful create.
    pub fn with_fanout(mut self, fanout: Arc<dyn FollowerFanout>) -> Self {
        self.fanout = Some(fanout);
        self
    }

    /// Share an event bus with other stores.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn build(self) -> ReviewStore {
        ReviewStore {
            inner: Arc::new(StoreInner {
                state: RwLock::new(ReviewState::default()),
                in_flight: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
                mutations: self.mutations,
                clock: self.clock,
                fanout: self.fanout,
                events: self.events,
            }),
        }
    }
}

async fn deliver_with_retry(
    fanout: &dyn FollowerFanout,
    notification: ReviewPublishedNotification,
) -> bool {
    for attempt in 1..=FANOUT_ATTEMPTS {
        match fanout.create_notification(notification.clone()).await {
            Ok(()) => return true,
            Err(e) => warn!(
                user_id = %notification.user_id,
                review_id = %notification.target_review_id,
                attempt,
                error = %e,
                "reviews: notification delivery failed"
            ),
        }
    }
    false
}
