//! Wiring of repositories, the photo pipeline and both stores.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use placemark_core::{
    BlobStorage, Clock, DocumentStore, EngagementRepository, EventBus, PhotoCompressor,
    PhotoPipeline, Result, ReviewRepository, SystemClock,
};
use placemark_db::{
    DocumentEngagementRepository, DocumentFollowerFanout, DocumentReviewRepository,
    FilesystemBlobStorage, HttpBlobStorage, HttpDocumentStore, MemoryDocumentStore,
};
use placemark_media::{FfmpegCompressor, PassthroughCompressor, StoragePhotoPipeline};
use placemark_reviews::{MutationDeps, ReviewMutations};
use placemark_state::{EngagementStore, ReviewStore};

use crate::config::{AppConfig, BlobBackend, CompressorChoice, DocumentBackend};

const CHECK_PATH: &str = "health-check/round-trip.bin";
const CHECK_BYTES: &[u8] = b"placemark-storage-check";

/// Result of [`Services::check`].
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub document_backend: &'static str,
    pub blob_backend: &'static str,
    pub compressor: &'static str,
    pub recent_reviews: usize,
    pub blob_round_trip: bool,
    pub duration_ms: u64,
}

pub struct Services {
    pub clock: Arc<dyn Clock>,
    pub events: EventBus,
    pub reviews: Arc<dyn ReviewRepository>,
    pub engagement: Arc<dyn EngagementRepository>,
    pub photos: Arc<dyn PhotoPipeline>,
    pub review_store: ReviewStore,
    pub engagement_store: EngagementStore,
    blob_storage: Option<Arc<dyn BlobStorage>>,
    document_backend: &'static str,
    blob_backend: &'static str,
    compressor: &'static str,
}

impl Services {
    /// Build every collaborator for `config`. Backends are fixed from here on.
    pub async fn bootstrap(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let events = EventBus::default();

        let documents: Arc<dyn DocumentStore> = match &config.document {
            DocumentBackend::Memory => {
                info!("Using in-memory document store (data is not persisted)");
                Arc::new(MemoryDocumentStore::new())
            }
            DocumentBackend::Http(http) => Arc::new(HttpDocumentStore::new(http.clone())?),
        };
        let reviews: Arc<dyn ReviewRepository> =
            Arc::new(DocumentReviewRepository::new(documents.clone()));
        let engagement: Arc<dyn EngagementRepository> = Arc::new(
            DocumentEngagementRepository::new(documents.clone(), clock.clone()),
        );

        let (compressor, compressor_name) = build_compressor(config).await;
        let blob_storage: Option<Arc<dyn BlobStorage>> = match &config.blob {
            BlobBackend::LocalEcho => None,
            BlobBackend::Filesystem(dir) => {
                let storage = FilesystemBlobStorage::new(dir.clone());
                if let Err(e) = storage.validate().await {
                    warn!(error = %e, "Filesystem blob storage failed validation");
                }
                Some(Arc::new(storage))
            }
            BlobBackend::Http(http) => Some(Arc::new(HttpBlobStorage::new(http.clone())?)),
        };
        let photos: Arc<dyn PhotoPipeline> = Arc::new(match &blob_storage {
            Some(storage) => StoragePhotoPipeline::new(compressor, storage.clone()),
            None => StoragePhotoPipeline::local_echo(compressor),
        });

        let mutations = ReviewMutations::new(
            MutationDeps::new(reviews.clone(), photos.clone())
                .with_clock(clock.clone())
                .with_step_timeout(config.step_timeout),
        );
        let review_store = ReviewStore::builder(mutations)
            .with_clock(clock.clone())
            .with_fanout(Arc::new(DocumentFollowerFanout::new(documents)))
            .with_events(events.clone())
            .build();
        let engagement_store = EngagementStore::with_events(engagement.clone(), events.clone());

        info!(
            document_backend = config.document.name(),
            blob_backend = config.blob.name(),
            compressor = compressor_name,
            step_timeout_ms = config.step_timeout.as_millis() as u64,
            "Services ready"
        );

        Ok(Self {
            clock,
            events,
            reviews,
            engagement,
            photos,
            review_store,
            engagement_store,
            blob_storage,
            document_backend: config.document.name(),
            blob_backend: config.blob.name(),
            compressor: compressor_name,
        })
    }

    /// Check the document store with a small read and blob storage with a
    /// write, read, delete round trip.
    pub async fn check(&self) -> Result<CheckReport> {
        let started = Instant::now();
        let recent = self.reviews.list_recent_reviews(1).await?;

        let blob_round_trip = match &self.blob_storage {
            Some(storage) => {
                storage
                    .upload(CHECK_PATH, CHECK_BYTES.to_vec(), "application/octet-stream")
                    .await?;
                let read_back = storage.read(CHECK_PATH).await?;
                storage.delete(CHECK_PATH).await?;
                if read_back != CHECK_BYTES {
                    return Err(placemark_core::Error::Storage(
                        "blob storage check read back different bytes".to_string(),
                    ));
                }
                true
            }
            None => false,
        };

        Ok(CheckReport {
            document_backend: self.document_backend,
            blob_backend: self.blob_backend,
            compressor: self.compressor,
            recent_reviews: recent.len(),
            blob_round_trip,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

async fn build_compressor(config: &AppConfig) -> (Arc<dyn PhotoCompressor>, &'static str) {
    let use_ffmpeg = match config.compressor {
        CompressorChoice::Ffmpeg => true,
        CompressorChoice::Passthrough => false,
        CompressorChoice::Auto => {
            let available = FfmpegCompressor::is_available().await;
            if !available {
                info!("ffmpeg not found, photos are uploaded uncompressed");
            }
            available
        }
    };
    let compressor: Arc<dyn PhotoCompressor> = if use_ffmpeg {
        Arc::new(FfmpegCompressor::new(config.work_dir.clone()))
    } else {
        Arc::new(PassthroughCompressor)
    };
    (compressor, if use_ffmpeg { "ffmpeg" } else { "passthrough" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use placemark_core::{
        CreateReviewInput, DeleteReviewInput, ReviewAuthor, ReviewPhotoDraft, ReviewPlace,
        ReviewVisibility,
    };
    use placemark_reviews::MutationOptions;
    use placemark_state::FetchPolicy;

    fn local_config() -> AppConfig {
        AppConfig {
            compressor: CompressorChoice::Passthrough,
            ..AppConfig::default()
        }
    }

    fn input(photos: Vec<ReviewPhotoDraft>) -> CreateReviewInput {
        CreateReviewInput {
            author: ReviewAuthor {
                id: "user-1".to_string(),
                name: "Morgan".to_string(),
                handle: "morgan".to_string(),
                avatar: None,
            },
            place: ReviewPlace {
                id: "place-1".to_string(),
                title: "Tidewater Oyster Bar".to_string(),
                coordinates: Some([-122.41, 37.77]),
            },
            notes: "Briny and cold".to_string(),
            rating: 9.0,
            visibility: ReviewVisibility::Followers,
            photos,
        }
    }

    #[tokio::test]
    async fn local_bootstrap_publishes_and_lists() {
        let services = Services::bootstrap(&local_config()).await.unwrap();

        let review = services
            .review_store
            .create_review_and_store(input(Vec::new()), MutationOptions::default())
            .await
            .unwrap();

        services.review_store.clear_reviews();
        services
            .review_store
            .hydrate_reviews(10, FetchPolicy::forced())
            .await;
        assert_eq!(services.review_store.review_ids(), vec![review.id.clone()]);

        let for_place = services
            .review_store
            .hydrate_place_reviews("place-1")
            .await
            .unwrap();
        assert_eq!(for_place.len(), 1);

        services
            .review_store
            .delete_review_and_store(DeleteReviewInput {
                review_id: review.id.clone(),
                author_id: "user-1".to_string(),
            })
            .await
            .unwrap();
        assert!(services.reviews.load_review(&review.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn filesystem_backend_stores_photos_and_passes_check() {
        let blobs = tempfile::tempdir().unwrap();
        let source_dir = tempfile::tempdir().unwrap();
        let source = source_dir.path().join("oysters.jpg");
        std::fs::write(&source, b"jpeg bytes").unwrap();

        let config = AppConfig {
            blob: BlobBackend::Filesystem(blobs.path().to_path_buf()),
            ..local_config()
        };
        let services = Services::bootstrap(&config).await.unwrap();

        let report = services.check().await.unwrap();
        assert_eq!(report.document_backend, "memory");
        assert_eq!(report.blob_backend, "filesystem");
        assert_eq!(report.compressor, "passthrough");
        assert!(report.blob_round_trip);

        let review = services
            .review_store
            .create_review_and_store(
                input(vec![ReviewPhotoDraft::local(source.display().to_string())]),
                MutationOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(review.photos.len(), 1);
        assert!(blobs.path().join(&review.photos[0].path).exists());
    }

    #[tokio::test]
    async fn local_echo_check_skips_blob_round_trip() {
        let services = Services::bootstrap(&local_config()).await.unwrap();

        let report = services.check().await.unwrap();

        assert_eq!(report.blob_backend, "local-echo");
        assert!(!report.blob_round_trip);
        assert_eq!(report.recent_reviews, 0);
    }

    #[tokio::test]
    async fn engagement_store_shares_the_document_store() {
        let services = Services::bootstrap(&local_config()).await.unwrap();

        services
            .engagement_store
            .hydrate_like_state("review-1", "user-1", false)
            .await
            .unwrap();
        assert!(services.engagement_store.toggle_like("review-1", "user-1").await.unwrap());

        let state = services.engagement.get_like_state("review-1", "user-1").await.unwrap();
        assert!(state.liked);
        assert_eq!(state.like_count, 1);
    }
}
