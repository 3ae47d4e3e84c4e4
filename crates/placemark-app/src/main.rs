//! placemark: operator CLI for publishing and browsing place reviews.
//!
//! Every command prints JSON on stdout; logs go to stderr (or `LOG_FILE`).

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use placemark_app::{AppConfig, LogConfig, Services};
use placemark_core::defaults::{COMMENT_LIST_LIMIT, REVIEW_LIST_LIMIT};
use placemark_core::{
    CreateReviewInput, DeleteReviewInput, ReviewAuthor, ReviewPhotoDraft, ReviewPlace,
    ReviewRecord, ReviewVisibility,
};
use placemark_reviews::MutationOptions;
use placemark_state::{FetchPolicy, HydrateOutcome};

const DEFAULT_LOG_FILTER: &str = "warn,placemark=info,placemark_app=info,placemark_core=info,\
placemark_db=info,placemark_media=info,placemark_reviews=info,placemark_state=info";

#[derive(Parser)]
#[command(name = "placemark")]
#[command(author, version, about = "Publish and browse place reviews")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration and exercise the configured backends
    Check,

    /// Publish a review, uploading its photos
    Publish {
        #[arg(long)]
        author_id: String,

        #[arg(long)]
        author_name: String,

        #[arg(long)]
        author_handle: String,

        #[arg(long)]
        author_avatar: Option<String>,

        #[arg(long)]
        place_id: String,

        #[arg(long)]
        place_title: String,

        /// Place longitude (requires --lat)
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lng: Option<f64>,

        /// Place latitude (requires --lng)
        #[arg(long, requires = "lng", allow_hyphen_values = true)]
        lat: Option<f64>,

        #[arg(short, long)]
        rating: f64,

        #[arg(short, long, default_value = "")]
        notes: String,

        #[arg(long, default_value = "followers", value_parser = ["followers", "subscribers"])]
        visibility: String,

        /// Local photo files, in display order (can specify multiple)
        #[arg(short, long = "photo")]
        photos: Vec<PathBuf>,
    },

    /// List the most recent reviews
    Feed {
        #[arg(short, long, default_value_t = REVIEW_LIST_LIMIT)]
        limit: usize,
    },

    /// List every review of one place
    Place {
        place_id: String,
    },

    /// Show one review
    Show {
        review_id: String,
    },

    /// List a review's comments, newest first
    Comments {
        review_id: String,

        #[arg(short, long, default_value_t = COMMENT_LIST_LIMIT)]
        limit: usize,
    },

    /// Delete a review and its photos
    Remove {
        #[arg(long)]
        review_id: String,

        /// Must match the review's author
        #[arg(long)]
        author_id: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = init_tracing(&LogConfig::from_env());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize tracing.
///
/// `RUST_LOG` filters (default: `info` for the placemark crates, `warn`
/// elsewhere). Console output goes to stderr; `LOG_FILE` switches to a
/// daily-rotated file.
fn init_tracing(config: &LogConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(env_filter);

    if let Some(ref path) = config.file {
        let file_dir = path.parent().unwrap_or(Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("placemark.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if config.json {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(config.ansi.unwrap_or(false)),
                )
                .init();
        }
        Some(guard)
    } else {
        if config.json {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
            if let Some(ansi) = config.ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    let services = Services::bootstrap(&config)
        .await
        .context("failed to start services")?;

    match cli.command {
        Commands::Check => {
            let report = services.check().await.context("backend check failed")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Publish {
            author_id,
            author_name,
            author_handle,
            author_avatar,
            place_id,
            place_title,
            lng,
            lat,
            rating,
            notes,
            visibility,
            photos,
        } => {
            let input = CreateReviewInput {
                author: ReviewAuthor {
                    id: author_id,
                    name: author_name,
                    handle: author_handle,
                    avatar: author_avatar,
                },
                place: ReviewPlace {
                    id: place_id,
                    title: place_title,
                    coordinates: lng.zip(lat).map(|(lng, lat)| [lng, lat]),
                },
                notes,
                rating,
                visibility: ReviewVisibility::parse_lenient(&visibility),
                photos: photos
                    .iter()
                    .map(|path| ReviewPhotoDraft::local(path.display().to_string()))
                    .collect(),
            };
            cmd_publish(&services, input).await?;
        }
        Commands::Feed { limit } => {
            let limit = limit.clamp(1, config.hydrate_limit);
            if let HydrateOutcome::Failed(e) = services
                .review_store
                .hydrate_reviews(limit, FetchPolicy::forced())
                .await
            {
                return Err(e).context("failed to load recent reviews");
            }
            print_reviews(&services.review_store.review_records())?;
        }
        Commands::Place { place_id } => {
            let reviews = services
                .review_store
                .hydrate_place_reviews(&place_id)
                .await
                .with_context(|| format!("failed to load reviews for {}", place_id))?;
            print_reviews(&reviews)?;
        }
        Commands::Show { review_id } => {
            let review = services
                .review_store
                .fetch_review_by_id_cached(&review_id, FetchPolicy::detail())
                .await
                .with_context(|| format!("failed to load {}", review_id))?
                .ok_or_else(|| anyhow::anyhow!("review not found: {}", review_id))?;
            println!("{}", serde_json::to_string_pretty(review.as_ref())?);
        }
        Commands::Comments { review_id, limit } => {
            let engagement = &services.engagement_store;
            engagement
                .hydrate_comments(&review_id, limit, true)
                .await
                .with_context(|| format!("failed to load comments for {}", review_id))?;
            let counts = engagement.hydrate_counts(&review_id).await?;
            let comments = engagement.comments(&review_id);
            let output = serde_json::json!({
                "reviewId": review_id,
                "likes": counts.likes,
                "comments": counts.comments,
                "hasMore": comments.has_more,
                "items": comments.items,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Remove {
            review_id,
            author_id,
        } => {
            services
                .review_store
                .delete_review_and_store(DeleteReviewInput {
                    review_id: review_id.clone(),
                    author_id,
                })
                .await
                .with_context(|| format!("failed to delete {}", review_id))?;
            let output = serde_json::json!({ "deleted": review_id });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

async fn cmd_publish(services: &Services, input: CreateReviewInput) -> anyhow::Result<()> {
    let options = MutationOptions::with_progress(|progress| {
        info!(
            review_id = %progress.review_id,
            stage = ?progress.stage,
            completed = progress.completed,
            total = progress.total,
            "Publish progress"
        );
    });
    let review = services
        .review_store
        .create_review_and_store(input, options)
        .await
        .context("failed to publish review")?;
    println!("{}", serde_json::to_string_pretty(review.as_ref())?);
    Ok(())
}

fn print_reviews(reviews: &[std::sync::Arc<ReviewRecord>]) -> anyhow::Result<()> {
    let records: Vec<&ReviewRecord> = reviews.iter().map(|r| r.as_ref()).collect();
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}
