use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

pub mod auth;
pub mod cleanup;
pub mod config;
pub mod db;
pub mod error;
pub mod ffmpeg;
pub mod handlers;
pub mod models;
pub mod storage;
pub mod system_info;
pub mod thumbnail;
pub mod upload;

use auth::JwtVerifier;
use config::Config;
use ffmpeg::FrameExtractor;
use handlers::{
    add_comment_handler, delete_handler, health_handler, like_handler, list_comments_handler,
    list_videos_handler, login_handler, register_handler, upload_handler,
};
use models::AppState;
use storage::Storage;
use thumbnail::ThumbnailResolver;

/// Create the storage directory, open the database and wire up shared state.
pub async fn build_state(
    config: Config,
    extractor: Arc<dyn FrameExtractor>,
) -> anyhow::Result<Arc<AppState>> {
    let storage = Storage::new(&config.upload_dir);
    storage.ensure().await?;

    let db = db::connect(&config.db_file).await?;

    let thumbnails = ThumbnailResolver::new(
        storage.clone(),
        extractor,
        config.max_concurrent_extractions,
        config.thumb_offset_seconds,
    );

    Ok(Arc::new(AppState {
        db,
        storage,
        thumbnails,
        verifier: Arc::new(JwtVerifier::new(config.jwt_secret.clone())),
        config,
    }))
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/videos", get(list_videos_handler).post(upload_handler))
        .route("/api/videos/:id", delete(delete_handler))
        .route("/api/videos/:id/like", post(like_handler))
        .route(
            "/api/videos/:id/comments",
            get(list_comments_handler).post(add_comment_handler),
        )
        .route("/api/register", post(register_handler))
        .route("/api/login", post(login_handler))
        .route("/health", get(health_handler))
        .nest_service("/uploads", ServeDir::new(state.storage.root()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
