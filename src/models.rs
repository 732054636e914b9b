use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::config::Config;
use crate::storage::Storage;
use crate::thumbnail::ThumbnailResolver;

/// A committed video row.
#[derive(Clone, Debug, FromRow)]
pub struct VideoRecord {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub filename: String,
    pub thumbnail_filename: Option<String>,
    pub uploader_id: Option<i64>,
    pub likes: i64,
    pub created_at: i64,
}

/// Listing row, joined with the uploader's username.
#[derive(Clone, Debug, FromRow)]
pub struct VideoListingRow {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub filename: String,
    pub thumbnail_filename: Option<String>,
    pub likes: i64,
    pub created_at: i64,
    pub uploader: Option<String>,
}

#[derive(Clone, Debug, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
}

#[derive(Clone, Debug, FromRow)]
pub struct CommentRow {
    pub id: i64,
    pub author: Option<String>,
    pub text: String,
    pub created_at: i64,
}

/// Authenticated caller as asserted by the token service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: i64,
    pub username: String,
}

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub storage: Storage,
    pub thumbnails: ThumbnailResolver,
    pub verifier: Arc<dyn TokenVerifier>,
    pub config: Config,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub ok: bool,
    pub id: i64,
}

#[derive(Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSummary {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub likes: i64,
    pub created_at: i64,
    pub uploader: Option<String>,
}

impl From<VideoListingRow> for VideoSummary {
    fn from(row: VideoListingRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            url: format!("/uploads/{}", row.filename),
            thumbnail_url: row.thumbnail_filename.map(|t| format!("/uploads/{}", t)),
            likes: row.likes,
            created_at: row.created_at,
            uploader: row.uploader,
        }
    }
}

#[derive(Serialize)]
pub struct VideoListResponse {
    pub videos: Vec<VideoSummary>,
}

#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: Identity,
}

#[derive(Serialize)]
pub struct LikesResponse {
    pub likes: i64,
}

#[derive(Deserialize)]
pub struct CommentRequest {
    pub author: Option<String>,
    pub text: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentSummary {
    pub id: i64,
    pub author: Option<String>,
    pub text: String,
    pub created_at: i64,
}

impl From<CommentRow> for CommentSummary {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            author: row.author,
            text: row.text,
            created_at: row.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct CommentListResponse {
    pub comments: Vec<CommentSummary>,
}

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
