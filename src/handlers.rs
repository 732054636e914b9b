use crate::{
    auth::{self, AuthUser},
    cleanup,
    db::{self, NewVideo},
    error::AppError,
    models::{
        AppState, CommentListResponse, CommentRequest, CommentSummary, CredentialsRequest,
        Identity, LikesResponse, LoginResponse, OkResponse, UploadResponse, VideoListResponse,
        VideoSummary,
    },
    upload,
};
use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::header::CONTENT_TYPE,
    response::Json,
};
use serde_json::{json, Value};
use std::{sync::Arc, time::Instant};
use tracing::{error, info, warn};

const ANONYMOUS_AUTHOR: &str = "anonymous";

/// Upload a video: stage the file, resolve a thumbnail, then commit the row.
///
/// The pipeline runs in its own task. A client that disconnects drops this
/// future, not the task, so staging always ends in a commit or a rollback.
pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    request: Request<Body>,
) -> Result<Json<UploadResponse>, AppError> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let pipeline = tokio::spawn(run_upload(state, user, content_type, request.into_body()));
    let id = pipeline
        .await
        .map_err(|e| AppError::Internal(format!("upload task failed: {}", e)))??;

    Ok(Json(UploadResponse { ok: true, id }))
}

async fn run_upload(
    state: Arc<AppState>,
    user: Identity,
    content_type: Option<String>,
    body: Body,
) -> Result<i64, AppError> {
    let start_time = Instant::now();
    info!("[POST /api/videos] ⏱️  START - uploader {}", user.id);

    let received = upload::receive(
        &state.storage,
        state.config.max_file_size,
        content_type.as_deref(),
        body,
    )
    .await
    .map_err(|e| {
        info!("[POST /api/videos] ✗ Rejected: {}", e);
        e
    })?;

    let thumbnail = state
        .thumbnails
        .resolve(&received.video_name, received.thumbnail.as_deref())
        .await;

    let new_video = NewVideo {
        title: &received.title,
        description: received.description.as_deref(),
        filename: &received.video_name,
        thumbnail_filename: thumbnail.as_deref(),
        uploader_id: user.id,
    };

    let id = match db::insert_video(&state.db, &new_video).await {
        Ok(id) => id,
        Err(e) => {
            error!("[POST /api/videos] ❌ Metadata commit failed: {}", e);
            let mut staged = vec![received.video_name.as_str()];
            staged.extend(thumbnail.as_deref());
            cleanup::rollback_staged(&state.storage, &staged).await;
            return Err(e);
        }
    };

    info!(
        "[POST /api/videos] ✅ SUCCESS - Video ID: {} (thumbnail: {}) in {:.2}s",
        id,
        thumbnail.as_deref().unwrap_or("none"),
        start_time.elapsed().as_secs_f64()
    );

    Ok(id)
}

/// Delete a video owned by the caller.
pub async fn delete_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(video_id): Path<i64>,
) -> Result<Json<OkResponse>, AppError> {
    info!("[DELETE /api/videos/{}] requested by {}", video_id, user.id);

    cleanup::delete_video(&state.db, &state.storage, video_id, &user).await?;

    Ok(Json(OkResponse { ok: true }))
}

/// List videos, newest first.
pub async fn list_videos_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<VideoListResponse>, AppError> {
    let videos = db::list_videos(&state.db)
        .await?
        .into_iter()
        .map(VideoSummary::from)
        .collect();

    Ok(Json(VideoListResponse { videos }))
}

fn credentials(request: CredentialsRequest) -> Result<(String, String), AppError> {
    match (request.username, request.password) {
        (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
            Ok((username, password))
        }
        _ => Err(AppError::Validation(
            "username and password required".to_string(),
        )),
    }
}

pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CredentialsRequest>,
) -> Result<Json<UploadResponse>, AppError> {
    let (username, password) = credentials(request)?;

    let hash = auth::hash_password(password, state.config.bcrypt_cost).await?;
    let id = db::insert_user(&state.db, &username, &hash)
        .await
        .map_err(|e| match e {
            AppError::Conflict(_) => AppError::Conflict("username already taken".to_string()),
            other => other,
        })?;

    info!("[POST /api/register] ✅ User {} registered as {}", username, id);
    Ok(Json(UploadResponse { ok: true, id }))
}

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CredentialsRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let (username, password) = credentials(request)?;
    let invalid = || AppError::Auth("invalid credentials".to_string());

    let user = db::find_user_by_username(&state.db, &username)
        .await?
        .ok_or_else(invalid)?;
    if !auth::verify_password(password, user.password_hash).await? {
        warn!("[POST /api/login] Wrong password for {}", username);
        return Err(invalid());
    }

    let identity = Identity {
        id: user.id,
        username: user.username,
    };
    let token = auth::issue_token(&state.config.jwt_secret, &identity)?;

    Ok(Json(LoginResponse {
        token,
        user: identity,
    }))
}

pub async fn like_handler(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<i64>,
) -> Result<Json<LikesResponse>, AppError> {
    let likes = db::add_like(&state.db, video_id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(LikesResponse { likes }))
}

pub async fn list_comments_handler(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<i64>,
) -> Result<Json<CommentListResponse>, AppError> {
    let comments = db::list_comments(&state.db, video_id)
        .await?
        .into_iter()
        .map(CommentSummary::from)
        .collect();

    Ok(Json(CommentListResponse { comments }))
}

/// Comments are open to anonymous callers.
pub async fn add_comment_handler(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<i64>,
    Json(request): Json<CommentRequest>,
) -> Result<Json<OkResponse>, AppError> {
    let text = request
        .text
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Validation("text required".to_string()))?;
    let author = request
        .author
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or(ANONYMOUS_AUTHOR);

    db::insert_comment(&state.db, video_id, author, text).await?;

    Ok(Json(OkResponse { ok: true }))
}

pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
