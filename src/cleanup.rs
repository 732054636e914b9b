use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::db;
use crate::error::AppError;
use crate::models::Identity;
use crate::storage::Storage;

/// Remove files staged by a request that is about to fail.
pub async fn rollback_staged(storage: &Storage, names: &[&str]) {
    for name in names {
        match storage.remove_if_present(name).await {
            Ok(true) => info!("[cleanup] ↩️  Rolled back staged file {}", name),
            Ok(false) => warn!("[cleanup] Staged file {} was already gone", name),
            Err(e) => error!("[cleanup] ❌ Failed to roll back staged file {}: {}", name, e),
        }
    }
}

/// Best-effort removal: a missing file is fine, other errors are logged.
async fn remove_best_effort(storage: &Storage, name: &str) {
    match storage.remove_if_present(name).await {
        Ok(true) => info!("[cleanup] ✅ Deleted file {}", name),
        Ok(false) => warn!("[cleanup] File {} was already gone", name),
        Err(e) => error!("[cleanup] ❌ Failed to delete file {}: {}", name, e),
    }
}

/// Delete a video on behalf of its uploader.
///
/// File removal never blocks row removal.
pub async fn delete_video(
    pool: &SqlitePool,
    storage: &Storage,
    video_id: i64,
    requester: &Identity,
) -> Result<(), AppError> {
    let video = db::find_video(pool, video_id)
        .await?
        .ok_or(AppError::NotFound)?;

    if video.uploader_id != Some(requester.id) {
        warn!(
            "[cleanup] User {} may not delete video {} (uploader {:?})",
            requester.id, video_id, video.uploader_id
        );
        return Err(AppError::Forbidden);
    }

    remove_best_effort(storage, &video.filename).await;
    if let Some(thumbnail) = &video.thumbnail_filename {
        remove_best_effort(storage, thumbnail).await;
    }

    // A concurrent delete may have removed the row since the lookup
    if !db::delete_video(pool, video_id).await? {
        return Err(AppError::NotFound);
    }
    info!("[cleanup] 🗑️  Video {} deleted", video_id);

    Ok(())
}
