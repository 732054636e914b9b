//! SQLite persistence for video metadata.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::error::AppError;
use crate::models::{CommentRow, UserRow, VideoListingRow, VideoRecord};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT UNIQUE NOT NULL,
        password_hash TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS videos (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        description TEXT,
        filename TEXT NOT NULL,
        thumbnail_filename TEXT,
        uploader_id INTEGER,
        likes INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        FOREIGN KEY(uploader_id) REFERENCES users(id) ON DELETE SET NULL
    )",
    "CREATE TABLE IF NOT EXISTS comments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        video_id INTEGER NOT NULL,
        author TEXT,
        text TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        FOREIGN KEY(video_id) REFERENCES videos(id) ON DELETE CASCADE
    )",
];

pub struct NewVideo<'a> {
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub filename: &'a str,
    pub thumbnail_filename: Option<&'a str>,
    pub uploader_id: i64,
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Open (creating if needed) the database file and apply the schema.
pub async fn connect(path: &Path) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    for statement in SCHEMA {
        sqlx::query(*statement).execute(&pool).await?;
    }
    info!("[db] 🗄️  Database ready at {:?}", path);

    Ok(pool)
}

/// Insert a video row and return its id. One statement, so either the whole
/// row exists afterwards or nothing does.
pub async fn insert_video(pool: &SqlitePool, video: &NewVideo<'_>) -> Result<i64, AppError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO videos (title, description, filename, thumbnail_filename, uploader_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         RETURNING id",
    )
    .bind(video.title)
    .bind(video.description.unwrap_or(""))
    .bind(video.filename)
    .bind(video.thumbnail_filename)
    .bind(video.uploader_id)
    .bind(now_millis())
    .fetch_one(pool)
    .await
    .map_err(AppError::from_db)?;

    Ok(id)
}

pub async fn find_video(pool: &SqlitePool, id: i64) -> Result<Option<VideoRecord>, AppError> {
    let record = sqlx::query_as::<_, VideoRecord>(
        "SELECT id, title, description, filename, thumbnail_filename, uploader_id, likes, created_at
         FROM videos WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Returns whether a row was removed.
pub async fn delete_video(pool: &SqlitePool, id: i64) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM videos WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn list_videos(pool: &SqlitePool) -> Result<Vec<VideoListingRow>, AppError> {
    let rows = sqlx::query_as::<_, VideoListingRow>(
        "SELECT v.id, v.title, v.description, v.filename, v.thumbnail_filename, v.likes,
                v.created_at, u.username AS uploader
         FROM videos v
         LEFT JOIN users u ON u.id = v.uploader_id
         ORDER BY v.created_at DESC, v.id DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Storage side of the identity service; usernames are unique.
pub async fn insert_user(
    pool: &SqlitePool,
    username: &str,
    password_hash: &str,
) -> Result<i64, AppError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO users (username, password_hash, created_at) VALUES (?1, ?2, ?3) RETURNING id",
    )
    .bind(username)
    .bind(password_hash)
    .bind(now_millis())
    .fetch_one(pool)
    .await
    .map_err(AppError::from_db)?;

    Ok(id)
}

pub async fn find_user_by_username(
    pool: &SqlitePool,
    username: &str,
) -> Result<Option<UserRow>, AppError> {
    let user = sqlx::query_as::<_, UserRow>(
        "SELECT id, username, password_hash FROM users WHERE username = ?1",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

/// Increment the like counter. `None` if the video does not exist.
pub async fn add_like(pool: &SqlitePool, video_id: i64) -> Result<Option<i64>, AppError> {
    let likes = sqlx::query_scalar::<_, i64>(
        "UPDATE videos SET likes = likes + 1 WHERE id = ?1 RETURNING likes",
    )
    .bind(video_id)
    .fetch_optional(pool)
    .await?;

    Ok(likes)
}

pub async fn insert_comment(
    pool: &SqlitePool,
    video_id: i64,
    author: &str,
    text: &str,
) -> Result<i64, AppError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO comments (video_id, author, text, created_at) VALUES (?1, ?2, ?3, ?4)
         RETURNING id",
    )
    .bind(video_id)
    .bind(author)
    .bind(text)
    .bind(now_millis())
    .fetch_one(pool)
    .await
    .map_err(|e| match AppError::from_db(e) {
        // The only foreign key on comments is the video
        AppError::Conflict(_) => AppError::NotFound,
        other => other,
    })?;

    Ok(id)
}

pub async fn list_comments(pool: &SqlitePool, video_id: i64) -> Result<Vec<CommentRow>, AppError> {
    let rows = sqlx::query_as::<_, CommentRow>(
        "SELECT id, author, text, created_at FROM comments
         WHERE video_id = ?1
         ORDER BY created_at DESC, id DESC",
    )
    .bind(video_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn pool() -> (tempfile::TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = connect(&dir.path().join("test.sqlite")).await.unwrap();
        (dir, pool)
    }

    #[tokio::test]
    async fn insert_find_and_delete_video() {
        let (_dir, pool) = pool().await;
        let uploader = insert_user(&pool, "alice", "hash").await.unwrap();

        let id = insert_video(
            &pool,
            &NewVideo {
                title: "First",
                description: None,
                filename: "1-abc.mp4",
                thumbnail_filename: Some("1-def.jpg"),
                uploader_id: uploader,
            },
        )
        .await
        .unwrap();

        let record = find_video(&pool, id).await.unwrap().unwrap();
        assert_eq!(record.title, "First");
        assert_eq!(record.description.as_deref(), Some(""));
        assert_eq!(record.thumbnail_filename.as_deref(), Some("1-def.jpg"));
        assert_eq!(record.uploader_id, Some(uploader));
        assert_eq!(record.likes, 0);

        let listed = list_videos(&pool).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].uploader.as_deref(), Some("alice"));

        assert!(delete_video(&pool, id).await.unwrap());
        assert!(find_video(&pool, id).await.unwrap().is_none());
        assert!(!delete_video(&pool, id).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_username_is_a_conflict() {
        let (_dir, pool) = pool().await;
        insert_user(&pool, "bob", "hash").await.unwrap();

        let err = insert_user(&pool, "bob", "other").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn unknown_uploader_is_a_conflict() {
        let (_dir, pool) = pool().await;

        let err = insert_video(
            &pool,
            &NewVideo {
                title: "Orphan",
                description: Some("no such user"),
                filename: "1-abc.mp4",
                thumbnail_filename: None,
                uploader_id: 42,
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        assert!(list_videos(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn removing_uploader_orphans_video() {
        let (_dir, pool) = pool().await;
        let uploader = insert_user(&pool, "carol", "hash").await.unwrap();
        let id = insert_video(
            &pool,
            &NewVideo {
                title: "Kept",
                description: None,
                filename: "1-abc.mp4",
                thumbnail_filename: None,
                uploader_id: uploader,
            },
        )
        .await
        .unwrap();

        sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(uploader)
            .execute(&pool)
            .await
            .unwrap();

        let record = find_video(&pool, id).await.unwrap().unwrap();
        assert_eq!(record.uploader_id, None);
    }

    #[tokio::test]
    async fn likes_and_comments_follow_the_video() {
        let (_dir, pool) = pool().await;
        let uploader = insert_user(&pool, "dave", "hash").await.unwrap();
        let id = insert_video(
            &pool,
            &NewVideo {
                title: "Liked",
                description: None,
                filename: "1-abc.mp4",
                thumbnail_filename: None,
                uploader_id: uploader,
            },
        )
        .await
        .unwrap();

        assert_eq!(add_like(&pool, id).await.unwrap(), Some(1));
        assert_eq!(add_like(&pool, id).await.unwrap(), Some(2));
        assert_eq!(add_like(&pool, id + 1).await.unwrap(), None);

        insert_comment(&pool, id, "erin", "first").await.unwrap();
        insert_comment(&pool, id, "frank", "second").await.unwrap();
        let comments = list_comments(&pool, id).await.unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].text, "second");

        let err = insert_comment(&pool, id + 1, "erin", "lost").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound));

        let user = find_user_by_username(&pool, "dave").await.unwrap().unwrap();
        assert_eq!(user.id, uploader);
        assert!(find_user_by_username(&pool, "nobody").await.unwrap().is_none());
    }
}
